//! The long-lived realtime connection.
//!
//! `ConnectionManager` owns at most one transport at a time and hides
//! transient failures from callers: unintentional losses are retried with
//! exponential backoff, and every registered topic is re-subscribed before
//! the connection is reported as `Connected`.

use crate::client::config::ConnectionConfig;
use crate::client::heartbeat::HeartbeatConfig;
use crate::client::registry::{handle_for, MessageCallback, Registry};
use crate::client::retry::{RetryDecision, RetryState};
use crate::client::status::ConnectionStatus;
use crate::client::subscription::{Release, Subscription};
use crate::error::{RealtimeError, Result};
use crate::protocol::constants::{headers, HEARTBEAT_EOL};
use crate::protocol::{format_frame, FrameParser, Inbound};
use crate::traits::{Connector, CredentialSource, Transport, TransportEvent};
use crate::types::{Command, Frame, Heartbeat};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

type ConnectAttempt = Shared<BoxFuture<'static, Result<()>>>;

/// Handle to the process-wide realtime connection. Cheap to clone.
///
/// Requires a Tokio runtime: handshakes, readers and retry timers run as
/// spawned tasks.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialSource>,
    state: Mutex<State>,
    status: watch::Sender<ConnectionStatus>,
}

struct State {
    /// Bumped by every new attempt and by `disconnect()`. Work started
    /// under an older generation is discarded.
    generation: u64,
    pending: Option<ConnectAttempt>,
    link: Option<Link>,
    registry: Registry,
    retry: RetryState,
    retry_timer: Option<JoinHandle<()>>,
    /// False until `connect()` is called, and again after `disconnect()`
    /// or an authentication failure.
    auto_reconnect: bool,
    last_error: Option<RealtimeError>,
}

struct Link {
    generation: u64,
    outgoing: async_channel::Sender<String>,
    reader: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
}

impl Link {
    fn push(&self, frame: &Frame) -> bool {
        self.outgoing.try_send(format_frame(frame)).is_ok()
    }

    fn close(self) {
        self.outgoing.close();
        self.reader.abort();
        if let Some(keepalive) = self.keepalive {
            keepalive.abort();
        }
    }
}

/// Result of a completed CONNECT/CONNECTED exchange.
struct Session {
    transport: Transport,
    parser: FrameParser,
    /// Items that arrived in the same read as CONNECTED.
    backlog: Vec<Inbound>,
    send_every: Option<Duration>,
    expect_every: Option<Duration>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let retry = RetryState::new(config.retry.clone());
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                credentials,
                state: Mutex::new(State {
                    generation: 0,
                    pending: None,
                    link: None,
                    registry: Registry::default(),
                    retry,
                    retry_timer: None,
                    auto_reconnect: false,
                    last_error: None,
                }),
                status,
            }),
        }
    }

    /// Manager over a native WebSocket.
    pub fn websocket(config: ConnectionConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::new(
            config,
            Arc::new(crate::client::native_network::WsConnector::new()),
            credentials,
        )
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Open the connection, or join the attempt already in flight.
    ///
    /// Resolves once the handshake has completed and every registered topic
    /// has been re-subscribed. A failed attempt rejects every caller that
    /// joined it once; retryable failures keep being retried in the
    /// background.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.link.is_some() {
                state.auto_reconnect = true;
                return Ok(());
            }
        }
        if self.inner.credentials.access_token().await.is_none() {
            let mut state = self.inner.state.lock();
            if state.link.is_none() && state.pending.is_none() {
                tracing::warn!("[Realtime] No credential available, not connecting");
                state.auto_reconnect = false;
                if let Some(timer) = state.retry_timer.take() {
                    timer.abort();
                }
                state.last_error = Some(RealtimeError::Unauthenticated);
                self.inner.publish(ConnectionStatus::Disconnected);
            }
            return Err(RealtimeError::Unauthenticated);
        }

        let attempt = {
            let mut state = self.inner.state.lock();
            state.auto_reconnect = true;
            if state.link.is_some() {
                return Ok(());
            }
            match &state.pending {
                Some(attempt) => attempt.clone(),
                None => Inner::begin_attempt(&self.inner, &mut state, ConnectionStatus::Connecting),
            }
        };
        attempt.await
    }

    /// Tear the connection down on purpose and stop retrying.
    ///
    /// Registrations survive; they are re-subscribed on the next `connect()`.
    pub fn disconnect(&self) {
        let link = {
            let mut state = self.inner.state.lock();
            state.auto_reconnect = false;
            state.generation += 1;
            state.pending = None;
            if let Some(timer) = state.retry_timer.take() {
                timer.abort();
            }
            state.retry.reset();
            state.registry.clear_live();
            state.link.take()
        };
        if let Some(link) = link {
            link.push(&Frame::disconnect());
            link.close();
            tracing::info!("[Realtime] Disconnected");
        }
        self.inner.publish(ConnectionStatus::Disconnected);
    }

    /// Publish a JSON payload. Returns whether it was handed to an open
    /// transport; never fails.
    pub fn send(&self, destination: &str, payload: &serde_json::Value) -> bool {
        let state = self.inner.state.lock();
        match &state.link {
            Some(link) => link.push(&Frame::send_json(destination, payload)),
            None => {
                tracing::debug!("[Realtime] Not connected, dropping send to {}", destination);
                false
            }
        }
    }

    /// Register interest in a topic.
    ///
    /// Activated immediately when connected, otherwise on the next
    /// successful connect. The callback runs on the connection's reader task
    /// and must not block.
    pub fn subscribe<F>(&self, destination: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        let destination = destination.into();
        let callback: MessageCallback = Arc::new(callback);
        let mut state = self.inner.state.lock();
        let id = state.registry.insert(destination.clone(), callback);
        let activated = state
            .link
            .as_ref()
            .map(|link| link.push(&Frame::subscribe(&handle_for(id), &destination)))
            .unwrap_or(false);
        if activated {
            state.registry.mark_live(id);
        }
        tracing::debug!(
            "[Realtime] Registered {} on {} (live: {})",
            handle_for(id),
            destination,
            activated
        );
        let owner: Weak<dyn Release> = Arc::downgrade(&self.inner) as Weak<dyn Release>;
        Subscription::new(id, destination, owner)
    }

    /// Host signal: the application became visible again.
    pub fn notify_foreground_recovered(&self) {
        Inner::recover(&self.inner, "foreground");
    }

    /// Host signal: network connectivity was restored.
    pub fn notify_network_recovered(&self) {
        Inner::recover(&self.inner, "network");
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().link.is_some()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().retry.attempts
    }

    /// Whether a backoff timer is currently pending.
    pub fn retry_pending(&self) -> bool {
        self.inner
            .state
            .lock()
            .retry_timer
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<RealtimeError> {
        self.inner.state.lock().last_error.clone()
    }

    /// `(handle, destination)` for every registration with a live handle.
    pub fn live_subscriptions(&self) -> Vec<(String, String)> {
        self.inner.state.lock().registry.live_handles()
    }

    pub fn registration_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }
}

impl Inner {
    fn publish(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!("[Realtime] Status {} -> {}", previous, status);
        }
    }

    /// Start a handshake in a spawned task and return the shared outcome.
    fn begin_attempt(
        inner: &Arc<Inner>,
        state: &mut State,
        status: ConnectionStatus,
    ) -> ConnectAttempt {
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let (tx, rx) = oneshot::channel();
        let attempt = rx
            .map(|outcome| outcome.unwrap_or(Err(RealtimeError::Aborted)))
            .boxed()
            .shared();
        state.pending = Some(attempt.clone());
        inner.publish(status);

        let inner = inner.clone();
        tokio::spawn(async move {
            let outcome = Inner::establish(&inner, generation).await;
            let _ = tx.send(outcome);
        });
        attempt
    }

    async fn establish(inner: &Arc<Inner>, generation: u64) -> Result<()> {
        let handshake = inner.handshake().await;

        let mut state = inner.state.lock();
        if state.generation != generation {
            if let Ok(session) = handshake {
                session.transport.outgoing.close();
            }
            return Err(RealtimeError::Aborted);
        }
        state.pending = None;

        match handshake {
            Ok(session) => {
                state.retry.reset();
                state.last_error = None;

                let Session {
                    transport,
                    parser,
                    backlog,
                    send_every,
                    expect_every,
                } = session;
                let outgoing = transport.outgoing.clone();

                let targets = state.registry.targets();
                for (id, destination) in &targets {
                    let frame = Frame::subscribe(&handle_for(*id), destination);
                    if outgoing.try_send(format_frame(&frame)).is_ok() {
                        state.registry.mark_live(*id);
                    }
                }

                let reader = tokio::spawn(read_loop(
                    inner.clone(),
                    generation,
                    transport.incoming,
                    parser,
                    backlog,
                    HeartbeatConfig::for_incoming(expect_every),
                ));
                let keepalive = send_every.map(|every| tokio::spawn(keepalive(outgoing.clone(), every)));

                state.link = Some(Link {
                    generation,
                    outgoing,
                    reader,
                    keepalive,
                });
                inner.publish(ConnectionStatus::Connected);
                tracing::info!(
                    "[Realtime] Connected, {} subscription(s) restored",
                    targets.len()
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[Realtime] Connection attempt failed: {}", e);
                state.last_error = Some(e.clone());
                if e.is_retryable() {
                    Inner::schedule_retry(inner, &mut state);
                } else {
                    state.auto_reconnect = false;
                    inner.publish(ConnectionStatus::Disconnected);
                }
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<Session> {
        let token = self
            .credentials
            .access_token()
            .await
            .ok_or(RealtimeError::Unauthenticated)?;
        let url = self.config.socket_url()?;
        let transport = self.connector.open(url.as_str()).await?;

        let connect = Frame::connect(&self.config.connect_host(), self.config.heartbeat, &token);
        if transport.outgoing.send(format_frame(&connect)).await.is_err() {
            return Err(RealtimeError::Closed);
        }

        let mut parser = FrameParser::new();
        let reply = tokio::time::timeout(
            self.config.handshake_timeout,
            await_connected(&transport.incoming, &mut parser),
        )
        .await;

        let (connected, backlog) = match reply {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                transport.outgoing.close();
                return Err(e);
            }
            Err(_) => {
                transport.outgoing.close();
                return Err(RealtimeError::Timeout);
            }
        };

        let (send_every, expect_every) =
            Heartbeat::negotiate(self.config.heartbeat, connected.heartbeat());
        tracing::debug!(
            "[Realtime] CONNECTED (heart-beat send {:?}, expect {:?})",
            send_every,
            expect_every
        );
        Ok(Session {
            transport,
            parser,
            backlog,
            send_every,
            expect_every,
        })
    }

    fn schedule_retry(inner: &Arc<Inner>, state: &mut State) {
        if !state.auto_reconnect {
            inner.publish(ConnectionStatus::Disconnected);
            return;
        }
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }

        let delay = match state.retry.decide_retry() {
            RetryDecision::Retry(delay) => delay,
            RetryDecision::DontRetry => {
                tracing::warn!("[Realtime] Giving up after {} attempts", state.retry.attempts - 1);
                inner.publish(ConnectionStatus::Error);
                return;
            }
        };

        tracing::info!(
            "[Realtime] Reconnecting in {:?} (attempt {})",
            delay,
            state.retry.attempts
        );
        inner.publish(ConnectionStatus::Reconnecting);

        let generation = state.generation;
        let timer_inner = inner.clone();
        state.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = timer_inner.state.lock();
            if state.generation != generation
                || !state.auto_reconnect
                || state.link.is_some()
                || state.pending.is_some()
            {
                return;
            }
            state.retry_timer = None;
            let _ = Inner::begin_attempt(&timer_inner, &mut state, ConnectionStatus::Reconnecting);
        }));
    }

    fn recover(inner: &Arc<Inner>, trigger: &str) {
        let mut state = inner.state.lock();
        if !state.auto_reconnect || state.link.is_some() {
            return;
        }
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }
        state.retry.reset();
        if state.pending.is_some() {
            return;
        }
        tracing::info!("[Realtime] {} recovered, reconnecting now", trigger);
        let _ = Inner::begin_attempt(inner, &mut state, ConnectionStatus::Reconnecting);
    }

    fn on_link_lost(inner: &Arc<Inner>, generation: u64, reason: RealtimeError) {
        let mut state = inner.state.lock();
        match &state.link {
            Some(link) if link.generation == generation => {}
            _ => return,
        }
        if let Some(link) = state.link.take() {
            link.close();
        }
        state.registry.clear_live();
        tracing::warn!("[Realtime] Connection lost: {}", reason);
        state.last_error = Some(reason.clone());

        if !reason.is_retryable() {
            state.auto_reconnect = false;
            inner.publish(ConnectionStatus::Disconnected);
            return;
        }
        if reason != RealtimeError::Closed {
            inner.publish(ConnectionStatus::Error);
        }
        Inner::schedule_retry(inner, &mut state);
    }

    fn handle_items(&self, items: Vec<Inbound>) -> Result<()> {
        for item in items {
            if let Inbound::Frame(frame) = item {
                self.handle_frame(frame)?;
            }
        }
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) -> Result<()> {
        match frame.command {
            Command::Message => {
                self.dispatch(frame);
                Ok(())
            }
            Command::Error => Err(RealtimeError::from_broker_frame(
                frame.header(headers::MESSAGE).unwrap_or_default(),
                &frame.body,
            )),
            Command::Receipt => {
                tracing::debug!(
                    "[Realtime] Receipt {}",
                    frame.header(headers::RECEIPT_ID).unwrap_or_default()
                );
                Ok(())
            }
            other => {
                tracing::debug!("[Realtime] Ignoring {} frame", other);
                Ok(())
            }
        }
    }

    fn dispatch(&self, frame: Frame) {
        let Some(handle) = frame.header(headers::SUBSCRIPTION) else {
            tracing::debug!("[Realtime] MESSAGE without subscription header");
            return;
        };
        let callback = self.state.lock().registry.callback_for(handle);
        let Some(callback) = callback else {
            tracing::debug!("[Realtime] No registration for {}", handle);
            return;
        };

        let payload = if frame.body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            match serde_json::from_str(&frame.body) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        "[Realtime] Dropping malformed payload on {}: {}",
                        frame.header(headers::DESTINATION).unwrap_or(handle),
                        e
                    );
                    return;
                }
            }
        };
        callback(payload);
    }
}

impl Release for Inner {
    fn release(&self, id: u64) {
        let mut state = self.state.lock();
        let Some(was_live) = state.registry.remove(id) else {
            return;
        };
        if was_live {
            if let Some(link) = &state.link {
                link.push(&Frame::unsubscribe(&handle_for(id)));
            }
        }
        tracing::debug!("[Realtime] Released {}", handle_for(id));
    }
}

/// Wait for CONNECTED. Anything parsed after it in the same read is
/// returned alongside so the reader can process it.
async fn await_connected(
    incoming: &async_channel::Receiver<TransportEvent>,
    parser: &mut FrameParser,
) -> Result<(Frame, Vec<Inbound>)> {
    loop {
        match incoming.recv().await {
            Ok(TransportEvent::Text(text)) => {
                let mut items = parser.feed(&text)?.into_iter();
                while let Some(item) = items.next() {
                    match item {
                        Inbound::Frame(frame) if frame.command == Command::Connected => {
                            return Ok((frame, items.collect()))
                        }
                        Inbound::Frame(frame) if frame.command == Command::Error => {
                            return Err(RealtimeError::from_broker_frame(
                                frame.header(headers::MESSAGE).unwrap_or_default(),
                                &frame.body,
                            ))
                        }
                        Inbound::Frame(frame) => {
                            tracing::debug!("[Realtime] Unexpected {} before CONNECTED", frame.command)
                        }
                        Inbound::Heartbeat => {}
                    }
                }
            }
            Ok(TransportEvent::Closed { code, reason }) => return Err(close_error(code, &reason)),
            Err(_) => return Err(RealtimeError::Closed),
        }
    }
}

async fn read_loop(
    inner: Arc<Inner>,
    generation: u64,
    incoming: async_channel::Receiver<TransportEvent>,
    mut parser: FrameParser,
    backlog: Vec<Inbound>,
    watchdog: Option<HeartbeatConfig>,
) {
    if let Err(reason) = inner.handle_items(backlog) {
        Inner::on_link_lost(&inner, generation, reason);
        return;
    }
    let reason = 'read: loop {
        let event = match watchdog {
            Some(config) => match tokio::time::timeout(config.timeout, incoming.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    break 'read RealtimeError::Transport(format!(
                        "no heartbeat for {:?}",
                        config.timeout
                    ))
                }
            },
            None => incoming.recv().await,
        };

        match event {
            Ok(TransportEvent::Text(text)) => match parser.feed(&text) {
                Ok(items) => {
                    if let Err(e) = inner.handle_items(items) {
                        break 'read e;
                    }
                }
                Err(e) => tracing::warn!("[Realtime] Dropping unparsable input: {}", e),
            },
            Ok(TransportEvent::Closed { code, reason }) => break 'read close_error(code, &reason),
            Err(_) => break 'read RealtimeError::Closed,
        }
    };
    Inner::on_link_lost(&inner, generation, reason);
}

async fn keepalive(outgoing: async_channel::Sender<String>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if outgoing.send(HEARTBEAT_EOL.to_string()).await.is_err() {
            break;
        }
    }
}

/// 1000 is a clean close; anything else counts as abnormal.
fn close_error(code: Option<u16>, reason: &str) -> RealtimeError {
    match code {
        Some(1000) => RealtimeError::Closed,
        Some(code) => RealtimeError::Transport(format!("closed with code {}: {}", code, reason)),
        None if reason.is_empty() => RealtimeError::Transport("connection dropped".to_string()),
        None => RealtimeError::Transport(reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_classification() {
        assert_eq!(close_error(Some(1000), "bye"), RealtimeError::Closed);
        assert!(matches!(
            close_error(Some(1006), ""),
            RealtimeError::Transport(_)
        ));
        assert!(close_error(None, "reset").is_retryable());
    }
}
