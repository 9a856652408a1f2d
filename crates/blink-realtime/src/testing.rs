//! In-memory broker for exercising the connection manager without a network.

use crate::error::{RealtimeError, Result};
use crate::protocol::constants::headers;
use crate::protocol::{format_frame, FrameParser, Inbound};
use crate::traits::{Connector, Transport, TransportEvent};
use crate::types::{Command, Frame, Heartbeat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A STOMP broker living in the test process.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    opens: AtomicUsize,
    heartbeats: AtomicUsize,
    next_session: AtomicUsize,
    state: Mutex<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    sessions: Vec<Session>,
    refuse: bool,
    accepted_token: Option<String>,
    connect_delay: Duration,
    server_heartbeat: Heartbeat,
    /// Raw text appended to the CONNECTED reply in the same message.
    connected_trailer: Option<String>,
    received: Vec<Frame>,
}

struct Session {
    id: usize,
    to_client: async_channel::Sender<TransportEvent>,
    /// `(subscription id, destination)`
    subscriptions: Vec<(String, String)>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transports opened so far.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    /// Make `open()` fail with a transport error.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.state.lock().refuse = refuse;
    }

    /// Only accept CONNECT frames carrying this bearer token.
    pub fn require_token(&self, token: impl Into<String>) {
        self.inner.state.lock().accepted_token = Some(token.into());
    }

    /// Delay the CONNECTED reply.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner.state.lock().connect_delay = delay;
    }

    pub fn set_server_heartbeat(&self, heartbeat: Heartbeat) {
        self.inner.state.lock().server_heartbeat = heartbeat;
    }

    /// Send `text` in the same WebSocket message as every CONNECTED reply.
    pub fn set_connected_trailer(&self, text: impl Into<String>) {
        self.inner.state.lock().connected_trailer = Some(text.into());
    }

    /// Client heartbeats received so far, across sessions.
    pub fn heartbeat_count(&self) -> usize {
        self.inner.heartbeats.load(Ordering::SeqCst)
    }

    /// Destinations with an active subscription, across sessions.
    pub fn subscribed_destinations(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut out: Vec<String> = state
            .sessions
            .iter()
            .flat_map(|s| s.subscriptions.iter().map(|(_, d)| d.clone()))
            .collect();
        out.sort();
        out
    }

    /// Every SEND frame received, in order.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.inner
            .state
            .lock()
            .received
            .iter()
            .filter(|f| f.command == Command::Send)
            .cloned()
            .collect()
    }

    /// Deliver a MESSAGE to every subscriber of `destination`. Returns the
    /// number of deliveries.
    pub fn publish(&self, destination: &str, body: &str) -> usize {
        let state = self.inner.state.lock();
        let mut delivered = 0;
        for session in &state.sessions {
            for (sub_id, dest) in &session.subscriptions {
                if dest != destination {
                    continue;
                }
                let frame = Frame::new(Command::Message)
                    .with_header(headers::SUBSCRIPTION, sub_id.as_str())
                    .with_header(headers::DESTINATION, destination)
                    .with_header(headers::MESSAGE_ID, format!("m-{}", delivered))
                    .with_body(body);
                if session
                    .to_client
                    .try_send(TransportEvent::Text(format_frame(&frame)))
                    .is_ok()
                {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send a raw text message to every session.
    pub fn push_raw(&self, text: &str) {
        let state = self.inner.state.lock();
        for session in &state.sessions {
            let _ = session.to_client.try_send(TransportEvent::Text(text.to_string()));
        }
    }

    /// Drop every session as if the network went away.
    pub fn drop_connections(&self) {
        let sessions = std::mem::take(&mut self.inner.state.lock().sessions);
        for session in sessions {
            let _ = session.to_client.try_send(TransportEvent::Closed {
                code: Some(1006),
                reason: "abnormal closure".to_string(),
            });
            session.to_client.close();
        }
    }

    /// Send an ERROR frame to every session and close them.
    pub fn send_error(&self, message: &str) {
        let sessions = std::mem::take(&mut self.inner.state.lock().sessions);
        let frame = Frame::new(Command::Error).with_header(headers::MESSAGE, message);
        for session in sessions {
            let _ = session
                .to_client
                .try_send(TransportEvent::Text(format_frame(&frame)));
            session.to_client.close();
        }
    }

    fn remove_session(&self, id: usize) {
        self.inner.state.lock().sessions.retain(|s| s.id != id);
    }

    async fn serve(
        self,
        id: usize,
        from_client: async_channel::Receiver<String>,
        to_client: async_channel::Sender<TransportEvent>,
    ) {
        let mut parser = FrameParser::new();
        while let Ok(text) = from_client.recv().await {
            let Ok(items) = parser.feed(&text) else {
                continue;
            };
            for item in items {
                let frame = match item {
                    Inbound::Frame(frame) => frame,
                    Inbound::Heartbeat => {
                        self.inner.heartbeats.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                };
                if !self.handle(id, frame, &to_client).await {
                    self.remove_session(id);
                    to_client.close();
                    return;
                }
            }
        }
        self.remove_session(id);
        let _ = to_client.try_send(TransportEvent::Closed {
            code: Some(1000),
            reason: String::new(),
        });
        to_client.close();
    }

    /// Returns false when the session should end.
    async fn handle(
        &self,
        id: usize,
        frame: Frame,
        to_client: &async_channel::Sender<TransportEvent>,
    ) -> bool {
        self.inner.state.lock().received.push(frame.clone());
        match frame.command {
            Command::Connect | Command::Stomp => {
                let (delay, accepted, heartbeat, trailer) = {
                    let state = self.inner.state.lock();
                    (
                        state.connect_delay,
                        state.accepted_token.clone(),
                        state.server_heartbeat,
                        state.connected_trailer.clone(),
                    )
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let presented = frame
                    .header(headers::AUTHORIZATION)
                    .and_then(|v| v.strip_prefix("Bearer "));
                if let Some(expected) = accepted {
                    if presented != Some(expected.as_str()) {
                        let error = Frame::new(Command::Error)
                            .with_header(headers::MESSAGE, "401 Unauthorized");
                        let _ = to_client.try_send(TransportEvent::Text(format_frame(&error)));
                        return false;
                    }
                }
                let connected = Frame::new(Command::Connected)
                    .with_header(headers::VERSION, "1.2")
                    .with_header(headers::HEART_BEAT, heartbeat.to_string());
                let mut reply = format_frame(&connected);
                if let Some(trailer) = trailer {
                    reply.push_str(&trailer);
                }
                let _ = to_client.try_send(TransportEvent::Text(reply));
                true
            }
            Command::Subscribe => {
                let sub_id = frame.header(headers::ID).unwrap_or_default().to_string();
                let destination = frame
                    .header(headers::DESTINATION)
                    .unwrap_or_default()
                    .to_string();
                let mut state = self.inner.state.lock();
                if let Some(session) = state.sessions.iter_mut().find(|s| s.id == id) {
                    session.subscriptions.push((sub_id, destination));
                }
                true
            }
            Command::Unsubscribe => {
                let sub_id = frame.header(headers::ID).unwrap_or_default();
                let mut state = self.inner.state.lock();
                if let Some(session) = state.sessions.iter_mut().find(|s| s.id == id) {
                    session.subscriptions.retain(|(s, _)| s != sub_id);
                }
                true
            }
            Command::Disconnect => false,
            _ => true,
        }
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn open(&self, _url: &str) -> Result<Transport> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        if self.inner.state.lock().refuse {
            return Err(RealtimeError::Transport("connection refused".to_string()));
        }

        let (client_tx, from_client) = async_channel::unbounded::<String>();
        let (to_client, client_rx) = async_channel::unbounded::<TransportEvent>();
        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        self.inner.state.lock().sessions.push(Session {
            id,
            to_client: to_client.clone(),
            subscriptions: Vec::new(),
        });
        tokio::spawn(self.clone().serve(id, from_client, to_client));

        Ok(Transport {
            outgoing: client_tx,
            incoming: client_rx,
        })
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
