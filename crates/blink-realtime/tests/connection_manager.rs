use blink_realtime::testing::{wait_until, MemoryBroker};
use blink_realtime::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, Heartbeat, RealtimeError, RetryConfig,
    StaticToken,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn fast_config() -> ConnectionConfig {
    ConnectionConfig::new("ws://broker.test/ws")
        .with_heartbeat(Heartbeat::new(0, 0))
        .with_handshake_timeout(Duration::from_secs(1))
        .with_retry(
            RetryConfig::default()
                .with_initial_backoff(Duration::from_millis(20))
                .with_max_backoff(Duration::from_millis(200))
                .with_jitter(Duration::ZERO),
        )
}

fn manager(broker: &MemoryBroker, token: Option<&str>) -> ConnectionManager {
    let credentials = match token {
        Some(t) => StaticToken::new(t),
        None => StaticToken::empty(),
    };
    ConnectionManager::new(fast_config(), Arc::new(broker.clone()), Arc::new(credentials))
}

#[tokio::test]
async fn test_concurrent_connects_share_one_handshake() {
    let broker = MemoryBroker::new();
    broker.set_connect_delay(Duration::from_millis(100));
    let manager = manager(&broker, Some("tok"));

    let (a, b) = tokio::join!(manager.connect(), manager.connect());
    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(broker.open_count(), 1);

    // Already connected: resolves without a new handshake.
    manager.connect().await.unwrap();
    assert_eq!(broker.open_count(), 1);
    assert_eq!(manager.current_status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_concurrent_connects_reject_together() {
    let broker = MemoryBroker::new();
    broker.require_token("right");
    broker.set_connect_delay(Duration::from_millis(50));
    let manager = manager(&broker, Some("wrong"));

    let (a, b) = tokio::join!(manager.connect(), manager.connect());
    assert_eq!(a, Err(RealtimeError::Unauthenticated));
    assert_eq!(b, Err(RealtimeError::Unauthenticated));
    assert_eq!(broker.open_count(), 1);
}

#[tokio::test]
async fn test_missing_credential_fails_without_retry() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker, None);

    assert_eq!(manager.connect().await, Err(RealtimeError::Unauthenticated));
    assert_eq!(manager.current_status(), ConnectionStatus::Disconnected);
    assert!(!manager.retry_pending());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.open_count(), 0);
}

#[tokio::test]
async fn test_broker_auth_rejection_is_not_retried() {
    let broker = MemoryBroker::new();
    broker.require_token("right");
    let manager = manager(&broker, Some("wrong"));

    assert_eq!(manager.connect().await, Err(RealtimeError::Unauthenticated));
    assert_eq!(manager.current_status(), ConnectionStatus::Disconnected);

    manager.notify_network_recovered();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.open_count(), 1);
}

#[tokio::test]
async fn test_resubscribes_every_topic_after_reconnect() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker, Some("tok"));
    let seen: Arc<Mutex<Vec<(String, serde_json::Value)>>> = Arc::default();

    let topics = ["/topic/conversations/a", "/topic/conversations/b", "/topic/conversations/a"];
    let mut subscriptions = Vec::new();
    for (i, topic) in topics.iter().enumerate() {
        let seen = seen.clone();
        let label = format!("{}#{}", topic, i);
        subscriptions.push(manager.subscribe(*topic, move |payload| {
            seen.lock().push((label.clone(), payload));
        }));
    }
    assert!(manager.live_subscriptions().is_empty());

    manager.connect().await.unwrap();
    assert_eq!(manager.live_subscriptions().len(), 3);
    assert!(wait_until(WAIT, || broker.subscribed_destinations().len() == 3).await);

    broker.drop_connections();
    assert!(wait_until(WAIT, || broker.open_count() == 2 && manager.is_connected()).await);
    assert!(wait_until(WAIT, || broker.subscribed_destinations().len() == 3).await);
    assert_eq!(manager.live_subscriptions().len(), 3);
    assert_eq!(manager.reconnect_attempts(), 0);

    assert_eq!(broker.publish("/topic/conversations/a", r#"{"id":"1"}"#), 2);
    assert_eq!(broker.publish("/topic/conversations/b", r#"{"id":"2"}"#), 1);
    assert!(wait_until(WAIT, || seen.lock().len() == 3).await);

    let mut labels: Vec<String> = seen.lock().iter().map(|(l, _)| l.clone()).collect();
    labels.sort();
    assert_eq!(
        labels,
        vec![
            "/topic/conversations/a#0",
            "/topic/conversations/a#2",
            "/topic/conversations/b#1"
        ]
    );
}

#[tokio::test]
async fn test_unsubscribe_releases_only_its_registration() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker, Some("tok"));
    manager.connect().await.unwrap();

    let hits = Arc::new(Mutex::new(Vec::new()));
    let first = {
        let hits = hits.clone();
        manager.subscribe("/topic/x", move |_| hits.lock().push("first"))
    };
    let _second = {
        let hits = hits.clone();
        manager.subscribe("/topic/x", move |_| hits.lock().push("second"))
    };
    assert!(wait_until(WAIT, || broker.subscribed_destinations().len() == 2).await);

    first.unsubscribe();
    assert_eq!(manager.registration_count(), 1);
    assert!(wait_until(WAIT, || broker.subscribed_destinations().len() == 1).await);

    assert_eq!(broker.publish("/topic/x", "{}"), 1);
    assert!(wait_until(WAIT, || hits.lock().len() == 1).await);
    assert_eq!(*hits.lock(), vec!["second"]);
}

#[tokio::test]
async fn test_malformed_payload_is_dropped() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker, Some("tok"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let seen = seen.clone();
        manager.subscribe("/topic/x", move |v| seen.lock().push(v))
    };
    manager.connect().await.unwrap();
    assert!(wait_until(WAIT, || broker.subscribed_destinations().len() == 1).await);

    broker.publish("/topic/x", "{not json");
    broker.publish("/topic/x", "");
    broker.publish("/topic/x", r#"{"ok":true}"#);
    assert!(wait_until(WAIT, || seen.lock().len() == 2).await);
    assert_eq!(
        *seen.lock(),
        vec![serde_json::Value::Null, serde_json::json!({"ok": true})]
    );
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_send_reports_handoff_and_never_fails() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker, Some("tok"));
    let payload = serde_json::json!({"conversationId": "c1", "body": "hi"});

    assert!(!manager.send("/app/chat.sendMessage", &payload));

    manager.connect().await.unwrap();
    assert!(manager.send("/app/chat.sendMessage", &payload));
    assert!(wait_until(WAIT, || broker.sent_frames().len() == 1).await);
    let frame = &broker.sent_frames()[0];
    assert_eq!(frame.header("destination"), Some("/app/chat.sendMessage"));
    assert_eq!(serde_json::from_str::<serde_json::Value>(&frame.body).unwrap(), payload);
}

#[tokio::test]
async fn test_failed_attempts_back_off_and_reset_on_success() {
    let broker = MemoryBroker::new();
    broker.refuse_connections(true);
    let manager = manager(&broker, Some("tok"));

    assert!(matches!(manager.connect().await, Err(RealtimeError::Transport(_))));
    assert_eq!(manager.current_status(), ConnectionStatus::Reconnecting);
    assert!(wait_until(WAIT, || manager.reconnect_attempts() >= 3).await);

    broker.refuse_connections(false);
    assert!(wait_until(WAIT, || manager.is_connected()).await);
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(manager.current_status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_disconnect_halts_retries() {
    let broker = MemoryBroker::new();
    broker.refuse_connections(true);
    let manager = manager(&broker, Some("tok"));

    let _ = manager.connect().await;
    assert_eq!(manager.current_status(), ConnectionStatus::Reconnecting);

    manager.disconnect();
    assert_eq!(manager.current_status(), ConnectionStatus::Disconnected);
    assert!(!manager.retry_pending());
    let opens = broker.open_count();

    broker.refuse_connections(false);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(broker.open_count(), opens);
    assert!(!manager.is_connected());

    manager.connect().await.unwrap();
    assert_eq!(broker.open_count(), opens + 1);
}

#[tokio::test]
async fn test_recovery_signal_skips_backoff() {
    let broker = MemoryBroker::new();
    broker.refuse_connections(true);
    let config = fast_config().with_retry(
        RetryConfig::default()
            .with_initial_backoff(Duration::from_secs(60))
            .with_max_backoff(Duration::from_secs(60))
            .with_jitter(Duration::ZERO),
    );
    let manager = ConnectionManager::new(
        config,
        Arc::new(broker.clone()),
        Arc::new(StaticToken::new("tok")),
    );

    let _ = manager.connect().await;
    assert!(manager.retry_pending());
    assert_eq!(manager.reconnect_attempts(), 1);

    broker.refuse_connections(false);
    manager.notify_foreground_recovered();
    assert!(wait_until(WAIT, || manager.is_connected()).await);
    assert_eq!(broker.open_count(), 2);
}

#[tokio::test]
async fn test_broker_error_after_connect_triggers_reconnect() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker, Some("tok"));
    let mut status = manager.status();
    manager.connect().await.unwrap();
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connected);

    broker.send_error("Session closed");
    assert!(wait_until(WAIT, || broker.open_count() == 2 && manager.is_connected()).await);
}

#[tokio::test]
async fn test_clean_disconnect_sends_frame_and_keeps_registrations() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker, Some("tok"));
    let _sub = manager.subscribe("/topic/x", |_| {});
    manager.connect().await.unwrap();
    assert!(wait_until(WAIT, || broker.session_count() == 1).await);

    manager.disconnect();
    assert!(manager.live_subscriptions().is_empty());
    assert_eq!(manager.registration_count(), 1);
    assert!(wait_until(WAIT, || broker.session_count() == 0).await);

    manager.connect().await.unwrap();
    assert_eq!(manager.live_subscriptions().len(), 1);
}

#[tokio::test]
async fn test_connect_while_connected_ignores_cleared_credential() {
    let broker = MemoryBroker::new();
    let credentials = Arc::new(StaticToken::new("tok"));
    let manager = ConnectionManager::new(fast_config(), Arc::new(broker.clone()), credentials.clone());
    manager.connect().await.unwrap();

    credentials.clear();
    assert_eq!(manager.connect().await, Ok(()));
    assert_eq!(manager.current_status(), ConnectionStatus::Connected);
    assert_eq!(broker.open_count(), 1);
}

#[tokio::test]
async fn test_keepalive_reaches_broker_and_silent_link_is_replaced() {
    let broker = MemoryBroker::new();
    broker.set_server_heartbeat(Heartbeat::new(200, 200));
    let config = fast_config().with_heartbeat(Heartbeat::new(100, 100));
    let manager = ConnectionManager::new(
        config,
        Arc::new(broker.clone()),
        Arc::new(StaticToken::new("tok")),
    );
    manager.connect().await.unwrap();

    // Outgoing pings every 200ms.
    assert!(wait_until(WAIT, || broker.heartbeat_count() >= 3).await);
    assert_eq!(broker.open_count(), 1);

    // The broker never pings back, so the 3.24s watchdog closes the link.
    assert!(wait_until(Duration::from_secs(6), || broker.open_count() >= 2).await);
    assert!(wait_until(WAIT, || manager.is_connected()).await);
}

#[tokio::test]
async fn test_broker_heartbeats_keep_link_open() {
    let broker = MemoryBroker::new();
    broker.set_server_heartbeat(Heartbeat::new(200, 200));
    let config = fast_config().with_heartbeat(Heartbeat::new(100, 100));
    let manager = ConnectionManager::new(
        config,
        Arc::new(broker.clone()),
        Arc::new(StaticToken::new("tok")),
    );
    manager.connect().await.unwrap();

    for _ in 0..40 {
        broker.push_raw("\n");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(broker.open_count(), 1);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_error_sharing_connected_read_is_not_lost() {
    let broker = MemoryBroker::new();
    broker.set_connected_trailer("ERROR\nmessage:401 Unauthorized\n\n\0");
    let manager = manager(&broker, Some("tok"));

    manager.connect().await.unwrap();
    assert!(
        wait_until(WAIT, || manager.current_status() == ConnectionStatus::Disconnected).await
    );
    assert_eq!(manager.last_error(), Some(RealtimeError::Unauthenticated));
    assert!(!manager.is_connected());
    assert!(!manager.retry_pending());
}

#[tokio::test]
async fn test_message_sharing_connected_read_is_delivered() {
    let broker = MemoryBroker::new();
    broker.set_connected_trailer(
        "MESSAGE\nsubscription:sub-1\ndestination:/topic/x\nmessage-id:0\n\n{\"early\":true}\0",
    );
    let manager = manager(&broker, Some("tok"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let seen = seen.clone();
        manager.subscribe("/topic/x", move |v| seen.lock().push(v))
    };

    manager.connect().await.unwrap();
    assert!(wait_until(WAIT, || seen.lock().len() == 1).await);
    assert_eq!(seen.lock()[0], serde_json::json!({"early": true}));
}
