//! Incoming call notifications.
//!
//! Only the trigger is handled here: the notification that someone is
//! calling. Media negotiation belongs to the host.

use crate::identity::Identity;
use crate::topics;
use blink_realtime::{ConnectionManager, Subscription};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNotification {
    pub call_id: String,
    pub caller_id: String,
    #[serde(default)]
    pub receiver_id: Option<String>,
    /// `VIDEO` or `AUDIO`.
    #[serde(rename = "type", default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub caller_avatar: Option<String>,
}

impl CallNotification {
    pub fn is_video(&self) -> bool {
        self.call_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case("video"))
            .unwrap_or(true)
    }

    /// Whether this notification is an incoming call for `identity`.
    pub fn is_for(&self, identity: &Identity) -> bool {
        if self.call_id.is_empty() || identity.is_self(&self.caller_id) {
            return false;
        }
        match (&self.receiver_id, identity.user_id()) {
            (Some(receiver), Some(me)) => *receiver == me,
            _ => true,
        }
    }
}

/// Queue of incoming calls, fed by the user's call-notification queue.
///
/// Dropping it releases the registration.
pub struct CallNotifications {
    rx: mpsc::UnboundedReceiver<CallNotification>,
    _subscription: Subscription,
}

impl CallNotifications {
    pub fn start(manager: &ConnectionManager, identity: Identity) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = manager.subscribe(topics::CALL_NOTIFICATIONS, move |payload| {
            let notification = match serde_json::from_value::<CallNotification>(payload) {
                Ok(notification) => notification,
                Err(e) => {
                    warn!("[Calls] Dropping notification: {}", e);
                    return;
                }
            };
            if !notification.is_for(&identity) {
                debug!("[Calls] Ignoring notification {}", notification.call_id);
                return;
            }
            info!(
                "[Calls] Incoming call {} from {}",
                notification.call_id, notification.caller_id
            );
            let _ = tx.send(notification);
        });
        Self {
            rx,
            _subscription: subscription,
        }
    }

    /// Next incoming call. `None` once the manager has been dropped.
    pub async fn recv(&mut self) -> Option<CallNotification> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CallNotification> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> CallNotification {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parses_wire_shape() {
        let n = parse(json!({
            "callId": "call-1",
            "callerId": "u2",
            "receiverId": "u1",
            "type": "AUDIO",
            "conversationId": "c1",
            "callerName": "bob",
            "callerAvatar": null
        }));
        assert_eq!(n.call_id, "call-1");
        assert_eq!(n.caller_name.as_deref(), Some("bob"));
        assert!(!n.is_video());
        assert!(n.is_for(&Identity::new("u1")));
    }

    #[test]
    fn test_rejects_calls_not_addressed_to_self() {
        let me = Identity::new("u1");
        let other = parse(json!({"callId": "c", "callerId": "u2", "receiverId": "u3"}));
        assert!(!other.is_for(&me));

        let own = parse(json!({"callId": "c", "callerId": "u1", "receiverId": "u2"}));
        assert!(!own.is_for(&me));

        let unaddressed = parse(json!({"callId": "c", "callerId": "u2"}));
        assert!(unaddressed.is_for(&me));
        assert!(unaddressed.is_video());
    }
}
