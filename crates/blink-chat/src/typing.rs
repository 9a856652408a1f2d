//! Who else is typing in a conversation.

use crate::identity::Identity;
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub user_id: String,
    pub typing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TypingSet {
    users: BTreeSet<String>,
}

impl TypingSet {
    /// Apply one event. Returns whether the set changed. Events from self
    /// and from other conversations are ignored.
    pub fn apply(&mut self, event: TypingEvent, conversation_id: &str, identity: &Identity) -> bool {
        if event
            .conversation_id
            .as_deref()
            .is_some_and(|c| c != conversation_id)
        {
            return false;
        }
        let user = identity.resolve(&event.user_id);
        if identity.is_self(&user) {
            return false;
        }
        if event.typing {
            self.users.insert(user)
        } else {
            self.users.remove(&user)
        }
    }

    pub fn users(&self) -> Vec<String> {
        self.users.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user: &str, typing: bool) -> TypingEvent {
        TypingEvent {
            conversation_id: Some("c1".into()),
            user_id: user.into(),
            typing,
        }
    }

    #[test]
    fn test_tracks_others_only() {
        let identity = Identity::new("u1");
        let mut set = TypingSet::default();
        assert!(set.apply(event("u2", true), "c1", &identity));
        assert!(!set.apply(event("u2", true), "c1", &identity));
        assert!(!set.apply(event("u1", true), "c1", &identity));
        assert_eq!(set.users(), vec!["u2"]);

        assert!(set.apply(event("u2", false), "c1", &identity));
        assert!(set.is_empty());
    }

    #[test]
    fn test_other_conversation_ignored() {
        let mut set = TypingSet::default();
        let mut e = event("u2", true);
        e.conversation_id = Some("c9".into());
        assert!(!set.apply(e, "c1", &Identity::new("u1")));
    }

    #[test]
    fn test_parses_wire_shape() {
        let e: TypingEvent =
            serde_json::from_value(serde_json::json!({"conversationId": "c1", "userId": "u2", "typing": true}))
                .unwrap();
        assert_eq!(e, event("u2", true));
    }
}
