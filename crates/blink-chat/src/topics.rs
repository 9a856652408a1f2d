//! Broker destinations used by the chat backend.

pub const SEND_MESSAGE: &str = "/app/chat.sendMessage";
pub const TYPING: &str = "/app/chat.typing";

/// Online/offline broadcasts for every user.
pub const PRESENCE: &str = "/topic/presence";

/// Per-user queue of incoming call notifications.
pub const CALL_NOTIFICATIONS: &str = "/user/queue/video/call-notification";

/// Live messages of one conversation.
pub fn conversation(conversation_id: &str) -> String {
    format!("/topic/conversations/{}", conversation_id)
}

/// Typing notifications of one conversation.
pub fn conversation_typing(conversation_id: &str) -> String {
    format!("/topic/conversations/{}/typing", conversation_id)
}

pub fn send_payload(conversation_id: &str, body: &str) -> serde_json::Value {
    serde_json::json!({ "conversationId": conversation_id, "body": body })
}

pub fn typing_payload(conversation_id: &str, typing: bool) -> serde_json::Value {
    serde_json::json!({ "conversationId": conversation_id, "typing": typing })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destinations() {
        assert_eq!(conversation("abc"), "/topic/conversations/abc");
        assert_eq!(conversation_typing("abc"), "/topic/conversations/abc/typing");
        assert_eq!(send_payload("abc", "hi")["conversationId"], "abc");
        assert_eq!(typing_payload("abc", true)["typing"], true);
    }
}
