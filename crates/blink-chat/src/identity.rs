//! Who "self" is.
//!
//! Locally created messages may carry a placeholder sender before the
//! authenticated user's id is known. [`Identity::resolve`] is the single
//! place that placeholder is interpreted; everything downstream compares
//! resolved ids only.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::RwLock;
use std::sync::Arc;

const SELF_PLACEHOLDER: &str = "me";

/// The authenticated user, shared by every session of one client.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    user_id: Arc<RwLock<Option<String>>>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        let identity = Self::default();
        identity.set_user_id(user_id);
        identity
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Identity carried in a JWT access token's `sub` claim.
    pub fn from_token(token: &str) -> Self {
        let identity = Self::default();
        if let Some(sub) = jwt_subject(token) {
            identity.set_user_id(sub);
        }
        identity
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        if user_id.trim().is_empty() || user_id == SELF_PLACEHOLDER {
            return;
        }
        *self.user_id.write() = Some(user_id);
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Sender id to stamp on a message created locally.
    pub fn self_sender(&self) -> String {
        self.user_id().unwrap_or_else(|| SELF_PLACEHOLDER.to_string())
    }

    /// Normalize a sender id, mapping the placeholder to the real id once
    /// it is known.
    pub fn resolve(&self, sender_id: &str) -> String {
        if sender_id == SELF_PLACEHOLDER {
            if let Some(id) = self.user_id() {
                return id;
            }
        }
        sender_id.to_string()
    }

    pub fn is_self(&self, sender_id: &str) -> bool {
        let resolved = self.resolve(sender_id);
        resolved == SELF_PLACEHOLDER || self.user_id().as_deref() == Some(resolved.as_str())
    }
}

/// `sub` claim of a JWT, without verifying the signature.
pub fn jwt_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
