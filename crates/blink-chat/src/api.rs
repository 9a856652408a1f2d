//! REST collaborators: history pages and message posting.

use crate::error::{ChatError, Result};
use async_trait::async_trait;
use blink_realtime::CredentialSource;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Longest body the backend accepts.
pub const MAX_BODY_CHARS: usize = 2000;

/// Abstraction over the chat REST endpoints. Responses are returned raw and
/// normalized by the caller.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    /// One page of history, newest first; page 0 is the most recent.
    async fn fetch_page(&self, conversation_id: &str, page: u32, size: u32) -> Result<Value>;

    async fn send_message(&self, conversation_id: &str, body: &str) -> Result<Value>;
}

/// `ChatApi` over HTTP with a bearer credential.
pub struct HttpChatApi {
    client: Client,
    base: Url,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpChatApi {
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;
        Self::with_client(client, base_url, credentials)
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    pub fn messages_url(&self, conversation_id: &str) -> Result<Url> {
        Ok(self
            .base
            .join(&format!("api/v1/chat/{}/messages", conversation_id))?)
    }

    async fn bearer(&self) -> Result<String> {
        self.credentials
            .access_token()
            .await
            .ok_or(ChatError::Unauthenticated)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_page(&self, conversation_id: &str, page: u32, size: u32) -> Result<Value> {
        let mut url = self.messages_url(conversation_id)?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string());
        let token = self.bearer().await?;

        tracing::debug!("[ChatAPI] GET {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    async fn send_message(&self, conversation_id: &str, body: &str) -> Result<Value> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::Rejected("empty message".to_string()));
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(ChatError::Rejected(format!(
                "message longer than {} characters",
                MAX_BODY_CHARS
            )));
        }
        let url = self.messages_url(conversation_id)?;
        let token = self.bearer().await?;

        tracing::debug!("[ChatAPI] POST {}", url);
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}
