use async_trait::async_trait;
use blink_common::StoredCredentials;
use blink_realtime::CredentialSource;
use std::path::PathBuf;

/// Reads the persisted credential pair on every request, so a token saved
/// by a later login is picked up on the next connect.
#[derive(Debug, Clone)]
pub struct StoredCredentialSource {
    path: PathBuf,
}

impl StoredCredentialSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The credentials file under the data root.
    pub fn default_location() -> Self {
        Self::new(blink_common::credentials_path())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CredentialSource for StoredCredentialSource {
    async fn access_token(&self) -> Option<String> {
        let path = self.path.clone();
        let stored = tokio::task::spawn_blocking(move || StoredCredentials::load_from(&path))
            .await
            .ok()?;
        stored.access_token().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_latest_token() {
        let dir = tempdir().unwrap();
        let source = StoredCredentialSource::new(dir.path().join("credentials.json"));
        assert_eq!(source.access_token().await, None);

        StoredCredentials {
            access_token: Some("abc".into()),
            refresh_token: None,
        }
        .save_to(source.path())
        .unwrap();
        assert_eq!(source.access_token().await.as_deref(), Some("abc"));
    }
}
