//! Centralized directory structure management for Blink
//!
//! Directory layout:
//! ```text
//! blink_data/
//! ├── settings.json      # API and websocket endpoints
//! ├── credentials.json   # Access/refresh token pair
//! └── state/             # Client state that survives restarts
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const ROOT_ENV: &str = "BLINK_ROOT";

#[derive(Deserialize, Debug)]
struct BlinkConfig {
    blink_root: Option<PathBuf>,
}

/// Get the global configuration path
fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("blink").join("config.json"))
}

/// Load the persistent root from config file
pub fn load_persistent_root() -> Option<PathBuf> {
    let path = get_config_path()?;
    read_json::<BlinkConfig>(&path).and_then(|c| c.blink_root)
}

/// Get the BLINK_ROOT directory from environment, persistent config, or default
pub fn blink_root() -> PathBuf {
    if let Ok(val) = std::env::var(ROOT_ENV) {
        return PathBuf::from(val);
    }
    if let Some(root) = load_persistent_root() {
        return root;
    }
    PathBuf::from("blink_data")
}

/// Client state directory (optimistic store)
pub fn state_dir() -> PathBuf {
    blink_root().join("state")
}

pub fn settings_path() -> PathBuf {
    blink_root().join("settings.json")
}

pub fn credentials_path() -> PathBuf {
    blink_root().join("credentials.json")
}

/// Ensure a single directory exists
pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Initialize the directory structure under the resolved root.
/// Call this once at app startup before any other operations
pub fn init_structure() -> anyhow::Result<PathBuf> {
    let root = blink_root();
    ensure_dir(&root)?;
    ensure_dir(&state_dir())?;

    let canonical = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
    info!("Blink directory structure initialized at: {:?}", canonical);
    Ok(canonical)
}

/// Endpoints remembered between runs.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
}

impl Settings {
    pub fn load_from(path: &Path) -> Self {
        read_json(path).unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        write_json(path, self)
    }
}

pub fn load_settings() -> Settings {
    Settings::load_from(&settings_path())
}

/// The access/refresh credential pair persisted after login.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl StoredCredentials {
    pub fn load_from(path: &Path) -> Self {
        read_json(path).unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        write_json(path, self)
    }

    /// The access token, if present and non-blank.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub fn load_credentials() -> StoredCredentials {
    StoredCredentials::load_from(&credentials_path())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
