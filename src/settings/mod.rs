//! Settings - admin configuration surface
//!
//! ## Responsibilities
//!
//! - Bridge settings persistence (JSON on disk)
//! - Per-category states filter (which tree leaves get exposed)
//! - Password obscuring, byte-compatible with the legacy admin page
//!
//! The XOR stream cipher is kept only for backward format
//! compatibility with existing configs. It is not a security
//! primitive and must never be treated as one.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::protect::Credentials;
use crate::Result;

/// Legacy default obscuring secret (overridable via config)
pub const DEFAULT_SECRET: &str = "Y5JQ6qCfnhysf9NG";

/// XOR stream cipher over char codes, symmetric
///
/// Matches the legacy admin page: code point of the value XORed with
/// the repeating key's code points. ASCII secrets and passwords round
/// trip exactly; anything outside the Basic Multilingual Plane falls
/// back to the replacement character.
pub fn obscure(secret: &str, value: &str) -> String {
    let key: Vec<u32> = secret.chars().map(|c| c as u32).collect();
    if key.is_empty() {
        return value.to_string();
    }
    value
        .chars()
        .enumerate()
        .map(|(i, c)| {
            char::from_u32(key[i % key.len()] ^ c as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect()
}

/// Bridge settings as persisted (password stored obscured)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeSettings {
    /// NVR host
    pub host: String,
    /// NVR port
    pub port: u16,
    pub username: String,
    /// Obscured password (see [`obscure`])
    pub password: String,
    /// Poll period in seconds
    pub poll_interval_secs: u64,
    /// Per-category list of selected leaf keys; empty list = expose all
    pub states_filter: HashMap<String, Vec<String>>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7443,
            username: String::new(),
            password: String::new(),
            poll_interval_secs: 60,
            states_filter: HashMap::new(),
        }
    }
}

impl BridgeSettings {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }

    /// Decrypt the stored password into usable credentials
    pub fn credentials(&self, secret: &str) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: obscure(secret, &self.password),
        }
    }

    pub fn set_password(&mut self, plain: &str, secret: &str) {
        self.password = obscure(secret, plain);
    }

    /// Selected leaf keys for a tree category, `None` when unrestricted
    pub fn filter_for(&self, category: &str) -> Option<HashSet<String>> {
        self.states_filter
            .get(category)
            .filter(|keys| !keys.is_empty())
            .map(|keys| keys.iter().cloned().collect())
    }
}

/// Settings file holder shared between the poller wiring and the admin API
pub struct SettingsStore {
    path: PathBuf,
    secret: String,
    current: RwLock<BridgeSettings>,
}

impl SettingsStore {
    /// Load settings from disk, falling back to defaults when absent
    pub async fn load(path: PathBuf, secret: String) -> Result<Self> {
        let current = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let settings: BridgeSettings = serde_json::from_str(&raw)?;
                info!(path = %path.display(), "Settings loaded");
                settings
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "No settings file, starting with defaults");
                BridgeSettings::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            secret,
            current: RwLock::new(current),
        })
    }

    pub async fn get(&self) -> BridgeSettings {
        self.current.read().await.clone()
    }

    pub async fn credentials(&self) -> Credentials {
        self.current.read().await.credentials(&self.secret)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Replace and persist; applied to the poll loop on next start
    pub async fn replace(&self, settings: BridgeSettings) -> Result<()> {
        let raw = serde_json::to_string_pretty(&settings)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, raw).await?;
        *self.current.write().await = settings;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}
