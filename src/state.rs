//! Application state
//!
//! Holds configuration and the shared components.

use std::path::PathBuf;
use std::sync::Arc;

use crate::poller::Poller;
use crate::settings::SettingsStore;
use crate::value_store::ValueStore;

/// Application configuration (environment driven)
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Admin API bind host
    pub host: String,
    /// Admin API port
    pub port: u16,
    /// SQLite URL for the state mirror
    pub database_url: String,
    /// Bridge settings file
    pub settings_path: PathBuf,
    /// Password-obscuring secret (legacy format compatibility)
    pub secret: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8124),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://protect-bridge.db?mode=rwc".to_string()),
            settings_path: std::env::var("SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("settings.json")),
            secret: std::env::var("BRIDGE_SECRET")
                .unwrap_or_else(|_| crate::settings::DEFAULT_SECRET.to_string()),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Bridge settings (admin surface)
    pub settings: Arc<SettingsStore>,
    /// State mirror backend
    pub store: Arc<dyn ValueStore>,
    /// Poll driver
    pub poller: Arc<Poller>,
}
