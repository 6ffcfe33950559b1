//! Protect API data types
//!
//! Records are shape-driven: the NVR's JSON objects are carried whole
//! and flattened by the tree builder, with typed accessors only for the
//! handful of fields the bridge itself needs.

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::{Error, Result};

/// NVR login credentials
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Camera record from `/api/bootstrap`
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct CameraRecord {
    pub fields: Map<String, Value>,
}

impl CameraRecord {
    pub fn id(&self) -> Result<&str> {
        self.fields
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Malformed("camera record without string id".to_string()))
    }

    /// Display name for the camera channel, falling back to the id
    pub fn display_name(&self) -> String {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| self.fields.get("id").and_then(Value::as_str))
            .unwrap_or("camera")
            .to_string()
    }
}

/// Motion event record from `/api/events`
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct MotionEventRecord {
    pub fields: Map<String, Value>,
}

impl MotionEventRecord {
    pub fn id(&self) -> Result<&str> {
        self.fields
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Malformed("motion event without string id".to_string()))
    }

    /// Owning camera id
    pub fn camera(&self) -> Result<&str> {
        self.fields
            .get("camera")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Malformed("motion event without camera id".to_string()))
    }
}

/// Bearer-token session with explicit renewal transitions
///
/// Unauthenticated (no token) -> Authenticated (token set) ->
/// cleared on auth failure -> re-authenticated by the next login.
#[derive(Default)]
pub struct Session {
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bearer(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn set(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }
}
