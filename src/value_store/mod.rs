//! ValueStore - hierarchical key/value state backend
//!
//! ## Responsibilities
//!
//! - Object tree management (channels and states, dot-separated paths)
//! - State persistence with an acknowledged flag
//! - Backend seam for the reconciler (memory for tests, SQLite for the
//!   daemon)
//!
//! ## Design Principles
//!
//! - No module writes states directly; all writes go through the
//!   reconciler's single-active-batch loop

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Result;

/// Scalar state value with loose equality
///
/// Upstream normalization (TreeBuilder) guarantees composites are
/// already collapsed to scalars before they reach the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StateValue::Null, StateValue::Null) => true,
            (StateValue::Bool(a), StateValue::Bool(b)) => a == b,
            (StateValue::Int(a), StateValue::Int(b)) => a == b,
            (StateValue::Float(a), StateValue::Float(b)) => a == b,
            // JSON does not distinguish 1 from 1.0; compare numerically
            (StateValue::Int(a), StateValue::Float(b))
            | (StateValue::Float(b), StateValue::Int(a)) => *a as f64 == *b,
            (StateValue::Str(a), StateValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Null => write!(f, "null"),
            StateValue::Bool(b) => write!(f, "{}", b),
            StateValue::Int(i) => write!(f, "{}", i),
            StateValue::Float(v) => write!(f, "{}", v),
            StateValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::Str(s.to_string())
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Bool(b)
    }
}

impl From<i64> for StateValue {
    fn from(i: i64) -> Self {
        StateValue::Int(i)
    }
}

/// Stored state entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub value: StateValue,
    pub ack: bool,
}

/// Object kind in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Grouping container (namespace node)
    Channel,
    /// Leaf state
    State,
}

/// Object metadata (display name, writability, allowed values)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub write: bool,
    /// Allowed values for enumerated settings (e.g. recording mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<BTreeMap<String, String>>,
}

impl ObjectMeta {
    pub fn channel(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// State backend seam
///
/// Implementations must make `create_object` idempotent ("not exists"
/// semantics): creating an existing path leaves it untouched.
#[async_trait]
pub trait ValueStore: Send + Sync {
    /// Read a stored state, `None` when the path has never been written
    async fn get_state(&self, name: &str) -> Result<Option<StoredState>>;

    /// Write a state value with the acknowledged flag
    async fn set_state(&self, name: &str, value: StateValue, ack: bool) -> Result<()>;

    /// Check whether an object exists at the path
    async fn object_exists(&self, name: &str) -> Result<bool>;

    /// Create an object if absent; existing objects are left untouched
    async fn create_object(&self, name: &str, kind: ObjectKind, meta: ObjectMeta) -> Result<()>;

    /// Delete an object and everything beneath it
    async fn delete_object(&self, name: &str) -> Result<()>;

    /// List channel paths strictly beneath the prefix
    async fn list_channels(&self, prefix: &str) -> Result<Vec<String>>;
}
