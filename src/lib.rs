//! protect-bridge
//!
//! Mirrors a UniFi Protect NVR (cameras, motion events) into a
//! hierarchical key/value state tree and pushes writable settings back.
//!
//! ## Architecture (7 Components)
//!
//! 1. ValueStore - state tree backend (memory / SQLite)
//! 2. Reconciler - sequential diff-and-write loop
//! 3. TreeBuilder - nested JSON to state-tree flattening
//! 4. ProtectClient - NVR HTTP client + bearer session
//! 5. Poller - fixed-interval fetch driver
//! 6. Settings - admin configuration (states filter, obscured password)
//! 7. WebApi - admin REST endpoints
//!
//! ## Design Principles
//!
//! - The store is only ever written through the single-active-batch
//!   reconciler, one update in flight at a time
//! - Nothing in the poll path is fatal; every failure degrades to
//!   "try again next cycle"

pub mod error;
pub mod poller;
pub mod protect;
pub mod reconciler;
pub mod settings;
pub mod state;
pub mod tree;
pub mod value_store;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
