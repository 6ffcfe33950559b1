//! ProtectClient - UniFi Protect NVR adapter
//!
//! ## Responsibilities
//!
//! - Bearer-token auth (POST credentials, token in response header)
//! - Bootstrap fetch (camera inventory) and motion-event queries
//! - Writable-setting push-back (per-camera PATCH)
//!
//! The bearer token lives on an explicit [`Session`], never in module
//! state; 401/403 from any call maps to [`crate::Error::Auth`] so the
//! poller can schedule a renewal.

mod client;
mod types;

pub use client::{ProtectClient, MOTION_LOOKAHEAD_SECS, MOTION_LOOKBACK_SECS};
pub use types::{CameraRecord, Credentials, MotionEventRecord, Session};
