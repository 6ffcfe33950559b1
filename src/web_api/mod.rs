//! WebApi - admin REST surface
//!
//! ## Endpoints
//!
//! - `GET  /api/health` - liveness + poller status
//! - `GET  /api/settings` / `PUT /api/settings` - bridge settings
//! - `GET  /api/states/{path}` - read a mirrored state
//! - `PUT  /api/states/{path}` - user write to a writable path

mod routes;

pub use routes::router;
