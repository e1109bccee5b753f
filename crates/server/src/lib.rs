//! framestitch HTTP Server
//!
//! Exposes the export protocol over HTTP. Request fields travel in headers:
//!
//! - `POST /start`: `token` (optional), `frames`; body: the session token
//! - `POST /frame`: `token`, `index`; body: raw frame bytes
//! - `POST /finish`: `token`; body: artifact URL (plain text)
//! - `GET /status`: `token`; body: JSON progress snapshot
//! - `GET /output/<token>/<file>`: finished artifacts

pub mod error;
pub mod handler;

pub use error::ApiError;
pub use handler::{router, AppState, ExportServer};
