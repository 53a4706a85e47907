//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → [gateway middleware decides: forward or deny]
//!     → request.rs (client IP, cookies, user agent)
//!     → response.rs (denials, rate-limit headers)
//!     → server.rs (built-in handlers or upstream forwarding)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, ServerError};
