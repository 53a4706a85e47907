//! Admin session authentication.
//!
//! # Data Flow
//! ```text
//! Request cookies
//!     → gate.rs (keep session cookies by prefix)
//!     → provider.rs (external auth provider resolves the user)
//!     → AdminCheck { is_admin, user }
//! ```
//!
//! # Design Decisions
//! - Fail closed: provider errors mean "not authenticated"
//! - The gateway never rejects on auth for API routes; it only picks the
//!   rate-limit identity. Downstream handlers produce the precise 401/403.
//! - Denials are reported as telemetry breadcrumbs, never exceptions

pub mod gate;
pub mod provider;

pub use gate::{AdminCheck, AuthGate};
pub use provider::{HttpSessionProvider, NoSessionProvider, ProviderError, SessionProvider, User};
