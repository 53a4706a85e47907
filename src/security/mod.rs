//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Mutating admin API request:
//!     → csrf.rs (double-submit cookie, HMAC when a key is configured)
//!     → [auth gate resolves the caller]
//!     → rate_limit (sliding window keyed by user id or client IP)
//!     → Pass to upstream
//! ```
//!
//! # Design Decisions
//! - CSRF fails closed: missing, malformed or mismatched tokens are 403
//! - Rate limiting fails open: an unreachable store never blocks traffic
//! - No trust in client input

pub mod csrf;
pub mod rate_limit;

pub use csrf::{CsrfGuard, CsrfSurface, CsrfToken, CsrfVerifier};
pub use rate_limit::{RateLimitResult, RateLimiters, SlidingWindowLimiter};
