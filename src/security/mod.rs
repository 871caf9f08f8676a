//! Inbound request security.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → session middleware (load or create Session)
//!     → fingerprint.rs (session fixation check, HTTPS only)
//!     → csrf.rs (token check on mutating requests)
//!     → handler
//! Login handler:
//!     → credentials.rs
//!     → throttle.rs on failure
//!     → fingerprint.rs + csrf.rs on success
//! ```
//!
//! # Design Decisions
//! - Guards take the session and a `RequestContext` explicitly
//! - Fail closed: a violation purges state and answers 403

pub mod context;
pub mod credentials;
pub mod csrf;
pub mod error;
pub mod fingerprint;
pub mod session;
pub mod throttle;

pub use context::RequestContext;
pub use credentials::CredentialStore;
pub use csrf::{CsrfFailure, CsrfGuard};
pub use error::SecurityViolation;
pub use fingerprint::SessionFixationGuard;
pub use session::{MemorySessionStore, Session, SessionStore};
pub use throttle::LoginThrottle;
