//! Inbound HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (request ID, tracing, timeout)
//!     → middleware/session.rs (resolve session, build RequestContext)
//!     → middleware/guards.rs (session fixation, CSRF)
//!     → handlers.rs (login, logout, session token, webservice gateway)
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{AppState, HttpServer};
