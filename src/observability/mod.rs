//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!     → profiling.rs (scoped timings logged at debug)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields instead of formatted strings where it matters
//! - Request ID flows through inbound requests via tower-http
//! - Metrics are cheap (atomic increments), recording never fails

pub mod logging;
pub mod metrics;
pub mod profiling;

pub use profiling::ProfileScope;
