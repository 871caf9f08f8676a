//! Outbound HTTP request subsystem.
//!
//! # Data Flow
//! ```text
//! caller (SOAP client, HTTP handler, CLI)
//!     → request.rs (OutboundRequest, RequestBody)
//!     → executor.rs (single attempt, classification)
//!         → cache.rs (reusable client per endpoint, idle sweep)
//!         → buffers (pooled streaming of large bodies)
//!     → response.rs (String or XmlDocument)
//!     → error.rs (RequestError with debug info)
//! ```

pub mod cache;
pub mod error;
pub mod executor;
pub mod request;
pub mod response;

pub use cache::{ClientCache, ClientHandle, ClientKey};
pub use error::{OutboundResult, RequestDebugInfo, RequestError};
pub use executor::RemoteExecutor;
pub use request::{HttpMethod, HttpVersion, OutboundRequest, RequestBody};
pub use response::{shape_xml, ResponseShape};
