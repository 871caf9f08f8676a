//! XML document model.
//!
//! # Data Flow
//! ```text
//! remote body (JSON / XML / text)
//!     → json.rs (JSON → element tree)
//!     → document.rs (parse, select, serialize)
//!     → envelope.rs (result / error wrappers)
//!     → callers (executor, SOAP client, HTTP handlers)
//! ```

pub mod document;
pub mod envelope;
pub mod json;

pub use document::{XmlDocument, XmlElement, XmlError, XmlNode};
pub use envelope::{envelope, error_document, success_document};
pub use json::json_to_xml;
