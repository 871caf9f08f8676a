//! Conversion of a successful body into the caller's requested shape.

use serde_json::Value;

use crate::xml::{error_document, json_to_xml, success_document, XmlDocument};

/// Root element of documents converted from JSON bodies.
pub const JSON_ROOT: &str = "root";

/// A type a response body can be turned into.
///
/// Shaping never fails: bodies that do not fit produce an in-band error
/// value instead (see [`shape_xml`]).
pub trait ResponseShape: Sized {
    fn from_body(body: String) -> Self;
}

impl ResponseShape for String {
    fn from_body(body: String) -> Self {
        body
    }
}

impl ResponseShape for XmlDocument {
    fn from_body(body: String) -> Self {
        shape_xml(&body)
    }
}

/// Detect the body format and build a document from it.
///
/// - JSON objects and arrays are converted under a `<root>` element
/// - XML is parsed as-is
/// - anything else is wrapped in a success envelope
///
/// A body that looks like JSON or XML but fails to parse yields an
/// `<error>` document carrying the parser message and the raw body.
pub fn shape_xml(body: &str) -> XmlDocument {
    let trimmed = body.trim_start_matches('\u{feff}').trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => json_to_xml(&value, JSON_ROOT),
            Err(e) => {
                tracing::warn!(error = %e, "Response body looked like JSON but did not parse");
                error_document("Could not parse JSON response", &e.to_string(), body)
            }
        };
    }

    if trimmed.starts_with('<') {
        return match XmlDocument::parse(trimmed) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "Response body is not well-formed XML");
                error_document("Could not parse XML response", &e.to_string(), body)
            }
        };
    }

    success_document(body)
}
