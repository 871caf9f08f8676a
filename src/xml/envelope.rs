//! Result and error envelopes.
//!
//! Every outward response uses the same shape:
//! ```text
//! <result>
//!   <message>...</message>
//!   <debuginfo>...</debuginfo>
//!   <data>...</data>
//! </result>
//! ```
//! Parse failures of a remote body use `<error>` instead, embedding the
//! exception and the raw response.

use crate::xml::document::{XmlDocument, XmlElement};

pub const SUCCESS_MESSAGE: &str = "Successfully retrieved data";

/// Build a `<result>` envelope.
pub fn envelope(message: &str, debug: Option<&str>, data: Option<XmlElement>) -> XmlDocument {
    let mut data_el = XmlElement::new("data");
    if let Some(data) = data {
        data_el.push_child(data);
    }
    let mut debug_el = XmlElement::new("debuginfo");
    if let Some(debug) = debug {
        debug_el.set_text(debug);
    }
    XmlDocument::new(
        XmlElement::new("result")
            .with_child(XmlElement::new("message").with_text(message))
            .with_child(debug_el)
            .with_child(data_el),
    )
}

/// Wrap a plain-text response body in a success envelope.
pub fn success_document(text: &str) -> XmlDocument {
    let mut doc = envelope(SUCCESS_MESSAGE, None, None);
    if let Some(data) = doc.root.find_descendant_mut("data") {
        data.set_text(text);
    }
    doc
}

/// Document describing a body that could not be shaped into XML.
pub fn error_document(message: &str, exception: &str, raw: &str) -> XmlDocument {
    XmlDocument::new(
        XmlElement::new("error")
            .with_child(XmlElement::new("message").with_text(message))
            .with_child(XmlElement::new("debuginfo").with_text(exception))
            .with_child(XmlElement::new("httpresponse").with_text(raw)),
    )
}

/// Whether a document is an `<error>` document produced by [`error_document`].
pub fn is_error_document(doc: &XmlDocument) -> bool {
    doc.root.name == "error" && doc.root.find_descendant("httpresponse").is_some()
}
