//! SOAP calls on top of the remote executor.
//!
//! # Data Flow
//! ```text
//! (service id, payload)
//!     → directory lookup
//!     → sign payload (when the service has a security block)
//!     → build envelope (1.1 / 1.2)
//!     → RemoteExecutor::execute::<XmlDocument>
//!     → signed service: verify, then unwrap within the digested content
//!     → unsigned service: //data, else namespace-stripped Body child
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::config::WebserviceSecurity;
use crate::remote::{HttpVersion, OutboundRequest, RemoteExecutor, RequestBody, RequestError};
use crate::soap::directory::WebserviceDirectory;
use crate::soap::envelope::build_envelope;
use crate::soap::signing::{self, SigningError};
use crate::xml::envelope::is_error_document;
use crate::xml::{envelope, XmlDocument, XmlElement, XmlError};

#[derive(Debug, Error)]
pub enum SoapError {
    #[error("unknown webservice `{0}`")]
    UnknownService(String),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("invalid payload: {0}")]
    Payload(#[from] XmlError),

    #[error("could not sign request: {0}")]
    Signing(SigningError),

    #[error("response signature rejected: {0}")]
    SignatureMismatch(SigningError),

    #[error("response is not a usable SOAP envelope: {0}")]
    Envelope(String),

    #[error("SOAP fault {code}: {reason}")]
    Fault { code: String, reason: String },

    /// The body was not XML; carries the `<error>` document describing why.
    #[error("response could not be parsed")]
    UnparsableResponse(XmlDocument),
}

impl SoapError {
    /// Render the failure as a `<result>` envelope.
    pub fn to_envelope(&self, include_debug: bool) -> XmlDocument {
        match self {
            SoapError::Request(e) => e.to_envelope(include_debug),
            SoapError::UnparsableResponse(doc) if include_debug => {
                envelope("Could not parse webservice response", None, Some(doc.root.clone()))
            }
            SoapError::SignatureMismatch(_) => {
                let debug = include_debug.then(|| self.to_string());
                envelope("Webservice response failed signature validation", debug.as_deref(), None)
            }
            other => {
                let debug = include_debug.then(|| other.to_string());
                envelope("Webservice call failed", debug.as_deref(), None)
            }
        }
    }
}

/// Calls configured SOAP webservices.
#[derive(Clone)]
pub struct SoapClient {
    executor: RemoteExecutor,
    directory: Arc<dyn WebserviceDirectory>,
}

impl SoapClient {
    pub fn new(executor: RemoteExecutor, directory: Arc<dyn WebserviceDirectory>) -> Self {
        Self { executor, directory }
    }

    pub fn executor(&self) -> &RemoteExecutor {
        &self.executor
    }

    /// Parse `payload` and call `service_id` with it.
    pub async fn call_str(&self, service_id: &str, payload: &str) -> Result<XmlElement, SoapError> {
        let payload = XmlDocument::parse(payload)?.into_root();
        self.call(service_id, payload).await
    }

    /// Send `payload` to the webservice and return the unwrapped response element.
    pub async fn call(&self, service_id: &str, payload: XmlElement) -> Result<XmlElement, SoapError> {
        let service = self
            .directory
            .lookup(service_id)
            .ok_or_else(|| SoapError::UnknownService(service_id.to_string()))?;

        let security_header = match &service.security {
            Some(security) => Some(signing::sign(security, &payload).map_err(SoapError::Signing)?),
            None => None,
        };

        let action = service.soap_action.as_deref();
        let envelope = build_envelope(&service, payload, security_header);
        let timeout_ms = service
            .timeout_ms
            .unwrap_or(self.executor.settings().default_timeout_ms);

        let content_type = service.soap_version.content_type(action);
        let mut request = OutboundRequest::post(
            service.url.clone(),
            RequestBody::text(envelope.to_string(), Some(content_type.as_str())),
        )
        .with_version(HttpVersion::from_major(service.http_version))
        .with_timeout_ms(timeout_ms);
        for (name, value) in service.soap_version.headers(action) {
            request = request.with_header(name, value);
        }

        tracing::debug!(service = %service.id, version = %service.soap_version, signed = service.security.is_some(), "Calling webservice");

        let response: XmlDocument = match self.executor.execute(request).await {
            Ok(doc) => doc,
            Err(e) => {
                if let RequestError::Status { body, status, .. } = &e {
                    if let Some((code, reason)) = fault_in(body) {
                        tracing::warn!(service = %service.id, status, code = %code, reason = %reason, "Webservice returned a SOAP fault");
                        return Err(SoapError::Fault { code, reason });
                    }
                }
                return Err(e.into());
            }
        };

        if is_error_document(&response) {
            return Err(SoapError::UnparsableResponse(response));
        }

        if let Some(security) = &service.security {
            return unwrap_signed_response(security, &response).inspect_err(|e| {
                if let SoapError::SignatureMismatch(reason) = e {
                    tracing::warn!(service = %service.id, error = %reason, "Webservice response signature rejected");
                }
            });
        }

        unwrap_response(response)
    }
}

fn body_children(envelope: &XmlElement) -> Option<Vec<&XmlElement>> {
    envelope
        .child_elements()
        .find(|e| e.local_name() == "Body")
        .map(|body| body.child_elements().collect())
}

/// Business element among the Body children: the only one, the second of
/// two, otherwise the first.
fn pick_payload<'a>(children: &[&'a XmlElement]) -> Option<&'a XmlElement> {
    match children.len() {
        0 => None,
        2 => Some(children[1]),
        _ => Some(children[0]),
    }
}

fn fault_details(fault: &XmlElement) -> (String, String) {
    let code = fault
        .select("Code/Value")
        .or_else(|| fault.select("faultcode"))
        .map(|e| e.text())
        .unwrap_or_default();
    let reason = fault
        .select("Reason/Text")
        .or_else(|| fault.select("faultstring"))
        .map(|e| e.text())
        .unwrap_or_default();
    (code.trim().to_string(), reason.trim().to_string())
}

/// Fault code and reason when `body` is an envelope carrying a Fault.
fn fault_in(body: &str) -> Option<(String, String)> {
    let doc = XmlDocument::parse(body.trim()).ok()?;
    doc.select("/Envelope/Body/Fault").map(fault_details)
}

/// Verify a signed response and strip its envelope.
///
/// Only the digested Body content is trusted: a `data` element is looked up
/// inside it, never elsewhere in the envelope.
pub fn unwrap_signed_response(security: &WebserviceSecurity, doc: &XmlDocument) -> Result<XmlElement, SoapError> {
    let children = body_children(&doc.root).ok_or_else(|| SoapError::Envelope("missing Body".into()))?;
    let payload =
        pick_payload(&children).ok_or_else(|| SoapError::Envelope("response Body has no element to verify".into()))?;
    signing::verify_response(security, &doc.root, payload).map_err(SoapError::SignatureMismatch)?;

    let signed = payload
        .select_as_root(&security.content_path)
        .ok_or_else(|| SoapError::SignatureMismatch(SigningError::ContentNotFound(security.content_path.clone())))?;
    let mut element = if signed.local_name() == "data" {
        signed.clone()
    } else {
        signed.find_descendant("data").unwrap_or(signed).clone()
    };
    element.strip_namespaces();
    Ok(element)
}

/// Strip the SOAP envelope from an unsigned response.
///
/// A `data` element anywhere in the document wins. Otherwise the Body
/// child is taken: the only child, the second of two, or the first of
/// more (logged, the response shape is unexpected).
pub fn unwrap_response(mut doc: XmlDocument) -> Result<XmlElement, SoapError> {
    if let Some(data) = doc.select("//data") {
        return Ok(data.clone());
    }
    if doc.root.local_name() != "Envelope" {
        return Err(SoapError::Envelope(format!("root element is `{}`", doc.root.name)));
    }

    doc.strip_namespaces();
    let children = body_children(&doc.root).ok_or_else(|| SoapError::Envelope("missing Body".into()))?;

    if let Some(fault) = children.iter().find(|c| c.local_name() == "Fault") {
        let (code, reason) = fault_details(fault);
        return Err(SoapError::Fault { code, reason });
    }

    match children.len() {
        0 => return Err(SoapError::Envelope("empty Body".into())),
        1 => {}
        2 => tracing::debug!(first = %children[0].name, "Body has two children, using the second"),
        n => tracing::warn!(children = n, "Body has an unexpected number of children, using the first"),
    }
    pick_payload(&children)
        .cloned()
        .ok_or_else(|| SoapError::Envelope("empty Body".into()))
}
