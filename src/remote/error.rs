//! Outbound request failures.

use std::fmt;

use thiserror::Error;

use crate::xml::{envelope, XmlDocument, XmlElement};

/// Result of one outbound call. `Err` never carries a partially parsed payload.
pub type OutboundResult<T> = Result<T, RequestError>;

/// Context attached to a failed call for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDebugInfo {
    pub url: String,
    pub method: String,
    /// Loggable copy of the request body, already truncated.
    pub request_body: String,
    pub reason: String,
}

impl fmt::Display for RequestDebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "url: {}, method: {}, reason: {}", self.url, self.method, self.reason)?;
        if !self.request_body.is_empty() {
            write!(f, ", request body: {}", self.request_body)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error("request URL is empty")]
    EmptyUrl,

    #[error("invalid request URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not build HTTP client: {0}")]
    Client(String),

    /// Connection refused, DNS failure, timeout or a broken body stream.
    #[error("{} {} failed: {}", .debug.method, .debug.url, .debug.reason)]
    Transport { timed_out: bool, debug: RequestDebugInfo },

    /// Non-2xx response. `body` is the verbatim error body.
    #[error("{} {} returned {status} {reason}", .debug.method, .debug.url)]
    Status {
        status: u16,
        reason: String,
        body: String,
        debug: RequestDebugInfo,
    },
}

impl RequestError {
    /// HTTP status of the failure, `None` when no response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Transport { timed_out: true, .. })
    }

    pub fn debug_info(&self) -> Option<&RequestDebugInfo> {
        match self {
            RequestError::Transport { debug, .. } | RequestError::Status { debug, .. } => Some(debug),
            _ => None,
        }
    }

    /// Render the failure as a `<result>` envelope.
    ///
    /// Callers outside debug contexts get a generic message only.
    pub fn to_envelope(&self, include_debug: bool) -> XmlDocument {
        let message = match self {
            RequestError::Status { status, reason, .. } => {
                format!("Remote service returned {status} {reason}")
            }
            _ => "Could not reach remote service".to_string(),
        };
        if !include_debug {
            return envelope(&message, None, None);
        }

        let debug = match self.debug_info() {
            Some(info) => info.to_string(),
            None => self.to_string(),
        };
        let data = match self {
            RequestError::Status { body, .. } if !body.is_empty() => {
                Some(XmlElement::new("httpresponse").with_text(body.clone()))
            }
            _ => None,
        };
        envelope(&message, Some(&debug), data)
    }
}
