//! Per-request view used by the guards.
//!
//! Built by the HTTP middleware from the inbound request and passed
//! explicitly; the guards never look up ambient request state.

use std::collections::HashMap;
use std::net::IpAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;

use crate::security::fingerprint::check_ip;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub remote_addr: Option<IpAddr>,
    pub is_https: bool,
    /// The client negotiated a JSON response.
    pub wants_json: bool,
    /// Query and form fields.
    pub fields: HashMap<String, String>,
    pub json_body: Option<Value>,
}

impl RequestContext {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            remote_addr: None,
            is_https: false,
            wants_json: false,
            fields: HashMap::new(),
            json_body: None,
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_https(mut self, is_https: bool) -> Self {
        self.is_https = is_https;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.wants_json = true;
        self.json_body = Some(body);
        self
    }

    /// All values of a header joined with `, `.
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Best guess at the client address: first valid `X-Forwarded-For`
    /// entry, then the socket peer.
    pub fn client_ip(&self) -> String {
        self.header("x-forwarded-for")
            .and_then(|v| check_ip(&v))
            .or_else(|| self.remote_addr.map(|ip| ip.to_string()))
            .unwrap_or_default()
    }
}
