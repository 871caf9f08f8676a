//! Outbound request description.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use url::form_urlencoded;

use crate::xml::XmlDocument;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    /// Anything else. Executed as GET.
    Other(String),
}

impl HttpMethod {
    pub fn parse(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            _ => HttpMethod::Other(method.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Other(m) => m,
        }
    }

    /// Payload goes into the request body rather than the query string.
    pub fn sends_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpVersion {
    #[default]
    Http11,
    Http2,
}

impl HttpVersion {
    pub fn major(self) -> u8 {
        match self {
            HttpVersion::Http11 => 1,
            HttpVersion::Http2 => 2,
        }
    }

    /// Anything other than 2 maps to HTTP/1.1.
    pub fn from_major(major: u8) -> Self {
        if major == 2 {
            HttpVersion::Http2
        } else {
            HttpVersion::Http11
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Version {
        match self {
            HttpVersion::Http11 => reqwest::Version::HTTP_11,
            HttpVersion::Http2 => reqwest::Version::HTTP_2,
        }
    }
}

/// Request payload, resolved at the call site.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
    Form(Vec<(String, String)>),
    Xml(XmlDocument),
}

impl RequestBody {
    pub fn text(text: impl Into<String>, content_type: Option<&str>) -> Self {
        RequestBody::Bytes {
            data: Bytes::from(text.into()),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Bytes { data, .. } => data.is_empty(),
            RequestBody::Form(fields) => fields.is_empty(),
            RequestBody::Xml(_) => false,
        }
    }

    /// Wire bytes of the payload.
    pub fn encode(&self) -> Bytes {
        match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Bytes { data, .. } => data.clone(),
            RequestBody::Form(fields) => Bytes::from(encode_form(fields)),
            RequestBody::Xml(doc) => Bytes::from(doc.to_string()),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Bytes { content_type, .. } => content_type.as_deref(),
            RequestBody::Form(_) => Some(FORM_CONTENT_TYPE),
            RequestBody::Xml(_) => Some(XML_CONTENT_TYPE),
        }
    }

    /// Payload as a query string for GET and DELETE.
    ///
    /// Raw bytes are assumed to be an encoded query already.
    pub fn as_query(&self) -> Option<String> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Bytes { data, .. } if data.is_empty() => None,
            RequestBody::Bytes { data, .. } => {
                Some(String::from_utf8_lossy(data).trim_start_matches('?').to_string())
            }
            RequestBody::Form(fields) if fields.is_empty() => None,
            RequestBody::Form(fields) => Some(encode_form(fields)),
            RequestBody::Xml(doc) => {
                Some(form_urlencoded::byte_serialize(doc.to_string().as_bytes()).collect())
            }
        }
    }

    /// Copy of the payload safe to log: URL-decoded when form encoded and
    /// capped at `limit` characters.
    pub fn loggable(&self, limit: usize) -> String {
        let encoded = self.encode();
        let text = if self.content_type() == Some(FORM_CONTENT_TYPE) {
            form_urlencoded::parse(&encoded)
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&")
        } else {
            String::from_utf8_lossy(&encoded).into_owned()
        };
        truncate_chars(&text, limit)
    }
}

fn encode_form(fields: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// One outbound call. Consumed by a single execution attempt.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub version: HttpVersion,
    pub body: RequestBody,
    pub headers: Vec<(String, String)>,
    /// Falls back to the executor's default timeout.
    pub timeout: Option<Duration>,
    pub suppress_error_logging: bool,
}

impl OutboundRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            version: HttpVersion::Http11,
            body: RequestBody::Empty,
            headers: Vec::new(),
            timeout: None,
            suppress_error_logging: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self::new(HttpMethod::Post, url).with_body(body)
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    pub fn suppress_error_logging(mut self) -> Self {
        self.suppress_error_logging = true;
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_methods_are_kept_verbatim() {
        assert_eq!(HttpMethod::parse("post"), HttpMethod::Post);
        assert_eq!(HttpMethod::parse("PATCH"), HttpMethod::Other("PATCH".into()));
        assert!(!HttpMethod::parse("PATCH").sends_body());
    }

    #[test]
    fn form_body_encodes_and_logs_decoded() {
        let body = RequestBody::Form(vec![
            ("q".into(), "a b&c".into()),
            ("n".into(), "1".into()),
        ]);
        assert_eq!(body.encode(), Bytes::from("q=a+b%26c&n=1"));
        assert_eq!(body.as_query().as_deref(), Some("q=a+b%26c&n=1"));
        assert_eq!(body.loggable(1024), "q=a b&c&n=1");
        assert_eq!(body.loggable(3), "q=a...");
    }

    #[test]
    fn raw_query_strips_leading_question_mark() {
        let body = RequestBody::text("?x=1", None);
        assert_eq!(body.as_query().as_deref(), Some("x=1"));
        assert_eq!(RequestBody::Empty.as_query(), None);
    }

    #[test]
    fn version_round_trips_through_major() {
        assert_eq!(HttpVersion::from_major(2), HttpVersion::Http2);
        assert_eq!(HttpVersion::from_major(7), HttpVersion::Http11);
        assert_eq!(HttpVersion::Http2.major(), 2);
    }
}
