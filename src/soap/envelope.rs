//! SOAP envelope construction.

use serde::{Deserialize, Serialize};

use crate::config::schema::WebserviceConfig;
use crate::xml::{XmlDocument, XmlElement};

pub const SOAP11_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const ENVELOPE_PREFIX: &str = "soap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SoapVersion {
    #[serde(rename = "1.1")]
    V11,
    #[default]
    #[serde(rename = "1.2")]
    V12,
}

impl SoapVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            SoapVersion::V11 => SOAP11_NAMESPACE,
            SoapVersion::V12 => SOAP12_NAMESPACE,
        }
    }

    /// Content-Type for a request, carrying the action for SOAP 1.2.
    pub fn content_type(self, action: Option<&str>) -> String {
        match (self, action) {
            (SoapVersion::V11, _) => "text/xml; charset=utf-8".to_string(),
            (SoapVersion::V12, Some(action)) => {
                format!("application/soap+xml; charset=utf-8; action=\"{action}\"")
            }
            (SoapVersion::V12, None) => "application/soap+xml; charset=utf-8".to_string(),
        }
    }

    /// Extra headers for a request. SOAP 1.1 always sends `SOAPAction`.
    pub fn headers(self, action: Option<&str>) -> Vec<(String, String)> {
        match self {
            SoapVersion::V11 => vec![(
                "SOAPAction".to_string(),
                format!("\"{}\"", action.unwrap_or_default()),
            )],
            SoapVersion::V12 => Vec::new(),
        }
    }

    /// Find the version from an envelope's namespace declaration.
    pub fn detect(envelope: &XmlElement) -> Option<Self> {
        envelope.attributes.iter().find_map(|(k, v)| {
            if k != "xmlns" && !k.starts_with("xmlns:") {
                return None;
            }
            match v.as_str() {
                SOAP11_NAMESPACE => Some(SoapVersion::V11),
                SOAP12_NAMESPACE => Some(SoapVersion::V12),
                _ => None,
            }
        })
    }
}

impl std::fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SoapVersion::V11 => "1.1",
            SoapVersion::V12 => "1.2",
        })
    }
}

fn qualified(local: &str) -> String {
    format!("{ENVELOPE_PREFIX}:{local}")
}

/// Wrap `payload` in an envelope for `service`.
///
/// The payload namespace from the service entry is declared on the
/// envelope element. `security` goes into the SOAP header when present.
pub fn build_envelope(service: &WebserviceConfig, payload: XmlElement, security: Option<XmlElement>) -> XmlDocument {
    let mut envelope = XmlElement::new(qualified("Envelope"))
        .with_attribute(format!("xmlns:{ENVELOPE_PREFIX}"), service.soap_version.namespace());

    if let Some(uri) = &service.namespace_uri {
        let attr = match &service.namespace_prefix {
            Some(prefix) if !prefix.is_empty() => format!("xmlns:{prefix}"),
            _ => "xmlns".to_string(),
        };
        envelope.set_attribute(attr, uri.as_str());
    }

    let mut header = XmlElement::new(qualified("Header"));
    if let Some(security) = security {
        header.push_child(security);
    }
    envelope.push_child(header);
    envelope.push_child(XmlElement::new(qualified("Body")).with_child(payload));
    XmlDocument::new(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(version: SoapVersion) -> WebserviceConfig {
        WebserviceConfig {
            id: "docs".into(),
            url: "http://svc.example/soap".into(),
            soap_version: version,
            namespace_prefix: Some("d".into()),
            namespace_uri: Some("urn:docs".into()),
            soap_action: Some("urn:docs/Get".into()),
            timeout_ms: None,
            http_version: 1,
            security: None,
        }
    }

    #[test]
    fn builds_soap12_envelope() {
        let doc = build_envelope(&service(SoapVersion::V12), XmlElement::new("d:Get"), None);
        assert_eq!(
            doc.to_string(),
            "<soap:Envelope xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\" xmlns:d=\"urn:docs\">\
             <soap:Header/><soap:Body><d:Get/></soap:Body></soap:Envelope>"
        );
        assert_eq!(SoapVersion::detect(&doc.root), Some(SoapVersion::V12));
    }

    #[test]
    fn soap11_uses_soapaction_header() {
        let version = SoapVersion::V11;
        assert_eq!(version.content_type(Some("x")), "text/xml; charset=utf-8");
        assert_eq!(version.headers(Some("urn:a")), vec![("SOAPAction".to_string(), "\"urn:a\"".to_string())]);
        let doc = build_envelope(&service(version), XmlElement::new("d:Get"), None);
        assert_eq!(SoapVersion::detect(&doc.root), Some(SoapVersion::V11));
    }

    #[test]
    fn soap12_carries_action_in_content_type() {
        assert_eq!(
            SoapVersion::V12.content_type(Some("urn:a")),
            "application/soap+xml; charset=utf-8; action=\"urn:a\""
        );
        assert!(SoapVersion::V12.headers(Some("urn:a")).is_empty());
    }
}
