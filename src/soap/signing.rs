//! Username-token and content digests.
//!
//! # Responsibilities
//! - Compute the password digest over the shared key pattern
//! - Compute the content digest over the ASCII-stripped payload fragment
//! - Fill the security header template
//! - Recompute both digests for a response and compare in constant time
//!
//! # Digest Inputs
//! ```text
//! password: key_pattern with [nonce] [created] [username] substituted
//! content:  serialized element at content_path, non-ASCII and whitespace removed
//! output:   base64 of the raw digest bytes
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::schema::WebserviceSecurity;
use crate::xml::{XmlDocument, XmlElement};

type HmacSha1 = Hmac<Sha1>;

pub const WSSE_NAMESPACE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NAMESPACE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_DIGEST_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const BASE64_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

const NONCE_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    HmacSha1,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("hmac-sha1 digest requires an hmac key")]
    MissingHmacKey,

    #[error("invalid hmac key")]
    InvalidHmacKey,

    #[error("content path `{0}` matches nothing in the payload")]
    ContentNotFound(String),

    #[error("security template is not valid XML: {0}")]
    Template(String),

    #[error("security template has no `{0}` element")]
    MissingTemplateField(&'static str),

    #[error("response carries no security header")]
    MissingSecurityHeader,

    #[error("response {0} digest does not match")]
    Mismatch(&'static str),
}

/// Values written into a security header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFields {
    pub username: String,
    pub nonce: String,
    pub created: String,
    pub password_digest: String,
    pub content_digest: String,
}

/// Replace `[nonce]`, `[created]` and `[username]` in a key pattern.
pub fn substitute_pattern(pattern: &str, nonce: &str, created: &str, username: &str) -> String {
    pattern
        .replace("[nonce]", nonce)
        .replace("[created]", created)
        .replace("[username]", username)
}

/// Drop non-ASCII characters and whitespace.
pub fn ascii_strip(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_whitespace())
        .collect()
}

/// Base64 digest of `data`.
pub fn digest(algorithm: DigestAlgorithm, data: &[u8], hmac_key: Option<&str>) -> Result<String, SigningError> {
    let raw = match algorithm {
        DigestAlgorithm::Md5 => Md5::digest(data).to_vec(),
        DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
        DigestAlgorithm::HmacSha1 => {
            let key = hmac_key.ok_or(SigningError::MissingHmacKey)?;
            let mut mac = <HmacSha1 as Mac>::new_from_slice(key.as_bytes())
                .map_err(|_| SigningError::InvalidHmacKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(STANDARD.encode(raw))
}

pub fn password_digest(
    security: &WebserviceSecurity,
    username: &str,
    nonce: &str,
    created: &str,
) -> Result<String, SigningError> {
    let material = substitute_pattern(&security.key_pattern, nonce, created, username);
    digest(
        security.password_digest,
        material.as_bytes(),
        security.hmac_key.as_deref(),
    )
}

pub fn content_digest(security: &WebserviceSecurity, payload: &XmlElement) -> Result<String, SigningError> {
    let fragment = payload
        .select_as_root(&security.content_path)
        .ok_or_else(|| SigningError::ContentNotFound(security.content_path.clone()))?;
    let stripped = ascii_strip(&fragment.to_string());
    digest(security.content_digest, stripped.as_bytes(), security.hmac_key.as_deref())
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

fn now_created() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Compute every field for signing `payload`.
pub fn signature_fields(security: &WebserviceSecurity, payload: &XmlElement) -> Result<SignatureFields, SigningError> {
    let nonce = generate_nonce();
    let created = now_created();
    Ok(SignatureFields {
        password_digest: password_digest(security, &security.username, &nonce, &created)?,
        content_digest: content_digest(security, payload)?,
        username: security.username.clone(),
        nonce,
        created,
    })
}

fn default_template() -> XmlElement {
    XmlElement::new("wsse:Security")
        .with_attribute("xmlns:wsse", WSSE_NAMESPACE)
        .with_attribute("xmlns:wsu", WSU_NAMESPACE)
        .with_child(
            XmlElement::new("wsse:UsernameToken")
                .with_child(XmlElement::new("wsse:Username"))
                .with_child(XmlElement::new("wsse:Password").with_attribute("Type", PASSWORD_DIGEST_TYPE))
                .with_child(XmlElement::new("wsse:Nonce").with_attribute("EncodingType", BASE64_ENCODING_TYPE))
                .with_child(XmlElement::new("wsu:Created")),
        )
        .with_child(XmlElement::new("wsse:ContentDigest"))
}

/// Security header for `fields`, built from the configured template or a
/// WS-Security UsernameToken.
pub fn security_header(security: &WebserviceSecurity, fields: &SignatureFields) -> Result<XmlElement, SigningError> {
    let mut header = match &security.template {
        Some(template) => XmlDocument::parse(template)
            .map_err(|e| SigningError::Template(e.to_string()))?
            .into_root(),
        None => default_template(),
    };

    for (name, value, required) in [
        ("Password", &fields.password_digest, true),
        ("ContentDigest", &fields.content_digest, true),
        ("Username", &fields.username, false),
        ("Nonce", &fields.nonce, false),
        ("Created", &fields.created, false),
    ] {
        match header.find_descendant_mut(name) {
            Some(element) => element.set_text(value.as_str()),
            None if required => return Err(SigningError::MissingTemplateField(name)),
            None => {}
        }
    }
    Ok(header)
}

/// Sign `payload`, returning the filled security header.
pub fn sign(security: &WebserviceSecurity, payload: &XmlElement) -> Result<XmlElement, SigningError> {
    let fields = signature_fields(security, payload)?;
    security_header(security, &fields)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check the security header of a response envelope against `payload`,
/// the business element of its body.
pub fn verify_response(
    security: &WebserviceSecurity,
    envelope: &XmlElement,
    payload: &XmlElement,
) -> Result<(), SigningError> {
    let header = envelope
        .find_descendant("Security")
        .ok_or(SigningError::MissingSecurityHeader)?;
    let field = |name: &str| header.find_descendant(name).map(|e| e.text());

    let nonce = field("Nonce").unwrap_or_default();
    let created = field("Created").unwrap_or_default();
    let username = field("Username").unwrap_or_else(|| security.username.clone());
    let received_password = field("Password").ok_or(SigningError::Mismatch("password"))?;
    let received_content = field("ContentDigest").ok_or(SigningError::Mismatch("content"))?;

    let expected_password = password_digest(security, &username, &nonce, &created)?;
    if !constant_time_eq(&expected_password, received_password.trim()) {
        return Err(SigningError::Mismatch("password"));
    }

    let expected_content = content_digest(security, payload)?;
    if !constant_time_eq(&expected_content, received_content.trim()) {
        return Err(SigningError::Mismatch("content"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security(password: DigestAlgorithm, content: DigestAlgorithm) -> WebserviceSecurity {
        WebserviceSecurity {
            username: "gateway".into(),
            key_pattern: "[nonce]-[created]-[username]-s3cret".into(),
            hmac_key: Some("shared".into()),
            password_digest: password,
            content_digest: content,
            content_path: "*".into(),
            template: None,
        }
    }

    fn payload() -> XmlElement {
        XmlDocument::parse("<d:Get xmlns:d=\"urn:docs\"><d:id>42</d:id><d:title>Zürich</d:title></d:Get>")
            .unwrap()
            .into_root()
    }

    #[test]
    fn known_digests() {
        assert_eq!(digest(DigestAlgorithm::Md5, b"abc", None).unwrap(), "kAFQmDzST7DWlj99KOF/cg==");
        assert_eq!(digest(DigestAlgorithm::Sha1, b"abc", None).unwrap(), "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=");
        assert_eq!(
            digest(DigestAlgorithm::HmacSha1, b"abc", None).unwrap_err(),
            SigningError::MissingHmacKey
        );
    }

    #[test]
    fn substitutes_placeholders() {
        assert_eq!(
            substitute_pattern("[username]:[nonce]:[created]:[nonce]", "n", "c", "u"),
            "u:n:c:n"
        );
        assert_eq!(ascii_strip(" a\tb\nZürich "), "abZrich");
    }

    #[test]
    fn content_digest_ignores_whitespace() {
        let sec = security(DigestAlgorithm::Sha1, DigestAlgorithm::Md5);
        let spaced = XmlDocument::parse("<d:Get xmlns:d=\"urn:docs\">\n  <d:id>42</d:id>\n  <d:title>Zürich</d:title>\n</d:Get>")
            .unwrap()
            .into_root();
        assert_eq!(
            content_digest(&sec, &payload()).unwrap(),
            content_digest(&sec, &spaced).unwrap()
        );
    }

    #[test]
    fn signed_header_verifies() {
        for alg in [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::HmacSha1] {
            let sec = security(alg, DigestAlgorithm::Sha1);
            let header = sign(&sec, &payload()).unwrap();
            let envelope = XmlElement::new("Envelope").with_child(XmlElement::new("Header").with_child(header));
            assert_eq!(verify_response(&sec, &envelope, &payload()), Ok(()));
        }
    }

    #[test]
    fn tampering_is_detected() {
        let sec = security(DigestAlgorithm::HmacSha1, DigestAlgorithm::Sha1);
        let header = sign(&sec, &payload()).unwrap();
        let envelope = XmlElement::new("Envelope").with_child(header.clone());

        let tampered = XmlDocument::parse("<d:Get xmlns:d=\"urn:docs\"><d:id>43</d:id></d:Get>")
            .unwrap()
            .into_root();
        assert_eq!(
            verify_response(&sec, &envelope, &tampered),
            Err(SigningError::Mismatch("content"))
        );

        let mut forged = header;
        forged.find_descendant_mut("Nonce").unwrap().set_text("AAAA");
        let envelope = XmlElement::new("Envelope").with_child(forged);
        assert_eq!(
            verify_response(&sec, &envelope, &payload()),
            Err(SigningError::Mismatch("password"))
        );

        assert_eq!(
            verify_response(&sec, &XmlElement::new("Envelope"), &payload()),
            Err(SigningError::MissingSecurityHeader)
        );
    }

    #[test]
    fn custom_template_needs_digest_fields() {
        let mut sec = security(DigestAlgorithm::Sha1, DigestAlgorithm::Sha1);
        sec.template = Some("<Auth><User/><Password/><ContentDigest/></Auth>".into());
        let header = sign(&sec, &payload()).unwrap();
        assert_eq!(header.find_descendant("User").unwrap().text(), "");
        assert!(!header.find_descendant("Password").unwrap().text().is_empty());

        sec.template = Some("<Auth><Password/></Auth>".into());
        assert_eq!(
            sign(&sec, &payload()).unwrap_err(),
            SigningError::MissingTemplateField("ContentDigest")
        );
    }
}
