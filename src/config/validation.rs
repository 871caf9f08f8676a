//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sweep interval within idle expiry)
//! - Check webservice entries (URLs, unique ids, digest settings, templates)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::soap::signing::DigestAlgorithm;
use crate::xml::XmlDocument;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid bind address `{0}`")]
    BindAddress(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("remote.sweep_interval_secs ({sweep}) exceeds remote.idle_expiry_secs ({expiry})")]
    SweepInterval { sweep: u64, expiry: u64 },

    #[error("webservice `{id}`: invalid url `{url}`")]
    WebserviceUrl { id: String, url: String },

    #[error("duplicate webservice id `{0}`")]
    DuplicateWebservice(String),

    #[error("webservice `{id}`: unsupported http_version {version}")]
    HttpVersion { id: String, version: u8 },

    #[error("webservice `{0}`: hmac-sha1 password digest requires hmac_key")]
    MissingHmacKey(String),

    #[error("webservice `{0}`: content_digest must be md5 or sha1")]
    ContentDigest(String),

    #[error("webservice `{id}`: security template is not valid XML: {reason}")]
    Template { id: String, reason: String },

    #[error("user `{0}`: password_sha256 must be 64 hex characters")]
    PasswordHash(String),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BindAddress(config.observability.metrics_address.clone()));
    }

    let remote = &config.remote;
    for (field, value) in [
        ("remote.default_timeout_ms", remote.default_timeout_ms),
        ("remote.idle_expiry_secs", remote.idle_expiry_secs),
        ("remote.stream_chunk_size", remote.stream_chunk_size as u64),
        ("listener.request_timeout_secs", config.listener.request_timeout_secs),
        ("session.idle_timeout_secs", config.session.idle_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    if remote.sweep_interval_secs > remote.idle_expiry_secs {
        errors.push(ValidationError::SweepInterval {
            sweep: remote.sweep_interval_secs,
            expiry: remote.idle_expiry_secs,
        });
    }

    let mut seen = HashSet::new();
    for ws in &config.webservices {
        if !seen.insert(ws.id.as_str()) {
            errors.push(ValidationError::DuplicateWebservice(ws.id.clone()));
        }
        if Url::parse(&ws.url).is_err() {
            errors.push(ValidationError::WebserviceUrl {
                id: ws.id.clone(),
                url: ws.url.clone(),
            });
        }
        if ws.timeout_ms == Some(0) {
            errors.push(ValidationError::Zero {
                field: "webservices.timeout_ms",
            });
        }
        if !matches!(ws.http_version, 1 | 2) {
            errors.push(ValidationError::HttpVersion {
                id: ws.id.clone(),
                version: ws.http_version,
            });
        }

        let Some(security) = &ws.security else {
            continue;
        };
        if security.password_digest == DigestAlgorithm::HmacSha1 && security.hmac_key.is_none() {
            errors.push(ValidationError::MissingHmacKey(ws.id.clone()));
        }
        if security.content_digest == DigestAlgorithm::HmacSha1 {
            errors.push(ValidationError::ContentDigest(ws.id.clone()));
        }
        if let Some(template) = &security.template {
            if let Err(e) = XmlDocument::parse(template) {
                errors.push(ValidationError::Template {
                    id: ws.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for user in &config.auth.users {
        let hash = &user.password_sha256;
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            errors.push(ValidationError::PasswordHash(user.username.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{UserConfig, WebserviceConfig, WebserviceSecurity};
    use crate::soap::envelope::SoapVersion;

    fn webservice(id: &str) -> WebserviceConfig {
        WebserviceConfig {
            id: id.to_string(),
            url: "https://svc.example/soap".to_string(),
            soap_version: SoapVersion::V12,
            namespace_prefix: None,
            namespace_uri: None,
            soap_action: None,
            timeout_ms: None,
            http_version: 1,
            security: None,
        }
    }

    fn security() -> WebserviceSecurity {
        WebserviceSecurity {
            username: "gw".to_string(),
            key_pattern: "[nonce]".to_string(),
            hmac_key: None,
            password_digest: DigestAlgorithm::Sha1,
            content_digest: DigestAlgorithm::Sha1,
            content_path: "*".to_string(),
            template: None,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn rejects_duplicate_ids_and_bad_versions() {
        let mut config = GatewayConfig::default();
        let mut second = webservice("a");
        second.http_version = 3;
        config.webservices = vec![webservice("a"), second];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateWebservice("a".into())));
        assert!(errors.contains(&ValidationError::HttpVersion {
            id: "a".into(),
            version: 3
        }));
    }

    #[test]
    fn checks_signing_settings() {
        let mut config = GatewayConfig::default();
        let mut ws = webservice("signed");
        let mut sec = security();
        sec.password_digest = DigestAlgorithm::HmacSha1;
        sec.content_digest = DigestAlgorithm::HmacSha1;
        sec.template = Some("<Security><open></Security>".to_string());
        ws.security = Some(sec);
        config.webservices.push(ws);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::MissingHmacKey("signed".into())));
        assert!(errors.contains(&ValidationError::ContentDigest("signed".into())));
    }

    #[test]
    fn checks_sweep_interval_and_password_hash() {
        let mut config = GatewayConfig::default();
        config.remote.sweep_interval_secs = config.remote.idle_expiry_secs + 1;
        config.auth.users.push(UserConfig {
            username: "alice".into(),
            password_sha256: "abc".into(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::PasswordHash("alice".into())));
    }
}
