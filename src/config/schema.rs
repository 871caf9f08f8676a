//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::soap::envelope::SoapVersion;
use crate::soap::signing::DigestAlgorithm;

/// Root configuration for the document store gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Outbound request execution and client caching.
    pub remote: RemoteConfig,

    /// Scratch buffer pool sizing.
    pub buffers: BufferConfig,

    /// Session cookie and fixation settings.
    pub session: SessionConfig,

    /// CSRF token field names.
    pub csrf: CsrfConfig,

    /// Failed login throttling.
    pub throttle: ThrottleConfig,

    /// Inbound request hardening.
    pub security: SecurityConfig,

    /// Accounts allowed to log in.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// SOAP webservices callable through the gateway.
    pub webservices: Vec<WebserviceConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Whole-request timeout for inbound calls in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            request_timeout_secs: 120,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Outbound request configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Timeout applied when a request does not carry its own.
    pub default_timeout_ms: u64,

    /// Cached clients idle longer than this are evicted.
    pub idle_expiry_secs: u64,

    /// Minimum time between two cache sweeps.
    pub sweep_interval_secs: u64,

    /// Bodies above this size (or of unknown size) are streamed.
    pub large_body_threshold: usize,

    /// Chunk size used when streaming a response body.
    pub stream_chunk_size: usize,

    /// Maximum number of request body characters kept for logging.
    pub log_body_limit: usize,

    /// Statuses logged as a short notice instead of an error dump.
    pub quiet_statuses: Vec<u16>,

    /// Response bodies larger than this trim the buffer pool afterwards.
    pub trim_threshold_bytes: usize,

    /// Idle keep-alive connections inside one client are closed after this.
    pub pool_idle_timeout_secs: u64,

    /// User-Agent sent on outbound requests.
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            idle_expiry_secs: 30 * 60,
            sweep_interval_secs: 5 * 60,
            large_body_threshold: 85 * 1024,
            stream_chunk_size: 32 * 1024,
            log_body_limit: 1024,
            quiet_statuses: vec![424],
            trim_threshold_bytes: 1024 * 1024,
            pool_idle_timeout_secs: 90,
            user_agent: concat!("docstore-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Buffer pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Idle buffers kept per size class.
    pub max_retained: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { max_retained: 32 }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session id.
    pub cookie_name: String,

    /// Additional cookies expired when a session is purged.
    pub purge_cookies: Vec<String>,

    /// Keep SSO cookies alive when purging.
    pub preserve_sso_cookies: bool,

    /// Prefix identifying SSO cookies.
    pub sso_cookie_prefix: String,

    /// Treat `X-Forwarded-Proto: https` as an HTTPS request.
    pub trust_forwarded_proto: bool,

    /// Sessions unused for this long are dropped.
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "docstore_session".to_string(),
            purge_cookies: Vec::new(),
            preserve_sso_cookies: true,
            sso_cookie_prefix: "sso_".to_string(),
            trust_forwarded_proto: false,
            idle_timeout_secs: 30 * 60,
        }
    }
}

/// CSRF field names.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Primary request field.
    pub field: String,

    /// Fallback request field.
    pub fallback_field: String,

    /// Field read from JSON bodies.
    pub json_field: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            field: "token".to_string(),
            fallback_field: "nekot".to_string(),
            json_field: "token".to_string(),
        }
    }
}

/// Failed login throttle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// A failure count restarts after this long without new failures.
    pub reset_after_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            reset_after_secs: 3600,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Login accounts.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,

    /// Hex encoded SHA-256 of the password.
    pub password_sha256: String,
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One SOAP webservice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebserviceConfig {
    /// Identifier used by callers.
    pub id: String,

    /// Endpoint URL.
    pub url: String,

    #[serde(default)]
    pub soap_version: SoapVersion,

    /// Prefix for the payload namespace declared on the envelope.
    #[serde(default)]
    pub namespace_prefix: Option<String>,

    #[serde(default)]
    pub namespace_uri: Option<String>,

    /// SOAPAction (1.1) or `action` content-type parameter (1.2).
    #[serde(default)]
    pub soap_action: Option<String>,

    /// Falls back to `remote.default_timeout_ms`.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// HTTP major version, 1 or 2.
    #[serde(default = "default_http_version")]
    pub http_version: u8,

    /// Signing settings. Present means every call is signed and verified.
    #[serde(default)]
    pub security: Option<WebserviceSecurity>,
}

fn default_http_version() -> u8 {
    1
}

/// Username-token and content signing for a webservice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebserviceSecurity {
    pub username: String,

    /// Shared key pattern with `[nonce]`, `[created]` and `[username]` placeholders.
    pub key_pattern: String,

    /// Key for `hmac-sha1` password digests.
    #[serde(default)]
    pub hmac_key: Option<String>,

    #[serde(default = "default_password_digest")]
    pub password_digest: DigestAlgorithm,

    #[serde(default = "default_content_digest")]
    pub content_digest: DigestAlgorithm,

    /// Path of the payload fragment covered by the content digest.
    #[serde(default = "default_content_path")]
    pub content_path: String,

    /// Security header template. A WS-Security UsernameToken is used when absent.
    #[serde(default)]
    pub template: Option<String>,
}

fn default_password_digest() -> DigestAlgorithm {
    DigestAlgorithm::Sha1
}

fn default_content_digest() -> DigestAlgorithm {
    DigestAlgorithm::Sha1
}

fn default_content_path() -> String {
    "*".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.remote.default_timeout_ms, 30_000);
        assert_eq!(config.remote.quiet_statuses, vec![424]);
        assert_eq!(config.csrf.fallback_field, "nekot");
        assert!(config.webservices.is_empty());
    }

    #[test]
    fn parses_webservice_with_security() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[webservices]]
            id = "archive"
            url = "https://archive.example/soap"
            soap_version = "1.1"
            http_version = 2

            [webservices.security]
            username = "gateway"
            key_pattern = "[nonce][created]secret"
            password_digest = "hmac-sha1"
            hmac_key = "k"
            content_digest = "md5"
            "#,
        )
        .unwrap();

        let ws = &config.webservices[0];
        assert_eq!(ws.soap_version, SoapVersion::V11);
        assert_eq!(ws.http_version, 2);
        let security = ws.security.as_ref().unwrap();
        assert_eq!(security.password_digest, DigestAlgorithm::HmacSha1);
        assert_eq!(security.content_digest, DigestAlgorithm::Md5);
        assert_eq!(security.content_path, "*");
    }
}
