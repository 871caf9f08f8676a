//! Session fixation guard.
//!
//! # Responsibilities
//! - Record a fingerprint of the client (forwarding headers, peer
//!   address, normalized user agent) in the session at login
//! - On later HTTPS requests, compare the live fingerprint against the
//!   recorded one and purge the session on the first difference
//!
//! # Design Decisions
//! - Only HTTPS traffic is checked; plain HTTP is expected to be
//!   redirected before it reaches authenticated routes
//! - IP-bearing headers that fail `check_ip` are stored as an empty
//!   placeholder, so a header that later starts carrying a valid
//!   address is a mismatch
//! - User agents are compared with version numbers cut to the major
//!   component, so a browser auto-update does not log the user out

use tracing::{debug, warn};

use crate::config::schema::SessionConfig;
use crate::observability::metrics;
use crate::security::context::RequestContext;
use crate::security::error::SecurityViolation;
use crate::security::session::Session;

const SESSION_KEY_PREFIX: &str = "fixation.";
const RECORDED_KEY: &str = "fixation.recorded";

/// Request attributes making up the client fingerprint, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintHeader {
    ClientIp,
    XForwardedFor,
    XForwarded,
    XClusterClientIp,
    ForwardedFor,
    Forwarded,
    Via,
    RemoteAddr,
    UserAgent,
}

impl FingerprintHeader {
    pub const ALL: [FingerprintHeader; 9] = [
        FingerprintHeader::ClientIp,
        FingerprintHeader::XForwardedFor,
        FingerprintHeader::XForwarded,
        FingerprintHeader::XClusterClientIp,
        FingerprintHeader::ForwardedFor,
        FingerprintHeader::Forwarded,
        FingerprintHeader::Via,
        FingerprintHeader::RemoteAddr,
        FingerprintHeader::UserAgent,
    ];

    /// CGI-style variable name, used in logs and session keys.
    pub fn variable(&self) -> &'static str {
        match self {
            FingerprintHeader::ClientIp => "HTTP_CLIENT_IP",
            FingerprintHeader::XForwardedFor => "HTTP_X_FORWARDED_FOR",
            FingerprintHeader::XForwarded => "HTTP_X_FORWARDED",
            FingerprintHeader::XClusterClientIp => "HTTP_X_CLUSTER_CLIENT_IP",
            FingerprintHeader::ForwardedFor => "HTTP_FORWARDED_FOR",
            FingerprintHeader::Forwarded => "HTTP_FORWARDED",
            FingerprintHeader::Via => "HTTP_VIA",
            FingerprintHeader::RemoteAddr => "REMOTE_ADDR",
            FingerprintHeader::UserAgent => "HTTP_USER_AGENT",
        }
    }

    /// HTTP header carrying the value. `None` for the socket peer.
    pub fn header_name(&self) -> Option<&'static str> {
        match self {
            FingerprintHeader::ClientIp => Some("client-ip"),
            FingerprintHeader::XForwardedFor => Some("x-forwarded-for"),
            FingerprintHeader::XForwarded => Some("x-forwarded"),
            FingerprintHeader::XClusterClientIp => Some("x-cluster-client-ip"),
            FingerprintHeader::ForwardedFor => Some("forwarded-for"),
            FingerprintHeader::Forwarded => Some("forwarded"),
            FingerprintHeader::Via => Some("via"),
            FingerprintHeader::RemoteAddr => None,
            FingerprintHeader::UserAgent => Some("user-agent"),
        }
    }

    pub fn session_key(&self) -> String {
        format!("{SESSION_KEY_PREFIX}{}", self.variable())
    }

    fn carries_ip(&self) -> bool {
        !matches!(self, FingerprintHeader::Via | FingerprintHeader::UserAgent)
    }

    /// Value of this attribute on the live request, as it would be stored.
    pub fn live_value(&self, ctx: &RequestContext) -> String {
        let raw = match self.header_name() {
            Some(name) => ctx.header(name),
            None => ctx.remote_addr.map(|ip| ip.to_string()),
        };
        let Some(raw) = raw else {
            return String::new();
        };
        match self {
            FingerprintHeader::UserAgent => normalize_user_agent(&raw),
            h if h.carries_ip() => check_ip(&raw).unwrap_or_default(),
            _ => raw.trim().to_string(),
        }
    }
}

/// First plausible IP address in a forwarding header value.
///
/// Accepts comma-separated lists, `for=` parameters, quoted values,
/// bracketed IPv6 and `ip:port`. Unspecified addresses are rejected.
pub fn check_ip(value: &str) -> Option<String> {
    value.split(',').find_map(|entry| {
        let token = entry
            .split(';')
            .map(str::trim)
            .find_map(|part| {
                part.get(..4)
                    .filter(|p| p.eq_ignore_ascii_case("for="))
                    .map(|_| &part[4..])
            })
            .unwrap_or(entry);
        parse_ip_token(token)
            .filter(|ip| !ip.is_unspecified())
            .map(|ip| ip.to_string())
    })
}

fn parse_ip_token(token: &str) -> Option<std::net::IpAddr> {
    let token = token.trim().trim_matches('"');
    if let Some(rest) = token.strip_prefix('[') {
        let end = rest.find(']')?;
        return rest[..end].parse().ok();
    }
    if let Ok(ip) = token.parse() {
        return Some(ip);
    }
    let (host, port) = token.rsplit_once(':')?;
    port.parse::<u16>().ok()?;
    host.parse::<std::net::Ipv4Addr>().ok().map(std::net::IpAddr::V4)
}

/// Reduce a user agent to a stable form.
///
/// A leading quoted section is taken on its own, and every dotted or
/// underscored version number is cut to its major component
/// (`Firefox/118.0.2` becomes `Firefox/118`).
pub fn normalize_user_agent(ua: &str) -> String {
    let ua = ua.trim();
    let ua = match ua.strip_prefix('"') {
        Some(rest) => rest.split('"').next().unwrap_or(rest),
        None => ua,
    };

    let mut out = String::with_capacity(ua.len());
    let mut chars = ua.chars().peekable();
    let mut prev: Option<char> = None;
    // Digits glued to a word (`x86_64`) are not a version.
    let mut in_version = false;
    while let Some(c) = chars.next() {
        let prev_digit = prev.is_some_and(|p| p.is_ascii_digit());
        if (c == '.' || c == '_') && prev_digit && in_version && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            while let Some(skipped) = chars.next_if(|n| n.is_ascii_digit() || *n == '.' || *n == '_') {
                prev = Some(skipped);
            }
            in_version = false;
            continue;
        }
        if c.is_ascii_digit() && !prev_digit {
            in_version = !prev.is_some_and(|p| p.is_ascii_alphanumeric());
        }
        prev = Some(c);
        out.push(c);
    }
    out
}

/// Records and checks client fingerprints.
#[derive(Debug, Clone)]
pub struct SessionFixationGuard {
    settings: SessionConfig,
}

impl SessionFixationGuard {
    pub fn new(settings: SessionConfig) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    /// Store the current fingerprint in the session. Called after a
    /// successful login.
    pub fn set_session_fixation(&self, session: &Session, ctx: &RequestContext) {
        for header in FingerprintHeader::ALL {
            session.set(&header.session_key(), header.live_value(ctx));
        }
        session.set(RECORDED_KEY, "1");
        debug!(session = %session.id(), "Session fingerprint recorded");
    }

    pub fn is_recorded(&self, session: &Session) -> bool {
        session.get(RECORDED_KEY).is_some()
    }

    /// Compare the live request to the recorded fingerprint.
    ///
    /// Stops at the first differing attribute, purges the session and
    /// returns the violation. Plain HTTP requests and sessions without a
    /// recorded fingerprint pass.
    pub fn handle_session_fixation(
        &self,
        session: &Session,
        ctx: &RequestContext,
    ) -> Result<(), SecurityViolation> {
        if !ctx.is_https || !self.is_recorded(session) {
            return Ok(());
        }

        for header in FingerprintHeader::ALL {
            let expected = session.get(&header.session_key()).unwrap_or_default();
            let actual = header.live_value(ctx);
            if expected != actual {
                warn!(
                    session = %session.id(),
                    header = header.variable(),
                    expected = %expected,
                    actual = %actual,
                    url = %ctx.url,
                    "Session fixation detected, purging session"
                );
                metrics::record_security_violation("session_fixation");
                let expired_cookies = self.purge(session);
                return Err(SecurityViolation::SessionFixation {
                    header: header.variable(),
                    expected,
                    actual,
                    expired_cookies,
                });
            }
        }
        Ok(())
    }

    /// Remove every session value and return the cookies to expire.
    ///
    /// SSO cookies are kept when `preserve_sso_cookies` is set.
    pub fn purge(&self, session: &Session) -> Vec<String> {
        for key in session.keys() {
            session.remove(&key);
        }
        session.clear();

        let mut cookies = vec![self.settings.cookie_name.clone()];
        cookies.extend(self.settings.purge_cookies.iter().cloned());
        cookies.dedup();
        cookies.retain(|name| {
            !(self.settings.preserve_sso_cookies && name.starts_with(&self.settings.sso_cookie_prefix))
        });
        cookies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::session::{MemorySessionStore, SessionStore};
    use axum::http::Method;
    use std::sync::Arc;

    const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:118.0) Gecko/20100101 Firefox/118.0.2";

    fn session() -> Session {
        let store = Arc::new(MemorySessionStore::new());
        let id = store.create();
        Session::new(id, store as Arc<dyn SessionStore>)
    }

    fn guard() -> SessionFixationGuard {
        SessionFixationGuard::new(SessionConfig {
            purge_cookies: vec!["remember_me".into(), "sso_ticket".into()],
            ..SessionConfig::default()
        })
    }

    fn request(ua: &str) -> RequestContext {
        RequestContext::new(Method::GET, "/api/session")
            .with_https(true)
            .with_header("User-Agent", ua)
            .with_header("X-Forwarded-For", "203.0.113.5, 10.0.0.1")
            .with_remote_addr("10.0.0.1".parse().unwrap())
    }

    #[test]
    fn check_ip_handles_forwarding_syntaxes() {
        assert_eq!(check_ip("203.0.113.5"), Some("203.0.113.5".into()));
        assert_eq!(check_ip("unknown, 198.51.100.7"), Some("198.51.100.7".into()));
        assert_eq!(check_ip("for=192.0.2.60;proto=https;by=203.0.113.43"), Some("192.0.2.60".into()));
        assert_eq!(check_ip("proto=http;For=\"[2001:db8::1]:4711\""), Some("2001:db8::1".into()));
        assert_eq!(check_ip("192.0.2.1:8080"), Some("192.0.2.1".into()));
        assert_eq!(check_ip("0.0.0.0"), None);
        assert_eq!(check_ip("not an address"), None);
    }

    #[test]
    fn user_agent_versions_are_cut_to_major() {
        assert_eq!(
            normalize_user_agent(FIREFOX),
            "Mozilla/5 (X11; Linux x86_64; rv:118) Gecko/20100101 Firefox/118"
        );
        assert_eq!(normalize_user_agent("\"Agent/2.1\" trailing"), "Agent/2");
        assert_eq!(normalize_user_agent("Mac OS X 10_15_7"), "Mac OS X 10");
        assert_eq!(
            normalize_user_agent(FIREFOX),
            normalize_user_agent(&FIREFOX.replace("118.0.2", "118.0.3"))
        );
    }

    #[test]
    fn unchanged_fingerprint_passes() {
        let guard = guard();
        let session = session();
        guard.set_session_fixation(&session, &request(FIREFOX));
        assert_eq!(
            session.get("fixation.HTTP_X_FORWARDED_FOR").as_deref(),
            Some("203.0.113.5")
        );
        assert_eq!(session.get("fixation.HTTP_CLIENT_IP").as_deref(), Some(""));
        assert!(guard.handle_session_fixation(&session, &request(FIREFOX)).is_ok());
    }

    #[test]
    fn changed_user_agent_purges_session() {
        let guard = guard();
        let session = session();
        session.set("user", "alice");
        guard.set_session_fixation(&session, &request(FIREFOX));

        let other = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0";
        match guard.handle_session_fixation(&session, &request(other)) {
            Err(SecurityViolation::SessionFixation { header, expired_cookies, .. }) => {
                assert_eq!(header, "HTTP_USER_AGENT");
                assert_eq!(expired_cookies, vec!["docstore_session".to_string(), "remember_me".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(session.keys().is_empty());
    }

    #[test]
    fn first_mismatch_is_reported() {
        let guard = guard();
        let session = session();
        guard.set_session_fixation(&session, &request(FIREFOX));

        let moved = request("Other/1.0").with_header("Client-IP", "198.51.100.9");
        match guard.handle_session_fixation(&session, &moved) {
            Err(SecurityViolation::SessionFixation { header, actual, .. }) => {
                assert_eq!(header, "HTTP_CLIENT_IP");
                assert_eq!(actual, "198.51.100.9");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn plain_http_is_not_checked() {
        let guard = guard();
        let session = session();
        guard.set_session_fixation(&session, &request(FIREFOX));
        let plain = request("Other/1.0").with_https(false);
        assert!(guard.handle_session_fixation(&session, &plain).is_ok());
        assert!(guard.is_recorded(&session));
    }

    #[test]
    fn sso_cookies_survive_purge_unless_disabled() {
        let session = session();
        let mut guard = guard();
        assert!(!guard.purge(&session).contains(&"sso_ticket".to_string()));

        guard.settings.preserve_sso_cookies = false;
        assert!(guard.purge(&session).contains(&"sso_ticket".to_string()));
    }
}
