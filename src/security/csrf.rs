//! CSRF token issue and validation.
//!
//! The token is bound to the client address and session id and stored
//! in the session. Mutating requests must echo it back in a form field,
//! the fallback field, or (for JSON requests) a body property.

use axum::http::Method;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::config::schema::CsrfConfig;
use crate::observability::metrics;
use crate::security::context::RequestContext;
use crate::security::error::SecurityViolation;
use crate::security::session::Session;

pub const CSRF_SESSION_KEY: &str = "csrf.token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsrfFailure {
    #[error("Token not found in session")]
    NotInSession,

    #[error("Token not supplied")]
    NotSupplied,

    #[error("Token mismatch")]
    Mismatch,
}

/// Hex SHA-1 of `"{client_ip}-{session_id}"`, lowercased before hashing.
pub fn compute_token(client_ip: &str, session_id: &str) -> String {
    let input = format!("{client_ip}-{session_id}").to_lowercase();
    hex::encode(Sha1::digest(input.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct CsrfGuard {
    settings: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(settings: CsrfConfig) -> Self {
        Self { settings }
    }

    /// Token for this session, created on first use.
    pub fn issue_token(&self, session: &Session, ctx: &RequestContext) -> String {
        if let Some(token) = session.get(CSRF_SESSION_KEY) {
            return token;
        }
        let token = compute_token(&ctx.client_ip(), session.id());
        session.set(CSRF_SESSION_KEY, token.clone());
        token
    }

    pub fn current_token(&self, session: &Session) -> Option<String> {
        session.get(CSRF_SESSION_KEY)
    }

    /// Token sent by the client, if any.
    pub fn supplied_token(&self, ctx: &RequestContext) -> Option<String> {
        let from_fields = [&self.settings.field, &self.settings.fallback_field]
            .into_iter()
            .find_map(|name| ctx.fields.get(name.as_str()).filter(|v| !v.is_empty()).cloned());
        if from_fields.is_some() {
            return from_fields;
        }

        if ctx.wants_json && ctx.method != Method::GET {
            return ctx
                .json_body
                .as_ref()
                .and_then(|body| body.get(&self.settings.json_field))
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }
        None
    }

    pub fn validate_token(&self, session: &Session, ctx: &RequestContext) -> Result<(), SecurityViolation> {
        let outcome = match (self.current_token(session), self.supplied_token(ctx)) {
            (None, _) => Err(CsrfFailure::NotInSession),
            (Some(_), None) => Err(CsrfFailure::NotSupplied),
            (Some(stored), Some(supplied)) => {
                if bool::from(stored.as_bytes().ct_eq(supplied.as_bytes())) {
                    Ok(())
                } else {
                    Err(CsrfFailure::Mismatch)
                }
            }
        };

        outcome.map_err(|reason| {
            warn!(
                session = %session.id(),
                reason = %reason,
                url = %ctx.url,
                client_ip = %ctx.client_ip(),
                "CSRF validation failed"
            );
            metrics::record_security_violation("csrf");
            SecurityViolation::Csrf {
                reason,
                url: ctx.url.clone(),
            }
        })
    }
}
