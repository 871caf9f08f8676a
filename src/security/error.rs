use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::security::csrf::CsrfFailure;

/// A request rejected by one of the guards.
#[derive(Debug, Clone, Error)]
pub enum SecurityViolation {
    #[error("session fixation: {header} changed from `{expected}` to `{actual}`")]
    SessionFixation {
        header: &'static str,
        expected: String,
        actual: String,
        /// Cookies the client must drop.
        expired_cookies: Vec<String>,
    },

    #[error("CSRF check failed for {url}: {reason}")]
    Csrf { reason: CsrfFailure, url: String },
}

impl SecurityViolation {
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityViolation::SessionFixation { .. } => "session_fixation",
            SecurityViolation::Csrf { .. } => "csrf",
        }
    }
}

pub fn expire_cookie(name: &str) -> String {
    format!("{name}=; Max-Age=0; Path=/; HttpOnly")
}

impl IntoResponse for SecurityViolation {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::FORBIDDEN, "Unauthorized").into_response();
        if let SecurityViolation::SessionFixation { expired_cookies, .. } = &self {
            for name in expired_cookies {
                if let Ok(value) = HeaderValue::from_str(&expire_cookie(name)) {
                    response.headers_mut().append(SET_COOKIE, value);
                }
            }
        }
        response
    }
}
