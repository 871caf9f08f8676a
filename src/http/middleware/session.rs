//! Session resolution.
//!
//! Attaches a [`RequestContext`] and a [`CurrentSession`] to every request.
//! Sessions are only created by the login handler; an unknown cookie
//! resolves to no session.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use url::form_urlencoded;

use crate::http::server::AppState;
use crate::security::{RequestContext, Session, SessionStore};

/// Session bound to the request, if the client presented a live one.
#[derive(Clone, Debug, Default)]
pub struct CurrentSession(pub Option<Session>);

pub async fn session_middleware(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let ctx = request_context(&state, &req);
    let session = cookie_value(req.headers(), &state.session_config.cookie_name)
        .filter(|id| state.sessions.exists(id))
        .map(|id| Session::new(id, state.sessions.clone()));

    if let Some(session) = &session {
        tracing::trace!(session = %session.id(), "Resolved session");
    }
    req.extensions_mut().insert(ctx);
    req.extensions_mut().insert(CurrentSession(session));
    next.run(req).await
}

/// Guard view of the request: headers, peer address, HTTPS flag and
/// query fields. Body fields are added by the CSRF middleware.
pub fn request_context(state: &AppState, req: &Request<Body>) -> RequestContext {
    let headers = req.headers();
    let forwarded_https = state.session_config.trust_forwarded_proto
        && header_str(headers, "x-forwarded-proto").is_some_and(|v| v.trim().eq_ignore_ascii_case("https"));
    let wants_json = header_str(headers, header::ACCEPT.as_str()).is_some_and(|v| v.contains("application/json"))
        || header_str(headers, header::CONTENT_TYPE.as_str()).is_some_and(|v| v.starts_with("application/json"));

    let mut ctx = RequestContext::new(req.method().clone(), req.uri().to_string());
    ctx.headers = headers.clone();
    ctx.remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    ctx.is_https = state.tls_enabled || forwarded_https;
    ctx.wants_json = wants_json;
    if let Some(query) = req.uri().query() {
        ctx.fields.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
    }
    ctx
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Value of the cookie `name` from the `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(name: &str, id: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{name}={id}; Path=/; HttpOnly; SameSite=Lax{secure}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; docstore_session=abc"));
        headers.append(header::COOKIE, HeaderValue::from_static("other=1"));
        assert_eq!(cookie_value(&headers, "docstore_session").as_deref(), Some("abc"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn secure_flag_follows_https() {
        assert!(session_cookie("s", "1", true).ends_with("; Secure"));
        assert_eq!(session_cookie("s", "1", false), "s=1; Path=/; HttpOnly; SameSite=Lax");
    }
}
