//! Session fixation and CSRF middleware.
//!
//! Both run after [`session_middleware`](super::session::session_middleware)
//! and answer with the guard's violation response instead of calling the
//! handler.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use crate::http::middleware::session::CurrentSession;
use crate::http::server::AppState;
use crate::security::{RequestContext, Session};

fn current_session(req: &Request<Body>) -> Option<Session> {
    req.extensions().get::<CurrentSession>().and_then(|c| c.0.clone())
}

fn not_logged_in() -> Response {
    (StatusCode::UNAUTHORIZED, "Not logged in").into_response()
}

pub async fn session_fixation_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(session) = current_session(&req) else {
        return not_logged_in();
    };
    let Some(ctx) = req.extensions().get::<RequestContext>() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Missing request context").into_response();
    };

    if let Err(violation) = state.fixation.handle_session_fixation(&session, ctx) {
        session.destroy();
        return violation.into_response();
    }
    next.run(req).await
}

pub async fn csrf_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }
    let Some(session) = current_session(&req) else {
        return not_logged_in();
    };

    let (mut parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit = state.max_body_size, "Rejected request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut ctx = parts
        .extensions
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::new(parts.method.clone(), parts.uri.to_string()));
    read_body_fields(&mut ctx, &parts.headers, &bytes);

    if let Err(violation) = state.csrf.validate_token(&session, &ctx) {
        return violation.into_response();
    }
    parts.extensions.insert(ctx);
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Add urlencoded form fields or the JSON body to the context.
fn read_body_fields(ctx: &mut RequestContext, headers: &HeaderMap, body: &[u8]) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/x-www-form-urlencoded") {
        ctx.fields.extend(form_urlencoded::parse(body).into_owned());
    } else if content_type.starts_with("application/json") {
        match serde_json::from_slice(body) {
            Ok(value) => {
                ctx.json_body = Some(value);
                ctx.wants_json = true;
            }
            Err(e) => tracing::debug!(error = %e, "JSON request body did not parse"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn form_and_json_fields_are_read() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));
        let mut ctx = RequestContext::new(Method::POST, "/");
        read_body_fields(&mut ctx, &headers, b"token=abc&x=1");
        assert_eq!(ctx.fields.get("token").map(String::as_str), Some("abc"));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        let mut ctx = RequestContext::new(Method::POST, "/");
        read_body_fields(&mut ctx, &headers, br#"{"token":"abc"}"#);
        assert!(ctx.wants_json);
        assert_eq!(ctx.json_body.unwrap()["token"], "abc");
    }
}
