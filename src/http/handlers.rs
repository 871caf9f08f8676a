//! Route handlers.

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use url::form_urlencoded;

use crate::http::middleware::session::{session_cookie, CurrentSession};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::error::expire_cookie;
use crate::security::{RequestContext, Session};
use crate::soap::SoapError;
use crate::xml::envelope::SUCCESS_MESSAGE;
use crate::xml::{envelope, XmlDocument};

const SESSION_USER_KEY: &str = "auth.user";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Credentials from a JSON or urlencoded body.
fn parse_login(headers: &HeaderMap, body: &[u8]) -> Option<LoginRequest> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return serde_json::from_slice(body).ok();
    }

    let mut username = None;
    let mut password = None;
    for (key, value) in form_urlencoded::parse(body) {
        match key.as_ref() {
            "username" => username = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(LoginRequest {
        username: username?,
        password: password?,
    })
}

pub async fn login(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(CurrentSession(previous)): Extension<CurrentSession>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(form) = parse_login(&headers, &body) else {
        return (StatusCode::BAD_REQUEST, "Missing username or password").into_response();
    };

    let verified = state.credentials.load().verify(&form.username, &form.password);
    if !verified {
        tracing::info!(username = %form.username, client_ip = %ctx.client_ip(), "Login failed");
        let captcha_required = state.throttle.record_and_throttle(&form.username).await;
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials", "captcha_required": captcha_required })),
        )
            .into_response();
    }

    state.throttle.reset(&form.username);
    // A fresh id on every login; an id known before authentication is never promoted.
    if let Some(previous) = previous {
        previous.destroy();
    }
    let session = Session::new(state.sessions.create(), state.sessions.clone());
    session.set(SESSION_USER_KEY, form.username.clone());
    state.fixation.set_session_fixation(&session, &ctx);
    let token = state.csrf.issue_token(&session, &ctx);

    tracing::info!(username = %form.username, session = %session.id(), "Login succeeded");
    let mut response = Json(json!({ "token": token })).into_response();
    let cookie = session_cookie(&state.session_config.cookie_name, session.id(), ctx.is_https);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let Some(session) = session else {
        return response;
    };

    let cookies = state.fixation.purge(&session);
    session.destroy();
    tracing::info!(session = %session.id(), "Logged out");
    for name in cookies {
        if let Ok(value) = HeaderValue::from_str(&expire_cookie(&name)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// CSRF token of the current session.
pub async fn session_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Response {
    let Some(session) = session else {
        return (StatusCode::UNAUTHORIZED, "Not logged in").into_response();
    };
    let token = state.csrf.issue_token(&session, &ctx);
    Json(json!({
        "token": token,
        "user": session.get(SESSION_USER_KEY),
    }))
    .into_response()
}

fn xml_response(status: StatusCode, doc: XmlDocument) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        doc.to_string(),
    )
        .into_response()
}

/// A forged or tampered webservice response is refused like any other
/// security violation.
fn soap_error_status(error: &SoapError) -> StatusCode {
    match error {
        SoapError::UnknownService(_) => StatusCode::NOT_FOUND,
        SoapError::Payload(_) => StatusCode::BAD_REQUEST,
        SoapError::SignatureMismatch(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Forward the XML body to a configured webservice.
pub async fn call_webservice(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> Response {
    let Ok(payload) = std::str::from_utf8(&body) else {
        return xml_response(
            StatusCode::BAD_REQUEST,
            envelope("Payload is not valid UTF-8", None, None),
        );
    };

    match state.soap.call_str(&id, payload).await {
        Ok(element) => xml_response(StatusCode::OK, envelope(SUCCESS_MESSAGE, None, Some(element))),
        Err(e) => {
            let status = soap_error_status(&e);
            if status == StatusCode::FORBIDDEN {
                metrics::record_security_violation("soap_signature");
            }
            tracing::warn!(service = %id, error = %e, "Webservice call failed");
            xml_response(status, e.to_envelope(state.include_debug))
        }
    }
}
