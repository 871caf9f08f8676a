//! Login, session fixation and CSRF through the HTTP server.

use std::net::SocketAddr;

use reqwest::header::{COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::StatusCode;
use serde_json::{json, Value};

use docstore_gateway::config::schema::{UserConfig, WebserviceConfig};
use docstore_gateway::lifecycle::Shutdown;
use docstore_gateway::security::credentials::hash_password;
use docstore_gateway::soap::SoapVersion;
use docstore_gateway::{GatewayConfig, HttpServer};

mod common;
use common::{MockResponse, start_fixed_backend};

const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:118.0) Gecko/20100101 Firefox/118.0";
const FIREFOX_UPDATED: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:118.0) Gecko/20100101 Firefox/118.0.1";
const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0";

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn config(backend: Option<SocketAddr>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.session.trust_forwarded_proto = true;
    config.auth.users.push(UserConfig {
        username: "alice".into(),
        password_sha256: hash_password("wonderland"),
    });
    if let Some(backend) = backend {
        config.webservices.push(WebserviceConfig {
            id: "docs".into(),
            url: format!("http://{backend}/soap"),
            soap_version: SoapVersion::V12,
            namespace_prefix: None,
            namespace_uri: None,
            soap_action: None,
            timeout_ms: Some(5_000),
            http_version: 1,
            security: None,
        });
    }
    config
}

/// Start the gateway on `port`. Keep the returned coordinator alive.
async fn start_gateway(port: u16, config: GatewayConfig) -> (String, Shutdown) {
    let listener = tokio::net::TcpListener::bind(addr(port)).await.unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    (format!("http://127.0.0.1:{port}"), shutdown)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Log in over forwarded HTTPS and return (session cookie, CSRF token).
async fn login(base: &str, user_agent: &str) -> (String, String) {
    let response = client()
        .post(format!("{base}/auth/login"))
        .header(USER_AGENT, user_agent)
        .header("X-Forwarded-Proto", "https")
        .json(&json!({ "username": "alice", "password": "wonderland" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("docstore_session="))
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();
    let body: Value = response.json().await.unwrap();
    (cookie, body["token"].as_str().unwrap().to_string())
}

async fn session_status(base: &str, cookie: &str, user_agent: &str) -> reqwest::Response {
    client()
        .get(format!("{base}/api/session"))
        .header(COOKIE, cookie)
        .header(USER_AGENT, user_agent)
        .header("X-Forwarded-Proto", "https")
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn login_issues_session_and_token() {
    let (base, _shutdown) = start_gateway(28341, config(None)).await;
    let (cookie, token) = login(&base, FIREFOX).await;
    assert_eq!(token.len(), 40);

    let response = session_status(&base, &cookie, FIREFOX).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token"], token.as_str());
    assert_eq!(body["user"], "alice");

    // A browser update keeps the major version and the session.
    let response = session_status(&base, &cookie, FIREFOX_UPDATED).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn changed_user_agent_kills_the_session() {
    let (base, _shutdown) = start_gateway(28342, config(None)).await;
    let (cookie, _) = login(&base, FIREFOX).await;

    let response = session_status(&base, &cookie, CHROME).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let expired: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    assert!(expired.contains(&"docstore_session=; Max-Age=0; Path=/; HttpOnly".to_string()));
    assert_eq!(response.text().await.unwrap(), "Unauthorized");

    // The original client is locked out as well.
    let response = session_status(&base, &cookie, FIREFOX).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (base, _shutdown) = start_gateway(28343, config(None)).await;

    for _ in 0..2 {
        let response = client()
            .post(format!("{base}/auth/login"))
            .form(&[("username", "alice"), ("password", "guess")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["captcha_required"], false);
    }
}

#[tokio::test]
async fn webservice_route_requires_csrf_token() {
    let backend = addr(28345);
    start_fixed_backend(
        backend,
        MockResponse::new(
            200,
            "<Envelope><Body><DocResponse><title>Report</title></DocResponse></Body></Envelope>",
        ),
    )
    .await;
    let (base, _shutdown) = start_gateway(28344, config(Some(backend))).await;
    let (cookie, token) = login(&base, FIREFOX).await;

    let call = |query: &str| {
        client()
            .post(format!("{base}/api/webservices/docs{query}"))
            .header(COOKIE, cookie.clone())
            .header(USER_AGENT, FIREFOX)
            .header("X-Forwarded-Proto", "https")
            .header("Content-Type", "application/xml")
            .body("<GetDoc><id>1</id></GetDoc>")
            .send()
    };

    let response = call("").await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = call("?token=wrong").await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = call(&format!("?token={token}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("<title>Report</title>"), "{body}");
    assert!(body.contains("Successfully retrieved data"));
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (base, _shutdown) = start_gateway(28346, config(None)).await;
    let (cookie, _) = login(&base, FIREFOX).await;

    let response = client()
        .post(format!("{base}/auth/logout"))
        .header(COOKIE, cookie.as_str())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = session_status(&base, &cookie, FIREFOX).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
