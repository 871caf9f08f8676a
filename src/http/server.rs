//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, session guards)
//! - Serve plain HTTP or rustls TLS until shutdown is triggered
//! - Apply reloaded configuration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::buffers::BufferPool;
use crate::config::schema::{GatewayConfig, SessionConfig, TlsConfig};
use crate::http::handlers;
use crate::http::middleware::{csrf_middleware, session_fixation_middleware, session_middleware};
use crate::remote::RemoteExecutor;
use crate::security::{CredentialStore, CsrfGuard, LoginThrottle, MemorySessionStore, SessionFixationGuard};
use crate::soap::{ConfiguredWebservices, SoapClient};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<MemorySessionStore>,
    pub fixation: Arc<SessionFixationGuard>,
    pub csrf: Arc<CsrfGuard>,
    pub throttle: Arc<LoginThrottle>,
    pub credentials: Arc<ArcSwap<CredentialStore>>,
    pub webservices: Arc<ConfiguredWebservices>,
    pub soap: SoapClient,
    pub session_config: Arc<SessionConfig>,
    pub max_body_size: usize,
    /// Requests arrive over TLS terminated by this process.
    pub tls_enabled: bool,
    /// Include debug detail in error envelopes.
    pub include_debug: bool,
}

impl AppState {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let pool = Arc::new(BufferPool::new(config.buffers.max_retained));
        let executor = RemoteExecutor::new(config.remote.clone(), pool);
        let webservices = Arc::new(ConfiguredWebservices::new(&config.webservices));

        Self {
            sessions: Arc::new(MemorySessionStore::with_idle_timeout(Duration::from_secs(
                config.session.idle_timeout_secs,
            ))),
            fixation: Arc::new(SessionFixationGuard::new(config.session.clone())),
            csrf: Arc::new(CsrfGuard::new(config.csrf.clone())),
            throttle: Arc::new(LoginThrottle::new(Duration::from_secs(config.throttle.reset_after_secs))),
            credentials: Arc::new(ArcSwap::from_pointee(CredentialStore::from_config(&config.auth))),
            soap: SoapClient::new(executor, webservices.clone()),
            webservices,
            session_config: Arc::new(config.session.clone()),
            max_body_size: config.security.max_body_size,
            tls_enabled: config.listener.tls.is_some(),
            include_debug: cfg!(debug_assertions),
        }
    }
}

/// Inbound HTTP server of the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let state = AppState::from_config(&config);
        let router = Self::build_router(&config, state.clone());
        Self { router, state, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let session_routes = Router::new()
            .route("/api/session", get(handlers::session_token))
            .route_layer(from_fn_with_state(state.clone(), session_fixation_middleware));

        let gateway_routes = Router::new()
            .route("/api/webservices/{id}", post(handlers::call_webservice))
            .route_layer(from_fn_with_state(state.clone(), csrf_middleware))
            .route_layer(from_fn_with_state(state.clone(), session_fixation_middleware));

        Router::new()
            .route("/auth/login", post(handlers::login))
            .route("/auth/logout", post(handlers::logout))
            .merge(session_routes)
            .merge(gateway_routes)
            .layer(from_fn_with_state(state.clone(), session_middleware))
            .layer(DefaultBodyLimit::max(config.security.max_body_size))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Swap in the reloadable parts of a new configuration: webservices
    /// and login accounts. Guard settings need a restart.
    pub fn apply_config(state: &AppState, config: &GatewayConfig) {
        state.webservices.replace(&config.webservices);
        state
            .credentials
            .store(Arc::new(CredentialStore::from_config(&config.auth)));
        tracing::info!(
            webservices = config.webservices.len(),
            users = config.auth.users.len(),
            "Configuration reloaded"
        );
    }

    /// Apply configurations received from the watcher until it goes away.
    pub fn spawn_reload(&self, mut updates: mpsc::UnboundedReceiver<GatewayConfig>) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                Self::apply_config(&state, &config);
            }
        })
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with rustls on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: &TlsConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
        tracing::info!(address = %addr, cert = %tls.cert_path, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let stopper = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(shutdown).await;
            stopper.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Resolves once shutdown is triggered or the coordinator is dropped.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        HttpServer::new(GatewayConfig::default()).router
    }

    #[tokio::test]
    async fn guarded_routes_need_a_session() {
        let response = router()
            .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router()
            .oneshot(
                Request::post("/api/webservices/docs")
                    .header(header::COOKIE, "docstore_session=unknown")
                    .body(Body::from("<a/>"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let response = router()
            .oneshot(Request::post("/auth/login").body(Body::from("username=only")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn reload_swaps_webservices_and_accounts() {
        let server = HttpServer::new(GatewayConfig::default());
        assert!(server.state().webservices.ids().is_empty());

        let mut config = GatewayConfig::default();
        config.webservices.push(crate::config::WebserviceConfig {
            id: "docs".into(),
            url: "http://docs.example/soap".into(),
            soap_version: Default::default(),
            namespace_prefix: None,
            namespace_uri: None,
            soap_action: None,
            timeout_ms: None,
            http_version: 1,
            security: None,
        });
        config.auth.users.push(crate::config::schema::UserConfig {
            username: "alice".into(),
            password_sha256: crate::security::credentials::hash_password("pw"),
        });
        HttpServer::apply_config(server.state(), &config);

        assert_eq!(server.state().webservices.ids(), vec!["docs".to_string()]);
        assert!(server.state().credentials.load().verify("alice", "pw"));
    }
}
