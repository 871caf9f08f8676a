//! Document store gateway.
//!
//! Outbound HTTP and SOAP calls to remote webservices over pooled
//! buffers and cached clients, behind an inbound Axum service guarded
//! against session fixation, CSRF and brute-force logins.

pub mod buffers;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod remote;
pub mod security;
pub mod soap;
pub mod xml;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use remote::RemoteExecutor;
pub use soap::SoapClient;
