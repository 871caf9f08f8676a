//! Remote request executor.
//!
//! # Data Flow
//! ```text
//! OutboundRequest
//!     → validate URL, sweep client cache
//!     → resolve method (GET/DELETE: query, POST/PUT: body, other: GET)
//!     → ClientCache::get_or_create
//!     → send (single attempt, client timeout)
//!     → non-2xx: RequestError::Status with verbatim body
//!     → 2xx: read body (streamed through pooled buffers when large)
//!     → ResponseShape (String or XmlDocument)
//! ```
//!
//! # Design Decisions
//! - No retries; callers own retry policy
//! - Timeouts come from the cached client, not a cancellation token
//! - Error bodies are never parsed

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::buffers::{BufferPool, TextAccumulator};
use crate::config::schema::RemoteConfig;
use crate::observability::{metrics, ProfileScope};
use crate::remote::cache::{ClientCache, ClientKey};
use crate::remote::error::{OutboundResult, RequestDebugInfo, RequestError};
use crate::remote::request::{truncate_chars, HttpMethod, OutboundRequest};
use crate::remote::response::ResponseShape;
use crate::xml::XmlDocument;

/// Executes outbound requests through cached clients.
#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    cache: Arc<ClientCache>,
    pool: Arc<BufferPool>,
    settings: RemoteConfig,
}

impl RemoteExecutor {
    pub fn new(settings: RemoteConfig, pool: Arc<BufferPool>) -> Self {
        let cache = Arc::new(ClientCache::new(&settings));
        Self::with_cache(settings, cache, pool)
    }

    /// Share an existing client cache.
    pub fn with_cache(settings: RemoteConfig, cache: Arc<ClientCache>, pool: Arc<BufferPool>) -> Self {
        Self { cache, pool, settings }
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn settings(&self) -> &RemoteConfig {
        &self.settings
    }

    pub async fn execute_text(&self, request: OutboundRequest) -> OutboundResult<String> {
        self.execute(request).await
    }

    pub async fn execute_xml(&self, request: OutboundRequest) -> OutboundResult<XmlDocument> {
        self.execute(request).await
    }

    /// Execute one request and shape a successful body as `T`.
    pub async fn execute<T: ResponseShape>(&self, request: OutboundRequest) -> OutboundResult<T> {
        let scope = ProfileScope::start("remote.execute");
        let started = Instant::now();

        if request.url.trim().is_empty() {
            tracing::error!(method = %request.method, "Outbound request has no URL");
            return Err(RequestError::EmptyUrl);
        }

        self.cache.sweep_expired();

        let method = match &request.method {
            HttpMethod::Other(other) => {
                tracing::warn!(method = %other, url = %request.url, "Unsupported HTTP method, sending as GET");
                HttpMethod::Get
            }
            known => known.clone(),
        };

        let mut url = Url::parse(request.url.trim()).map_err(|e| RequestError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;

        let mut debug_info = RequestDebugInfo {
            url: request.url.clone(),
            method: method.as_str().to_string(),
            request_body: request.body.loggable(self.settings.log_body_limit),
            reason: String::new(),
        };

        let payload = if method.sends_body() {
            Some(request.body.encode())
        } else {
            if let Some(query) = request.body.as_query() {
                let merged = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                    _ => query,
                };
                url.set_query(Some(&merged));
            }
            None
        };

        let timeout = request
            .timeout
            .unwrap_or(Duration::from_millis(self.settings.default_timeout_ms));
        let key = ClientKey::for_url(&url, timeout, request.version)?;
        let handle = self.cache.get_or_create(&key)?;

        tracing::debug!(
            method = %method,
            url = %url,
            handle = handle.id(),
            base = ?handle.base_url().map(Url::as_str),
            "Sending outbound request"
        );

        let reqwest_method = match method {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            _ => reqwest::Method::GET,
        };
        let mut builder = handle
            .client()
            .request(reqwest_method, url.clone())
            .version(request.version.to_reqwest());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = payload {
            if !request.has_header(CONTENT_TYPE.as_str()) {
                if let Some(content_type) = request.body.content_type() {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
            }
            builder = builder.body(payload);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                debug_info.reason = e.to_string();
                if !request.suppress_error_logging {
                    tracing::error!(
                        method = %method,
                        url = %url,
                        timed_out = e.is_timeout(),
                        request_body = %debug_info.request_body,
                        error = %e,
                        "Outbound request failed"
                    );
                }
                metrics::record_outbound_request(method.as_str(), 0, started);
                return Err(RequestError::Transport {
                    timed_out: e.is_timeout(),
                    debug: debug_info,
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default().to_string();
            let body = response.text().await.unwrap_or_default();
            debug_info.reason = reason.clone();
            self.log_status_failure(&request, &debug_info, status.as_u16(), &body);
            metrics::record_outbound_request(method.as_str(), status.as_u16(), started);
            return Err(RequestError::Status {
                status: status.as_u16(),
                reason,
                body,
                debug: debug_info,
            });
        }

        let body = match self.read_body(response).await {
            Ok(body) => body,
            Err(e) => {
                debug_info.reason = e.to_string();
                if !request.suppress_error_logging {
                    tracing::error!(method = %method, url = %url, error = %e, "Failed reading response body");
                }
                metrics::record_outbound_request(method.as_str(), 0, started);
                return Err(RequestError::Transport {
                    timed_out: e.is_timeout(),
                    debug: debug_info,
                });
            }
        };

        let body_len = body.len();
        let shaped = T::from_body(body);
        if body_len > self.settings.trim_threshold_bytes {
            let freed = self.pool.trim();
            metrics::record_pool_trim();
            tracing::debug!(body_len, freed, "Large response released, buffer pool trimmed");
        }

        metrics::record_outbound_request(method.as_str(), status.as_u16(), started);
        let elapsed = scope.stop();
        tracing::debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            body_len,
            elapsed_ms = elapsed.as_millis() as u64,
            "Outbound request completed"
        );
        Ok(shaped)
    }

    /// Read a successful body. Large or unsized bodies go through a pooled
    /// text accumulator in `stream_chunk_size` pieces.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<String, reqwest::Error> {
        let length = response
            .content_length()
            .map(|len| usize::try_from(len).unwrap_or(usize::MAX));
        let small = matches!(length, Some(len) if len <= self.settings.large_body_threshold);
        if small {
            return response.text().await;
        }

        let mut text = TextAccumulator::new(&self.pool, length);
        let chunk_size = self.settings.stream_chunk_size.max(1);
        while let Some(chunk) = response.chunk().await? {
            for piece in chunk.chunks(chunk_size) {
                text.push(piece);
            }
        }
        Ok(text.finish())
    }

    fn log_status_failure(&self, request: &OutboundRequest, debug_info: &RequestDebugInfo, status: u16, body: &str) {
        if self.settings.quiet_statuses.contains(&status) {
            tracing::info!(status, url = %debug_info.url, "Remote service returned {} {}", status, debug_info.reason);
            return;
        }
        if request.suppress_error_logging {
            tracing::debug!(status, url = %debug_info.url, "Remote request failed (logging suppressed)");
            return;
        }
        tracing::error!(
            status,
            reason = %debug_info.reason,
            method = %debug_info.method,
            url = %debug_info.url,
            request_body = %debug_info.request_body,
            response_body = %truncate_chars(body, self.settings.log_body_limit),
            "Remote request failed"
        );
    }
}
