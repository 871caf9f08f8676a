//! Client connection cache.
//!
//! # Responsibilities
//! - Hand out one reusable `reqwest::Client` per endpoint signature
//! - Refresh last-use time on every hand-out
//! - Evict idle handles with an opportunistic, rate-limited sweep
//!
//! # Design Decisions
//! - Keyed by scheme, host, port, timeout and HTTP major version so a
//!   handle is never shared across hosts
//! - Handles are built outside the map lock; the loser of a creation race
//!   drops its own client and adopts the winner's
//! - No background timer: the executor calls `sweep_expired` before each request
//! - Server certificates are not validated (`danger_accept_invalid_certs`)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use url::Url;

use crate::config::schema::RemoteConfig;
use crate::observability::metrics;
use crate::remote::error::RequestError;
use crate::remote::request::HttpVersion;

/// Global counter for handle IDs.
static HANDLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Signature of the endpoint a handle serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub http_major: u8,
}

impl ClientKey {
    pub fn for_url(url: &Url, timeout: Duration, version: HttpVersion) -> Result<Self, RequestError> {
        let invalid = |reason: &str| RequestError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("unknown port for scheme"))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port,
            timeout_ms: timeout.as_millis() as u64,
            http_major: version.major(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn version(&self) -> HttpVersion {
        HttpVersion::from_major(self.http_major)
    }

    fn base_url(&self) -> Option<Url> {
        Url::parse(&format!("{}://{}:{}/", self.scheme, self.host, self.port)).ok()
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}:{} ({}ms, HTTP/{})",
            self.scheme, self.host, self.port, self.timeout_ms, self.http_major
        )
    }
}

/// A cached client with its usage timestamps.
#[derive(Debug)]
pub struct ClientHandle {
    id: u64,
    client: reqwest::Client,
    /// Fixed base address of HTTP/2 handles.
    base_url: Option<Url>,
    created_at: Instant,
    last_used: Mutex<Instant>,
}

impl ClientHandle {
    fn build(key: &ClientKey, settings: &RemoteConfig, now: Instant) -> Result<Self, RequestError> {
        let mut builder = reqwest::Client::builder()
            .timeout(key.timeout())
            .pool_idle_timeout(Duration::from_secs(settings.pool_idle_timeout_secs))
            .tcp_keepalive(TCP_KEEPALIVE)
            .gzip(true)
            .danger_accept_invalid_certs(true)
            .user_agent(settings.user_agent.as_str());

        let base_url = match key.version() {
            HttpVersion::Http2 => {
                builder = builder.http2_prior_knowledge();
                key.base_url()
            }
            HttpVersion::Http11 => {
                builder = builder.http1_only();
                None
            }
        };

        let client = builder
            .build()
            .map_err(|e| RequestError::Client(e.to_string()))?;

        Ok(Self {
            id: HANDLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            client,
            base_url,
            created_at: now,
            last_used: Mutex::new(now),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().expect("client handle mutex poisoned")
    }

    fn touch(&self, now: Instant) {
        let mut last = self.last_used.lock().expect("client handle mutex poisoned");
        if now > *last {
            *last = now;
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used())
    }
}

/// Concurrent cache of client handles.
#[derive(Debug)]
pub struct ClientCache {
    entries: DashMap<ClientKey, Arc<ClientHandle>>,
    last_sweep: Mutex<Instant>,
    idle_expiry: Duration,
    sweep_interval: Duration,
    settings: RemoteConfig,
}

impl ClientCache {
    pub fn new(settings: &RemoteConfig) -> Self {
        Self {
            entries: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
            idle_expiry: Duration::from_secs(settings.idle_expiry_secs),
            sweep_interval: Duration::from_secs(settings.sweep_interval_secs),
            settings: settings.clone(),
        }
    }

    /// Reusable handle for `key`, created on first use.
    pub fn get_or_create(&self, key: &ClientKey) -> Result<Arc<ClientHandle>, RequestError> {
        self.get_or_create_at(key, Instant::now())
    }

    pub fn get_or_create_at(&self, key: &ClientKey, now: Instant) -> Result<Arc<ClientHandle>, RequestError> {
        if let Some(handle) = self.entries.get(key) {
            handle.touch(now);
            return Ok(Arc::clone(handle.value()));
        }

        let fresh = Arc::new(ClientHandle::build(key, &self.settings, now)?);
        let handle = match self.entries.entry(key.clone()) {
            Entry::Occupied(existing) => {
                tracing::debug!(key = %key, discarded = fresh.id, "Lost client creation race, reusing existing handle");
                existing.get().touch(now);
                Arc::clone(existing.get())
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&fresh));
                tracing::debug!(key = %key, handle = fresh.id, "Created outbound client");
                fresh
            }
        };
        metrics::record_client_cache_size(self.entries.len());
        Ok(handle)
    }

    /// Evict idle handles, at most once per sweep interval.
    ///
    /// Returns the number of handles removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        {
            let mut last = self.last_sweep.lock().expect("client cache mutex poisoned");
            if now.saturating_duration_since(*last) < self.sweep_interval {
                return 0;
            }
            *last = now;
        }

        let mut removed = 0;
        self.entries.retain(|_, handle| {
            let keep = handle.idle_for(now) < self.idle_expiry;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            tracing::info!(removed, remaining = self.entries.len(), "Evicted idle outbound clients");
            metrics::record_client_cache_evictions(removed);
        }
        metrics::record_client_cache_size(self.entries.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
