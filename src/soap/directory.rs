//! Webservice configuration lookup.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::WebserviceConfig;

/// Source of webservice entries, keyed by identifier.
pub trait WebserviceDirectory: Send + Sync {
    fn lookup(&self, id: &str) -> Option<WebserviceConfig>;
}

/// Directory backed by the loaded configuration. Swappable on reload.
#[derive(Debug)]
pub struct ConfiguredWebservices {
    entries: ArcSwap<HashMap<String, WebserviceConfig>>,
}

impl ConfiguredWebservices {
    pub fn new(services: &[WebserviceConfig]) -> Self {
        Self {
            entries: ArcSwap::from_pointee(Self::index(services)),
        }
    }

    fn index(services: &[WebserviceConfig]) -> HashMap<String, WebserviceConfig> {
        services.iter().map(|s| (s.id.clone(), s.clone())).collect()
    }

    /// Atomically replace every entry.
    pub fn replace(&self, services: &[WebserviceConfig]) {
        self.entries.store(Arc::new(Self::index(services)));
        tracing::info!(count = services.len(), "Webservice directory updated");
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.load().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl WebserviceDirectory for ConfiguredWebservices {
    fn lookup(&self, id: &str) -> Option<WebserviceConfig> {
        self.entries.load().get(id).cloned()
    }
}
