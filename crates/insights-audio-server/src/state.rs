//! Shared application state.
//!
//! Immutable per-process wiring: the outbound HTTP client and settings.
//! Requests share nothing mutable through it.

use std::sync::Arc;

use crate::fetch::Fetcher;
use crate::resolver::Resolver;

/// Proxy response settings.
#[derive(Clone, Debug)]
pub struct ProxySettings {
    /// `max-age` for the `Cache-Control` header on proxied audio.
    pub cache_max_age_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            cache_max_age_secs: 3600,
        }
    }
}

pub struct AppState {
    pub resolver: Resolver,
    pub fetcher: Arc<dyn Fetcher>,
    pub proxy: ProxySettings,
}

impl AppState {
    pub fn new(fetcher: Arc<dyn Fetcher>, proxy: ProxySettings) -> Self {
        Self {
            resolver: Resolver::new(fetcher.clone()),
            fetcher,
            proxy,
        }
    }
}
