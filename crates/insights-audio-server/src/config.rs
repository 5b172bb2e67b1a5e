//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROXY_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 3600;
const DEFAULT_JSON_LIMIT_BYTES: usize = 64 * 1024;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// User-Agent sent on every outbound request.
    pub user_agent: Option<String>,
    /// Timeout for share-page GET and Drive HEAD requests.
    pub resolve_timeout_ms: Option<u64>,
    /// Timeout for the proxied upstream to answer with headers.
    pub proxy_timeout_ms: Option<u64>,
    /// `max-age` advertised on proxied audio.
    pub proxy_cache_max_age_secs: Option<u64>,
    /// Maximum accepted JSON body size.
    pub json_limit_bytes: Option<usize>,
    /// Origins allowed to call the extract route (empty = any).
    pub cors_origins: Option<Vec<String>>,
    /// Per-client request limits on `/v1`.
    pub rate_limit: Option<RateLimitConfig>,
}

/// Rate limit settings from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: Option<bool>,
    pub window_secs: Option<u64>,
    pub max_requests: Option<u32>,
    /// Key clients on `Forwarded`/`X-Forwarded-For` (only behind a trusted proxy).
    pub trust_proxy_headers: Option<bool>,
}

/// Settings for outbound HTTP shared by the resolver and the proxy.
#[derive(Clone, Debug)]
pub struct FetchSettings {
    pub user_agent: String,
    pub resolve_timeout: Duration,
    pub proxy_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            resolve_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
            proxy_timeout: Duration::from_millis(DEFAULT_PROXY_TIMEOUT_MS),
        }
    }
}

/// Resolved rate limit settings; `None` on the config means disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
    /// When false, clients are keyed on the socket peer address.
    pub trust_proxy_headers: bool,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse an optional bind address from config.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    let Some(bind) = cfg.bind.as_deref() else {
        return Ok(None);
    };
    let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
    Ok(Some(addr))
}

/// Build outbound fetch settings, falling back to defaults per field.
pub fn fetch_settings_from_config(cfg: &ServerConfig) -> FetchSettings {
    let defaults = FetchSettings::default();
    FetchSettings {
        user_agent: cfg
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .map(str::to_string)
            .unwrap_or(defaults.user_agent),
        resolve_timeout: cfg
            .resolve_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.resolve_timeout),
        proxy_timeout: cfg
            .proxy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.proxy_timeout),
    }
}

pub fn cache_max_age_from_config(cfg: &ServerConfig) -> u64 {
    cfg.proxy_cache_max_age_secs
        .unwrap_or(DEFAULT_CACHE_MAX_AGE_SECS)
}

pub fn json_limit_from_config(cfg: &ServerConfig) -> usize {
    cfg.json_limit_bytes.unwrap_or(DEFAULT_JSON_LIMIT_BYTES)
}

/// Allowed CORS origins with blanks removed.
pub fn cors_origins_from_config(cfg: &ServerConfig) -> Vec<String> {
    cfg.cors_origins
        .as_ref()
        .map(|origins| {
            origins
                .iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve rate limit settings; enabled unless explicitly turned off.
pub fn rate_limit_from_config(cfg: &ServerConfig) -> Result<Option<RateLimitSettings>> {
    let section = cfg.rate_limit.as_ref();
    if section.and_then(|rl| rl.enabled) == Some(false) {
        return Ok(None);
    }
    let window_secs = section
        .and_then(|rl| rl.window_secs)
        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);
    let max_requests = section
        .and_then(|rl| rl.max_requests)
        .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS);
    if window_secs == 0 {
        return Err(anyhow::anyhow!("rate_limit.window_secs must be greater than 0"));
    }
    if max_requests == 0 {
        return Err(anyhow::anyhow!("rate_limit.max_requests must be greater than 0"));
    }
    Ok(Some(RateLimitSettings {
        window: Duration::from_secs(window_secs),
        max_requests,
        trust_proxy_headers: section
            .and_then(|rl| rl.trust_proxy_headers)
            .unwrap_or(false),
    }))
}
