//! Outbound HTTP used by the resolver and the proxy.
//!
//! Everything goes through the [`Fetcher`] trait so handlers can be exercised
//! against in-memory upstreams.

use std::time::Duration;

use actix_web::web::Bytes;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::Client;
use reqwest::header::{self, HeaderMap};

use crate::config::FetchSettings;

/// Chunked upstream body.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// Headers of interest from a HEAD request.
#[derive(Clone, Debug, Default)]
pub struct HeadInfo {
    pub content_type: Option<String>,
}

/// A 2xx upstream response whose body has not been read yet.
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// HEAD the url; non-2xx responses are errors.
    async fn head(&self, url: &str) -> Result<HeadInfo, FetchError>;
    /// GET the url and read the body as text; non-2xx responses are errors.
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
    /// GET the url without buffering the body, forwarding `range` when present.
    async fn get_stream(&self, url: &str, range: Option<&str>) -> Result<UpstreamResponse, FetchError>;
}

/// [`Fetcher`] backed by a pooled reqwest client.
pub struct ReqwestFetcher {
    client: Client,
    resolve_timeout: Duration,
    proxy_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            resolve_timeout: settings.resolve_timeout,
            proxy_timeout: settings.proxy_timeout,
        })
    }

    fn parse_url(url: &str) -> Result<reqwest::Url, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }

    fn map_error(url: &str, timeout: Duration, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    fn ensure_success(url: &str, status: reqwest::StatusCode) -> Result<(), FetchError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn head(&self, url: &str) -> Result<HeadInfo, FetchError> {
        let parsed = Self::parse_url(url)?;
        let resp = self
            .client
            .head(parsed)
            .timeout(self.resolve_timeout)
            .send()
            .await
            .map_err(|e| Self::map_error(url, self.resolve_timeout, e))?;
        Self::ensure_success(url, resp.status())?;
        Ok(HeadInfo {
            content_type: header_string(resp.headers(), header::CONTENT_TYPE),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Self::parse_url(url)?;
        let resp = self
            .client
            .get(parsed)
            .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .timeout(self.resolve_timeout)
            .send()
            .await
            .map_err(|e| Self::map_error(url, self.resolve_timeout, e))?;
        Self::ensure_success(url, resp.status())?;
        resp.text()
            .await
            .map_err(|e| Self::map_error(url, self.resolve_timeout, e))
    }

    async fn get_stream(&self, url: &str, range: Option<&str>) -> Result<UpstreamResponse, FetchError> {
        let parsed = Self::parse_url(url)?;
        let mut req = self.client.get(parsed);
        if let Some(range) = range {
            req = req.header(header::RANGE, range);
        }
        // Only the response head is bounded; long bodies keep streaming.
        let resp = tokio::time::timeout(self.proxy_timeout, req.send())
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: self.proxy_timeout.as_millis() as u64,
            })?
            .map_err(|e| Self::map_error(url, self.proxy_timeout, e))?;
        Self::ensure_success(url, resp.status())?;

        let status = resp.status().as_u16();
        let content_type = header_string(resp.headers(), header::CONTENT_TYPE);
        let content_length = header_u64(resp.headers(), header::CONTENT_LENGTH);
        let content_range = header_string(resp.headers(), header::CONTENT_RANGE);
        let owned_url = url.to_string();
        let body = resp
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| FetchError::Transport {
                    url: owned_url.clone(),
                    message: e.to_string(),
                })
            })
            .boxed();

        Ok(UpstreamResponse {
            status,
            content_type,
            content_length,
            content_range,
            body,
        })
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn header_u64(headers: &HeaderMap, name: header::HeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}
