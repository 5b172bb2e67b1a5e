//! In-memory upstreams for handler and resolver tests.

use std::collections::HashMap;
use std::sync::Mutex;

use actix_web::web::Bytes;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::fetch::{FetchError, Fetcher, HeadInfo, UpstreamResponse};
use crate::range::{parse_single_range, range_len};

struct FakeStream {
    body: Vec<u8>,
    content_type: Option<String>,
    honor_range: bool,
    advertise_length: bool,
}

/// Serves canned pages, HEAD answers and byte streams. Unknown URLs fail
/// like an unresolvable host.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    pages: HashMap<String, String>,
    heads: HashMap<String, Option<String>>,
    streams: HashMap<String, FakeStream>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub(crate) fn with_head(mut self, url: &str, content_type: Option<&str>) -> Self {
        self.heads
            .insert(url.to_string(), content_type.map(str::to_string));
        self
    }

    /// Upstream that ignores `Range` and always answers 200 with the full body.
    pub(crate) fn with_stream(mut self, url: &str, body: Vec<u8>, content_type: Option<&str>) -> Self {
        self.streams.insert(
            url.to_string(),
            FakeStream {
                body,
                content_type: content_type.map(str::to_string),
                honor_range: false,
                advertise_length: true,
            },
        );
        self
    }

    /// Upstream that answers range requests itself with 206.
    pub(crate) fn with_ranged_stream(mut self, url: &str, body: Vec<u8>) -> Self {
        self.streams.insert(
            url.to_string(),
            FakeStream {
                body,
                content_type: Some("audio/ogg".to_string()),
                honor_range: true,
                advertise_length: true,
            },
        );
        self
    }

    /// Upstream without a `Content-Length` header.
    pub(crate) fn with_unsized_stream(mut self, url: &str, body: Vec<u8>) -> Self {
        self.streams.insert(
            url.to_string(),
            FakeStream {
                body,
                content_type: None,
                honor_range: false,
                advertise_length: false,
            },
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn unreachable(url: &str) -> FetchError {
        FetchError::Transport {
            url: url.to_string(),
            message: "dns error: failed to lookup address information".to_string(),
        }
    }
}

fn chunked(body: &[u8]) -> crate::fetch::ByteStream {
    let chunks: Vec<Result<Bytes, FetchError>> = body
        .chunks(16)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks).boxed()
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn head(&self, url: &str) -> Result<HeadInfo, FetchError> {
        self.record(format!("HEAD {url}"));
        let content_type = self.heads.get(url).ok_or_else(|| Self::unreachable(url))?;
        Ok(HeadInfo {
            content_type: content_type.clone(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.record(format!("GET {url}"));
        self.pages.get(url).cloned().ok_or_else(|| Self::unreachable(url))
    }

    async fn get_stream(&self, url: &str, range: Option<&str>) -> Result<UpstreamResponse, FetchError> {
        self.record(format!("STREAM {url} range={}", range.unwrap_or("-")));
        let upstream = self.streams.get(url).ok_or_else(|| Self::unreachable(url))?;
        let total = upstream.body.len() as u64;
        if upstream.honor_range {
            if let Some((start, end)) = range.and_then(|r| parse_single_range(r, total)) {
                let slice = &upstream.body[start as usize..=end as usize];
                return Ok(UpstreamResponse {
                    status: 206,
                    content_type: upstream.content_type.clone(),
                    content_length: Some(range_len(start, end)),
                    content_range: Some(format!("bytes {start}-{end}/{total}")),
                    body: chunked(slice),
                });
            }
        }
        Ok(UpstreamResponse {
            status: 200,
            content_type: upstream.content_type.clone(),
            content_length: upstream.advertise_length.then_some(total),
            content_range: None,
            body: chunked(&upstream.body),
        })
    }
}
