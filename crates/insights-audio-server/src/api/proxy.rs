//! Range-aware audio relay.
//!
//! Re-streams a remote audio URL so the site's player can seek against hosts
//! that do not send CORS headers themselves.

use std::time::Instant;

use actix_web::body::SizedStream;
use actix_web::http::header::{self, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::stream::{StreamExt, unfold};
use insights_audio_types::ErrorResponse;

use crate::api::errors::ApiError;
use crate::fetch::{ByteStream, UpstreamResponse};
use crate::range::{byte_window, parse_content_range, parse_single_range, range_len};
use crate::state::AppState;

const PROXY_MARKER: &str = "/proxy/";
const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// How the upstream body maps onto our response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProxyPlan {
    /// 200 with the whole upstream body.
    Full { content_length: Option<u64> },
    /// Upstream already answered 206; relay its window.
    Passthrough { start: u64, end: u64, total: Option<u64> },
    /// Upstream sent everything; cut `start..=end` out locally.
    Window { start: u64, end: u64, total: u64 },
    Unsatisfiable { total: u64 },
}

pub(crate) fn plan_response(
    range: Option<&str>,
    status: u16,
    content_length: Option<u64>,
    content_range: Option<&str>,
) -> ProxyPlan {
    let Some(range) = range else {
        return ProxyPlan::Full { content_length };
    };
    if status == StatusCode::PARTIAL_CONTENT.as_u16() {
        if let Some((start, end, total)) = content_range.and_then(parse_content_range) {
            return ProxyPlan::Passthrough { start, end, total };
        }
        return ProxyPlan::Full { content_length };
    }
    match content_length {
        Some(total) => match parse_single_range(range, total) {
            Some((start, end)) => ProxyPlan::Window { start, end, total },
            None => ProxyPlan::Unsatisfiable { total },
        },
        // Without a total we cannot build a Content-Range; send everything.
        None => ProxyPlan::Full { content_length: None },
    }
}

/// Upstream URL from the raw request target, query string included.
///
/// A fully percent-encoded URL (`https%3A%2F%2F...`) is decoded once.
pub(crate) fn upstream_url_from_request(req: &HttpRequest) -> Option<String> {
    let (_, path_tail) = req.uri().path().split_once(PROXY_MARKER)?;
    let path_tail = path_tail.trim();
    if path_tail.is_empty() {
        return None;
    }
    let tail = match req.uri().query() {
        Some(query) => format!("{path_tail}?{query}"),
        None => path_tail.to_string(),
    };
    let tail = tail.as_str();
    if is_absolute_http(tail) {
        return Some(tail.to_string());
    }
    match urlencoding::decode(tail) {
        Ok(decoded) if is_absolute_http(&decoded) => Some(decoded.into_owned()),
        _ => Some(tail.to_string()),
    }
}

fn is_absolute_http(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Add the open CORS headers every proxy response carries.
pub(crate) fn with_cors(mut resp: HttpResponse) -> HttpResponse {
    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Range"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length, Content-Range, Accept-Ranges"),
    );
    resp
}

struct ReleaseGuard {
    upstream: String,
    sent: u64,
    finished: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                upstream = %self.upstream,
                sent_bytes = self.sent,
                "client went away; releasing upstream"
            );
        }
    }
}

/// Relay `body`, noting when the client drops the response early.
///
/// Dropping the returned stream drops the upstream body and its connection.
fn track_release(body: ByteStream, upstream: String) -> ByteStream {
    let guard = ReleaseGuard {
        upstream,
        sent: 0,
        finished: false,
    };
    unfold((body, guard), |(mut body, mut guard)| async move {
        match body.next().await {
            Some(Ok(chunk)) => {
                guard.sent += chunk.len() as u64;
                Some((Ok(chunk), (body, guard)))
            }
            Some(Err(err)) => {
                guard.finished = true;
                tracing::warn!(upstream = %guard.upstream, error = %err, "upstream stream failed");
                Some((Err(err), (body, guard)))
            }
            None => {
                guard.finished = true;
                None
            }
        }
    })
    .boxed()
}

#[utoipa::path(
    get,
    path = "/v1/audio/proxy/{url}",
    params(
        ("url" = String, Path, description = "Raw upstream audio URL, query string included"),
        ("Range" = Option<String>, Header, description = "Byte range, e.g. bytes=0-99")
    ),
    responses(
        (status = 200, description = "Full audio stream"),
        (status = 206, description = "Partial content"),
        (status = 400, description = "Missing URL", body = ErrorResponse),
        (status = 416, description = "Invalid range"),
        (status = 500, description = "Upstream fetch failed", body = ErrorResponse)
    )
)]
/// Stream a remote audio file with range support and open CORS.
pub async fn proxy_audio(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let Some(upstream_url) = upstream_url_from_request(&req) else {
        return with_cors(ApiError::MissingAudioUrl.into_response());
    };
    let range_header = req
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let started = Instant::now();
    let upstream = match state.fetcher.get_stream(&upstream_url, range_header).await {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(
                upstream = %upstream_url,
                range = range_header.unwrap_or("-"),
                error = %err,
                "proxy upstream fetch failed"
            );
            return with_cors(ApiError::ProxyFailed(err.to_string()).into_response());
        }
    };
    tracing::debug!(
        upstream = %upstream_url,
        status = upstream.status,
        range = range_header.unwrap_or("-"),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proxy upstream connected"
    );

    let plan = plan_response(
        range_header,
        upstream.status,
        upstream.content_length,
        upstream.content_range.as_deref(),
    );
    with_cors(build_response(
        plan,
        upstream,
        upstream_url,
        state.proxy.cache_max_age_secs,
    ))
}

fn build_response(
    plan: ProxyPlan,
    upstream: UpstreamResponse,
    upstream_url: String,
    cache_max_age_secs: u64,
) -> HttpResponse {
    let UpstreamResponse {
        content_type, body, ..
    } = upstream;

    let (status, content_range, len, body) = match plan {
        ProxyPlan::Unsatisfiable { total } => {
            return HttpResponse::RangeNotSatisfiable()
                .insert_header((header::ACCEPT_RANGES, "bytes"))
                .insert_header((header::CONTENT_RANGE, format!("bytes */{total}")))
                .finish();
        }
        ProxyPlan::Full { content_length } => (StatusCode::OK, None, content_length, body),
        ProxyPlan::Passthrough { start, end, total } => {
            let total = total.map_or_else(|| "*".to_string(), |t| t.to_string());
            (
                StatusCode::PARTIAL_CONTENT,
                Some(format!("bytes {start}-{end}/{total}")),
                Some(range_len(start, end)),
                body,
            )
        }
        ProxyPlan::Window { start, end, total } => {
            let len = range_len(start, end);
            (
                StatusCode::PARTIAL_CONTENT,
                Some(format!("bytes {start}-{end}/{total}")),
                Some(len),
                byte_window(body, start, len),
            )
        }
    };

    let mut resp = HttpResponse::build(status);
    resp.insert_header((
        header::CONTENT_TYPE,
        content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
    ));
    resp.insert_header((header::ACCEPT_RANGES, "bytes"));
    resp.insert_header((
        header::CACHE_CONTROL,
        format!("public, max-age={cache_max_age_secs}"),
    ));
    if let Some(content_range) = content_range {
        resp.insert_header((header::CONTENT_RANGE, content_range));
    }

    let body = track_release(body, upstream_url);
    match len {
        Some(len) => resp.body(SizedStream::new(len, body)),
        None => resp.streaming(body),
    }
}

/// CORS preflight for ranged GETs from the player.
pub async fn proxy_preflight() -> HttpResponse {
    with_cors(
        HttpResponse::NoContent()
            .insert_header((header::ACCESS_CONTROL_MAX_AGE, "86400"))
            .finish(),
    )
}
