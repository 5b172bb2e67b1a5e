//! Fixed-window, per-client request limiting for the `/v1` API.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_web::http::Method;
use actix_web::{Error, HttpResponse};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use insights_audio_types::ErrorResponse;

use crate::config::RateLimitSettings;

const LIMITED_PREFIX: &str = "/v1/";
/// Expired windows are swept once the table grows past this.
const SWEEP_THRESHOLD: usize = 10_000;

const RATELIMIT_LIMIT: &str = "ratelimit-limit";
const RATELIMIT_REMAINING: &str = "ratelimit-remaining";
const RATELIMIT_RESET: &str = "ratelimit-reset";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decision {
    Allowed { remaining: u32, reset: Duration },
    Limited { reset: Duration },
}

struct ClientWindow {
    started: Instant,
    count: u32,
}

pub(crate) struct RateLimiter {
    settings: RateLimitSettings,
    clients: Mutex<HashMap<String, ClientWindow>>,
}

impl RateLimiter {
    pub(crate) fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn check(&self, client: &str) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Decision {
        let window = self.settings.window;
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if clients.len() > SWEEP_THRESHOLD {
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }
        let entry = clients.entry(client.to_string()).or_insert(ClientWindow {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }
        let reset = window.saturating_sub(now.duration_since(entry.started));
        if entry.count >= self.settings.max_requests {
            return Decision::Limited { reset };
        }
        entry.count += 1;
        Decision::Allowed {
            remaining: self.settings.max_requests - entry.count,
            reset,
        }
    }

    fn limit(&self) -> u32 {
        self.settings.max_requests
    }

    /// Client key: the socket peer IP, or the forwarded client IP when proxy
    /// headers are trusted.
    fn client_key(&self, req: &ServiceRequest) -> String {
        if self.settings.trust_proxy_headers {
            if let Some(ip) = req.connection_info().realip_remote_addr() {
                return ip.to_string();
            }
        }
        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Seconds until reset, rounded up so clients never retry early.
fn reset_secs(reset: Duration) -> u64 {
    reset.as_secs() + u64::from(reset.subsec_nanos() > 0)
}

fn should_limit(method: &Method, path: &str) -> bool {
    method != Method::OPTIONS && path.starts_with(LIMITED_PREFIX)
}

/// Actix middleware; `None` disables limiting.
pub(crate) struct RateLimit {
    limiter: Option<Arc<RateLimiter>>,
}

impl RateLimit {
    pub(crate) fn new(limiter: Option<Arc<RateLimiter>>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        })
    }
}

pub(crate) struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Option<Arc<RateLimiter>>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let limiter = match self.limiter.as_ref() {
            Some(limiter) if should_limit(req.method(), req.path()) => limiter.clone(),
            _ => {
                let fut = self.service.call(req);
                return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
            }
        };

        let client = limiter.client_key(&req);
        let limit = limiter.limit();
        match limiter.check(&client) {
            Decision::Limited { reset } => {
                let secs = reset_secs(reset);
                tracing::warn!(client = %client, path = %req.path(), "rate limit exceeded");
                let resp = HttpResponse::TooManyRequests()
                    .insert_header((header::RETRY_AFTER, secs.to_string()))
                    .insert_header((RATELIMIT_LIMIT, limit.to_string()))
                    .insert_header((RATELIMIT_REMAINING, "0"))
                    .insert_header((RATELIMIT_RESET, secs.to_string()))
                    .json(ErrorResponse::new(
                        "Too many requests, please try again later.",
                    ));
                Box::pin(async move { Ok(req.into_response(resp).map_into_right_body()) })
            }
            Decision::Allowed { remaining, reset } => {
                let fut = self.service.call(req);
                Box::pin(async move {
                    let mut res = fut.await?;
                    let headers = res.headers_mut();
                    headers.insert(HeaderName::from_static(RATELIMIT_LIMIT), HeaderValue::from(limit));
                    headers.insert(
                        HeaderName::from_static(RATELIMIT_REMAINING),
                        HeaderValue::from(remaining),
                    );
                    headers.insert(
                        HeaderName::from_static(RATELIMIT_RESET),
                        HeaderValue::from(reset_secs(reset)),
                    );
                    Ok(res.map_into_left_body())
                })
            }
        }
    }
}
