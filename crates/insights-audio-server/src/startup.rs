//! Actix server startup + app wiring.
//!
//! Builds the shared state, routes, middleware, and OpenAPI endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse};
use actix_web::{App, Error, HttpServer, web};
use anyhow::Result;
use futures_util::future::{LocalBoxFuture, Ready, ok};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::config;
use crate::fetch::ReqwestFetcher;
use crate::openapi;
use crate::ratelimit::{RateLimit, RateLimiter};
use crate::resolver::{Resolution, Resolver};
use crate::state::{AppState, ProxySettings};

/// Build server state and start the Actix HTTP server.
pub(crate) async fn run(bind: Option<SocketAddr>, config_path: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config_path.as_ref())?;
    let bind = resolve_bind(bind, &cfg)?;
    let fetch = config::fetch_settings_from_config(&cfg);
    let cors_origins = config::cors_origins_from_config(&cfg);
    let json_limit = config::json_limit_from_config(&cfg);
    let rate_limit = config::rate_limit_from_config(&cfg)?;
    tracing::info!(
        bind = %bind,
        git_sha = env!("GIT_SHA"),
        build_date = env!("BUILD_DATE"),
        resolve_timeout_ms = fetch.resolve_timeout.as_millis() as u64,
        proxy_timeout_ms = fetch.proxy_timeout.as_millis() as u64,
        cors_origins = ?cors_origins,
        rate_limit = ?rate_limit,
        "starting insights-audio-server"
    );

    let fetcher = Arc::new(ReqwestFetcher::new(&fetch)?);
    let state = web::Data::new(AppState::new(
        fetcher,
        ProxySettings {
            cache_max_age_secs: config::cache_max_age_from_config(&cfg),
        },
    ));
    let limiter = rate_limit.map(|settings| Arc::new(RateLimiter::new(settings)));

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        App::new()
            .app_data(state.clone())
            .wrap(RateLimit::new(limiter.clone()))
            .wrap(FilteredLogger)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .configure(move |cfg| api::configure(cfg, &cors_origins, json_limit))
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}

/// Resolve a single share URL and print the result as JSON.
pub(crate) async fn resolve_once(config_path: Option<PathBuf>, share_url: &str) -> Result<()> {
    let cfg = load_config(config_path.as_ref())?;
    let fetcher = Arc::new(ReqwestFetcher::new(&config::fetch_settings_from_config(&cfg))?);
    let resolver = Resolver::new(fetcher);
    let out = match resolver.resolve(share_url.trim()).await? {
        Resolution::Found(audio_url) => serde_json::json!({
            "audioUrl": audio_url,
            "originalUrl": share_url.trim(),
        }),
        Resolution::Missed(miss) => serde_json::json!({
            "error": "Could not extract audio URL from the provided link",
            "reason": miss.reason(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Return true when the request path should be logged.
fn should_log_path(path: &str) -> bool {
    if path == "/health" || path.starts_with("/swagger-ui/") {
        return false;
    }
    // Proxy streams log from the handler.
    !path.starts_with("/v1/audio/proxy")
}

/// Socket peer IP; forwarded headers are not consulted.
fn peer_ip(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Actix middleware that filters noisy paths from logging.
struct FilteredLogger;

impl<S, B> actix_web::dev::Transform<S, ServiceRequest> for FilteredLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = FilteredLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(FilteredLoggerMiddleware { service })
    }
}

/// Service wrapper that applies the logging filter.
struct FilteredLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for FilteredLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let path = req.path().to_string();
        let should_log = should_log_path(&path);
        let method = req.method().clone();
        let peer = peer_ip(&req);
        let ua = req
            .headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let start = std::time::Instant::now();
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            if should_log {
                tracing::info!(
                    method = %method,
                    path = %path,
                    status = %res.status().as_u16(),
                    user_agent = %ua,
                    peer = %peer,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "http request"
                );
            }
            Ok(res)
        })
    }
}

/// Load server config from disk or fall back to defaults.
fn load_config(path: Option<&PathBuf>) -> Result<config::ServerConfig> {
    if let Some(path) = path {
        return config::ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
    match auto_path {
        Some(path) if path.exists() => config::ServerConfig::load(&path),
        _ => {
            tracing::debug!("no config file found; using defaults");
            Ok(config::ServerConfig::default())
        }
    }
}

/// Resolve the final bind address from args + config.
fn resolve_bind(bind: Option<SocketAddr>, cfg: &config::ServerConfig) -> Result<SocketAddr> {
    match bind {
        Some(addr) => Ok(addr),
        None => match config::bind_from_config(cfg)? {
            Some(addr) => Ok(addr),
            None => Ok(config::DEFAULT_BIND.parse()?),
        },
    }
}
