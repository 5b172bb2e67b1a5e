//! HTTP API handlers.
//!
//! Defines the Actix routes for share-link extraction and the audio proxy.

pub mod errors;
pub mod extract;
pub mod health;
pub mod proxy;

use actix_cors::Cors;
use actix_web::http::{header, Method};
use actix_web::{error, web, HttpRequest};

use errors::ApiError;

/// Register the audio routes. Shared by the server and route tests.
pub fn configure(cfg: &mut web::ServiceConfig, cors_origins: &[String], json_limit: usize) {
    cfg.service(health::health).service(
        web::resource("/v1/audio/extract")
            .app_data(json_config(json_limit))
            .wrap(extract_cors(cors_origins))
            .route(web::post().to(extract::extract_audio)),
    )
    .service(
        web::resource(["/v1/audio/proxy", "/v1/audio/proxy/{url:.*}"])
            .route(web::get().to(proxy::proxy_audio))
            .route(web::method(Method::OPTIONS).to(proxy::proxy_preflight)),
    );
}

/// Malformed or oversized JSON bodies become JSON 400s.
fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err: error::JsonPayloadError, _req: &HttpRequest| {
            let resp = ApiError::InvalidBody(err.to_string()).into_response();
            error::InternalError::from_response(err, resp).into()
        })
}

fn extract_cors(origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["POST", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .max_age(3600);
    if origins.is_empty() {
        cors = cors.allow_any_origin();
    } else {
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
    }
    cors
}
