use actix_web::{get, HttpResponse, Responder};
use insights_audio_types::HealthResponse;

/// Basic health check for load balancers.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("BUILD_VERSION").to_string(),
    })
}
