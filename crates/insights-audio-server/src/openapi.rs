use insights_audio_types::{ErrorResponse, ExtractRequest, ExtractResponse, HealthResponse, MissReason};
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::extract::extract_audio,
        api::proxy::proxy_audio,
        api::health::health,
    ),
    components(
        schemas(
            ExtractRequest,
            ExtractResponse,
            ErrorResponse,
            MissReason,
            HealthResponse,
        )
    ),
    tags(
        (name = "insights-audio-server", description = "Share-link audio extraction and proxy API")
    )
)]
pub struct ApiDoc;
