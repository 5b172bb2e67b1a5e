//! JSON error responses shared by the audio routes.

use actix_web::HttpResponse;
use insights_audio_types::{ErrorResponse, MissReason};

#[derive(Debug)]
pub(crate) enum ApiError {
    MissingShareUrl,
    InvalidBody(String),
    NoAudioFound(MissReason),
    ExtractFailed(String),
    MissingAudioUrl,
    ProxyFailed(String),
}

impl ApiError {
    /// Convert an API error into an HTTP response.
    pub(crate) fn into_response(self) -> HttpResponse {
        match self {
            ApiError::MissingShareUrl => {
                HttpResponse::BadRequest().json(ErrorResponse::new("Share URL is required"))
            }
            ApiError::InvalidBody(message) => HttpResponse::BadRequest()
                .json(ErrorResponse::new("Invalid request body").with_message(message)),
            ApiError::NoAudioFound(reason) => HttpResponse::NotFound().json(
                ErrorResponse::new("Could not extract audio URL from the provided link")
                    .with_reason(reason),
            ),
            ApiError::ExtractFailed(message) => HttpResponse::InternalServerError()
                .json(ErrorResponse::new("Failed to extract audio URL").with_message(message)),
            ApiError::MissingAudioUrl => {
                HttpResponse::BadRequest().json(ErrorResponse::new("Audio URL is required"))
            }
            ApiError::ProxyFailed(message) => HttpResponse::InternalServerError()
                .json(ErrorResponse::new("Failed to proxy audio").with_message(message)),
        }
    }
}
