//! Share-link extraction route.

use std::time::Instant;

use actix_web::{web, HttpResponse};
use insights_audio_types::{ErrorResponse, ExtractRequest, ExtractResponse};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::api::errors::ApiError;
use crate::resolver::Resolution;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/v1/audio/extract",
    request_body = ExtractRequest,
    responses(
        (status = 200, description = "Audio URL found", body = ExtractResponse),
        (status = 400, description = "Missing shareUrl", body = ErrorResponse),
        (status = 404, description = "No audio found for the link", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Unexpected failure", body = ErrorResponse)
    )
)]
/// Resolve a sharing link to a direct audio URL.
pub async fn extract_audio(
    state: web::Data<AppState>,
    body: web::Json<ExtractRequest>,
) -> HttpResponse {
    let Some(share_url) = body
        .share_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    else {
        return ApiError::MissingShareUrl.into_response();
    };

    let started = Instant::now();
    match state.resolver.resolve(share_url).await {
        Ok(Resolution::Found(audio_url)) => {
            tracing::info!(
                share_url,
                audio_url = %audio_url,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "audio url extracted"
            );
            let extracted_at = match extracted_at_now() {
                Ok(ts) => ts,
                Err(err) => return ApiError::ExtractFailed(err.to_string()).into_response(),
            };
            HttpResponse::Ok().json(ExtractResponse {
                audio_url,
                original_url: share_url.to_string(),
                extracted_at,
            })
        }
        Ok(Resolution::Missed(miss)) => {
            tracing::info!(
                share_url,
                reason = ?miss.reason(),
                detail = miss.detail().unwrap_or("-"),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "no audio found for share url"
            );
            ApiError::NoAudioFound(miss.reason()).into_response()
        }
        Err(err) => {
            tracing::error!(share_url, error = %err, "audio extraction failed");
            ApiError::ExtractFailed(err.to_string()).into_response()
        }
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
fn extracted_at_now() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
}
