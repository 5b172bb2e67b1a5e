//! Wire types shared by the audio relay server and its clients.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Request body for `POST /v1/audio/extract`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    /// Public sharing link (Google Drive file or any web page). Non-string
    /// values read as absent.
    #[serde(default, deserialize_with = "string_or_none")]
    pub share_url: Option<String>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Text(text)) => Some(text),
        Some(Lenient::Other(_)) | None => None,
    })
}

/// Successful extraction result. Never stored; returned once per request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    /// Absolute URL of the audio resource.
    pub audio_url: String,
    /// Share URL as submitted by the caller.
    pub original_url: String,
    /// UTC timestamp of the extraction, millisecond precision.
    pub extracted_at: String,
}

/// Why a share URL did not resolve to audio.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// Google Drive link without a `/file/d/{id}` segment.
    InvalidDriveUrl,
    /// Drive file exists but is not served with an audio content type.
    NotAudio,
    /// Page fetched but none of the heuristics found an audio URL.
    NoMatch,
    /// The share target could not be fetched.
    UpstreamError,
}

/// JSON body for every non-2xx response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    /// Short human readable summary.
    pub error: String,
    /// Underlying error text (500s and malformed bodies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Miss classification for 404s from the extract route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<MissReason>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            reason: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_reason(mut self, reason: MissReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Response for `GET /health`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: String,
    /// Build identifier (`git sha` + build date).
    pub version: String,
}
