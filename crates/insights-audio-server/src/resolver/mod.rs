//! Sharing-link audio resolution.
//!
//! Turns a share URL into a direct audio URL. Google Drive links are rewritten
//! to their download endpoint and checked with a HEAD request; any other URL is
//! fetched and run through the page heuristics. Fetch and parse failures are
//! reported as misses, never as errors.

mod drive;
mod heuristics;

use std::sync::Arc;
use std::time::Instant;

use insights_audio_types::MissReason;
use reqwest::Url;

use crate::fetch::Fetcher;

/// Outcome of resolving one share URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Absolute audio URL.
    Found(String),
    Missed(Miss),
}

/// Why resolution came back empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Miss {
    InvalidDriveUrl,
    NotAudio { content_type: Option<String> },
    NoMatch,
    /// The share target (or Drive HEAD) could not be fetched.
    Upstream { message: String },
}

impl Miss {
    pub fn reason(&self) -> MissReason {
        match self {
            Miss::InvalidDriveUrl => MissReason::InvalidDriveUrl,
            Miss::NotAudio { .. } => MissReason::NotAudio,
            Miss::NoMatch => MissReason::NoMatch,
            Miss::Upstream { .. } => MissReason::UpstreamError,
        }
    }

    /// Content type or upstream error text behind the miss, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Miss::NotAudio { content_type } => content_type.as_deref(),
            Miss::Upstream { message } => Some(message),
            Miss::InvalidDriveUrl | Miss::NoMatch => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot resolve {candidate:?} against share url {share_url:?}: {reason}")]
    Normalize {
        share_url: String,
        candidate: String,
        reason: String,
    },
}

/// Stateless resolver; every call does its own network work.
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn resolve(&self, share_url: &str) -> Result<Resolution, ResolveError> {
        let share_url = share_url.trim();
        let started = Instant::now();
        let candidate = if drive::is_drive_url(share_url) {
            self.resolve_drive(share_url).await
        } else {
            self.resolve_page(share_url).await
        };
        let resolution = match candidate {
            Ok(candidate) => Resolution::Found(normalize(share_url, &candidate)?),
            Err(miss) => Resolution::Missed(miss),
        };
        tracing::debug!(
            share_url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            resolution = ?resolution,
            "share url resolved"
        );
        Ok(resolution)
    }

    async fn resolve_drive(&self, share_url: &str) -> Result<String, Miss> {
        let file_id = drive::file_id(share_url).ok_or(Miss::InvalidDriveUrl)?;
        let direct = drive::direct_download_url(file_id);
        let head = self.fetcher.head(&direct).await.map_err(|err| {
            tracing::warn!(share_url, url = %direct, error = %err, "drive head request failed");
            Miss::Upstream {
                message: err.to_string(),
            }
        })?;
        if drive::is_audio_content_type(head.content_type.as_deref()) {
            Ok(direct)
        } else {
            Err(Miss::NotAudio {
                content_type: head.content_type,
            })
        }
    }

    async fn resolve_page(&self, share_url: &str) -> Result<String, Miss> {
        let html = self.fetcher.get_text(share_url).await.map_err(|err| {
            tracing::warn!(share_url, error = %err, "share page fetch failed");
            Miss::Upstream {
                message: err.to_string(),
            }
        })?;
        let (heuristic, url) = heuristics::first_match(&html).ok_or(Miss::NoMatch)?;
        tracing::debug!(share_url, heuristic, url = %url, "audio url found in page");
        Ok(url)
    }
}

/// Make `candidate` absolute using the share URL as base.
///
/// Absolute candidates are returned untouched. Root-relative, protocol-relative
/// and document-relative values take the share URL's scheme and host.
pub(crate) fn normalize(share_url: &str, candidate: &str) -> Result<String, ResolveError> {
    if Url::parse(candidate).is_ok() {
        return Ok(candidate.to_string());
    }
    let err = |reason: String| ResolveError::Normalize {
        share_url: share_url.to_string(),
        candidate: candidate.to_string(),
        reason,
    };
    let base = Url::parse(share_url).map_err(|e| err(e.to_string()))?;
    let joined = base.join(candidate).map_err(|e| err(e.to_string()))?;
    Ok(joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFetcher;

    fn resolver(fetcher: FakeFetcher) -> (Resolver, Arc<FakeFetcher>) {
        let fetcher = Arc::new(fetcher);
        (Resolver::new(fetcher.clone()), fetcher)
    }

    #[actix_web::test]
    async fn drive_link_without_file_segment_never_builds_download_url() {
        let (resolver, fetcher) = resolver(FakeFetcher::new());
        let out = resolver
            .resolve("https://drive.google.com/open?id=abc123")
            .await
            .unwrap();
        assert_eq!(out, Resolution::Missed(Miss::InvalidDriveUrl));
        assert!(fetcher.calls().is_empty());
    }

    #[actix_web::test]
    async fn drive_link_with_audio_head_resolves_to_download_url() {
        let direct = "https://drive.google.com/uc?export=download&id=F1le_ID";
        let (resolver, fetcher) =
            resolver(FakeFetcher::new().with_head(direct, Some("audio/mpeg")));
        let out = resolver
            .resolve("https://drive.google.com/file/d/F1le_ID/view?usp=sharing")
            .await
            .unwrap();
        assert_eq!(out, Resolution::Found(direct.to_string()));
        assert_eq!(fetcher.calls(), vec![format!("HEAD {direct}")]);
    }

    #[actix_web::test]
    async fn drive_link_with_non_audio_head_is_a_miss() {
        let direct = "https://drive.google.com/uc?export=download&id=doc";
        let (resolver, _) = resolver(FakeFetcher::new().with_head(direct, Some("text/html")));
        let out = resolver
            .resolve("https://drive.google.com/file/d/doc/view")
            .await
            .unwrap();
        assert_eq!(
            out,
            Resolution::Missed(Miss::NotAudio {
                content_type: Some("text/html".to_string())
            })
        );
    }

    #[actix_web::test]
    async fn drive_head_failure_is_an_upstream_miss() {
        let (resolver, _) = resolver(FakeFetcher::new());
        let out = resolver
            .resolve("https://drive.google.com/file/d/gone/view")
            .await
            .unwrap();
        assert!(matches!(out, Resolution::Missed(Miss::Upstream { .. })));
    }

    #[actix_web::test]
    async fn page_audio_tag_is_returned_exactly() {
        let share = "https://blog.example.com/posts/42";
        let (resolver, _) = resolver(
            FakeFetcher::new().with_page(share, r#"<html><body><audio src="https://x/a.mp3"></audio></body></html>"#),
        );
        let out = resolver.resolve(share).await.unwrap();
        assert_eq!(out, Resolution::Found("https://x/a.mp3".to_string()));
    }

    #[actix_web::test]
    async fn page_json_ld_is_used_when_no_audio_tag() {
        let share = "https://podcast.example.com/ep/7";
        let (resolver, _) = resolver(FakeFetcher::new().with_page(
            share,
            r#"<html><head><script type="application/ld+json">{"contentUrl":"https://x/b.wav"}</script></head><body></body></html>"#,
        ));
        let out = resolver.resolve(share).await.unwrap();
        assert_eq!(out, Resolution::Found("https://x/b.wav".to_string()));
    }

    #[actix_web::test]
    async fn root_relative_url_takes_share_url_origin() {
        let share = "https://news.example.org:8443/stories/radio?ref=home";
        let (resolver, _) = resolver(FakeFetcher::new().with_page(
            share,
            r#"<html><body><div data-audio-url="/media/c.ogg"></div></body></html>"#,
        ));
        let out = resolver.resolve(share).await.unwrap();
        assert_eq!(
            out,
            Resolution::Found("https://news.example.org:8443/media/c.ogg".to_string())
        );
    }

    #[actix_web::test]
    async fn resolving_twice_gives_the_same_answer() {
        let share = "https://blog.example.com/posts/1";
        let (resolver, fetcher) = resolver(FakeFetcher::new().with_page(
            share,
            r#"<html><head><meta property="og:audio" content="/a/b.mp3"></head></html>"#,
        ));
        let first = resolver.resolve(share).await.unwrap();
        let second = resolver.resolve(share).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Resolution::Found("https://blog.example.com/a/b.mp3".to_string()));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[actix_web::test]
    async fn page_without_audio_is_no_match() {
        let share = "https://blog.example.com/empty";
        let (resolver, _) =
            resolver(FakeFetcher::new().with_page(share, "<html><body><p>hi</p></body></html>"));
        assert_eq!(
            resolver.resolve(share).await.unwrap(),
            Resolution::Missed(Miss::NoMatch)
        );
    }

    #[actix_web::test]
    async fn unreachable_page_is_an_upstream_miss_not_an_error() {
        let (resolver, _) = resolver(FakeFetcher::new());
        let out = resolver.resolve("https://nowhere.invalid/post").await.unwrap();
        match out {
            Resolution::Missed(miss @ Miss::Upstream { .. }) => {
                assert_eq!(miss.reason(), MissReason::UpstreamError);
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }

    #[test]
    fn miss_detail_carries_content_type_or_message() {
        let not_audio = Miss::NotAudio {
            content_type: Some("application/pdf".to_string()),
        };
        assert_eq!(not_audio.detail(), Some("application/pdf"));
        let upstream = Miss::Upstream {
            message: "dns error".to_string(),
        };
        assert_eq!(upstream.detail(), Some("dns error"));
        assert_eq!(Miss::NoMatch.detail(), None);
    }

    #[test]
    fn normalize_keeps_absolute_urls() {
        assert_eq!(
            normalize("https://a.com/p", "https://x/a.mp3").unwrap(),
            "https://x/a.mp3"
        );
    }

    #[test]
    fn normalize_resolves_relative_forms() {
        let share = "http://a.com/blog/post.html";
        assert_eq!(normalize(share, "/m/a.mp3").unwrap(), "http://a.com/m/a.mp3");
        assert_eq!(normalize(share, "//cdn.a.com/a.mp3").unwrap(), "http://cdn.a.com/a.mp3");
        assert_eq!(normalize(share, "files/a.mp3").unwrap(), "http://a.com/blog/files/a.mp3");
    }

    #[test]
    fn normalize_fails_without_usable_base() {
        assert!(matches!(
            normalize("not a url", "/m/a.mp3"),
            Err(ResolveError::Normalize { .. })
        ));
    }
}
