//! Google Drive share links.

use std::sync::LazyLock;

use regex::Regex;

const DRIVE_HOST: &str = "drive.google.com";

static FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/d/([A-Za-z0-9_-]+)").expect("drive file id regex"));

pub(crate) fn is_drive_url(url: &str) -> bool {
    url.contains(DRIVE_HOST)
}

/// File id from a `/file/d/{id}/...` share link.
pub(crate) fn file_id(url: &str) -> Option<&str> {
    FILE_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub(crate) fn direct_download_url(file_id: &str) -> String {
    format!("https://{DRIVE_HOST}/uc?export=download&id={file_id}")
}

pub(crate) fn is_audio_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("audio"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_from_view_link() {
        let url = "https://drive.google.com/file/d/1AbC-d_9/view?usp=sharing";
        assert!(is_drive_url(url));
        assert_eq!(file_id(url), Some("1AbC-d_9"));
        assert_eq!(
            direct_download_url("1AbC-d_9"),
            "https://drive.google.com/uc?export=download&id=1AbC-d_9"
        );
    }

    #[test]
    fn open_links_have_no_file_id() {
        assert_eq!(file_id("https://drive.google.com/open?id=1AbC"), None);
        assert_eq!(file_id("https://drive.google.com/drive/folders/xyz"), None);
    }

    #[test]
    fn audio_content_type_is_case_insensitive() {
        assert!(is_audio_content_type(Some("audio/mpeg")));
        assert!(is_audio_content_type(Some("Audio/X-WAV; charset=binary")));
        assert!(!is_audio_content_type(Some("text/html; charset=utf-8")));
        assert!(!is_audio_content_type(None));
    }
}
