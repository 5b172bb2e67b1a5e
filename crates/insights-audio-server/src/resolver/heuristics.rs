//! Audio URL heuristics over a parsed share page.
//!
//! Each probe is a pure function of the document. [`HEURISTICS`] fixes the
//! priority order; the first probe that yields a non-empty value wins.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

pub(crate) type Probe = fn(&Html) -> Option<String>;

/// Probes in priority order, with the name used in logs.
pub(crate) const HEURISTICS: &[(&str, Probe)] = &[
    ("audio_source", audio_source),
    ("og_audio", og_audio),
    ("twitter_audio", twitter_audio),
    ("data_audio_url", data_audio_url),
    ("audio_player", audio_player),
    ("audio_tag", audio_tag),
    ("json_ld", json_ld),
    ("script_url", script_url),
];

/// Attributes read from a matched element, in order.
const URL_ATTRIBUTES: [&str; 3] = ["src", "content", "data-audio-url"];

static AUDIO_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(?:mp3|wav|m4a|ogg)(?:$|[?#])").expect("audio extension regex")
});

static SCRIPT_AUDIO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)["'](https?://[^"'\s]+?\.(?:mp3|wav|m4a|ogg)(?:\?[^"'\s]*)?)["']"#)
        .expect("script audio url regex")
});

/// Parse `html` and return the first heuristic hit as `(name, url)`.
pub(crate) fn first_match(html: &str) -> Option<(&'static str, String)> {
    let doc = Html::parse_document(html);
    HEURISTICS
        .iter()
        .find_map(|(name, probe)| probe(&doc).map(|url| (*name, url)))
}

pub(crate) fn has_audio_extension(url: &str) -> bool {
    AUDIO_EXTENSION.is_match(url.trim())
}

fn audio_source(doc: &Html) -> Option<String> {
    probe_selector(doc, "audio source")
}

fn og_audio(doc: &Html) -> Option<String> {
    probe_selector(doc, r#"meta[property="og:audio"]"#)
}

fn twitter_audio(doc: &Html) -> Option<String> {
    probe_selector(doc, r#"meta[name="twitter:audio:source"]"#)
}

fn data_audio_url(doc: &Html) -> Option<String> {
    probe_selector(doc, "[data-audio-url]")
}

fn audio_player(doc: &Html) -> Option<String> {
    probe_selector(doc, ".audio-player audio")
}

fn audio_tag(doc: &Html) -> Option<String> {
    probe_selector(doc, "audio")
}

/// First `contentUrl` with an audio extension across all JSON-LD blocks.
fn json_ld(doc: &Html) -> Option<String> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    doc.select(&selector).find_map(|el| {
        let raw = element_text(&el);
        // Malformed blocks are skipped.
        serde_json::from_str::<Value>(raw.trim())
            .ok()
            .and_then(|value| find_content_url(&value))
    })
}

/// First quoted absolute audio URL in inline script text.
fn script_url(doc: &Html) -> Option<String> {
    let selector = Selector::parse("script").ok()?;
    let text = doc
        .select(&selector)
        .filter(|el| el.value().attr("src").is_none())
        .map(|el| element_text(&el))
        .collect::<Vec<_>>()
        .join("\n")
        .replace("\\/", "/");
    SCRIPT_AUDIO_URL
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Read the first element matching `css`: `src`, then `content`, then `data-audio-url`.
fn probe_selector(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let el = doc.select(&selector).next()?;
    URL_ATTRIBUTES
        .iter()
        .filter_map(|attr| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Depth-first search: an object's own `contentUrl` before its children.
fn find_content_url(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(url)) = map.get("contentUrl") {
                if has_audio_extension(url) {
                    return Some(url.trim().to_string());
                }
            }
            map.iter()
                .filter(|(key, _)| key.as_str() != "contentUrl")
                .find_map(|(_, child)| find_content_url(child))
        }
        Value::Array(items) => items.iter().find_map(find_content_url),
        _ => None,
    }
}
