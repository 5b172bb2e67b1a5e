//! Byte-range parsing and windowed stream copying for the proxy.

use futures_util::stream::{StreamExt, unfold};

use crate::fetch::ByteStream;

/// Parse a `Range` header against a known total length.
///
/// Only the first range of a multi-range header is honored. Suffix ranges
/// (`bytes=-N`) are rejected. The end is clamped to the last byte.
pub(crate) fn parse_single_range(header: &str, total_len: u64) -> Option<(u64, u64)> {
    let header = header.trim();
    if !header.starts_with("bytes=") {
        return None;
    }
    let range = header.trim_start_matches("bytes=");
    let first = range.split(',').next()?;
    let (start_s, end_s) = first.trim().split_once('-')?;
    if start_s.is_empty() {
        return None;
    }
    let start = start_s.parse::<u64>().ok()?;
    let end = if end_s.is_empty() {
        total_len.saturating_sub(1)
    } else {
        end_s.parse::<u64>().ok()?
    };
    if start >= total_len || end < start {
        return None;
    }
    Some((start, end.min(total_len.saturating_sub(1))))
}

/// Parse a `Content-Range: bytes start-end/total` value. `total` may be `*`.
pub(crate) fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start_s, end_s) = span.trim().split_once('-')?;
    let start = start_s.trim().parse::<u64>().ok()?;
    let end = end_s.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    Some((start, end, total))
}

/// Number of bytes in an inclusive range.
pub(crate) fn range_len(start: u64, end: u64) -> u64 {
    end.saturating_sub(start).saturating_add(1)
}

struct WindowState {
    inner: ByteStream,
    skip: u64,
    remaining: u64,
}

/// Yield `len` bytes of `inner` starting at byte offset `start`.
///
/// The upstream is not polled again once the window is complete, and it is
/// dropped together with the returned stream.
pub(crate) fn byte_window(inner: ByteStream, start: u64, len: u64) -> ByteStream {
    unfold(
        WindowState {
            inner,
            skip: start,
            remaining: len,
        },
        |mut st| async move {
            loop {
                if st.remaining == 0 {
                    return None;
                }
                let mut chunk = match st.inner.next().await? {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        st.remaining = 0;
                        return Some((Err(err), st));
                    }
                };
                if st.skip > 0 {
                    let chunk_len = chunk.len() as u64;
                    if chunk_len <= st.skip {
                        st.skip -= chunk_len;
                        continue;
                    }
                    chunk = chunk.slice(st.skip as usize..);
                    st.skip = 0;
                }
                if chunk.is_empty() {
                    continue;
                }
                if chunk.len() as u64 > st.remaining {
                    chunk.truncate(st.remaining as usize);
                }
                st.remaining -= chunk.len() as u64;
                return Some((Ok(chunk), st));
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use actix_web::web::Bytes;
    use futures_util::stream;

    use super::*;
    use crate::fetch::FetchError;

    fn chunked(data: &[u8], chunk: usize) -> ByteStream {
        let chunks: Vec<Result<Bytes, FetchError>> = data
            .chunks(chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks).boxed()
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut stream = stream;
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn parse_single_range_accepts_open_end() {
        let range = parse_single_range("bytes=10-", 100).unwrap();
        assert_eq!(range, (10, 99));
    }

    #[test]
    fn parse_single_range_rejects_invalid() {
        assert!(parse_single_range("items=1-2", 100).is_none());
        assert!(parse_single_range("bytes=-10", 100).is_none());
        assert!(parse_single_range("bytes=200-300", 100).is_none());
        assert!(parse_single_range("bytes=50-40", 100).is_none());
        assert!(parse_single_range("bytes=a-b", 100).is_none());
    }

    #[test]
    fn parse_single_range_clamps_end_to_length() {
        let range = parse_single_range("bytes=90-200", 100).unwrap();
        assert_eq!(range, (90, 99));
    }

    #[test]
    fn parse_single_range_uses_first_range() {
        let range = parse_single_range("bytes=0-1,2-3", 100).unwrap();
        assert_eq!(range, (0, 1));
    }

    #[test]
    fn parse_content_range_reads_total() {
        assert_eq!(parse_content_range("bytes 0-99/1000"), Some((0, 99, Some(1000))));
        assert_eq!(parse_content_range("bytes 5-9/*"), Some((5, 9, None)));
        assert_eq!(parse_content_range("bytes */1000"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes 9-5/10"), None);
    }

    #[actix_web::test]
    async fn window_spans_chunk_boundaries() {
        let data: Vec<u8> = (0u8..=255).collect();
        let out = collect(byte_window(chunked(&data, 7), 10, 20)).await;
        assert_eq!(out, data[10..30].to_vec());
    }

    #[actix_web::test]
    async fn window_from_zero_returns_prefix() {
        let data: Vec<u8> = (0u8..200).collect();
        let out = collect(byte_window(chunked(&data, 64), 0, 100)).await;
        assert_eq!(out.len(), 100);
        assert_eq!(out, data[..100].to_vec());
    }

    #[actix_web::test]
    async fn window_stops_at_upstream_end() {
        let data = vec![1u8; 10];
        let out = collect(byte_window(chunked(&data, 4), 5, 100)).await;
        assert_eq!(out.len(), 5);
    }

    #[actix_web::test]
    async fn window_does_not_poll_past_its_end() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let upstream = stream::iter(0..100)
            .map(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(Bytes::from_static(b"0123456789"))
            })
            .boxed();
        let out = collect(byte_window(upstream, 0, 25)).await;
        assert_eq!(out.len(), 25);
        assert_eq!(polled.load(Ordering::SeqCst), 3);
    }

    #[actix_web::test]
    async fn window_surfaces_upstream_error_once() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(FetchError::Transport {
                url: "https://x".to_string(),
                message: "reset".to_string(),
            }),
            Ok(Bytes::from_static(b"def")),
        ])
        .boxed();
        let mut window = byte_window(upstream, 0, 100);
        assert!(window.next().await.unwrap().is_ok());
        assert!(window.next().await.unwrap().is_err());
        assert!(window.next().await.is_none());
    }
}
