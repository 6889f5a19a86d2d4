//! Byte-range aware file streaming.
//!
//! Every request opens its own read handle. The handle travels inside the
//! response body, so it is released when the body finishes, errors, or is
//! dropped because the client went away.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use std::io::{self, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf};
use tokio_util::io::ReaderStream;

/// Content type used when the extension is not in the lookup table.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Errors while preparing a file response.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to open media file: {0}")]
    Open(#[source] io::Error),

    #[error("failed to stat media file: {0}")]
    Metadata(#[source] io::Error),

    #[error("failed to seek media file: {0}")]
    Seek(#[source] io::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl MediaError {
    /// True when the file vanished between resolution and opening.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MediaError::Open(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// A satisfiable byte window of a file, `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl RangeSpec {
    /// Number of bytes in the window.
    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

/// Parses a `Range` header against a file of `total_size` bytes.
///
/// Only the first range of a multi-range header is used. `bytes=N-` runs to
/// the end of the file, `bytes=-N` selects the last N bytes and an end past
/// EOF is clamped. Anything unusable yields `None`, which callers treat as a
/// request for the whole file.
pub fn parse_range(header: &str, total_size: u64) -> Option<RangeSpec> {
    if total_size == 0 {
        return None;
    }
    let last = total_size - 1;

    let spec = header.trim().strip_prefix("bytes=")?;
    let first = spec.split(',').next()?.trim();
    let (start_s, end_s) = first.split_once('-')?;
    let (start_s, end_s) = (start_s.trim(), end_s.trim());

    let (start, end) = if start_s.is_empty() {
        let suffix = end_s.parse::<u64>().ok()?;
        if suffix == 0 {
            return None;
        }
        (total_size.saturating_sub(suffix), last)
    } else {
        let start = start_s.parse::<u64>().ok()?;
        let end = if end_s.is_empty() {
            last
        } else {
            end_s.parse::<u64>().ok()?.min(last)
        };
        (start, end)
    };

    if start > end {
        return None;
    }

    Some(RangeSpec {
        start,
        end,
        total_size,
    })
}

/// Content type for a file, based on its extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Decrements the open-stream count when the owning reader is dropped.
#[derive(Debug)]
struct StreamGuard {
    open: Arc<AtomicUsize>,
}

impl StreamGuard {
    fn new(open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { open }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!("media stream released");
    }
}

/// Reader that keeps its guard alive exactly as long as the file handle.
struct TrackedReader<R> {
    inner: R,
    _guard: StreamGuard,
}

impl<R: AsyncRead + Unpin> AsyncRead for TrackedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Streams files from disk with `Range` support.
///
/// Requests share nothing but the open-handle counter, which exists so the
/// number of live handles can be observed.
#[derive(Debug, Clone, Default)]
pub struct MediaServer {
    open_streams: Arc<AtomicUsize>,
}

impl MediaServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of file handles currently owned by response bodies.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Builds a 200 or 206 response streaming `path`.
    ///
    /// # Arguments
    /// * `path` - Resolved file to stream
    /// * `range` - Raw `Range` header, if the client sent one
    pub async fn serve(
        &self,
        path: &Path,
        range: Option<&HeaderValue>,
    ) -> Result<Response, MediaError> {
        let mut file = File::open(path).await.map_err(MediaError::Open)?;
        let file_size = file.metadata().await.map_err(MediaError::Metadata)?.len();
        let content_type = content_type(path);

        let range = range
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_range(value, file_size));

        match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(MediaError::Seek)?;

                tracing::debug!(
                    path = %path.display(),
                    start = range.start,
                    end = range.end,
                    size = file_size,
                    "serving partial content"
                );

                let reader = TrackedReader {
                    inner: file.take(range.byte_len()),
                    _guard: StreamGuard::new(self.open_streams.clone()),
                };

                let response = Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_TYPE, content_type)
                    .header(header::CONTENT_LENGTH, range.byte_len())
                    .header(header::CONTENT_RANGE, range.content_range())
                    .header(header::ACCEPT_RANGES, "bytes")
                    .body(Body::from_stream(ReaderStream::new(reader)))?;

                Ok(response)
            }
            None => {
                tracing::debug!(path = %path.display(), size = file_size, "serving full content");

                let reader = TrackedReader {
                    inner: file,
                    _guard: StreamGuard::new(self.open_streams.clone()),
                };

                let response = Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, content_type)
                    .header(header::CONTENT_LENGTH, file_size)
                    .header(header::ACCEPT_RANGES, "bytes")
                    .body(Body::from_stream(ReaderStream::new(reader)))?;

                Ok(response)
            }
        }
    }
}
