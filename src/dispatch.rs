//! Locates the file a download run produced and streams it back to the client.
//!
//! yt-dlp picks the extension at run time, so the file is found by stem prefix.
//! When several entries share the prefix (leftovers from an earlier failed run,
//! or two concurrent requests for the same title) the first one the directory
//! listing yields is used. Nothing serializes access to the download directory.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll, ready},
};

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures::Stream;
use thiserror::Error;
use tokio::{
    fs::{self, File},
    runtime::Handle,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum DispatchFailure {
    /// The extractor exited cleanly but nothing in the directory matches the stem.
    #[error("no file starting with {stem:?} in {}", .dir.display())]
    FileNotProduced { stem: String, dir: PathBuf },
    #[error("could not read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A produced file ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDelivery {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mime_type: &'static str,
    /// Real on-disk name, extension included.
    pub display_filename: String,
}

/// Finds the first entry in `download_dir` whose name starts with `stem`.
pub async fn dispatch(stem: &str, download_dir: &Path) -> Result<FileDelivery, DispatchFailure> {
    let not_produced = || DispatchFailure::FileNotProduced {
        stem: stem.to_owned(),
        dir: download_dir.to_path_buf(),
    };

    let mut entries = match fs::read_dir(download_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(not_produced()),
        Err(source) => {
            return Err(DispatchFailure::Io {
                path: download_dir.to_path_buf(),
                source,
            });
        }
    };

    let io_err = |source| DispatchFailure::Io {
        path: download_dir.to_path_buf(),
        source,
    };

    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(stem) {
            continue;
        }

        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|source| DispatchFailure::Io {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            continue;
        }

        debug!(file = %name, size = metadata.len(), "matched download output");
        return Ok(FileDelivery {
            mime_type: mime_for_path(&path),
            path,
            size_bytes: metadata.len(),
            display_filename: name,
        });
    }

    Err(not_produced())
}

impl FileDelivery {
    /// Streams the file with download headers. The file is deleted once the
    /// body has been fully sent and dropped; see [`DeleteWhenDrained`].
    pub async fn stream(self) -> Result<Response, DispatchFailure> {
        let file = File::open(&self.path)
            .await
            .map_err(|source| DispatchFailure::Io {
                path: self.path.clone(),
                source,
            })?;

        let stream = DeleteWhenDrained {
            inner: Some(ReaderStream::new(file)),
            remaining: self.size_bytes,
            path: self.path.clone(),
        };

        let mut response = Body::from_stream(stream).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.mime_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.size_bytes));
        if let Ok(value) = HeaderValue::from_str(&content_disposition(&self.display_filename)) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }

        Ok(response)
    }
}

/// File body that unlinks its source when dropped, but only if every byte was
/// read. Hyper stops polling a body once `Content-Length` bytes are written,
/// so completion is tracked by byte count rather than end-of-stream. A client
/// that disconnects early leaves the file in place.
struct DeleteWhenDrained {
    inner: Option<ReaderStream<File>>,
    remaining: u64,
    path: PathBuf,
}

impl Stream for DeleteWhenDrained {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = ready!(Pin::new(inner).poll_next(cx));
        if let Some(Ok(chunk)) = &item {
            self.remaining = self.remaining.saturating_sub(chunk.len() as u64);
        }
        Poll::Ready(item)
    }
}

impl Drop for DeleteWhenDrained {
    fn drop(&mut self) {
        // Close the handle first so the unlink also succeeds on Windows.
        drop(self.inner.take());
        if self.remaining > 0 {
            debug!(path = %self.path.display(), remaining = self.remaining, "delivery aborted, keeping file");
            return;
        }
        let path = std::mem::take(&mut self.path);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || remove_delivered(&path));
            }
            Err(_) => remove_delivered(&path),
        }
    }
}

fn remove_delivered(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed delivered file"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove delivered file"),
    }
}

/// Fixed extension table; anything unknown is sent as an opaque byte stream.
pub fn mime_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return OCTET_STREAM;
    };
    match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        _ => OCTET_STREAM,
    }
}

/// `attachment` disposition carrying both a quoted ASCII fallback and the
/// RFC 5987 UTF-8 form of the name.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(filename),
        urlencoding::encode(filename)
    )
}

fn ascii_fallback(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            ' '..='~' => c,
            _ => '_',
        })
        .collect()
}
