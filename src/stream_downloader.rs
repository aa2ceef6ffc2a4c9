//! Streaming video download
//!
//! Copies a response body to a [`Sink`] in fixed-size chunks, reporting
//! progress after every chunk. There is no resume: a failure mid-stream fails
//! the download and leaves the partial file where it is.

use crate::sink::Sink;
use crate::transport::{HttpResponse, Transport, TransportError};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Size of the chunks the body is copied in
pub const CHUNK_SIZE: usize = 8192; // 8KB

/// Errors that can occur while downloading a stream
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request could not be made
    #[error("Failed to open stream: {0}")]
    Transport(#[from] TransportError),

    /// The server refused the stream
    #[error("HTTP {status} while downloading {url}")]
    HttpStatus { url: String, status: u16 },

    /// The server did not declare a `Content-Length`
    #[error("Size of {path} is unknown: response has no Content-Length")]
    SizeUnknown { path: PathBuf },

    /// Reading the body failed mid-stream
    #[error("Failed to read stream for {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Writing to the sink failed
    #[error("Failed to write {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },
}

/// Persists byte streams through a sink
pub struct StreamDownloader<'a> {
    sink: &'a dyn Sink,
}

impl<'a> StreamDownloader<'a> {
    pub fn new(sink: &'a dyn Sink) -> Self {
        Self { sink }
    }

    /// Opens `url` presenting `identity` and stores the body at `relative`.
    ///
    /// `on_progress` receives `(bytes written, total bytes)` after each chunk.
    /// Returns the number of bytes written.
    pub fn download<F>(
        &self,
        transport: &dyn Transport,
        url: &str,
        identity: &str,
        relative: &Path,
        on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, u64),
    {
        let response = transport.get(url, Some(identity))?;
        if !response.is_ok() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        self.write_response(response, relative, on_progress)
    }

    /// Stores the body of an already opened response at `relative`.
    pub fn write_response<F>(
        &self,
        mut response: HttpResponse,
        relative: &Path,
        mut on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, u64),
    {
        let total_size = response
            .content_length
            .ok_or_else(|| DownloadError::SizeUnknown {
                path: relative.to_path_buf(),
            })?;

        let write_failed = |source: io::Error| DownloadError::WriteFailed {
            path: relative.to_path_buf(),
            source,
        };

        let mut file = self.sink.create(relative).map_err(write_failed)?;

        let mut downloaded: u64 = 0;
        let mut buffer = [0; CHUNK_SIZE];

        loop {
            let bytes_read = fill_chunk(&mut response.body, &mut buffer).map_err(|source| {
                DownloadError::ReadFailed {
                    path: relative.to_path_buf(),
                    source,
                }
            })?;

            if bytes_read == 0 {
                break; // EOF
            }

            file.write_all(&buffer[..bytes_read]).map_err(write_failed)?;

            downloaded += bytes_read as u64;
            on_progress(downloaded.min(total_size), total_size);
        }

        file.flush().map_err(write_failed)?;

        if downloaded != total_size {
            warn!(
                path = %relative.display(),
                downloaded,
                declared = total_size,
                "stream length differs from Content-Length"
            );
        }
        debug!(path = %relative.display(), bytes = downloaded, "download complete");

        Ok(downloaded)
    }
}

/// Reads until `buffer` is full or the reader is exhausted
fn fill_chunk(reader: &mut dyn Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
