//! Byte sources for model ingestion.
//!
//! A [`ByteSource`] is either a seekable local file with a known total
//! length, or a sequential byte stream (typically an HTTP response
//! body) whose total length may or may not have been declared by the
//! transport.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while acquiring a source, before any chunk is read.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} fetching {url}")]
    Status { url: String, status: u16 },
}

/// A byte source for a single load attempt. Sources are consumed by
/// [`ChunkedByteLoader::load`](crate::ChunkedByteLoader::load) and are
/// not reusable.
pub enum ByteSource {
    /// Seekable local file with a known total length.
    File { file: File, len: u64 },
    /// Sequential stream with an optional declared total length.
    Stream {
        reader: Box<dyn Read + Send>,
        declared_len: Option<u64>,
    },
}

impl ByteSource {
    /// Open a local file.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        info!("Opened {:?} ({} bytes)", path, len);
        Ok(Self::File { file, len })
    }

    /// Issue a range-less GET against `url` and stream the response
    /// body. The declared length comes from the `Content-Length`
    /// header when the server sends one.
    pub fn fetch(url: &str) -> Result<Self, SourceError> {
        let response = reqwest::blocking::get(url)?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let declared_len = response.content_length();
        match declared_len {
            Some(len) => info!("Fetching {} ({} bytes)", url, len),
            None => warn!("Fetching {} without a Content-Length header", url),
        }

        Ok(Self::Stream {
            reader: Box::new(response),
            declared_len,
        })
    }

    /// Wrap an arbitrary reader as a stream source.
    pub fn from_reader(reader: impl Read + Send + 'static, declared_len: Option<u64>) -> Self {
        Self::Stream {
            reader: Box::new(reader),
            declared_len,
        }
    }

    /// Total payload length, when the source declares one.
    pub fn total_len(&self) -> Option<u64> {
        match self {
            Self::File { len, .. } => Some(*len),
            Self::Stream { declared_len, .. } => *declared_len,
        }
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File { len, .. } => f.debug_struct("File").field("len", len).finish(),
            Self::Stream { declared_len, .. } => f
                .debug_struct("Stream")
                .field("declared_len", declared_len)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reader_source_reports_declared_length() {
        let source = ByteSource::from_reader(Cursor::new(vec![1, 2, 3]), Some(3));
        assert_eq!(source.total_len(), Some(3));

        let source = ByteSource::from_reader(Cursor::new(vec![1, 2, 3]), None);
        assert_eq!(source.total_len(), None);
    }
}
