//! Bounded-memory chunked loading.
//!
//! [`ChunkedByteLoader`] assembles a payload into one contiguous buffer
//! while holding at most one chunk in transit. Chunks are produced in
//! strictly increasing offset order and appended exactly once; there is
//! no reordering, no per-chunk retry and no partial result on failure.

use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::progress::ProgressTracker;
use crate::source::ByteSource;

/// Per-chunk read size when the high-capability render backend is
/// active.
pub const HIGH_CAPABILITY_CHUNK_SIZE: usize = 128 * 1024 * 1024;
/// Per-chunk read size for the GL fallback backend.
pub const FALLBACK_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Errors raised while assembling the payload. Every variant is fatal
/// for the load attempt; the partially-accumulated buffer is released
/// before the error is returned.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("chunk size must be a positive number of bytes")]
    InvalidChunkSize,

    #[error("payload does not fit in addressable memory ({len} bytes)")]
    TooLarge { len: u64 },

    #[error("read failed at byte offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("stream exceeded its declared length of {declared} bytes at offset {offset}")]
    Overrun { declared: u64, offset: u64 },

    #[error("stream ended after {received} of {declared} declared bytes")]
    Truncated { declared: u64, received: u64 },

    #[error("load cancelled")]
    Cancelled,
}

/// Shared cancellation flag, observed at the inter-chunk yield point —
/// the pipeline's single defined cancellation point. Cancelling a
/// token aborts the load it was passed to with [`LoadError::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Assembles a [`ByteSource`] into one contiguous buffer, `chunk_size`
/// bytes at a time.
pub struct ChunkedByteLoader {
    chunk_size: usize,
}

impl ChunkedByteLoader {
    /// `chunk_size` bounds per-step memory use and must be positive.
    pub fn new(chunk_size: usize) -> Result<Self, LoadError> {
        if chunk_size == 0 {
            return Err(LoadError::InvalidChunkSize);
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Read the whole source into one contiguous buffer.
    ///
    /// Progress is reported once per completed chunk and reaches
    /// exactly 1.0 on completion. Between chunks the loader yields so a
    /// cooperative host stays responsive, and checks `cancel`. Any read
    /// error aborts immediately, carrying the byte offset reached; the
    /// accumulator never escapes on failure.
    pub fn load(
        &self,
        source: ByteSource,
        progress: &mut ProgressTracker<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, LoadError> {
        match source {
            ByteSource::File { file, len } => self.load_file(file, len, progress, cancel),
            ByteSource::Stream {
                reader,
                declared_len: Some(len),
            } => self.load_stream_known(reader, len, progress, cancel),
            ByteSource::Stream {
                reader,
                declared_len: None,
            } => self.load_stream_unknown(reader, progress, cancel),
        }
    }

    /// File path: slice fixed `chunk_size` windows and read each fully.
    fn load_file(
        &self,
        mut file: File,
        len: u64,
        progress: &mut ProgressTracker<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, LoadError> {
        let total = usize::try_from(len).map_err(|_| LoadError::TooLarge { len })?;
        let mut accumulated = Vec::with_capacity(total);
        if total == 0 {
            progress.finish();
            return Ok(accumulated);
        }

        let mut window = vec![0u8; self.chunk_size.min(total)];
        let mut offset = 0usize;
        let mut chunks = 0usize;
        while offset < total {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }
            let want = self.chunk_size.min(total - offset);
            let dst = &mut window[..want];
            file.read_exact(dst).map_err(|source| LoadError::Io {
                offset: offset as u64,
                source,
            })?;
            accumulated.extend_from_slice(dst);
            offset += want;
            chunks += 1;
            progress.report(offset as f32 / total as f32);
            std::thread::yield_now();
        }

        info!("Assembled {} bytes from {} file chunks", offset, chunks);
        Ok(accumulated)
    }

    /// Stream with a declared length: transport decides chunk sizes,
    /// bounded above by `chunk_size`. Overrunning or falling short of
    /// the declared length is an error.
    fn load_stream_known(
        &self,
        mut reader: Box<dyn Read + Send>,
        declared: u64,
        progress: &mut ProgressTracker<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, LoadError> {
        let total = usize::try_from(declared).map_err(|_| LoadError::TooLarge { len: declared })?;
        let mut accumulated = Vec::with_capacity(total);
        if total == 0 {
            progress.finish();
            return Ok(accumulated);
        }

        let mut scratch = vec![0u8; self.chunk_size];
        loop {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }
            let n = reader.read(&mut scratch).map_err(|source| LoadError::Io {
                offset: accumulated.len() as u64,
                source,
            })?;
            if n == 0 {
                break;
            }
            if accumulated.len() + n > total {
                return Err(LoadError::Overrun {
                    declared,
                    offset: (accumulated.len() + n) as u64,
                });
            }
            accumulated.extend_from_slice(&scratch[..n]);
            progress.report(accumulated.len() as f32 / total as f32);
            std::thread::yield_now();
        }

        if accumulated.len() < total {
            return Err(LoadError::Truncated {
                declared,
                received: accumulated.len() as u64,
            });
        }
        debug!("Assembled {} declared stream bytes", accumulated.len());
        Ok(accumulated)
    }

    /// Stream without a declared length: accumulate a chunk list and
    /// concatenate once at the end instead of pre-sizing. Progress is a
    /// step-count estimate that approaches (and finally reaches) 1.
    fn load_stream_unknown(
        &self,
        mut reader: Box<dyn Read + Send>,
        progress: &mut ProgressTracker<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, LoadError> {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut received = 0u64;
        let mut scratch = vec![0u8; self.chunk_size];
        loop {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }
            let n = reader.read(&mut scratch).map_err(|source| LoadError::Io {
                offset: received,
                source,
            })?;
            if n == 0 {
                break;
            }
            chunks.push(scratch[..n].to_vec());
            received += n as u64;
            let steps = chunks.len() as f32;
            progress.report(steps / (steps + 1.0));
            std::thread::yield_now();
        }

        let total = usize::try_from(received).map_err(|_| LoadError::TooLarge { len: received })?;
        let mut accumulated = Vec::with_capacity(total);
        for chunk in &chunks {
            accumulated.extend_from_slice(chunk);
        }
        progress.finish();
        info!(
            "Assembled {} bytes from {} stream chunks",
            received,
            chunks.len()
        );
        Ok(accumulated)
    }
}
