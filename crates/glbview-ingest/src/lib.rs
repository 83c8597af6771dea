//! Bounded-memory chunked ingestion for large glTF binaries.
//!
//! This library assembles a large binary payload (local file or HTTP
//! stream) into one contiguous buffer without holding more than one
//! chunk in transit, reports monotonic progress while doing so, and
//! performs the bookkeeping that follows a successful parse: container
//! validation, triangle/vertex counting, bounding-volume computation
//! and the normalization transform that fits a scene into a fixed
//! reference size.
//!
//! Parsing itself is delegated to the `gltf` crate; rendering is the
//! caller's business.

pub mod glb;
pub mod loader;
pub mod progress;
pub mod scene;
pub mod source;

pub use loader::{
    CancelToken, ChunkedByteLoader, LoadError, FALLBACK_CHUNK_SIZE, HIGH_CAPABILITY_CHUNK_SIZE,
};
pub use progress::{Progress, ProgressPhase, ProgressTracker};
pub use scene::{Aabb, NormalizationTransform, ParseError, SceneSummary, REFERENCE_SIZE};
pub use source::{ByteSource, SourceError};

/// Union of everything that can go wrong during one ingestion attempt.
///
/// Any variant aborts the attempt wholesale; no partial scene is ever
/// produced and no layer retries internally. Retrying means invoking
/// the pipeline again with a fresh source.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Source(#[from] source::SourceError),

    #[error(transparent)]
    Load(#[from] loader::LoadError),

    #[error(transparent)]
    Container(#[from] glb::GlbError),

    #[error(transparent)]
    Parse(#[from] scene::ParseError),
}

impl IngestError {
    /// True when the failure is the recognized allocation-failure
    /// signature, so callers can suggest a compressed or smaller file
    /// instead of showing a generic parse error.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::Parse(scene::ParseError::OutOfMemory(_)))
    }
}
