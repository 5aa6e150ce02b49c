//! Error types for the edgequake-pdfimages library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Caller-facing**: the extractor cannot be set up
//!   (bad configuration, writer pool failed to start). Returned as
//!   `Err(ExtractError)` from constructors and builders.
//!
//! * [`JobError`]: **Non-fatal**: writing a single image failed (output file
//!   could not be opened, the encoder rejected a row). It is logged with the
//!   offending path and counted in [`crate::extract::ExtractSummary`]; sibling
//!   images are never affected.
//!
//! Nothing that happens while walking a document is fatal. Lower decode
//! layers failing only show up here as a sample source running dry, which
//! truncates the image instead of erroring.
//!
//! [`SinkError`] is the encoder-level error surfaced by
//! [`crate::pipeline::sink::RowSink`] implementations; jobs wrap it into a
//! [`JobError`] together with the output path.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the edgequake-pdfimages library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pool errors ───────────────────────────────────────────────────────
    /// The background writer runtime could not be created.
    #[error("Failed to start image writer pool: {source}")]
    PoolStartFailed {
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write to the listing output.
    #[error("Failed to write image listing: {source}")]
    ListingWriteFailed {
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal error for a single output file.
#[derive(Debug, Error)]
pub enum JobError {
    /// The output file could not be created.
    #[error("Couldn't open image file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The row sink refused its header (dimensions, colour type, DPI).
    #[error("Error writing '{path}': {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: SinkError,
    },

    /// A scanline could not be written.
    #[error("Error writing row {row} of '{path}': {source}")]
    Row {
        path: PathBuf,
        row: u32,
        #[source]
        source: SinkError,
    },

    /// Finishing the encoder or flushing the file failed.
    #[error("Error closing '{path}': {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: SinkError,
    },

    /// Copying a raw codestream to disk failed part-way.
    #[error("Error dumping codestream to '{path}': {source}")]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job panicked; the panic was contained to this job.
    #[error("Writer job for '{path}' panicked: {detail}")]
    Panicked { path: PathBuf, detail: String },
}

impl JobError {
    /// Output path the failing job was writing.
    pub fn path(&self) -> &std::path::Path {
        match self {
            JobError::Open { path, .. }
            | JobError::Init { path, .. }
            | JobError::Row { path, .. }
            | JobError::Close { path, .. }
            | JobError::Dump { path, .. }
            | JobError::Panicked { path, .. } => path,
        }
    }
}

/// Encoder-level failure inside a row sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("PNG encoder: {0}")]
    Png(#[from] png::EncodingError),

    #[error("TIFF encoder: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// A row of the wrong length was handed to the sink.
    #[error("row is {actual} bytes, expected {expected}")]
    RowLength { expected: usize, actual: usize },

    /// More rows were written than the height given to `init`.
    #[error("too many rows: image height is {height}")]
    TooManyRows { height: u32 },

    /// `write_row`/`close` called before a successful `init`.
    #[error("sink used before init")]
    NotInitialised,

    /// Dimensions the encoder cannot represent.
    #[error("unsupported dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },

    /// The container has no colour type for this raster format.
    #[error("{container} cannot store {format} rasters")]
    Unsupported {
        container: &'static str,
        format: &'static str,
    },
}
