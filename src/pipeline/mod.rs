//! Pipeline stages for image extraction.
//!
//! Each submodule implements exactly one step between the interpreter's draw
//! call and a file on disk.
//!
//! ## Data Flow
//!
//! ```text
//! probe ──▶ select ──▶ raster ──▶ writer ──▶ sink
//! (inline)  (plan)     (decode)   (queue)    (encode)
//! ```
//!
//! 1. [`probe`]:  measure the embedded length of inline images without
//!    disturbing the content stream
//! 2. [`select`]: raw dump or raster; which container and pixel format
//! 3. [`raster`]: drain the decoded stream into an owned buffer; runs on the
//!    interpreter's thread because the stream belongs to the document
//! 4. [`writer`]: hand the buffer to a background worker; the only stage
//!    that runs concurrently
//! 5. [`sink`]:   PNG / TIFF / PNM row encoders

pub mod probe;
pub mod raster;
pub mod select;
pub mod sink;
pub mod writer;
