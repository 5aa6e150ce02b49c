//! # edgequake-pdfimages
//!
//! Extract the raster images embedded in a paginated document, either as the
//! stored codestreams (JPEG, JPEG 2000, JBIG2, CCITT fax) or as decoded
//! PNG / TIFF / NetPBM files.
//!
//! ## Why this crate?
//!
//! Decoding is cheap next to re-encoding: a page interpreter can produce
//! samples far faster than a PNG compressor can swallow them. This crate
//! keeps decoding on the interpreter's thread (the streams belong to the
//! document) and moves colour conversion and encoding to a pool of
//! background writers, so a long document is limited by the interpreter,
//! not by zlib.
//!
//! ## Pipeline Overview
//!
//! ```text
//! draw_image (interpreter thread)
//!  │
//!  ├─ 1. Probe   inline images: measure embedded length, keep content stream intact
//!  ├─ 2. Select  raw dump, or raster container + pixel format
//!  ├─ 3. Decode  drain samples into an owned buffer (truncated on short data)
//!  └─ 4. Queue   WriteJob ──▶ writer pool ──▶ colour resolve ──▶ PNG/TIFF/PNM sink
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfimages::{
//!     DeviceColorMap, ExtractConfig, ImageExtractor, ImageOccurrence, MemoryImageStream,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractConfig::builder()
//!         .file_root("out/img")
//!         .output_png(true)
//!         .dump_jpeg(true)
//!         .build()?;
//!     let mut extractor = ImageExtractor::new(config)?;
//!
//!     extractor.start_page(1);
//!     let gray = DeviceColorMap::device_gray(8);
//!     let mut stream = MemoryImageStream::unfiltered(vec![0u8; 64 * 64]);
//!     extractor.draw_image(&mut stream, &ImageOccurrence::image(64, 64, &gray));
//!
//!     let summary = extractor.finish();
//!     eprintln!("{} images, {} failed", summary.images, summary.jobs_failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Output Files
//!
//! | Extension | Written when |
//! |-----------|--------------|
//! | `jpg`     | DCT codestream and `dump_jpeg` |
//! | `jp2`     | JPX codestream and `dump_jp2` |
//! | `jb2e` / `jb2g` | JBIG2 codestream (+ globals) and `dump_jbig2` |
//! | `ccitt` / `params` | fax codestream (+ decoder flags) and `dump_ccitt` |
//! | `png`     | `output_png` |
//! | `tif`     | `output_tiff` (or CMYK when both PNG and TIFF are on) |
//! | `ppm` / `pbm` | neither PNG nor TIFF enabled |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfimages` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfimages = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod color;
pub mod config;
pub mod error;
pub mod extract;
pub mod image;
pub mod pipeline;
pub mod report;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use color::{ColorMap, DeviceColorMap};
pub use config::{ExtractConfig, ExtractConfigBuilder, ListingFormat};
pub use error::{ExtractError, JobError, SinkError};
pub use extract::{ExtractSummary, ImageExtractor, ImageOccurrence};
pub use image::{CodestreamKind, ColorSpaceMode, FaxParams, ImageDescriptor, ImageKind, ObjectRef};
pub use pipeline::probe::{EmbedStream, InlineCursor, InlineImageStream};
pub use pipeline::raster::RasterFormat;
pub use pipeline::select::Container;
pub use report::ListingRow;
pub use source::{CodestreamSource, ImageStream, MemoryImageStream, MemorySource, SampleSource};
