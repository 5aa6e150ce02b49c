//! Configuration types for image extraction.
//!
//! All extraction behaviour is controlled through [`ExtractConfig`], built via
//! its [`ExtractConfigBuilder`]. The config is fixed for the lifetime of an
//! [`crate::extract::ImageExtractor`]; nothing in it changes between images.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for an image extraction run.
///
/// # Example
/// ```rust
/// use edgequake_pdfimages::ExtractConfig;
///
/// let config = ExtractConfig::builder()
///     .file_root("out/img")
///     .output_png(true)
///     .dump_jpeg(true)
///     .build()
///     .unwrap();
/// assert!(config.output_png);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Prefix for every output file: `<root>[-<page>]-<num>.<ext>`.
    ///
    /// Required unless `list_images` is set.
    pub file_root: Option<PathBuf>,

    /// Insert the page number into file names. Default: false.
    pub page_names: bool,

    /// Print one summary row per image instead of writing files. Default: false.
    pub list_images: bool,

    /// Rendering of the listing rows. Default: [`ListingFormat::Table`].
    pub listing_format: ListingFormat,

    /// Write decoded images as PNG. Default: false.
    pub output_png: bool,

    /// Write decoded images as TIFF. Default: false.
    ///
    /// When both PNG and TIFF are enabled, CMYK images go to TIFF (PNG has no
    /// CMYK colour type) and everything else goes to PNG.
    pub output_tiff: bool,

    /// Copy DCT codestreams verbatim to `.jpg`. Default: false.
    pub dump_jpeg: bool,

    /// Copy JPX codestreams verbatim to `.jp2`. Default: false.
    pub dump_jp2: bool,

    /// Copy JBIG2 codestreams to `.jb2e` (+ `.jb2g` globals). Default: false.
    pub dump_jbig2: bool,

    /// Copy CCITT fax codestreams to `.ccitt` (+ `.params`). Default: false.
    pub dump_ccitt: bool,

    /// Number of background writer threads. Default: available parallelism.
    pub writer_threads: usize,

    /// Resolution recorded in PNG/TIFF headers. Default: 72.
    pub dpi: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            file_root: None,
            page_names: false,
            list_images: false,
            listing_format: ListingFormat::default(),
            output_png: false,
            output_tiff: false,
            dump_jpeg: false,
            dump_jp2: false,
            dump_jbig2: false,
            dump_ccitt: false,
            writer_threads: default_writer_threads(),
            dpi: 72,
        }
    }
}

impl ExtractConfig {
    /// Create a new builder for `ExtractConfig`.
    pub fn builder() -> ExtractConfigBuilder {
        ExtractConfigBuilder {
            config: Self::default(),
        }
    }

    /// Config for listing mode: no files are written.
    pub fn listing() -> Self {
        Self {
            list_images: true,
            ..Self::default()
        }
    }

    /// Check the constraints `build()` enforces. Useful when the struct was
    /// filled in directly or deserialised.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if !self.list_images {
            match &self.file_root {
                None => {
                    return Err(ExtractError::InvalidConfig(
                        "an output file root is required unless listing".into(),
                    ))
                }
                Some(root) if root.as_os_str().is_empty() => {
                    return Err(ExtractError::InvalidConfig(
                        "output file root must not be empty".into(),
                    ))
                }
                Some(_) => {}
            }
        }
        if self.writer_threads == 0 {
            return Err(ExtractError::InvalidConfig(
                "Writer threads must be ≥ 1".into(),
            ));
        }
        if self.dpi == 0 {
            return Err(ExtractError::InvalidConfig("DPI must be ≥ 1".into()));
        }
        Ok(())
    }
}

fn default_writer_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builder for [`ExtractConfig`].
#[derive(Debug)]
pub struct ExtractConfigBuilder {
    config: ExtractConfig,
}

impl ExtractConfigBuilder {
    pub fn file_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.file_root = Some(root.into());
        self
    }

    pub fn page_names(mut self, v: bool) -> Self {
        self.config.page_names = v;
        self
    }

    pub fn list_images(mut self, v: bool) -> Self {
        self.config.list_images = v;
        self
    }

    pub fn listing_format(mut self, format: ListingFormat) -> Self {
        self.config.listing_format = format;
        self
    }

    pub fn output_png(mut self, v: bool) -> Self {
        self.config.output_png = v;
        self
    }

    pub fn output_tiff(mut self, v: bool) -> Self {
        self.config.output_tiff = v;
        self
    }

    pub fn dump_jpeg(mut self, v: bool) -> Self {
        self.config.dump_jpeg = v;
        self
    }

    pub fn dump_jp2(mut self, v: bool) -> Self {
        self.config.dump_jp2 = v;
        self
    }

    pub fn dump_jbig2(mut self, v: bool) -> Self {
        self.config.dump_jbig2 = v;
        self
    }

    pub fn dump_ccitt(mut self, v: bool) -> Self {
        self.config.dump_ccitt = v;
        self
    }

    /// Enable every raw dump at once (`-all` in the CLI).
    pub fn dump_all(self) -> Self {
        self.dump_jpeg(true)
            .dump_jp2(true)
            .dump_jbig2(true)
            .dump_ccitt(true)
    }

    pub fn writer_threads(mut self, n: usize) -> Self {
        self.config.writer_threads = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How listing rows are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListingFormat {
    /// Fixed-width table with a two-line header. (default)
    #[default]
    Table,
    /// One JSON object per image, no header.
    JsonLines,
}
