//! The extraction context driven by a page-content interpreter.
//!
//! The interpreter walks the document and, for every image it meets, calls
//! one of the `draw_*` methods with the image's stream and geometry. An
//! [`ImageExtractor`] then either lists the image, copies its codestream
//! verbatim, or decodes it and queues a background write.
//!
//! ```rust,no_run
//! use edgequake_pdfimages::{
//!     DeviceColorMap, ExtractConfig, ImageExtractor, ImageOccurrence, MemoryImageStream,
//! };
//!
//! let config = ExtractConfig::builder().file_root("out/img").output_png(true).build()?;
//! let mut extractor = ImageExtractor::new(config)?;
//! extractor.start_page(1);
//!
//! let rgb = DeviceColorMap::device_rgb(8);
//! let mut stream = MemoryImageStream::unfiltered(vec![255u8; 2 * 2 * 3]);
//! extractor.draw_image(&mut stream, &ImageOccurrence::image(2, 2, &rgb));
//!
//! let summary = extractor.finish();
//! assert_eq!(summary.images, 1);
//! # Ok::<(), edgequake_pdfimages::ExtractError>(())
//! ```
//!
//! Sequence numbers are assigned on the calling thread, in draw order, so
//! file names are deterministic even though files are finished out of order.

use crate::color::ColorMap;
use crate::config::{ExtractConfig, ListingFormat};
use crate::error::{ExtractError, JobError};
use crate::image::{CodestreamKind, Ctm, ImageDescriptor, ImageKind, ObjectRef};
use crate::pipeline::raster::{decode_raster, RasterFormat};
use crate::pipeline::select::{select_output, Container, OutputPlan, RawDump};
use crate::pipeline::writer::{execute, JobStats, WriteJob, WriterPool};
use crate::pipeline::probe;
use crate::report::{ListingRow, LISTING_HEADER};
use crate::source::{CodestreamSource, ImageStream};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Geometry and context of one image as the interpreter sees it.
#[derive(Debug, Clone, Copy)]
pub struct ImageOccurrence<'a> {
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
    pub color_map: Option<&'a dyn ColorMap>,
    /// Indirect reference of the image XObject; `None` for inline images.
    pub object: Option<ObjectRef>,
    /// CTM at draw time. Defaults to one point per pixel (72 ppi).
    pub ctm: Ctm,
    pub is_inline: bool,
    pub interpolate: bool,
}

impl<'a> ImageOccurrence<'a> {
    pub fn new(width: u32, height: u32, kind: ImageKind, color_map: Option<&'a dyn ColorMap>) -> Self {
        Self {
            width,
            height,
            kind,
            color_map,
            object: None,
            ctm: [f64::from(width), 0.0, 0.0, f64::from(height), 0.0, 0.0],
            is_inline: false,
            interpolate: false,
        }
    }

    /// A colour image.
    pub fn image(width: u32, height: u32, color_map: &'a dyn ColorMap) -> Self {
        Self::new(width, height, ImageKind::Image, Some(color_map))
    }

    /// A 1-bit stencil mask painted in the fill colour.
    pub fn stencil(width: u32, height: u32) -> Self {
        Self::new(width, height, ImageKind::Stencil, None)
    }

    pub fn inline(mut self, v: bool) -> Self {
        self.is_inline = v;
        self
    }

    pub fn object(mut self, object: ObjectRef) -> Self {
        self.object = Some(object);
        self
    }

    pub fn ctm(mut self, ctm: Ctm) -> Self {
        self.ctm = ctm;
        self
    }

    pub fn interpolate(mut self, v: bool) -> Self {
        self.interpolate = v;
        self
    }

    fn with_kind(mut self, kind: ImageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Colour map, if it is usable.
    fn valid_map(&self) -> Option<&'a dyn ColorMap> {
        self.color_map.filter(|m| m.is_ok())
    }

    pub fn descriptor(&self, codestream: CodestreamKind) -> ImageDescriptor {
        ImageDescriptor::new(self.width, self.height, self.kind, self.color_map, codestream)
            .inline(self.is_inline)
            .interpolate(self.interpolate)
    }
}

/// Outcome of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    /// Images seen (listed, dumped or queued).
    pub images: u32,
    /// Raw codestream files written.
    pub raw_dumps: usize,
    pub raw_dump_failures: usize,
    /// Background raster writes that finished.
    pub jobs_completed: usize,
    pub jobs_failed: usize,
}

/// Per-document extraction state: page, sequence number, writer pool and
/// listing sink.
pub struct ImageExtractor {
    config: ExtractConfig,
    page: u32,
    next_num: u32,
    pool: Option<WriterPool>,
    stats: Arc<JobStats>,
    listing: Box<dyn Write + Send>,
    raw_dumps: usize,
    raw_dump_failures: usize,
    finished: bool,
}

impl ImageExtractor {
    /// Extractor printing its listing (if any) to stdout.
    pub fn new(config: ExtractConfig) -> Result<Self, ExtractError> {
        Self::with_listing_output(config, Box::new(io::stdout()))
    }

    /// Extractor printing its listing to `out`. In table mode the header is
    /// written immediately.
    pub fn with_listing_output(config: ExtractConfig, out: Box<dyn Write + Send>) -> Result<Self, ExtractError> {
        config.validate()?;
        let mut extractor = Self {
            config,
            page: 0,
            next_num: 0,
            pool: None,
            stats: Arc::new(JobStats::default()),
            listing: out,
            raw_dumps: 0,
            raw_dump_failures: 0,
            finished: false,
        };
        if extractor.config.list_images && extractor.config.listing_format == ListingFormat::Table {
            extractor
                .listing
                .write_all(LISTING_HEADER.as_bytes())
                .map_err(|source| ExtractError::ListingWriteFailed { source })?;
        }
        Ok(extractor)
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Set the page number used in listings and page-named files.
    pub fn start_page(&mut self, page: u32) {
        debug!("Page {}", page);
        self.page = page;
    }

    /// Sequence number the next image will get.
    pub fn next_image_number(&self) -> u32 {
        self.next_num
    }

    /// Handle one image occurrence.
    pub fn draw_image(&mut self, stream: &mut dyn ImageStream, image: &ImageOccurrence<'_>) {
        let desc = image.descriptor(stream.kind());
        if self.config.list_images {
            self.list_image(stream, image, &desc);
        } else {
            self.write_image(stream, image, &desc);
        }
    }

    /// A stencil mask: 1-bit, no colour map.
    pub fn draw_image_mask(&mut self, stream: &mut dyn ImageStream, width: u32, height: u32, inline: bool) {
        self.draw_image(stream, &ImageOccurrence::stencil(width, height).inline(inline));
    }

    /// An image with an explicit mask. The image comes first, then the mask.
    pub fn draw_masked_image(
        &mut self,
        stream: &mut dyn ImageStream,
        image: &ImageOccurrence<'_>,
        mask_stream: &mut dyn ImageStream,
        mask: &ImageOccurrence<'_>,
    ) {
        self.draw_image(stream, image);
        self.draw_image(mask_stream, &mask.with_kind(ImageKind::Mask));
    }

    /// An image with a soft mask. The image comes first, then the soft mask.
    pub fn draw_soft_masked_image(
        &mut self,
        stream: &mut dyn ImageStream,
        image: &ImageOccurrence<'_>,
        mask_stream: &mut dyn ImageStream,
        mask: &ImageOccurrence<'_>,
    ) {
        self.draw_image(stream, image);
        self.draw_image(mask_stream, &mask.with_kind(ImageKind::Smask));
    }

    /// Wait for every queued write and return the run's totals.
    pub fn finish(mut self) -> ExtractSummary {
        self.shutdown();
        ExtractSummary {
            images: self.next_num,
            raw_dumps: self.raw_dumps,
            raw_dump_failures: self.raw_dump_failures,
            jobs_completed: self.stats.completed(),
            jobs_failed: self.stats.failed(),
        }
    }

    // ── Listing ──────────────────────────────────────────────────────────

    fn list_image(&mut self, stream: &mut dyn ImageStream, image: &ImageOccurrence<'_>, desc: &ImageDescriptor) {
        let embedded = if desc.is_inline {
            let len = probe::measure(stream, image.width, image.height, image.valid_map());
            probe::restore(stream);
            len
        } else {
            stream.embedded_length()
        };

        let row = ListingRow::new(self.page, self.next_num, desc, image.object, &image.ctm, embedded);
        self.next_num += 1;

        let written = match self.config.listing_format {
            ListingFormat::Table => writeln!(self.listing, "{row}"),
            ListingFormat::JsonLines => match row.to_json() {
                Ok(json) => writeln!(self.listing, "{json}"),
                Err(e) => Err(io::Error::other(e)),
            },
        };
        if let Err(source) = written {
            warn!("{}", ExtractError::ListingWriteFailed { source });
        }
    }

    // ── Writing ──────────────────────────────────────────────────────────

    fn write_image(&mut self, stream: &mut dyn ImageStream, image: &ImageOccurrence<'_>, desc: &ImageDescriptor) {
        // Inline data must be captured before decoding so the content stream
        // can be put back where the interpreter expects it.
        let probed = desc.is_inline
            && probe::measure(stream, image.width, image.height, image.valid_map()).is_some();

        match select_output(&self.config, desc) {
            OutputPlan::Raw(kind) => self.dump_raw(stream, kind),
            OutputPlan::Raster { container, format } => {
                self.dispatch_raster(stream, image, container, format)
            }
        }

        if probed {
            probe::restore(stream);
        }
    }

    fn dump_raw(&mut self, stream: &mut dyn ImageStream, kind: RawDump) {
        match kind {
            RawDump::Jbig2 => {
                // Shares its number with the .jb2e that follows.
                let path = self.output_path("jb2g");
                if let Some(globals) = stream.jbig2_globals() {
                    self.record_dump(copy_codestream(globals, &path));
                }
            }
            RawDump::Ccitt => {
                let path = self.output_path("params");
                match stream.fax_params() {
                    Some(params) => {
                        let result = std::fs::write(&path, params.to_param_line())
                            .map(|()| 0)
                            .map_err(|source| JobError::Open { path, source });
                        self.record_dump(result);
                    }
                    None => warn!("CCITT image without decode parameters; no .params written"),
                }
            }
            RawDump::Jpeg | RawDump::Jp2 => {}
        }

        let path = self.output_path(kind.extension());
        self.next_num += 1;
        self.record_dump(copy_codestream(stream.encoded(), &path));
    }

    fn record_dump(&mut self, result: Result<u64, JobError>) {
        match result {
            Ok(bytes) => {
                debug!("Dumped {} bytes", bytes);
                self.raw_dumps += 1;
            }
            Err(e) => {
                error!("{e}");
                self.raw_dump_failures += 1;
            }
        }
    }

    fn dispatch_raster(
        &mut self,
        stream: &mut dyn ImageStream,
        image: &ImageOccurrence<'_>,
        container: Container,
        format: RasterFormat,
    ) {
        let path = self.output_path(container.extension(format));
        self.next_num += 1;

        let map = image.valid_map();
        let raster = decode_raster(format, stream, image.width, image.height, map);
        let job = WriteJob::new(path, container, raster, map, f64::from(self.config.dpi));
        self.submit(job);
    }

    fn submit(&mut self, job: WriteJob) {
        if self.pool.is_none() {
            match WriterPool::new(self.config.writer_threads, Arc::clone(&self.stats)) {
                Ok(pool) => {
                    info!("Started image writer pool ({} threads)", self.config.writer_threads);
                    self.pool = Some(pool);
                }
                Err(e) => {
                    warn!("{e}; writing on the calling thread");
                    execute(job, &self.stats);
                    return;
                }
            }
        }
        if let Some(pool) = &self.pool {
            pool.submit(job);
        }
    }

    /// `<root>[-<page>]-<num>.<ext>` for the current page and number.
    fn output_path(&self, ext: &str) -> PathBuf {
        let page = self.config.page_names.then_some(self.page);
        let root = self.config.file_root.as_deref().unwrap_or(Path::new(""));
        output_path(root, page, self.next_num, ext)
    }

    fn shutdown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(mut pool) = self.pool.take() {
            pool.drain();
        }
        if let Err(e) = self.listing.flush() {
            warn!("Failed to flush image listing: {e}");
        }
        info!(
            "Extracted {} image(s): {} raster written, {} failed, {} raw dump(s)",
            self.next_num,
            self.stats.completed(),
            self.stats.failed(),
            self.raw_dumps
        );
    }
}

impl Drop for ImageExtractor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build an output file name. The root is used as a prefix, not a directory.
pub fn output_path(root: &Path, page: Option<u32>, num: u32, ext: &str) -> PathBuf {
    let mut name = OsString::from(root.as_os_str());
    match page {
        Some(page) => name.push(format!("-{page:03}-{num:03}.{ext}")),
        None => name.push(format!("-{num:03}.{ext}")),
    }
    PathBuf::from(name)
}

const DUMP_CHUNK: usize = 8192;

/// Copy a codestream byte for byte. Returns the number of bytes written.
fn copy_codestream(src: &mut dyn CodestreamSource, path: &Path) -> Result<u64, JobError> {
    let file = File::create(path).map_err(|source| JobError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let dump_err = |source| JobError::Dump {
        path: path.to_path_buf(),
        source,
    };

    let mut out = BufWriter::new(file);
    let mut chunk = Vec::with_capacity(DUMP_CHUNK);
    let mut total = 0u64;
    src.reset();
    while let Some(c) = src.get_char() {
        chunk.push(c);
        if chunk.len() == DUMP_CHUNK {
            out.write_all(&chunk).map_err(dump_err)?;
            total += chunk.len() as u64;
            chunk.clear();
        }
    }
    src.close();
    out.write_all(&chunk).map_err(dump_err)?;
    total += chunk.len() as u64;
    out.flush().map_err(dump_err)?;
    Ok(total)
}
