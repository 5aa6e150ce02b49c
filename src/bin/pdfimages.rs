//! CLI binary for edgequake-pdfimages.
//!
//! A thin shim over the library crate. Without a document parser in the
//! loop, each input file is one image: either raw samples (decoded output)
//! or a stored codestream (JPEG, JPEG 2000, JBIG2, CCITT). Input `n` is
//! drawn on page `n`, so the extractor numbers and names files exactly as it
//! would for a document with one image per page.

use anyhow::{Context, Result};
use clap::builder::TypedValueParser as _;
use clap::Parser;
use edgequake_pdfimages::{
    CodestreamKind, ColorMap, DeviceColorMap, ExtractConfig, ExtractSummary, FaxParams,
    ImageExtractor, ImageKind, ImageOccurrence, ImageStream, InlineImageStream, ListingFormat,
    MemoryImageStream, MemorySource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Decode 8-bit RGB samples to PNG: out/img-000.png
  pdfimages --width 640 --height 480 --colorspace rgb --png --root out/img samples.raw

  # Copy JPEG codestreams verbatim, page numbers in file names
  pdfimages -j -p --width 640 --height 480 --root out/img a.jpg b.jpg

  # CMYK to TIFF (PNG has no CMYK)
  pdfimages --png --tiff --colorspace cmyk --width 100 --height 100 --root out/k k.raw

  # List instead of writing
  pdfimages --list --width 16 --height 16 --colorspace none --kind stencil mask.bin

  # JSON lines listing
  pdfimages --list --json --width 640 --height 480 photo.jpg

OUTPUT FILES:
  <root>[-<page>]-<num>.<ext>   page and num are zero-padded to 3 digits
  ext: jpg jp2 jb2e jb2g ccitt params png tif ppm pbm

ENVIRONMENT VARIABLES:
  PDFIMAGES_THREADS   Number of background writer threads
  RUST_LOG            tracing filter, overrides -v / -q
"#;

/// Extract embedded images as codestreams or decoded PNG/TIFF/PNM files.
#[derive(Parser, Debug)]
#[command(
    name = "pdfimages",
    version,
    about = "Extract embedded images as codestreams or decoded PNG/TIFF/PNM files",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files: raw samples or stored codestreams, one image each.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file prefix (required unless --list).
    #[arg(short = 'o', long, env = "PDFIMAGES_ROOT")]
    root: Option<PathBuf>,

    /// Print one line per image instead of writing files.
    #[arg(short, long)]
    list: bool,

    /// With --list, print JSON lines instead of the table.
    #[arg(long, requires = "list")]
    json: bool,

    /// Write decoded images as PNG.
    #[arg(long)]
    png: bool,

    /// Write decoded images as TIFF.
    #[arg(long)]
    tiff: bool,

    /// Copy JPEG codestreams verbatim.
    #[arg(short = 'j', long = "jpeg")]
    jpeg: bool,

    /// Copy JPEG 2000 codestreams verbatim.
    #[arg(long)]
    jp2: bool,

    /// Copy JBIG2 codestreams verbatim.
    #[arg(long)]
    jbig2: bool,

    /// Copy CCITT fax codestreams verbatim (with a .params sidecar).
    #[arg(long)]
    ccitt: bool,

    /// Equivalent to --png --tiff -j --jp2 --jbig2 --ccitt.
    #[arg(long)]
    all: bool,

    /// Include the page number in output file names.
    #[arg(short = 'p', long)]
    page_names: bool,

    /// Background writer threads (default: available parallelism).
    #[arg(long, env = "PDFIMAGES_THREADS")]
    threads: Option<usize>,

    /// Resolution written to PNG/TIFF headers.
    #[arg(long, env = "PDFIMAGES_DPI", default_value_t = 72)]
    dpi: u32,

    /// Image width in pixels.
    #[arg(long)]
    width: u32,

    /// Image height in pixels.
    #[arg(long)]
    height: u32,

    /// Colour space of the samples; `none` for stencils and masks.
    #[arg(long, value_enum, default_value = "rgb")]
    colorspace: ColorSpaceArg,

    /// Bits per component of the samples.
    #[arg(long, default_value_t = 8,
          value_parser = clap::builder::PossibleValuesParser::new(["1", "2", "4", "8", "16"])
              .map(|s| s.parse::<u8>().unwrap_or(8)))]
    bpc: u8,

    /// Role of the image on the page.
    #[arg(long, value_enum, default_value = "image")]
    kind: KindArg,

    /// Codestream kind; guessed from the file extension when omitted.
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Treat inputs as inline images (no recorded length).
    #[arg(long)]
    inline: bool,

    /// JBIG2 globals segment shared by every input.
    #[arg(long)]
    jbig2_globals: Option<PathBuf>,

    /// CCITT /K parameter (<0 G4, 0 G3 1-D, >0 G3 2-D).
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    fax_k: i32,

    /// CCITT data has /BlackIs1 set.
    #[arg(long)]
    fax_black_is_1: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFIMAGES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFIMAGES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFIMAGES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ColorSpaceArg {
    None,
    Gray,
    Rgb,
    Cmyk,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Image,
    Stencil,
    Mask,
    Smask,
}

impl From<KindArg> for ImageKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::Image => ImageKind::Image,
            KindArg::Stencil => ImageKind::Stencil,
            KindArg::Mask => ImageKind::Mask,
            KindArg::Smask => ImageKind::Smask,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EncodingArg {
    Raw,
    Dct,
    Jpx,
    Jbig2,
    Ccitt,
}

impl From<EncodingArg> for CodestreamKind {
    fn from(v: EncodingArg) -> Self {
        match v {
            EncodingArg::Raw => CodestreamKind::Raw,
            EncodingArg::Dct => CodestreamKind::Dct,
            EncodingArg::Jpx => CodestreamKind::Jpx,
            EncodingArg::Jbig2 => CodestreamKind::Jbig2,
            EncodingArg::Ccitt => CodestreamKind::CcittFax,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.list;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let color_map = build_color_map(&cli);
    let globals = match &cli.jbig2_globals {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("Failed to read JBIG2 globals from {:?}", path))?,
        ),
        None => None,
    };

    // ── Run extraction ───────────────────────────────────────────────────
    let start = Instant::now();
    let bar = progress_bar(show_progress, cli.inputs.len());
    let mut extractor = ImageExtractor::new(config).context("Failed to start extractor")?;

    for (idx, path) in cli.inputs.iter().enumerate() {
        bar.set_message(path.display().to_string());
        extractor.start_page(idx as u32 + 1);

        let mut stream = open_input(&cli, path, globals.as_deref())
            .with_context(|| format!("Failed to read {:?}", path))?;
        let occurrence = ImageOccurrence::new(
            cli.width,
            cli.height,
            cli.kind.into(),
            color_map.as_ref().map(|m| m as &dyn ColorMap),
        )
        .inline(cli.inline);
        extractor.draw_image(stream.as_mut(), &occurrence);
        bar.inc(1);
    }

    bar.set_message("finishing writes…");
    let summary = extractor.finish();
    bar.finish_and_clear();

    if !cli.quiet && !cli.list {
        print_summary(&summary, start.elapsed());
    }
    Ok(())
}

/// Map CLI args to `ExtractConfig`.
fn build_config(cli: &Cli) -> Result<ExtractConfig> {
    let mut builder = ExtractConfig::builder()
        .page_names(cli.page_names)
        .list_images(cli.list)
        .listing_format(if cli.json {
            ListingFormat::JsonLines
        } else {
            ListingFormat::Table
        })
        .output_png(cli.png || cli.all)
        .output_tiff(cli.tiff || cli.all)
        .dump_jpeg(cli.jpeg)
        .dump_jp2(cli.jp2)
        .dump_jbig2(cli.jbig2)
        .dump_ccitt(cli.ccitt)
        .dpi(cli.dpi);

    if cli.all {
        builder = builder.dump_all();
    }
    if let Some(root) = &cli.root {
        builder = builder.file_root(root);
    }
    if let Some(n) = cli.threads {
        builder = builder.writer_threads(n);
    }
    builder.build().context("Invalid configuration")
}

fn build_color_map(cli: &Cli) -> Option<DeviceColorMap> {
    match cli.colorspace {
        ColorSpaceArg::None => None,
        ColorSpaceArg::Gray => Some(DeviceColorMap::device_gray(cli.bpc)),
        ColorSpaceArg::Rgb => Some(DeviceColorMap::device_rgb(cli.bpc)),
        ColorSpaceArg::Cmyk => Some(DeviceColorMap::device_cmyk(cli.bpc)),
    }
}

/// Guess the codestream kind from a file extension.
fn guess_encoding(path: &Path) -> CodestreamKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => CodestreamKind::Dct,
        Some("jp2" | "j2k" | "jpx") => CodestreamKind::Jpx,
        Some("jb2" | "jb2e" | "jbig2") => CodestreamKind::Jbig2,
        Some("ccitt" | "g3" | "g4") => CodestreamKind::CcittFax,
        _ => CodestreamKind::Raw,
    }
}

fn open_input(cli: &Cli, path: &Path, globals: Option<&[u8]>) -> Result<Box<dyn ImageStream>> {
    let bytes = std::fs::read(path)?;
    let kind = cli
        .encoding
        .map(CodestreamKind::from)
        .unwrap_or_else(|| guess_encoding(path));

    if kind == CodestreamKind::Raw {
        return Ok(if cli.inline {
            Box::new(InlineImageStream::new(MemorySource::new(bytes)))
        } else {
            Box::new(MemoryImageStream::unfiltered(bytes))
        });
    }

    // No decoder for stored codestreams here; unless dumped they come out
    // as all-zero rasters.
    if !cli.list {
        warn!("{:?}: {:?} codestream can only be dumped, not decoded", path, kind);
    }
    let mut stream = MemoryImageStream::new(kind, bytes, Vec::new());
    if let (CodestreamKind::Jbig2, Some(globals)) = (kind, globals) {
        stream = stream.with_jbig2_globals(globals);
    }
    if kind == CodestreamKind::CcittFax {
        stream = stream.with_fax_params(FaxParams {
            encoding: cli.fax_k,
            end_of_line: false,
            columns: cli.width,
            black_is_1: cli.fax_black_is_1,
        });
    }
    Ok(Box::new(stream))
}

fn progress_bar(show: bool, total: usize) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Extracting");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn print_summary(summary: &ExtractSummary, elapsed: Duration) {
    let failed = summary.jobs_failed + summary.raw_dump_failures;
    let written = summary.jobs_completed + summary.raw_dumps;
    eprintln!(
        "{}  {} images  {} files written  {}",
        if failed == 0 { green("✔") } else { red("✘") },
        bold(&summary.images.to_string()),
        written,
        dim(&format!("{}ms", elapsed.as_millis())),
    );
    if failed > 0 {
        eprintln!("   {} writes failed (see log)", red(&failed.to_string()));
    }
}
