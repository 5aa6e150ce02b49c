//! End-to-end tests: draw calls in, files and listings out.
//!
//! Every test writes into its own temporary directory and reads the results
//! back with the `image` crate (or byte-for-byte for dumps and NetPBM).

use edgequake_pdfimages::{
    CodestreamKind, ColorMap, DeviceColorMap, ExtractConfig, FaxParams, ImageExtractor,
    ImageOccurrence, InlineImageStream, ListingFormat, MemoryImageStream, MemorySource, ObjectRef,
};
use edgequake_pdfimages::{CodestreamSource, ImageStream};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Listing sink the test can read after the extractor is done with it.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn root(dir: &Path) -> PathBuf {
    dir.join("img")
}

fn writer(dir: &Path) -> edgequake_pdfimages::ExtractConfigBuilder {
    ExtractConfig::builder().file_root(root(dir)).writer_threads(2)
}

fn lister(format: ListingFormat) -> (ImageExtractor, SharedBuf) {
    let buf = SharedBuf::default();
    let config = ExtractConfig::builder()
        .list_images(true)
        .listing_format(format)
        .build()
        .unwrap();
    let extractor = ImageExtractor::with_listing_output(config, Box::new(buf.clone())).unwrap();
    (extractor, buf)
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Raster output ────────────────────────────────────────────────────────────

#[test]
fn rgb_identity_png_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).output_png(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    ex.start_page(1);

    let samples = vec![0u8, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110];
    let rgb = DeviceColorMap::device_rgb(8);
    let mut stream = MemoryImageStream::unfiltered(samples.clone());
    ex.draw_image(&mut stream, &ImageOccurrence::image(2, 2, &rgb));
    let summary = ex.finish();

    assert_eq!(summary.images, 1);
    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(summary.jobs_failed, 0);
    let img = image::open(dir.path().join("img-000.png")).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (2, 2));
    assert_eq!(img.as_raw(), &samples);
}

#[test]
fn sequence_numbers_are_dense_and_in_draw_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).writer_threads(4).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let rgb = DeviceColorMap::device_rgb(8);

    for i in 0..12u8 {
        ex.start_page(u32::from(i / 4) + 1);
        let mut stream = MemoryImageStream::unfiltered(vec![i; 3]);
        ex.draw_image(&mut stream, &ImageOccurrence::image(1, 1, &rgb));
    }
    assert_eq!(ex.next_image_number(), 12);
    let summary = ex.finish();
    assert_eq!(summary.jobs_completed, 12);

    let expected: Vec<String> = (0..12).map(|n| format!("img-{n:03}.ppm")).collect();
    assert_eq!(file_names(dir.path()), expected);
    for i in 0..12u8 {
        let bytes = std::fs::read(dir.path().join(format!("img-{i:03}.ppm"))).unwrap();
        assert_eq!(&bytes[bytes.len() - 3..], &[i, i, i]);
    }
}

#[test]
fn page_names_include_page_number() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).page_names(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let gray = DeviceColorMap::device_gray(8);

    ex.start_page(3);
    ex.draw_image(&mut MemoryImageStream::unfiltered(vec![1u8]), &ImageOccurrence::image(1, 1, &gray));
    ex.start_page(4);
    ex.draw_image(&mut MemoryImageStream::unfiltered(vec![2u8]), &ImageOccurrence::image(1, 1, &gray));
    ex.finish();

    assert_eq!(file_names(dir.path()), vec!["img-003-000.ppm", "img-004-001.ppm"]);
}

#[test]
fn truncated_image_has_zero_trailing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).output_png(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let gray = DeviceColorMap::device_gray(8);

    // 4x4 gray needs 16 bytes; 2.5 rows are present.
    let mut stream = MemoryImageStream::unfiltered(vec![200u8; 10]);
    ex.draw_image(&mut stream, &ImageOccurrence::image(4, 4, &gray));
    let summary = ex.finish();
    assert_eq!(summary.jobs_completed, 1);

    let img = image::open(dir.path().join("img-000.png")).unwrap().to_luma8();
    assert_eq!(img.dimensions(), (4, 4));
    let raw = img.as_raw();
    assert!(raw[..8].iter().all(|&p| p == 200));
    assert!(raw[8..].iter().all(|&p| p == 0), "got {raw:?}");
}

#[test]
fn sixteen_bit_rgb_png_is_wide() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).output_png(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let rgb16 = DeviceColorMap::device_rgb(16);

    let mut stream = MemoryImageStream::unfiltered(vec![0xff, 0x00, 0x80, 0x00, 0x00, 0x00]);
    ex.draw_image(&mut stream, &ImageOccurrence::image(1, 1, &rgb16));
    ex.finish();

    let img = image::open(dir.path().join("img-000.png")).unwrap();
    assert_eq!(img.color(), image::ColorType::Rgb16);
    assert_eq!(img.to_rgb16().as_raw(), &vec![65535, 32896, 0]);
}

#[test]
fn cmyk_goes_to_tiff_and_rgb_to_png() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).output_png(true).output_tiff(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let cmyk = DeviceColorMap::device_cmyk(8);
    let rgb = DeviceColorMap::device_rgb(8);

    ex.draw_image(&mut MemoryImageStream::unfiltered(vec![0u8; 4]), &ImageOccurrence::image(1, 1, &cmyk));
    ex.draw_image(&mut MemoryImageStream::unfiltered(vec![0u8; 3]), &ImageOccurrence::image(1, 1, &rgb));
    let summary = ex.finish();

    assert_eq!(summary.jobs_completed, 2);
    assert_eq!(file_names(dir.path()), vec!["img-000.tif", "img-001.png"]);
}

#[test]
fn stencil_pbm_keeps_painted_bits_black() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();

    let mut stream = MemoryImageStream::unfiltered(vec![0b1111_0000u8]);
    ex.draw_image_mask(&mut stream, 8, 1, false);
    ex.finish();

    let bytes = std::fs::read(dir.path().join("img-000.pbm")).unwrap();
    assert_eq!(bytes, b"P4\n8 1\n\xf0");
}

/// Draw one 8x1 1-bit gray image `0b0000_1111` and return the output path.
fn draw_one_bit_gray(dir: &Path, png: bool, map: &DeviceColorMap) -> PathBuf {
    let config = writer(dir).output_png(png).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let mut stream = MemoryImageStream::unfiltered(vec![0b0000_1111u8]);
    ex.draw_image(&mut stream, &ImageOccurrence::image(8, 1, map));
    let summary = ex.finish();
    assert_eq!(summary.jobs_completed, 1);
    dir.join(if png { "img-000.png" } else { "img-000.pbm" })
}

#[test]
fn one_bit_gray_keeps_black_samples_black() {
    let map = DeviceColorMap::device_gray(1);

    let dir = tempfile::tempdir().unwrap();
    let png = image::open(draw_one_bit_gray(dir.path(), true, &map)).unwrap().to_luma8();
    assert_eq!(png.as_raw(), &vec![0, 0, 0, 0, 255, 255, 255, 255]);

    let dir = tempfile::tempdir().unwrap();
    let pbm = std::fs::read(draw_one_bit_gray(dir.path(), false, &map)).unwrap();
    assert_eq!(pbm, b"P4\n8 1\n\xf0");
}

#[test]
fn one_bit_gray_with_reversed_decode_keeps_black_samples_black() {
    // With /Decode [1 0] a set bit is black.
    let map = DeviceColorMap::device_gray(1).with_decode(vec![(1.0, 0.0)]);

    let dir = tempfile::tempdir().unwrap();
    let png = image::open(draw_one_bit_gray(dir.path(), true, &map)).unwrap().to_luma8();
    assert_eq!(png.as_raw(), &vec![255, 255, 255, 255, 0, 0, 0, 0]);

    let dir = tempfile::tempdir().unwrap();
    let pbm = std::fs::read(draw_one_bit_gray(dir.path(), false, &map)).unwrap();
    assert_eq!(pbm, b"P4\n8 1\n\x0f");
}

#[test]
fn masked_image_writes_image_then_mask() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).output_png(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let rgb = DeviceColorMap::device_rgb(8);

    let mut image = MemoryImageStream::unfiltered(vec![9u8; 2 * 2 * 3]);
    let mut mask = MemoryImageStream::unfiltered(vec![0u8, 0]);
    ex.draw_masked_image(
        &mut image,
        &ImageOccurrence::image(2, 2, &rgb),
        &mut mask,
        &ImageOccurrence::stencil(2, 2),
    );
    let summary = ex.finish();

    assert_eq!(summary.jobs_completed, 2);
    let mask_png = image::open(dir.path().join("img-001.png")).unwrap().to_luma8();
    // Zero mask bits invert to opaque (white).
    assert!(mask_png.as_raw().iter().all(|&p| p == 255));
}

// ── Raw dumps ────────────────────────────────────────────────────────────────

#[test]
fn jpeg_dump_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).dump_jpeg(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let rgb = DeviceColorMap::device_rgb(8);

    let jpeg: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let mut stream = MemoryImageStream::new(CodestreamKind::Dct, jpeg.clone(), Vec::new());
    ex.draw_image(&mut stream, &ImageOccurrence::image(100, 100, &rgb));
    let summary = ex.finish();

    assert_eq!(summary.raw_dumps, 1);
    assert_eq!(summary.jobs_completed, 0);
    assert_eq!(std::fs::read(dir.path().join("img-000.jpg")).unwrap(), jpeg);
}

#[test]
fn ccitt_dump_writes_params_sidecar_with_same_number() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).dump_ccitt(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();

    let params = FaxParams {
        encoding: -1,
        end_of_line: false,
        columns: 1728,
        black_is_1: false,
    };
    let mut fax = MemoryImageStream::new(CodestreamKind::CcittFax, vec![1u8, 2, 3], Vec::new())
        .with_fax_params(params);
    ex.draw_image(&mut fax, &ImageOccurrence::stencil(1728, 10));
    let mut next = MemoryImageStream::new(CodestreamKind::CcittFax, vec![4u8], Vec::new())
        .with_fax_params(params);
    ex.draw_image(&mut next, &ImageOccurrence::stencil(1728, 1));
    ex.finish();

    assert_eq!(
        file_names(dir.path()),
        vec!["img-000.ccitt", "img-000.params", "img-001.ccitt", "img-001.params"]
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("img-000.params")).unwrap(),
        "-4 -P -X 1728 -B -M\n"
    );
}

#[test]
fn jbig2_globals_share_number_with_embedded_stream() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).dump_jbig2(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();

    let mut stream = MemoryImageStream::new(CodestreamKind::Jbig2, vec![0x97u8, 0x4a], Vec::new())
        .with_jbig2_globals(vec![0xaau8]);
    ex.draw_image(&mut stream, &ImageOccurrence::stencil(8, 8));
    ex.finish();

    assert_eq!(file_names(dir.path()), vec!["img-000.jb2e", "img-000.jb2g"]);
    assert_eq!(std::fs::read(dir.path().join("img-000.jb2g")).unwrap(), vec![0xaa]);
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[test]
fn unopenable_output_fails_only_that_job() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where img-001.ppm should go makes that one create() fail.
    std::fs::create_dir(dir.path().join("img-001.ppm")).unwrap();
    let config = writer(dir.path()).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let rgb = DeviceColorMap::device_rgb(8);

    for i in 0..3u8 {
        ex.draw_image(&mut MemoryImageStream::unfiltered(vec![i; 3]), &ImageOccurrence::image(1, 1, &rgb));
    }
    let summary = ex.finish();

    assert_eq!(summary.jobs_completed, 2);
    assert_eq!(summary.jobs_failed, 1);
    assert!(dir.path().join("img-000.ppm").is_file());
    assert!(dir.path().join("img-002.ppm").is_file());
}

#[test]
fn dropping_the_extractor_drains_pending_writes() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).output_png(true).build().unwrap();
    let gray = DeviceColorMap::device_gray(8);
    {
        let mut ex = ImageExtractor::new(config).unwrap();
        for _ in 0..5 {
            let mut stream = MemoryImageStream::unfiltered(vec![128u8; 64 * 64]);
            ex.draw_image(&mut stream, &ImageOccurrence::image(64, 64, &gray));
        }
    }
    assert_eq!(file_names(dir.path()).len(), 5);
    for n in 0..5 {
        let img = image::open(dir.path().join(format!("img-{n:03}.png"))).unwrap();
        assert_eq!(img.width(), 64);
    }
}

// ── Inline images ────────────────────────────────────────────────────────────

#[test]
fn inline_image_leaves_content_stream_after_image_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = writer(dir.path()).output_png(true).build().unwrap();
    let mut ex = ImageExtractor::new(config).unwrap();
    let gray = DeviceColorMap::device_gray(8);

    let mut content = vec![1u8, 2, 3, 4];
    content.extend_from_slice(b"EI Q");
    let mut stream = InlineImageStream::new(MemorySource::new(content));
    ex.draw_image(&mut stream, &ImageOccurrence::image(2, 2, &gray).inline(true));

    let rest: Vec<u8> = std::iter::from_fn(|| stream.decoded().get_char()).collect();
    assert_eq!(rest, b"EI Q");
    ex.finish();

    let img = image::open(dir.path().join("img-000.png")).unwrap().to_luma8();
    assert_eq!(img.as_raw(), &vec![1, 2, 3, 4]);
}

// ── Listing ──────────────────────────────────────────────────────────────────

#[test]
fn listing_prints_header_and_rows_without_writing_files() {
    let (mut ex, buf) = lister(ListingFormat::Table);
    let rgb = DeviceColorMap::device_rgb(8);

    ex.start_page(1);
    let mut photo = MemoryImageStream::new(CodestreamKind::Dct, vec![0u8; 12_000], Vec::new());
    let occ = ImageOccurrence::image(100, 100, &rgb).object(ObjectRef { num: 7, generation: 0 });
    ex.draw_image(&mut photo, &occ);

    let mut stencil = MemoryImageStream::unfiltered(vec![0u8; 32]).with_embedded_length(None);
    ex.draw_image_mask(&mut stencil, 16, 16, false);
    let summary = ex.finish();
    assert_eq!(summary.images, 2);

    let text = buf.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("page   num  type"));
    assert_eq!(lines[1], "-".repeat(92));
    assert_eq!(
        lines[2],
        "   1     0 image     100   100  rgb     3   8  jpeg   no         7  0    72    72 11.7K  40%"
    );
    assert!(lines[3].starts_with("   1     1 stencil    16    16  -       1   1  image  no   [none]"));
    assert!(lines[3].ends_with("   -    - "), "got: {:?}", lines[3]);
}

#[test]
fn listing_measures_inline_images() {
    let (mut ex, buf) = lister(ListingFormat::Table);
    let rgb = DeviceColorMap::device_rgb(8);

    let mut content = vec![5u8; 12];
    content.extend_from_slice(b"EI");
    let mut stream = InlineImageStream::new(MemorySource::new(content));
    ex.draw_image(&mut stream, &ImageOccurrence::image(2, 2, &rgb).inline(true));

    // Content stream continues right after the image bytes.
    assert_eq!(stream.decoded().get_char(), Some(b'E'));
    ex.finish();

    let text = buf.text();
    let row = text.lines().nth(2).unwrap();
    assert!(row.contains("[inline]"), "got: {row:?}");
    assert!(row.ends_with("  12B 100%"), "got: {row:?}");
}

#[test]
fn json_listing_has_no_header() {
    let (mut ex, buf) = lister(ListingFormat::JsonLines);
    let gray: &dyn ColorMap = &DeviceColorMap::device_gray(8);

    ex.start_page(2);
    ex.draw_image(&mut MemoryImageStream::unfiltered(vec![0u8; 4]), &ImageOccurrence::image(2, 2, gray));
    ex.finish();

    let text = buf.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let row: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(row["page"], 2);
    assert_eq!(row["color"], "gray");
    assert_eq!(row["size"], 4);
}
