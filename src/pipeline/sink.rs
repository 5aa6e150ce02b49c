//! Stage 5: Row-oriented image encoders.
//!
//! A [`RowSink`] receives a freshly created output file, the image geometry,
//! then exactly `height` resolved rows, then `close`. The three sinks map
//! [`RasterFormat`]s onto container colour types:
//!
//! | Format       | PNG            | TIFF            | PNM   |
//! |--------------|----------------|-----------------|-------|
//! | `Monochrome` | gray, 1 bit    | Gray8 (0/255)   | P4    |
//! | `Gray8`      | gray, 8 bit    | Gray8           | -     |
//! | `Rgb24`      | RGB, 8 bit     | RGB8            | P6    |
//! | `Rgb48`      | RGB, 16 bit    | RGB16           | -     |
//! | `Cmyk32`     | -              | CMYK8           | -     |
//!
//! Monochrome rows arrive with bit 1 = white. PBM stores 1 = black, so the
//! PNM sink inverts on the way out.

use crate::error::SinkError;
use crate::pipeline::raster::RasterFormat;
use crate::pipeline::select::Container;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use tiff::encoder::{colortype, Rational, TiffEncoder, TiffValue};
use tiff::tags::ResolutionUnit;

/// Streaming encoder for one output file.
pub trait RowSink: Send {
    fn init(&mut self, file: File, width: u32, height: u32, x_dpi: f64, y_dpi: f64) -> Result<(), SinkError>;

    /// Append one row of `format.row_bytes(width)` bytes.
    fn write_row(&mut self, row: &[u8]) -> Result<(), SinkError>;

    /// Finish the container and flush the file.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Sink for `format` in `container`.
pub fn new_sink(container: Container, format: RasterFormat) -> Box<dyn RowSink> {
    match container {
        Container::Png => Box::new(PngSink::new(format)),
        Container::Tiff => Box::new(TiffSink::new(format)),
        Container::Pnm => Box::new(PnmSink::new(format)),
    }
}

/// Row bookkeeping shared by all sinks.
#[derive(Debug, Clone, Copy)]
struct RowCounter {
    row_bytes: usize,
    height: u32,
    written: u32,
}

impl RowCounter {
    fn new(format: RasterFormat, width: u32, height: u32) -> Self {
        Self {
            row_bytes: format.row_bytes(width as usize),
            height,
            written: 0,
        }
    }

    fn accept(&mut self, row: &[u8]) -> Result<(), SinkError> {
        if row.len() != self.row_bytes {
            return Err(SinkError::RowLength {
                expected: self.row_bytes,
                actual: row.len(),
            });
        }
        if self.written >= self.height {
            return Err(SinkError::TooManyRows {
                height: self.height,
            });
        }
        self.written += 1;
        Ok(())
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), SinkError> {
    if width == 0 || height == 0 {
        return Err(SinkError::Dimensions { width, height });
    }
    Ok(())
}

// ── PNG ──────────────────────────────────────────────────────────────────

/// PNG written row by row through the encoder's stream writer.
pub struct PngSink {
    format: RasterFormat,
    state: Option<(png::StreamWriter<'static, File>, RowCounter)>,
}

impl PngSink {
    pub fn new(format: RasterFormat) -> Self {
        Self { format, state: None }
    }
}

/// Pixels per metre for a dots-per-inch value.
fn dpi_to_ppm(dpi: f64) -> u32 {
    (dpi / 0.0254).round() as u32
}

impl RowSink for PngSink {
    fn init(&mut self, file: File, width: u32, height: u32, x_dpi: f64, y_dpi: f64) -> Result<(), SinkError> {
        check_dimensions(width, height)?;
        let (color, depth) = match self.format {
            RasterFormat::Monochrome => (png::ColorType::Grayscale, png::BitDepth::One),
            RasterFormat::Gray8 => (png::ColorType::Grayscale, png::BitDepth::Eight),
            RasterFormat::Rgb24 => (png::ColorType::Rgb, png::BitDepth::Eight),
            RasterFormat::Rgb48 => (png::ColorType::Rgb, png::BitDepth::Sixteen),
            RasterFormat::Cmyk32 => {
                return Err(SinkError::Unsupported {
                    container: "PNG",
                    format: self.format.as_str(),
                })
            }
        };

        let mut encoder = png::Encoder::new(file, width, height);
        encoder.set_color(color);
        encoder.set_depth(depth);
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: dpi_to_ppm(x_dpi),
            yppu: dpi_to_ppm(y_dpi),
            unit: png::Unit::Meter,
        }));
        let writer = encoder.write_header()?.into_stream_writer()?;
        self.state = Some((writer, RowCounter::new(self.format, width, height)));
        Ok(())
    }

    fn write_row(&mut self, row: &[u8]) -> Result<(), SinkError> {
        let (writer, rows) = self.state.as_mut().ok_or(SinkError::NotInitialised)?;
        rows.accept(row)?;
        writer.write_all(row)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let (writer, _) = self.state.take().ok_or(SinkError::NotInitialised)?;
        writer.finish()?;
        Ok(())
    }
}

// ── TIFF ─────────────────────────────────────────────────────────────────

/// TIFF sink. The encoder takes whole strips, so rows are collected and the
/// image is encoded on `close`.
pub struct TiffSink {
    format: RasterFormat,
    state: Option<TiffState>,
}

struct TiffState {
    out: BufWriter<File>,
    width: u32,
    height: u32,
    dpi: (f64, f64),
    rows: RowCounter,
    data: Vec<u8>,
}

impl TiffSink {
    pub fn new(format: RasterFormat) -> Self {
        Self { format, state: None }
    }
}

impl RowSink for TiffSink {
    fn init(&mut self, file: File, width: u32, height: u32, x_dpi: f64, y_dpi: f64) -> Result<(), SinkError> {
        check_dimensions(width, height)?;
        let rows = RowCounter::new(self.format, width, height);
        self.state = Some(TiffState {
            out: BufWriter::new(file),
            width,
            height,
            dpi: (x_dpi, y_dpi),
            rows,
            data: Vec::with_capacity(rows.row_bytes * height as usize),
        });
        Ok(())
    }

    fn write_row(&mut self, row: &[u8]) -> Result<(), SinkError> {
        let state = self.state.as_mut().ok_or(SinkError::NotInitialised)?;
        state.rows.accept(row)?;
        match self.format {
            RasterFormat::Monochrome => {
                let width = state.width as usize;
                state.data.extend(
                    (0..width).map(|x| if row[x / 8] & (0x80 >> (x % 8)) != 0 { 255 } else { 0 }),
                );
            }
            _ => state.data.extend_from_slice(row),
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.take().ok_or(SinkError::NotInitialised)?;
        let (w, h, dpi) = (state.width, state.height, state.dpi);
        {
            let mut encoder = TiffEncoder::new(&mut state.out)?;
            match self.format {
                RasterFormat::Monochrome | RasterFormat::Gray8 => {
                    encode_tiff::<colortype::Gray8, _>(&mut encoder, w, h, dpi, &state.data)?
                }
                RasterFormat::Rgb24 => encode_tiff::<colortype::RGB8, _>(&mut encoder, w, h, dpi, &state.data)?,
                RasterFormat::Rgb48 => {
                    let words: Vec<u16> = state
                        .data
                        .chunks_exact(2)
                        .map(|b| u16::from_be_bytes([b[0], b[1]]))
                        .collect();
                    encode_tiff::<colortype::RGB16, _>(&mut encoder, w, h, dpi, &words)?
                }
                RasterFormat::Cmyk32 => encode_tiff::<colortype::CMYK8, _>(&mut encoder, w, h, dpi, &state.data)?,
            }
        }
        state.out.flush()?;
        Ok(())
    }
}

fn encode_tiff<C, W>(
    encoder: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    (x_dpi, y_dpi): (f64, f64),
    data: &[C::Inner],
) -> Result<(), SinkError>
where
    C: colortype::ColorType,
    W: Write + Seek,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(width, height)?;
    image.resolution_unit(ResolutionUnit::Inch);
    image.x_resolution(Rational {
        n: x_dpi.round() as u32,
        d: 1,
    });
    image.y_resolution(Rational {
        n: y_dpi.round() as u32,
        d: 1,
    });
    image.write_data(data)?;
    Ok(())
}

// ── PNM ──────────────────────────────────────────────────────────────────

/// Binary PBM (P4) or PPM (P6). No resolution field exists.
pub struct PnmSink {
    format: RasterFormat,
    state: Option<(BufWriter<File>, RowCounter)>,
    scratch: Vec<u8>,
}

impl PnmSink {
    pub fn new(format: RasterFormat) -> Self {
        Self {
            format,
            state: None,
            scratch: Vec::new(),
        }
    }
}

impl RowSink for PnmSink {
    fn init(&mut self, file: File, width: u32, height: u32, _x_dpi: f64, _y_dpi: f64) -> Result<(), SinkError> {
        let mut out = BufWriter::new(file);
        match self.format {
            RasterFormat::Monochrome => write!(out, "P4\n{width} {height}\n")?,
            RasterFormat::Rgb24 => write!(out, "P6\n{width} {height}\n255\n")?,
            other => {
                return Err(SinkError::Unsupported {
                    container: "PNM",
                    format: other.as_str(),
                })
            }
        }
        self.state = Some((out, RowCounter::new(self.format, width, height)));
        Ok(())
    }

    fn write_row(&mut self, row: &[u8]) -> Result<(), SinkError> {
        let (out, rows) = self.state.as_mut().ok_or(SinkError::NotInitialised)?;
        rows.accept(row)?;
        if self.format == RasterFormat::Monochrome {
            self.scratch.clear();
            self.scratch.extend(row.iter().map(|b| !b));
            out.write_all(&self.scratch)?;
        } else {
            out.write_all(row)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let (mut out, _) = self.state.take().ok_or(SinkError::NotInitialised)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_all(sink: &mut dyn RowSink, path: &std::path::Path, w: u32, h: u32, rows: &[&[u8]]) {
        let file = File::create(path).unwrap();
        sink.init(file, w, h, 72.0, 72.0).unwrap();
        for row in rows {
            sink.write_row(row).unwrap();
        }
        sink.close().unwrap();
    }

    #[test]
    fn pbm_inverts_to_black_is_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.pbm");
        let mut sink = PnmSink::new(RasterFormat::Monochrome);
        write_all(&mut sink, &path, 8, 1, &[&[0b1111_0000]]);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, b"P4\n8 1\n\x0f");
    }

    #[test]
    fn ppm_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.ppm");
        let mut sink = PnmSink::new(RasterFormat::Rgb24);
        write_all(&mut sink, &path, 1, 2, &[&[1, 2, 3], &[4, 5, 6]]);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, b"P6\n1 2\n255\n\x01\x02\x03\x04\x05\x06");
    }

    #[test]
    fn pnm_rejects_gray() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("g.pgm")).unwrap();
        let mut sink = PnmSink::new(RasterFormat::Gray8);
        let err = sink.init(file, 1, 1, 72.0, 72.0).unwrap_err();
        assert!(matches!(err, SinkError::Unsupported { .. }));
    }

    #[test]
    fn wrong_row_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("x.ppm")).unwrap();
        let mut sink = PnmSink::new(RasterFormat::Rgb24);
        sink.init(file, 2, 1, 72.0, 72.0).unwrap();
        let err = sink.write_row(&[0; 3]).unwrap_err();
        assert!(matches!(err, SinkError::RowLength { expected: 6, actual: 3 }));
    }

    #[test]
    fn extra_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("x.png")).unwrap();
        let mut sink = PngSink::new(RasterFormat::Gray8);
        sink.init(file, 1, 1, 72.0, 72.0).unwrap();
        sink.write_row(&[9]).unwrap();
        assert!(matches!(sink.write_row(&[9]), Err(SinkError::TooManyRows { height: 1 })));
    }

    #[test]
    fn write_before_init_fails() {
        let mut sink = TiffSink::new(RasterFormat::Rgb24);
        assert!(matches!(sink.write_row(&[0; 3]), Err(SinkError::NotInitialised)));
    }

    #[test]
    fn png_rejects_cmyk_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("x.png")).unwrap();
        assert!(PngSink::new(RasterFormat::Cmyk32).init(file, 1, 1, 72.0, 72.0).is_err());
        let file = File::create(dir.path().join("y.png")).unwrap();
        assert!(matches!(
            PngSink::new(RasterFormat::Rgb24).init(file, 0, 4, 72.0, 72.0),
            Err(SinkError::Dimensions { width: 0, height: 4 })
        ));
    }

    #[test]
    fn png_rgb_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.png");
        let mut sink = new_sink(Container::Png, RasterFormat::Rgb24);
        write_all(sink.as_mut(), &path, 2, 1, &[&[10, 20, 30, 40, 50, 60]]);
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.as_raw(), &vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn tiff_cmyk_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.tif");
        let mut sink = new_sink(Container::Tiff, RasterFormat::Cmyk32);
        write_all(sink.as_mut(), &path, 1, 1, &[&[1, 2, 3, 4]]);
        let mut decoder = tiff::decoder::Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (1, 1));
        assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::CMYK(8));
    }

    #[test]
    fn tiff_monochrome_expands_to_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.tif");
        let mut sink = new_sink(Container::Tiff, RasterFormat::Monochrome);
        write_all(sink.as_mut(), &path, 3, 1, &[&[0b1010_0000]]);
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.as_raw(), &vec![255, 0, 255]);
    }
}
