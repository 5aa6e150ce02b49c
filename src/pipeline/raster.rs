//! Stage 3: Decode an image into an owned raster buffer.
//!
//! Decoding always happens on the interpreter's thread: the decoded stream
//! belongs to the document and cannot be read once the draw call returns.
//! The buffer produced here is what travels to a writer job.
//!
//! ## Buffer layout
//!
//! | Format       | Row stride           | Contents                      |
//! |--------------|----------------------|-------------------------------|
//! | `Monochrome` | `ceil(width / 8)`    | packed bits, 1 = white/opaque |
//! | other        | `width * components` | one byte per component        |
//!
//! Colour conversion is deferred to the job; the buffer keeps raw samples.

use crate::color::{col_to_byte, ColorMap};
use crate::source::{CodestreamSource, ImageStream, PackedSampleSource, SampleSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pixel layout handed to a row sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterFormat {
    /// 1 bit per pixel, packed MSB first.
    Monochrome,
    Gray8,
    Rgb24,
    /// 16 bits per channel, big-endian.
    Rgb48,
    Cmyk32,
}

impl RasterFormat {
    /// Bytes per pixel of a resolved row. Monochrome rows are packed and
    /// report 0; use [`row_bytes`](Self::row_bytes) for them.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            RasterFormat::Monochrome => 0,
            RasterFormat::Gray8 => 1,
            RasterFormat::Rgb24 => 3,
            RasterFormat::Rgb48 => 6,
            RasterFormat::Cmyk32 => 4,
        }
    }

    /// Length of one resolved output row.
    pub fn row_bytes(self, width: usize) -> usize {
        match self {
            RasterFormat::Monochrome => width.div_ceil(8),
            other => width * other.bytes_per_pixel(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RasterFormat::Monochrome => "monochrome",
            RasterFormat::Gray8 => "gray8",
            RasterFormat::Rgb24 => "rgb24",
            RasterFormat::Rgb48 => "rgb48",
            RasterFormat::Cmyk32 => "cmyk32",
        }
    }
}

/// Decoded, not yet colour-resolved image data.
///
/// `data` holds only whole rows. A source that ran dry leaves
/// `data.len() < row_stride * height`; the missing rows are written as zeros
/// by the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    pub format: RasterFormat,
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub data: Vec<u8>,
}

impl RasterBuffer {
    /// Rows actually decoded.
    pub fn rows_present(&self) -> u32 {
        if self.row_stride == 0 {
            return self.height;
        }
        (self.data.len() / self.row_stride).min(self.height as usize) as u32
    }

    pub fn is_truncated(&self) -> bool {
        self.rows_present() < self.height
    }

    /// Row `y`, or `None` if it was never decoded.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let start = y as usize * self.row_stride;
        self.data.get(start..start + self.row_stride)
    }
}

/// XOR mask applied to monochrome bytes so that bit 1 means white/opaque.
///
/// Stencils and masks (no colour map) are inverted: 0 paints, 1 leaves the
/// page alone. A colour map whose zero sample is already black (plain
/// DeviceGray) keeps its bits; any other map (e.g. `/Decode [1 0]`) is
/// inverted.
pub fn mono_invert_mask(color_map: Option<&dyn ColorMap>) -> u8 {
    match color_map {
        Some(map) if map.is_ok() => {
            let zero = vec![0u8; map.components().max(1) as usize];
            if col_to_byte(map.gray(&zero)) == 0 {
                0x00
            } else {
                0xff
            }
        }
        _ => 0xff,
    }
}

/// Drain `stream` into a [`RasterBuffer`] for the given output format.
///
/// The stream is reset first and closed afterwards. Only whole rows are kept.
pub fn decode_raster(
    format: RasterFormat,
    stream: &mut dyn ImageStream,
    width: u32,
    height: u32,
    color_map: Option<&dyn ColorMap>,
) -> RasterBuffer {
    let map = color_map.filter(|m| m.is_ok());
    let buffer = match (format, map) {
        (RasterFormat::Monochrome, _) | (_, None) => {
            decode_mono(stream.decoded(), width, height, mono_invert_mask(map))
        }
        (_, Some(map)) => decode_samples(stream.decoded(), width, height, map),
    };
    let buffer = RasterBuffer { format, ..buffer };
    debug!(
        "Decoded {}x{} {} raster: {}/{} rows",
        width,
        height,
        format.as_str(),
        buffer.rows_present(),
        height
    );
    buffer
}

fn decode_mono(src: &mut dyn CodestreamSource, width: u32, height: u32, invert: u8) -> RasterBuffer {
    let row_stride = (width as usize).div_ceil(8);
    let mut data = Vec::with_capacity(row_stride * height as usize);
    src.reset();
    'rows: for _ in 0..height {
        let start = data.len();
        for _ in 0..row_stride {
            match src.get_char() {
                Some(c) => data.push(c ^ invert),
                None => {
                    data.truncate(start);
                    break 'rows;
                }
            }
        }
    }
    src.close();
    RasterBuffer {
        format: RasterFormat::Monochrome,
        width,
        height,
        row_stride,
        data,
    }
}

fn decode_samples(
    src: &mut dyn CodestreamSource,
    width: u32,
    height: u32,
    map: &dyn ColorMap,
) -> RasterBuffer {
    let comps = map.components().max(1);
    let row_stride = width as usize * comps as usize;
    let mut data = Vec::with_capacity(row_stride * height as usize);
    let mut samples = PackedSampleSource::new(src, width, comps, map.bits());
    samples.reset();
    for _ in 0..height {
        match samples.get_line() {
            Some(line) => data.extend_from_slice(line),
            None => break,
        }
    }
    samples.close();
    RasterBuffer {
        format: RasterFormat::Rgb24,
        width,
        height,
        row_stride,
        data,
    }
}
