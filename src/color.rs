//! Colour maps and per-row colour resolution.
//!
//! A [`ColorMap`] turns the raw component samples of one pixel into a device
//! colour. The decoder stores samples unpacked, one byte per component, so a
//! pixel is always `components` consecutive bytes.
//!
//! [`resolve_row`] is the resolver the writer jobs call for every scanline:
//! samples in, quantised 8- or 16-bit channels out.

use crate::image::ColorSpaceMode;
use crate::pipeline::raster::RasterFormat;
use std::fmt;

/// Normalised RGB, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// Normalised CMYK, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cmyk {
    pub c: f64,
    pub m: f64,
    pub y: f64,
    pub k: f64,
}

/// Colour conversion capability of an image's colour space.
///
/// Implementations must be cheap to [`snapshot`](ColorMap::snapshot): the
/// extractor copies the map into every queued write job because the
/// interpreter may free its own copy as soon as the draw call returns.
pub trait ColorMap: Send + Sync + fmt::Debug {
    /// Whether the map was constructed from a usable colour space.
    fn is_ok(&self) -> bool {
        true
    }

    fn mode(&self) -> ColorSpaceMode;

    /// Components per pixel.
    fn components(&self) -> u32;

    /// Bits per component in the encoded stream.
    fn bits(&self) -> u8;

    /// Gray level of one pixel, 0 = black.
    fn gray(&self, pixel: &[u8]) -> f64;

    fn rgb(&self, pixel: &[u8]) -> Rgb;

    fn cmyk(&self, pixel: &[u8]) -> Cmyk;

    /// Owned deep copy for handing to another thread.
    fn snapshot(&self) -> Box<dyn ColorMap>;
}

/// Quantise a normalised channel to 8 bits.
pub fn col_to_byte(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Quantise a normalised channel to 16 bits.
pub fn col_to_short(v: f64) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Colour map for device, calibrated and ICC spaces, converted by component
/// count (1 = gray, 3 = RGB, 4 = CMYK) with an optional decode range per
/// component.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceColorMap {
    mode: ColorSpaceMode,
    components: u32,
    bits: u8,
    decode: Vec<(f64, f64)>,
    ok: bool,
}

impl DeviceColorMap {
    pub fn new(mode: ColorSpaceMode, components: u32, bits: u8) -> Self {
        let ok = matches!(components, 1 | 3 | 4) && matches!(bits, 1 | 2 | 4 | 8 | 16);
        Self {
            mode,
            components,
            bits,
            decode: vec![(0.0, 1.0); components as usize],
            ok,
        }
    }

    pub fn device_gray(bits: u8) -> Self {
        Self::new(ColorSpaceMode::DeviceGray, 1, bits)
    }

    pub fn device_rgb(bits: u8) -> Self {
        Self::new(ColorSpaceMode::DeviceRgb, 3, bits)
    }

    pub fn device_cmyk(bits: u8) -> Self {
        Self::new(ColorSpaceMode::DeviceCmyk, 4, bits)
    }

    /// Replace the decode ranges (`/Decode [d0min d0max ...]`). A length that
    /// does not match the component count marks the map invalid.
    pub fn with_decode(mut self, ranges: Vec<(f64, f64)>) -> Self {
        if ranges.len() != self.components as usize {
            self.ok = false;
        }
        self.decode = ranges;
        self
    }

    /// Largest stored sample value. 16-bit streams keep only the high byte.
    fn max_sample(&self) -> f64 {
        f64::from((1u32 << self.bits.min(8)) - 1)
    }

    fn component(&self, pixel: &[u8], i: usize) -> f64 {
        let sample = pixel.get(i).copied().unwrap_or(0);
        let (lo, hi) = self.decode.get(i).copied().unwrap_or((0.0, 1.0));
        let max = self.max_sample();
        let v = f64::from(sample.min(max as u8)) / max;
        (lo + v * (hi - lo)).clamp(0.0, 1.0)
    }

    fn to_rgb(&self, pixel: &[u8]) -> Rgb {
        match self.components {
            1 => {
                let g = self.component(pixel, 0);
                Rgb { r: g, g, b: g }
            }
            4 => {
                let c = self.cmyk(pixel);
                Rgb {
                    r: 1.0 - (c.c + c.k).min(1.0),
                    g: 1.0 - (c.m + c.k).min(1.0),
                    b: 1.0 - (c.y + c.k).min(1.0),
                }
            }
            _ => Rgb {
                r: self.component(pixel, 0),
                g: self.component(pixel, 1),
                b: self.component(pixel, 2),
            },
        }
    }
}

impl ColorMap for DeviceColorMap {
    fn is_ok(&self) -> bool {
        self.ok
    }

    fn mode(&self) -> ColorSpaceMode {
        self.mode
    }

    fn components(&self) -> u32 {
        self.components
    }

    fn bits(&self) -> u8 {
        self.bits
    }

    fn gray(&self, pixel: &[u8]) -> f64 {
        match self.components {
            1 => self.component(pixel, 0),
            4 => {
                let c = self.cmyk(pixel);
                1.0 - (0.3 * c.c + 0.59 * c.m + 0.11 * c.y + c.k).min(1.0)
            }
            _ => {
                let c = self.to_rgb(pixel);
                (0.3 * c.r + 0.59 * c.g + 0.11 * c.b).clamp(0.0, 1.0)
            }
        }
    }

    fn rgb(&self, pixel: &[u8]) -> Rgb {
        self.to_rgb(pixel)
    }

    fn cmyk(&self, pixel: &[u8]) -> Cmyk {
        match self.components {
            4 => Cmyk {
                c: self.component(pixel, 0),
                m: self.component(pixel, 1),
                y: self.component(pixel, 2),
                k: self.component(pixel, 3),
            },
            _ => {
                let rgb = self.to_rgb(pixel);
                let (c, m, y) = (1.0 - rgb.r, 1.0 - rgb.g, 1.0 - rgb.b);
                let k = c.min(m).min(y);
                Cmyk {
                    c: c - k,
                    m: m - k,
                    y: y - k,
                    k,
                }
            }
        }
    }

    fn snapshot(&self) -> Box<dyn ColorMap> {
        Box::new(self.clone())
    }
}

/// Resolve one scanline of samples into `out` in the given raster format.
///
/// `samples` is `None` for rows past the end of a truncated buffer; those rows
/// come out all-zero. `out` must be exactly `format.row_bytes(width)` long.
pub fn resolve_row(
    format: RasterFormat,
    map: Option<&dyn ColorMap>,
    samples: Option<&[u8]>,
    width: usize,
    out: &mut [u8],
) {
    let (samples, map) = match (samples, map, format) {
        (Some(s), _, RasterFormat::Monochrome) => {
            let n = s.len().min(out.len());
            out[..n].copy_from_slice(&s[..n]);
            out[n..].fill(0);
            return;
        }
        (Some(s), Some(m), _) => (s, m),
        _ => {
            out.fill(0);
            return;
        }
    };

    let comps = (map.components() as usize).max(1);
    let pixels = samples.chunks_exact(comps).take(width);
    let produced = samples.len() / comps;
    match format {
        RasterFormat::Monochrome => {}
        RasterFormat::Gray8 => {
            for (px, o) in pixels.zip(out.iter_mut()) {
                *o = col_to_byte(map.gray(px));
            }
        }
        RasterFormat::Rgb24 => {
            for (px, o) in pixels.zip(out.chunks_exact_mut(3)) {
                let c = map.rgb(px);
                o[0] = col_to_byte(c.r);
                o[1] = col_to_byte(c.g);
                o[2] = col_to_byte(c.b);
            }
        }
        RasterFormat::Rgb48 => {
            for (px, o) in pixels.zip(out.chunks_exact_mut(6)) {
                let c = map.rgb(px);
                o[0..2].copy_from_slice(&col_to_short(c.r).to_be_bytes());
                o[2..4].copy_from_slice(&col_to_short(c.g).to_be_bytes());
                o[4..6].copy_from_slice(&col_to_short(c.b).to_be_bytes());
            }
        }
        RasterFormat::Cmyk32 => {
            for (px, o) in pixels.zip(out.chunks_exact_mut(4)) {
                let c = map.cmyk(px);
                o[0] = col_to_byte(c.c);
                o[1] = col_to_byte(c.m);
                o[2] = col_to_byte(c.y);
                o[3] = col_to_byte(c.k);
            }
        }
    }
    // Short sample rows leave the tail black rather than stale.
    let done = produced.min(width) * format.bytes_per_pixel();
    if done < out.len() {
        out[done..].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rgb_round_trips_bytes() {
        let map = DeviceColorMap::device_rgb(8);
        let samples = [0u8, 17, 255, 128, 64, 3];
        let mut out = [0u8; 6];
        resolve_row(RasterFormat::Rgb24, Some(&map), Some(&samples), 2, &mut out);
        assert_eq!(out, samples);
    }

    #[test]
    fn gray_low_bit_depth_scales_to_full_range() {
        let map = DeviceColorMap::device_gray(2);
        let samples = [0u8, 1, 2, 3];
        let mut out = [0u8; 4];
        resolve_row(RasterFormat::Gray8, Some(&map), Some(&samples), 4, &mut out);
        assert_eq!(out, [0, 85, 170, 255]);
    }

    #[test]
    fn rgb48_is_big_endian_and_scaled() {
        let map = DeviceColorMap::device_rgb(16);
        let samples = [255u8, 0, 128];
        let mut out = [0u8; 6];
        resolve_row(RasterFormat::Rgb48, Some(&map), Some(&samples), 1, &mut out);
        assert_eq!(&out[0..2], &[0xff, 0xff]);
        assert_eq!(&out[2..4], &[0, 0]);
        let mid = u16::from_be_bytes([out[4], out[5]]);
        assert_eq!(mid, col_to_short(128.0 / 255.0));
    }

    #[test]
    fn cmyk_passes_components_through() {
        let map = DeviceColorMap::device_cmyk(8);
        let samples = [10u8, 20, 30, 40];
        let mut out = [0u8; 4];
        resolve_row(RasterFormat::Cmyk32, Some(&map), Some(&samples), 1, &mut out);
        assert_eq!(out, samples);
    }

    #[test]
    fn missing_row_is_zero_filled() {
        let map = DeviceColorMap::device_rgb(8);
        let mut out = [9u8; 6];
        resolve_row(RasterFormat::Rgb24, Some(&map), None, 2, &mut out);
        assert_eq!(out, [0; 6]);
    }

    #[test]
    fn monochrome_copies_packed_bits() {
        let mut out = [0u8; 2];
        resolve_row(RasterFormat::Monochrome, None, Some(&[0b1010_0000u8, 0xff][..]), 9, &mut out);
        assert_eq!(out, [0b1010_0000, 0xff]);
    }

    #[test]
    fn decode_array_inverts_gray() {
        let map = DeviceColorMap::device_gray(1).with_decode(vec![(1.0, 0.0)]);
        assert!(map.is_ok());
        assert_eq!(map.gray(&[0]), 1.0);
        assert_eq!(map.gray(&[1]), 0.0);
    }

    #[test]
    fn bad_decode_length_invalidates_map() {
        let map = DeviceColorMap::device_rgb(8).with_decode(vec![(0.0, 1.0)]);
        assert!(!map.is_ok());
    }

    #[test]
    fn unsupported_geometry_is_not_ok() {
        assert!(!DeviceColorMap::new(ColorSpaceMode::DeviceN, 2, 8).is_ok());
        assert!(!DeviceColorMap::new(ColorSpaceMode::DeviceRgb, 3, 7).is_ok());
    }

    #[test]
    fn cmyk_to_rgb_and_gray() {
        let map = DeviceColorMap::device_cmyk(8);
        let black = [0u8, 0, 0, 255];
        assert_eq!(map.rgb(&black), Rgb { r: 0.0, g: 0.0, b: 0.0 });
        assert_eq!(map.gray(&black), 0.0);
        let white = [0u8, 0, 0, 0];
        assert_eq!(map.gray(&white), 1.0);
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let map = DeviceColorMap::device_gray(8);
        let snap = map.snapshot();
        drop(map);
        assert_eq!(snap.components(), 1);
        assert_eq!(snap.gray(&[255]), 1.0);
    }
}
