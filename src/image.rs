//! Per-occurrence image description handed over by the content interpreter.
//!
//! Everything here is plain data: the interpreter fills an
//! [`ImageDescriptor`] once per image it meets on a page, and the rest of the
//! crate only ever reads it.

use crate::color::ColorMap;
use serde::{Deserialize, Serialize};

/// What role the image plays on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Ordinary sampled image.
    Image,
    /// Stencil mask painted in the current fill colour.
    Stencil,
    /// Explicit (1-bit) mask of a masked image.
    Mask,
    /// Soft mask (alpha channel) of an image.
    Smask,
}

impl ImageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Image => "image",
            ImageKind::Stencil => "stencil",
            ImageKind::Mask => "mask",
            ImageKind::Smask => "smask",
        }
    }
}

/// Colour space family of an image's colour map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpaceMode {
    DeviceGray,
    CalGray,
    DeviceRgb,
    CalRgb,
    DeviceCmyk,
    Lab,
    IccBased,
    Indexed,
    Separation,
    DeviceN,
    Pattern,
}

impl ColorSpaceMode {
    /// Short tag printed in the listing `color` column.
    pub fn tag(self) -> &'static str {
        match self {
            ColorSpaceMode::DeviceGray | ColorSpaceMode::CalGray => "gray",
            ColorSpaceMode::DeviceRgb | ColorSpaceMode::CalRgb => "rgb",
            ColorSpaceMode::DeviceCmyk => "cmyk",
            ColorSpaceMode::Lab => "lab",
            ColorSpaceMode::IccBased => "icc",
            ColorSpaceMode::Indexed => "index",
            ColorSpaceMode::Separation => "sep",
            ColorSpaceMode::DeviceN => "devn",
            ColorSpaceMode::Pattern => "-",
        }
    }
}

/// Outermost filter of the image's codestream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodestreamKind {
    /// Unfiltered sample data.
    Raw,
    Flate,
    Lzw,
    RunLength,
    Ascii85,
    AsciiHex,
    /// Baseline/progressive JPEG.
    Dct,
    /// JPEG 2000.
    Jpx,
    Jbig2,
    CcittFax,
}

impl CodestreamKind {
    /// Encoding tag printed in the listing `enc` column.
    pub fn encoding_tag(self) -> &'static str {
        match self {
            CodestreamKind::CcittFax => "ccitt",
            CodestreamKind::Dct => "jpeg",
            CodestreamKind::Jpx => "jpx",
            CodestreamKind::Jbig2 => "jbig2",
            _ => "image",
        }
    }
}

/// Indirect object reference of an image XObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub num: u32,
    pub generation: u32,
}

/// Current transformation matrix `[a b c d e f]` at the time the image is drawn.
pub type Ctm = [f64; 6];

/// Immutable description of one image occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
    /// `None` when there is no usable colour map (stencils, masks, broken maps).
    pub color_space: Option<ColorSpaceMode>,
    pub components: u32,
    pub bits_per_component: u8,
    pub is_inline: bool,
    pub codestream: CodestreamKind,
    pub interpolate: bool,
}

impl ImageDescriptor {
    /// Describe an image. A missing or invalid colour map yields the
    /// monochrome-mask defaults (1 component, 1 bit).
    pub fn new(
        width: u32,
        height: u32,
        kind: ImageKind,
        color_map: Option<&dyn ColorMap>,
        codestream: CodestreamKind,
    ) -> Self {
        let (color_space, components, bits_per_component) = match color_map {
            Some(map) if map.is_ok() => (Some(map.mode()), map.components(), map.bits()),
            _ => (None, 1, 1),
        };
        Self {
            width,
            height,
            kind,
            color_space,
            components,
            bits_per_component,
            is_inline: false,
            codestream,
            interpolate: false,
        }
    }

    pub fn inline(mut self, v: bool) -> Self {
        self.is_inline = v;
        self
    }

    pub fn interpolate(mut self, v: bool) -> Self {
        self.interpolate = v;
        self
    }

    /// Stencils and masks carry no colour of their own.
    pub fn is_mask(&self) -> bool {
        self.kind != ImageKind::Image
    }

    /// Size of the fully decoded samples in bytes.
    pub fn uncompressed_size(&self) -> u64 {
        let pixels = u64::from(self.width) * u64::from(self.height);
        if self.color_space.is_some() {
            pixels * u64::from(self.components) * u64::from(self.bits_per_component) / 8
        } else {
            pixels / 8
        }
    }
}

/// Parameters of a CCITT fax codestream, enough to drive an external decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaxParams {
    /// The `/K` entry: < 0 pure 2-D (G4), 0 pure 1-D (G3), > 0 mixed.
    pub encoding: i32,
    pub end_of_line: bool,
    pub columns: u32,
    pub black_is_1: bool,
}

impl FaxParams {
    /// Decoder-invocation flags, e.g. `-4 -P -X 1728 -B -M`, with trailing newline.
    ///
    /// `-M` is always present: PDF fax data is MSB-first.
    pub fn to_param_line(&self) -> String {
        let encoding = match self.encoding {
            k if k < 0 => "-4",
            0 => "-1",
            _ => "-2",
        };
        let eol = if self.end_of_line { "-A" } else { "-P" };
        let polarity = if self.black_is_1 { "-W" } else { "-B" };
        format!("{encoding} {eol} -X {} {polarity} -M\n", self.columns)
    }
}
