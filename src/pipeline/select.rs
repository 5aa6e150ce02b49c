//! Stage 2: Pick what gets written for an image.
//!
//! Raw dumps win over raster output: if the codestream is a kind the config
//! asks to dump verbatim, the bytes are copied and nothing is decoded.
//! Otherwise a container is chosen from the enabled outputs, then the richest
//! raster format that container can represent.

use crate::config::ExtractConfig;
use crate::image::{CodestreamKind, ColorSpaceMode, ImageDescriptor};
use crate::pipeline::raster::RasterFormat;

/// Output file container for decoded rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Png,
    Tiff,
    /// PBM for monochrome, PPM for everything else.
    Pnm,
}

impl Container {
    pub fn supports_gray(self) -> bool {
        !matches!(self, Container::Pnm)
    }

    pub fn supports_wide(self) -> bool {
        !matches!(self, Container::Pnm)
    }

    pub fn supports_cmyk(self) -> bool {
        matches!(self, Container::Tiff)
    }

    /// File extension for a raster of `format` in this container.
    pub fn extension(self, format: RasterFormat) -> &'static str {
        match (self, format) {
            (Container::Png, _) => "png",
            (Container::Tiff, _) => "tif",
            (Container::Pnm, RasterFormat::Monochrome) => "pbm",
            (Container::Pnm, _) => "ppm",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Container::Png => "PNG",
            Container::Tiff => "TIFF",
            Container::Pnm => "PNM",
        }
    }
}

/// Codestream kinds that can be copied out untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDump {
    Jpeg,
    Jp2,
    Jbig2,
    Ccitt,
}

impl RawDump {
    pub fn extension(self) -> &'static str {
        match self {
            RawDump::Jpeg => "jpg",
            RawDump::Jp2 => "jp2",
            RawDump::Jbig2 => "jb2e",
            RawDump::Ccitt => "ccitt",
        }
    }
}

/// What the extractor does with one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPlan {
    Raw(RawDump),
    Raster {
        container: Container,
        format: RasterFormat,
    },
}

/// Decide the output for one image.
///
/// JPEG dumps apply to inline images too; JPX and JBIG2 never occur inline,
/// so those dumps are only taken for stream objects.
pub fn select_output(config: &ExtractConfig, desc: &ImageDescriptor) -> OutputPlan {
    if let Some(raw) = raw_dump(config, desc) {
        return OutputPlan::Raw(raw);
    }
    let container = select_container(config, desc);
    OutputPlan::Raster {
        container,
        format: select_format(container, desc),
    }
}

fn raw_dump(config: &ExtractConfig, desc: &ImageDescriptor) -> Option<RawDump> {
    match desc.codestream {
        CodestreamKind::Dct if config.dump_jpeg => Some(RawDump::Jpeg),
        CodestreamKind::Jpx if config.dump_jp2 && !desc.is_inline => Some(RawDump::Jp2),
        CodestreamKind::Jbig2 if config.dump_jbig2 && !desc.is_inline => Some(RawDump::Jbig2),
        CodestreamKind::CcittFax if config.dump_ccitt => Some(RawDump::Ccitt),
        _ => None,
    }
}

/// PNG when enabled, except CMYK goes to TIFF when that is enabled too.
/// With neither, PNM.
pub fn select_container(config: &ExtractConfig, desc: &ImageDescriptor) -> Container {
    if config.output_png && !(config.output_tiff && is_cmyk_family(desc)) {
        Container::Png
    } else if config.output_tiff {
        Container::Tiff
    } else {
        Container::Pnm
    }
}

pub fn select_format(container: Container, desc: &ImageDescriptor) -> RasterFormat {
    if desc.color_space.is_none() || (desc.components == 1 && desc.bits_per_component == 1) {
        RasterFormat::Monochrome
    } else if is_gray_family(desc) && container.supports_gray() {
        RasterFormat::Gray8
    } else if is_cmyk_family(desc) && container.supports_cmyk() {
        RasterFormat::Cmyk32
    } else if is_rgb_family(desc) && desc.bits_per_component > 8 && container.supports_wide() {
        RasterFormat::Rgb48
    } else {
        RasterFormat::Rgb24
    }
}

pub fn is_gray_family(desc: &ImageDescriptor) -> bool {
    matches!(
        desc.color_space,
        Some(ColorSpaceMode::DeviceGray | ColorSpaceMode::CalGray)
    )
}

pub fn is_rgb_family(desc: &ImageDescriptor) -> bool {
    match desc.color_space {
        Some(ColorSpaceMode::DeviceRgb | ColorSpaceMode::CalRgb) => true,
        Some(ColorSpaceMode::IccBased) => desc.components == 3,
        _ => false,
    }
}

pub fn is_cmyk_family(desc: &ImageDescriptor) -> bool {
    match desc.color_space {
        Some(ColorSpaceMode::DeviceCmyk) => true,
        Some(ColorSpaceMode::IccBased) => desc.components == 4,
        _ => false,
    }
}
