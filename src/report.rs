//! Listing-mode output: one fixed-width summary row per image.
//!
//! ```text
//! page   num  type   width height color comp bpc  enc interp  object ID x-ppi y-ppi size ratio
//! --------------------------------------------------------------------------------------------
//!    1     0 image     640   480  rgb     3   8  jpeg   no        12  0    72    72 41.2K 4.6%
//! ```
//!
//! Everything here is pure formatting. The size and ratio rules are frozen:
//! scripts parse this output column by column.

use crate::image::{Ctm, ImageDescriptor, ImageKind, ObjectRef};
use serde::Serialize;
use std::fmt;

/// Two header lines, each newline-terminated.
pub const LISTING_HEADER: &str = "page   num  type   width height color comp bpc  enc interp  object ID x-ppi y-ppi size ratio\n\
--------------------------------------------------------------------------------------------\n";

/// Generation numbers at or above this are treated as "no object".
const MAX_GENERATION: u32 = 100_000;

/// The object column of a listing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ObjectId {
    Inline,
    #[serde(rename = "none")]
    Unreferenced,
    Ref { num: u32, generation: u32 },
}

impl ObjectId {
    fn new(is_inline: bool, object: Option<ObjectRef>) -> Self {
        match object {
            _ if is_inline => ObjectId::Inline,
            Some(r) if r.generation < MAX_GENERATION => ObjectId::Ref {
                num: r.num,
                generation: r.generation,
            },
            _ => ObjectId::Unreferenced,
        }
    }
}

/// One image as shown in the listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRow {
    pub page: u32,
    pub num: u32,
    #[serde(rename = "type")]
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub color: &'static str,
    pub components: u32,
    pub bpc: u8,
    pub encoding: &'static str,
    pub interpolate: bool,
    pub object: ObjectId,
    pub x_ppi: Option<f64>,
    pub y_ppi: Option<f64>,
    /// Stored codestream length in bytes.
    pub size: Option<u64>,
    /// Stored size as a percentage of the decoded size.
    pub ratio: Option<f64>,
}

impl ListingRow {
    pub fn new(
        page: u32,
        num: u32,
        desc: &ImageDescriptor,
        object: Option<ObjectRef>,
        ctm: &Ctm,
        embedded_size: Option<u64>,
    ) -> Self {
        let uncompressed = desc.uncompressed_size();
        let ratio = match embedded_size {
            Some(size) if uncompressed > 0 => Some(100.0 * size as f64 / uncompressed as f64),
            _ => None,
        };
        Self {
            page,
            num,
            kind: desc.kind,
            width: desc.width,
            height: desc.height,
            color: desc.color_space.map_or("-", |c| c.tag()),
            components: desc.components,
            bpc: desc.bits_per_component,
            encoding: desc.codestream.encoding_tag(),
            interpolate: desc.interpolate,
            object: ObjectId::new(desc.is_inline, object),
            x_ppi: ppi(desc.width, ctm[0], ctm[2]),
            y_ppi: ppi(desc.height, ctm[1], ctm[3]),
            size: embedded_size,
            ratio,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Pixels per inch along one axis of the CTM.
fn ppi(pixels: u32, a: f64, b: f64) -> Option<f64> {
    let v = (f64::from(pixels) * 72.0 / (a + b)).abs();
    v.is_finite().then_some(v)
}

impl fmt::Display for ListingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4} {:5} ", self.page, self.num)?;
        write!(f, "{:<7} {:5} {:5}  ", self.kind.as_str(), self.width, self.height)?;
        write!(f, "{:<5}  {:2}  {:2}  ", self.color, self.components, self.bpc)?;
        write!(f, "{:<5}  ", self.encoding)?;
        write!(f, "{:<3}  ", if self.interpolate { "yes" } else { "no" })?;
        match self.object {
            ObjectId::Inline => f.write_str("[inline]   ")?,
            ObjectId::Unreferenced => f.write_str("[none]     ")?,
            ObjectId::Ref { num, generation } => write!(f, " {num:6} {generation:2} ")?,
        }
        write!(f, "{} {} ", format_ppi(self.x_ppi), format_ppi(self.y_ppi))?;
        f.write_str(&format_size(self.size))?;
        f.write_str(&format_ratio(self.ratio))
    }
}

/// 5 columns: three decimals below 1, whole numbers otherwise.
///
/// The value is biased by +0.5 before both the branch and the rounding, so
/// the column matches existing listings byte for byte.
pub fn format_ppi(ppi: Option<f64>) -> String {
    match ppi.map(|v| v + 0.5) {
        Some(v) if v < 1.0 => format!("{v:5.3}"),
        Some(v) => format!("{v:5.0}"),
        None => "    -".to_string(),
    }
}

/// Four significant characters for sizes of 10 K and up.
pub fn format_number(d: f64) -> String {
    if d < 10.0 {
        format!("{d:4.2}").chars().take(4).collect()
    } else if d < 100.0 {
        let s = format!("{d:4.1}");
        match s.as_bytes().get(3) {
            Some(c) if !c.is_ascii_digit() => format!(" {}", &s[..3]),
            _ => s,
        }
    } else {
        format!("{d:4.0}")
    }
}

/// 5 columns: `1234B`, `10.0K`, ` 128M`, or `   - ` when unknown.
pub fn format_size(size: Option<u64>) -> String {
    let Some(n) = size else {
        return "   - ".to_string();
    };
    if n <= 9999 {
        return format!("{n:4}B");
    }
    let mut d = n as f64 / 1024.0;
    for unit in ['K', 'M'] {
        if d <= 9999.0 {
            return format!("{}{unit}", format_number(d));
        }
        d /= 1024.0;
    }
    format!("{}G", format_number(d))
}

/// 5 columns after a leading space: ` 14%`, ` 3.5%`.
pub fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) if r > 9.9 => format!(" {r:3.0}%"),
        Some(r) if r >= 0.0 => format!(" {r:3.1}%"),
        _ => "   - ".to_string(),
    }
}
