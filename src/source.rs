//! Interfaces to the decoding layers below this crate.
//!
//! The content interpreter owns the real filter chain (Flate, DCT, fax, …).
//! This crate only needs to pull bytes out of it, so the seams are small:
//!
//! * [`CodestreamSource`]: byte-at-a-time reader with `reset`/`close`.
//! * [`SampleSource`]: one scanline of unpacked samples per call.
//! * [`ImageStream`]: everything one image occurrence exposes: decoded
//!   bytes, the undecoded codestream for raw dumps, and codec side data.
//!
//! In-memory implementations are provided so callers that already hold the
//! bytes (and the tests) need no interpreter at all.

use crate::image::{CodestreamKind, FaxParams};
use crate::pipeline::probe::InlineCursor;

/// Byte-oriented stream over a codestream or its decoded output.
pub trait CodestreamSource {
    /// Position the stream at its first byte.
    fn reset(&mut self);

    /// Next byte, or `None` at end of data.
    fn get_char(&mut self) -> Option<u8>;

    /// Release decoder state. Reading after `close` is unspecified.
    fn close(&mut self) {}
}

/// Scanline-oriented stream of unpacked samples (one byte per component).
pub trait SampleSource {
    fn reset(&mut self);

    /// Next row of `width * components` samples, or `None` once the
    /// underlying data is exhausted.
    fn get_line(&mut self) -> Option<&[u8]>;

    fn close(&mut self) {}
}

/// One image occurrence as seen by the extractor.
pub trait ImageStream {
    /// Outermost filter of the codestream.
    fn kind(&self) -> CodestreamKind;

    /// Fully decoded, bit-packed sample bytes.
    fn decoded(&mut self) -> &mut dyn CodestreamSource;

    /// The codestream exactly as stored in the document, for raw dumps.
    fn encoded(&mut self) -> &mut dyn CodestreamSource;

    /// Length of the stored codestream, when the container records one.
    /// Inline images have none; their length comes from probing.
    fn embedded_length(&self) -> Option<u64>;

    /// Out-of-band JBIG2 globals segment, if the image references one.
    fn jbig2_globals(&mut self) -> Option<&mut dyn CodestreamSource> {
        None
    }

    /// CCITT decode parameters, for fax codestreams.
    fn fax_params(&self) -> Option<FaxParams> {
        None
    }

    /// Record/replay cursor of an inline image's embedded data.
    fn inline_cursor(&mut self) -> Option<&mut dyn InlineCursor> {
        None
    }
}

/// Owned byte buffer read as a [`CodestreamSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes consumed since the last reset.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl CodestreamSource for MemorySource {
    fn reset(&mut self) {
        self.pos = 0;
    }

    fn get_char(&mut self) -> Option<u8> {
        let c = self.data.get(self.pos).copied()?;
        self.pos += 1;
        Some(c)
    }
}

/// Unpacks bit-packed rows from a [`CodestreamSource`] into one byte per
/// component.
///
/// 1/2/4-bit samples are read MSB first; 16-bit samples keep their high byte,
/// which is all an 8-bit colour map can use.
pub struct PackedSampleSource<'a> {
    src: &'a mut dyn CodestreamSource,
    samples_per_line: usize,
    bits: u8,
    packed: Vec<u8>,
    line: Vec<u8>,
}

impl<'a> PackedSampleSource<'a> {
    pub fn new(src: &'a mut dyn CodestreamSource, width: u32, components: u32, bits: u8) -> Self {
        let samples_per_line = width as usize * components as usize;
        let packed_len = (samples_per_line * usize::from(bits)).div_ceil(8);
        Self {
            src,
            samples_per_line,
            bits,
            packed: Vec::with_capacity(packed_len),
            line: vec![0; samples_per_line],
        }
    }

    /// Bytes of packed input consumed per row.
    pub fn packed_row_len(&self) -> usize {
        (self.samples_per_line * usize::from(self.bits)).div_ceil(8)
    }

    fn unpack(&mut self) {
        match self.bits {
            8 => self.line.copy_from_slice(&self.packed[..self.samples_per_line]),
            16 => {
                for (dst, pair) in self.line.iter_mut().zip(self.packed.chunks_exact(2)) {
                    *dst = pair[0];
                }
            }
            bits => {
                let bits = usize::from(bits);
                let mask = (1u16 << bits) - 1;
                for (i, dst) in self.line.iter_mut().enumerate() {
                    let bit = i * bits;
                    let byte = self.packed[bit / 8];
                    let shift = 8 - bits - (bit % 8);
                    *dst = ((u16::from(byte) >> shift) & mask) as u8;
                }
            }
        }
    }
}

impl SampleSource for PackedSampleSource<'_> {
    fn reset(&mut self) {
        self.src.reset();
    }

    fn get_line(&mut self) -> Option<&[u8]> {
        let want = self.packed_row_len();
        self.packed.clear();
        while self.packed.len() < want {
            self.packed.push(self.src.get_char()?);
        }
        self.unpack();
        Some(&self.line)
    }

    fn close(&mut self) {
        self.src.close();
    }
}

/// An image whose bytes are already in memory.
///
/// `decoded` holds what the interpreter's filter chain produced; `encoded`
/// holds the stored codestream. For unfiltered images they are the same.
#[derive(Debug, Clone)]
pub struct MemoryImageStream {
    kind: CodestreamKind,
    encoded: MemorySource,
    decoded: MemorySource,
    embedded_length: Option<u64>,
    globals: Option<MemorySource>,
    fax: Option<FaxParams>,
}

impl MemoryImageStream {
    pub fn new(kind: CodestreamKind, encoded: impl Into<Vec<u8>>, decoded: impl Into<Vec<u8>>) -> Self {
        let encoded = MemorySource::new(encoded);
        let embedded_length = Some(encoded.len() as u64);
        Self {
            kind,
            encoded,
            decoded: MemorySource::new(decoded),
            embedded_length,
            globals: None,
            fax: None,
        }
    }

    /// Unfiltered samples: the codestream is the decoded data.
    pub fn unfiltered(samples: impl Into<Vec<u8>>) -> Self {
        let samples = samples.into();
        Self::new(CodestreamKind::Raw, samples.clone(), samples)
    }

    /// Override the recorded length (`None` = the container records none).
    pub fn with_embedded_length(mut self, len: Option<u64>) -> Self {
        self.embedded_length = len;
        self
    }

    pub fn with_jbig2_globals(mut self, globals: impl Into<Vec<u8>>) -> Self {
        self.globals = Some(MemorySource::new(globals));
        self
    }

    pub fn with_fax_params(mut self, params: FaxParams) -> Self {
        self.fax = Some(params);
        self
    }
}

impl ImageStream for MemoryImageStream {
    fn kind(&self) -> CodestreamKind {
        self.kind
    }

    fn decoded(&mut self) -> &mut dyn CodestreamSource {
        &mut self.decoded
    }

    fn encoded(&mut self) -> &mut dyn CodestreamSource {
        &mut self.encoded
    }

    fn embedded_length(&self) -> Option<u64> {
        self.embedded_length
    }

    fn jbig2_globals(&mut self) -> Option<&mut dyn CodestreamSource> {
        self.globals
            .as_mut()
            .map(|g| g as &mut dyn CodestreamSource)
    }

    fn fax_params(&self) -> Option<FaxParams> {
        self.fax
    }
}
