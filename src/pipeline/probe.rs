//! Stage 1: Measure the embedded length of inline images.
//!
//! Inline images live inside the page content stream, so nothing records how
//! many bytes they occupy. The only way to find out is to decode the image
//! once and count what the decoder consumed. That must not disturb the
//! content stream, which the interpreter continues parsing afterwards.
//!
//! [`EmbedStream`] wraps the content-stream cursor with a record/replay
//! buffer:
//!
//! ```text
//! Passthrough ─begin_recording→ Recording ─rewind→ Replaying ─restore→ Passthrough
//!                                                  └─rewind (again)─┘
//! ```
//!
//! Usage pattern (what [`measure`] does):
//!
//! 1. `begin_recording`, drain the image through its decoder;
//! 2. `rewind`, count the recorded bytes;
//! 3. `rewind` again so the real decode pass sees the same bytes;
//! 4. caller decodes for real, then `restore`.
//!
//! Calls out of this order are programming errors and panic.

use crate::color::ColorMap;
use crate::image::CodestreamKind;
use crate::source::{CodestreamSource, ImageStream, PackedSampleSource, SampleSource};

/// Record/replay control of an inline image's embedded bytes.
pub trait InlineCursor: CodestreamSource {
    /// Start capturing every byte read from the underlying stream.
    fn begin_recording(&mut self);

    /// Serve the captured bytes again from the start.
    fn rewind(&mut self);

    /// Stop replaying and read from the underlying stream again.
    fn restore(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Passthrough,
    Recording,
    Replaying { pos: usize },
}

/// Content-stream cursor with a record/replay buffer.
#[derive(Debug)]
pub struct EmbedStream<S> {
    inner: S,
    record: Vec<u8>,
    state: CursorState,
}

impl<S: CodestreamSource> EmbedStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            record: Vec::new(),
            state: CursorState::Passthrough,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Bytes captured by the last recording.
    pub fn recorded_len(&self) -> usize {
        self.record.len()
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.state, CursorState::Replaying { .. })
    }
}

impl<S: CodestreamSource> CodestreamSource for EmbedStream<S> {
    /// Rewinds only the replay position. The content stream itself is never
    /// reset: it is shared with the interpreter.
    fn reset(&mut self) {
        if let CursorState::Replaying { pos } = &mut self.state {
            *pos = 0;
        }
    }

    fn get_char(&mut self) -> Option<u8> {
        match &mut self.state {
            CursorState::Passthrough => self.inner.get_char(),
            CursorState::Recording => {
                let c = self.inner.get_char()?;
                self.record.push(c);
                Some(c)
            }
            CursorState::Replaying { pos } => {
                let c = self.record.get(*pos).copied()?;
                *pos += 1;
                Some(c)
            }
        }
    }
}

impl<S: CodestreamSource> InlineCursor for EmbedStream<S> {
    fn begin_recording(&mut self) {
        assert_eq!(
            self.state,
            CursorState::Passthrough,
            "begin_recording while a probe is already active"
        );
        self.record.clear();
        self.state = CursorState::Recording;
    }

    fn rewind(&mut self) {
        assert_ne!(
            self.state,
            CursorState::Passthrough,
            "rewind without a recording"
        );
        self.state = CursorState::Replaying { pos: 0 };
    }

    fn restore(&mut self) {
        assert!(self.is_replaying(), "restore without a rewind");
        self.record.clear();
        self.state = CursorState::Passthrough;
    }
}

/// An inline image read straight out of the content stream.
#[derive(Debug)]
pub struct InlineImageStream<S> {
    embed: EmbedStream<S>,
    kind: CodestreamKind,
}

impl<S: CodestreamSource> InlineImageStream<S> {
    pub fn new(content: S) -> Self {
        Self::with_kind(content, CodestreamKind::Raw)
    }

    pub fn with_kind(content: S, kind: CodestreamKind) -> Self {
        Self {
            embed: EmbedStream::new(content),
            kind,
        }
    }

    pub fn into_inner(self) -> S {
        self.embed.into_inner()
    }
}

impl<S: CodestreamSource> ImageStream for InlineImageStream<S> {
    fn kind(&self) -> CodestreamKind {
        self.kind
    }

    fn decoded(&mut self) -> &mut dyn CodestreamSource {
        &mut self.embed
    }

    fn encoded(&mut self) -> &mut dyn CodestreamSource {
        &mut self.embed
    }

    fn embedded_length(&self) -> Option<u64> {
        None
    }

    fn inline_cursor(&mut self) -> Option<&mut dyn InlineCursor> {
        Some(&mut self.embed)
    }
}

/// Measure the embedded length of an inline image by draining it through its
/// decoder.
///
/// Returns `None` if the stream has no inline cursor. On `Some`, the cursor
/// is left rewound: the caller's next decode sees the same bytes and must be
/// followed by [`restore`].
pub fn measure(
    stream: &mut dyn ImageStream,
    width: u32,
    height: u32,
    color_map: Option<&dyn ColorMap>,
) -> Option<u64> {
    match color_map.filter(|m| m.is_ok()) {
        Some(map) => measure_with(stream, |s| {
            let mut samples = PackedSampleSource::new(s.decoded(), width, map.components(), map.bits());
            samples.reset();
            for _ in 0..height {
                if samples.get_line().is_none() {
                    break;
                }
            }
            samples.close();
        }),
        None => measure_with(stream, |s| {
            let src = s.decoded();
            src.reset();
            let bytes = (width as usize).div_ceil(8) * height as usize;
            for _ in 0..bytes {
                if src.get_char().is_none() {
                    break;
                }
            }
            src.close();
        }),
    }
}

/// [`measure`] with a caller-supplied drain pass.
pub fn measure_with<F>(stream: &mut dyn ImageStream, drain: F) -> Option<u64>
where
    F: FnOnce(&mut dyn ImageStream),
{
    stream.inline_cursor()?.begin_recording();
    drain(stream);
    let cursor = stream.inline_cursor()?;
    cursor.rewind();
    let mut len = 0u64;
    while cursor.get_char().is_some() {
        len += 1;
    }
    cursor.rewind();
    Some(len)
}

/// End a probe started by [`measure`]; no-op for non-inline streams.
pub fn restore(stream: &mut dyn ImageStream) {
    if let Some(cursor) = stream.inline_cursor() {
        cursor.restore();
    }
}
