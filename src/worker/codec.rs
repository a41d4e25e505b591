//! NDJSON framing for worker output.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length. The
//! codec's internal buffer holds any trailing, not-yet-terminated fragment
//! until its newline arrives, so frames split across reads are reassembled
//! before they are parsed.

use std::io::ErrorKind;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted from a worker: 16 MiB.
///
/// Completion frames carry the whole task result, so the limit is generous.
/// Longer lines are discarded up to their newline and reported as
/// [`AppError::Protocol`].
pub const MAX_LINE_BYTES: usize = 16 * 1_048_576;

/// Line codec for worker stdio.
///
/// # Decoder
///
/// Yields each `\n`-terminated line without the terminator (a trailing `\r`
/// is stripped too). Over-long lines and invalid UTF-8 yield
/// [`AppError::Protocol`]; the offending line is already consumed, so the
/// caller can keep decoding. Other I/O failures yield [`AppError::Io`].
///
/// # Encoder
///
/// Writes `item\n`.
#[derive(Debug)]
pub struct FrameCodec(LinesCodec);

impl FrameCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Flush the final unterminated line when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol("line too long: exceeded max line length".into())
        }
        LinesCodecError::Io(io_err) if io_err.kind() == ErrorKind::InvalidData => {
            AppError::Protocol(format!("line is not valid utf-8: {io_err}"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
