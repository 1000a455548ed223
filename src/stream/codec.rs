//! Line framing for the agent's stream-json output.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line
//! length so an unterminated or maliciously large line from a misbehaving
//! remote process cannot exhaust memory.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum accepted line length: 1 MiB.
///
/// Longer lines cause [`StreamCodec::decode`] to return
/// [`AppError::Connection`] with `"line too long"` instead of allocating.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-framing codec for agent output.
///
/// Each `\n`-terminated UTF-8 string is one protocol record. The limit is
/// a decoder-side concern only; this codec is never used for writing.
#[derive(Debug)]
pub struct StreamCodec(LinesCodec);

impl StreamCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for StreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StreamCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next complete line from `src`, buffering partial tails.
    ///
    /// Returns `Ok(None)` when no complete line is available yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final unterminated line at EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Connection(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
