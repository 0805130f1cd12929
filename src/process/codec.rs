//! Line codec for child process output.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! backend that never emits a newline cannot grow the buffer without bound.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted from a child process: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline framing for child stdout/stderr.
///
/// Lines longer than [`MAX_LINE_BYTES`] yield `AppError::Io("line too long: …")`;
/// the codec discards the rest of that line and carries on with the next.
#[derive(Debug)]
pub struct OutputCodec(LinesCodec);

impl OutputCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for OutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

/// Whether a codec error only skipped one oversized line.
#[must_use]
pub fn is_recoverable(err: &AppError) -> bool {
    matches!(err, AppError::Io(msg) if msg.starts_with("line too long"))
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Io(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
