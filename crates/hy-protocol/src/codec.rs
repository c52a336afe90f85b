//! Tokio codec for newline-delimited protocol records
//!
//! Decoding skips any line that is not a protocol record. Remote links run
//! through a login shell on a pseudo-terminal, so banners, echoed input, and
//! stderr output from the peer arrive interleaved with real records.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::ProtocolError;
use crate::message::Message;

/// Maximum length of a single record (16MB). Runner output can be large,
/// but an unbounded line would let a runaway peer exhaust memory.
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Codec for encoding/decoding protocol records
#[derive(Debug)]
pub struct MessageCodec {
    lines: LinesCodec,
}

impl MessageCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }

    /// Turn the next complete line into a message, skipping noise.
    fn next_message(
        &mut self,
        src: &mut BytesMut,
        at_eof: bool,
    ) -> Result<Option<Message>, ProtocolError> {
        loop {
            let line = if at_eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    tracing::warn!("Discarding line longer than {} bytes", MAX_LINE_LENGTH);
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(ProtocolError::Io(e)),
            };

            if line.trim().is_empty() {
                continue;
            }

            match Message::from_line(&line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    tracing::trace!("Skipping non-protocol line: {}", e);
                }
            }
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_message(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_message(src, true)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = message.to_line()?;
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
