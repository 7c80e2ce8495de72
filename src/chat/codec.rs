/// Envelope frame codec — length-prefixed JSON over TCP.
///
/// Each frame is a 4-byte big-endian length followed by exactly that many
/// bytes of JSON encoding one [`Envelope`]. The prefix is peeked without
/// consuming, so a partial frame leaves the buffer untouched until the rest
/// arrives.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::envelope::Envelope;

/// Maximum frame payload size. A chat envelope is a few hundred bytes; a
/// frame claiming more than this is a corrupt or hostile stream.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Codec error: oversized frame, malformed JSON, or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame exceeds maximum length ({MAX_FRAME_LENGTH} bytes)")]
    FrameTooLong,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A tokio codec framing envelopes with a u32 length prefix.
#[derive(Debug, Default)]
pub struct EnvelopeCodec;

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > MAX_FRAME_LENGTH {
            return Err(CodecError::FrameTooLong);
        }

        if src.len() < 4 + len {
            // Partial frame — ask for the rest in one read.
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let payload = src.split_to(len);
        Ok(Some(serde_json::from_slice(&payload)?))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > MAX_FRAME_LENGTH {
            return Err(CodecError::FrameTooLong);
        }

        dst.reserve(4 + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}
