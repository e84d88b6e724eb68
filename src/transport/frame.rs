//! AMQP frame codec.
//!
//! Every AMQP frame starts with an 8-byte header: a 4-byte total size, a data
//! offset in 4-byte words, a frame type, and a 2-byte channel. A frame with an
//! empty body is a heartbeat.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::TransportError;

/// Protocol header for AMQP 1.0 without a security layer.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x01\x00\x00";

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 8;

/// Smallest max-frame-size a peer may announce.
pub const MIN_MAX_FRAME_SIZE: u32 = 512;

/// Max frame size announced by the receiver.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Frame type byte for AMQP frames.
pub const AMQP_FRAME_TYPE: u8 = 0x00;

/// A decoded AMQP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Channel the frame belongs to.
    pub channel: u16,
    /// Frame body; empty for heartbeats.
    pub body: Bytes,
}

impl Frame {
    /// Create a frame on `channel`.
    #[must_use]
    pub fn new(channel: u16, body: impl Into<Bytes>) -> Self {
        Self {
            channel,
            body: body.into(),
        }
    }

    /// Returns `true` for an empty heartbeat frame.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool { self.body.is_empty() }
}

/// `tokio_util` codec for AMQP frames.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec accepting frames up to `max_frame_size` bytes.
    #[must_use]
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            max_frame_size: max_frame_size.max(MIN_MAX_FRAME_SIZE) as usize,
        }
    }

    /// Largest frame accepted or produced.
    #[must_use]
    pub fn max_frame_size(&self) -> usize { self.max_frame_size }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_SIZE) }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = src.as_ref();
        let size = header.get_u32() as usize;
        let data_offset = usize::from(header.get_u8()) * 4;
        let frame_type = header.get_u8();
        let channel = header.get_u16();
        if size > self.max_frame_size {
            return Err(TransportError::OversizedFrame {
                size,
                max: self.max_frame_size,
            });
        }
        if data_offset < FRAME_HEADER_LEN || data_offset > size {
            return Err(TransportError::InvalidFrame {
                reason: "data offset outside frame",
            });
        }
        if frame_type != AMQP_FRAME_TYPE {
            return Err(TransportError::InvalidFrame {
                reason: "unsupported frame type",
            });
        }
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(size);
        frame.advance(data_offset);
        Ok(Some(Frame {
            channel,
            body: frame.freeze(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = FRAME_HEADER_LEN + item.body.len();
        if size > self.max_frame_size {
            return Err(TransportError::OversizedFrame {
                size,
                max: self.max_frame_size,
            });
        }
        let wire_size = u32::try_from(size).map_err(|_| TransportError::OversizedFrame {
            size,
            max: self.max_frame_size,
        })?;
        dst.reserve(size);
        dst.put_u32(wire_size);
        dst.put_u8(2);
        dst.put_u8(AMQP_FRAME_TYPE);
        dst.put_u16(item.channel);
        dst.extend_from_slice(&item.body);
        Ok(())
    }
}
