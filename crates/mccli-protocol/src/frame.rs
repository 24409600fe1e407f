//! Frame encoding/decoding utilities.
//!
//! Each frame carries a direction marker and a 2-byte little-endian length:
//!
//! ```text
//! +--------+--------+--------+-------------------+
//! | '<'/'>'| len_lo | len_hi | data[0..len]      |
//! +--------+--------+--------+-------------------+
//! ```
//!
//! `'<'` marks host → device frames, `'>'` device → host frames.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::responses::Message;

/// Initial receive buffer capacity.
pub const MAX_FRAMED_SIZE: usize = 1024;

/// Header byte of frames written by the host.
pub const HOST_FRAME_MARKER: u8 = b'<';
/// Header byte of frames written by the device.
pub const DEVICE_FRAME_MARKER: u8 = b'>';

/// Reassembles device frames from an arbitrary chunking of the byte stream.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAMED_SIZE),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take one complete device frame out of the buffer.
    ///
    /// Bytes before a `'>'` marker are discarded. Returns `None` while the
    /// frame is still incomplete.
    pub fn decode(&mut self) -> Option<Vec<u8>> {
        let skip = self
            .buffer
            .iter()
            .position(|&b| b == DEVICE_FRAME_MARKER)
            .unwrap_or(self.buffer.len());
        if skip > 0 {
            log::trace!("discarding {} bytes before frame marker", skip);
            self.buffer.advance(skip);
        }

        if self.buffer.len() < 3 {
            return None;
        }

        let len = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;
        if self.buffer.len() < 3 + len {
            return None;
        }

        self.buffer.advance(3);
        Some(self.buffer.split_to(len).to_vec())
    }

    /// Decode the next complete frame into a [`Message`].
    pub fn next_message(&mut self) -> Option<Result<Message, ProtocolError>> {
        self.decode().map(|frame| Message::decode(&frame))
    }

    /// Wrap a command payload for host → device transmission.
    pub fn encode(data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + data.len());
        buf.push(HOST_FRAME_MARKER);
        buf.put_u16_le(data.len() as u16);
        buf.extend_from_slice(data);
        buf
    }

    /// Wrap a payload the way the device does. Used by device emulators.
    pub fn encode_device(data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + data.len());
        buf.push(DEVICE_FRAME_MARKER);
        buf.put_u16_le(data.len() as u16);
        buf.extend_from_slice(data);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::{PushNotification, Response};

    #[test]
    fn test_frame_codec_encode_decode() {
        let mut codec = FrameCodec::new();

        let data = b"Hello, World!";
        let encoded = FrameCodec::encode(data);
        assert_eq!(encoded.len(), 3 + data.len());
        assert_eq!(encoded[0], b'<');
        assert_eq!(encoded[1], data.len() as u8);
        assert_eq!(encoded[2], 0);

        codec.push(&FrameCodec::encode_device(data));
        let decoded = codec.decode().expect("should decode frame");
        assert_eq!(&decoded, data);
    }

    #[test]
    fn test_frame_codec_partial() {
        let mut codec = FrameCodec::new();
        let encoded = FrameCodec::encode_device(b"Test data");

        codec.push(&encoded[..4]);
        assert!(codec.decode().is_none());

        codec.push(&encoded[4..]);
        assert_eq!(codec.decode().expect("should decode frame"), b"Test data");
    }

    #[test]
    fn test_frame_codec_multiple() {
        let mut codec = FrameCodec::new();
        codec.push(&FrameCodec::encode_device(b"First"));
        codec.push(&FrameCodec::encode_device(b"Second"));

        assert_eq!(codec.decode().expect("first frame"), b"First");
        assert_eq!(codec.decode().expect("second frame"), b"Second");
        assert!(codec.decode().is_none());
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_frame_codec_skips_garbage() {
        let mut codec = FrameCodec::new();
        codec.push(b"\x00\x01junk");
        codec.push(&FrameCodec::encode_device(&[0x0A]));

        let decoded = codec.decode().expect("should decode after garbage");
        assert_eq!(decoded, vec![0x0A]);
    }

    #[test]
    fn test_next_message_distinguishes_push() {
        let mut codec = FrameCodec::new();
        codec.push(&FrameCodec::encode_device(&[0x0A]));
        codec.push(&FrameCodec::encode_device(&[0x83]));

        match codec.next_message() {
            Some(Ok(Message::Response(Response::NoMoreMessages))) => {}
            other => panic!("unexpected {:?}", other),
        }
        match codec.next_message() {
            Some(Ok(Message::Push(PushNotification::MessageWaiting))) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(codec.next_message().is_none());
    }
}
