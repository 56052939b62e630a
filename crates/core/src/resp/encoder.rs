//! Frame encoder.
//!
//! Produces the canonical byte sequence for each frame kind. Encoding is
//! deterministic and length-exact; nil bulk strings serialize as `$-1\r\n`
//! and nil arrays as `*-1\r\n`.

use bytes::{BufMut, BytesMut};

use super::Frame;

pub struct Encoder {
    buffer: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create an encoder with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Clear the buffer for reuse
    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the encoded bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Encode a frame into the buffer
    pub fn encode(&mut self, frame: &Frame) {
        match frame {
            Frame::SimpleString(s) => {
                self.buffer.put_u8(b'+');
                self.buffer.put_slice(s.as_bytes());
                self.write_crlf();
            }
            Frame::Error(e) => {
                self.buffer.put_u8(b'-');
                self.buffer.put_slice(e.as_bytes());
                self.write_crlf();
            }
            Frame::Integer(i) => {
                self.buffer.put_u8(b':');
                let mut itoa_buf = itoa::Buffer::new();
                self.buffer.put_slice(itoa_buf.format(*i).as_bytes());
                self.write_crlf();
            }
            Frame::BulkString(bytes) => {
                self.buffer.put_u8(b'$');
                let mut itoa_buf = itoa::Buffer::new();
                self.buffer
                    .put_slice(itoa_buf.format(bytes.len()).as_bytes());
                self.write_crlf();
                self.buffer.put_slice(bytes);
                self.write_crlf();
            }
            Frame::NullBulkString => {
                self.buffer.put_slice(b"$-1\r\n");
            }
            Frame::Array(items) => {
                self.buffer.put_u8(b'*');
                let mut itoa_buf = itoa::Buffer::new();
                self.buffer
                    .put_slice(itoa_buf.format(items.len()).as_bytes());
                self.write_crlf();
                for item in items {
                    self.encode(item);
                }
            }
            Frame::NullArray => {
                self.buffer.put_slice(b"*-1\r\n");
            }
        }
    }

    fn write_crlf(&mut self) {
        self.buffer.put_slice(b"\r\n");
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a frame into a new buffer.
/// For repeated encoding, prefer reusing an [`Encoder`] directly.
pub fn encode(frame: &Frame) -> BytesMut {
    let mut encoder = Encoder::new();
    encoder.encode(frame);
    encoder.buffer
}
