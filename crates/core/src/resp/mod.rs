//! Wire protocol frames (RESP-style)
//!
//! A frame is one unit of the protocol: simple strings, errors, integers,
//! length-prefixed bulk strings and recursively nested arrays, all terminated
//! by CRLF. The parser is restartable across socket reads; the encoder
//! produces the canonical byte sequence for each frame kind.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    NullBulkString,
    Array(Vec<Frame>),
    NullArray,
}

impl Frame {
    /// Borrow the payload of a bulk string frame, if that is what this is.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::BulkString(bytes) => Some(bytes),
            _ => None,
        }
    }

}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer holds fewer bytes than a full frame; read more and retry.
    #[error("incomplete frame")]
    Incomplete,
    /// Structurally invalid input; the connection must be closed.
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub mod encoder;
pub mod parser;

pub use encoder::Encoder;
