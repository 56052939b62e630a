//! Streaming frame parser.
//!
//! [`parse`] decodes exactly one frame from a byte buffer at a caller-held
//! cursor. When the buffer contains fewer bytes than a full frame it returns
//! [`FrameError::Incomplete`] and leaves the cursor unchanged, so the caller
//! can retain the unread suffix and retry once more bytes arrive.

use bytes::Bytes;

use super::{Frame, FrameError};

// Limit bulk string size to 512MB to prevent memory exhaustion from a
// single hostile length header.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

// Limit array size to 1M elements to bound recursion and allocation.
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Decode one frame starting at `*pos`, advancing the cursor past the
/// consumed bytes on success.
pub fn parse(buf: &[u8], pos: &mut usize) -> Result<Frame, FrameError> {
    let mut cursor = *pos;
    let frame = parse_at(buf, &mut cursor)?;
    *pos = cursor;
    Ok(frame)
}

fn parse_at(buf: &[u8], pos: &mut usize) -> Result<Frame, FrameError> {
    let byte = *buf.get(*pos).ok_or(FrameError::Incomplete)?;
    *pos += 1;
    match byte {
        b'+' => parse_simple_string(buf, pos),
        b'-' => parse_error(buf, pos),
        b':' => parse_integer(buf, pos),
        b'$' => parse_bulk_string(buf, pos),
        b'*' => parse_array(buf, pos),
        _ => Err(FrameError::Protocol(format!(
            "invalid frame type byte: {}",
            byte
        ))),
    }
}

/// Read up to the next CRLF, returning the line without the terminator.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], FrameError> {
    let start = *pos;
    for i in start..buf.len() {
        if buf[i] == b'\r' {
            return match buf.get(i + 1) {
                Some(b'\n') => {
                    *pos = i + 2;
                    Ok(&buf[start..i])
                }
                Some(_) => Err(FrameError::Protocol(
                    "expected CRLF line terminator".to_string(),
                )),
                None => Err(FrameError::Incomplete),
            };
        }
    }
    Err(FrameError::Incomplete)
}

fn parse_decimal(line: &[u8]) -> Result<i64, FrameError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| FrameError::Protocol("non-ASCII integer".to_string()))?;
    text.parse::<i64>()
        .map_err(|_| FrameError::Protocol(format!("invalid integer: {}", text)))
}

fn parse_simple_string(buf: &[u8], pos: &mut usize) -> Result<Frame, FrameError> {
    let line = read_line(buf, pos)?;
    Ok(Frame::SimpleString(
        String::from_utf8_lossy(line).into_owned(),
    ))
}

fn parse_error(buf: &[u8], pos: &mut usize) -> Result<Frame, FrameError> {
    let line = read_line(buf, pos)?;
    Ok(Frame::Error(String::from_utf8_lossy(line).into_owned()))
}

fn parse_integer(buf: &[u8], pos: &mut usize) -> Result<Frame, FrameError> {
    let line = read_line(buf, pos)?;
    Ok(Frame::Integer(parse_decimal(line)?))
}

fn parse_bulk_string(buf: &[u8], pos: &mut usize) -> Result<Frame, FrameError> {
    let length = parse_decimal(read_line(buf, pos)?)?;

    if length == -1 {
        return Ok(Frame::NullBulkString);
    }
    if length < 0 {
        return Err(FrameError::Protocol(format!(
            "invalid bulk string length: {}",
            length
        )));
    }
    if length > MAX_BULK_LEN {
        return Err(FrameError::Protocol(format!(
            "bulk string length {} exceeds maximum allowed size",
            length
        )));
    }

    let length = length as usize;
    if buf.len() - *pos < length + 2 {
        return Err(FrameError::Incomplete);
    }

    let data = &buf[*pos..*pos + length];
    if &buf[*pos + length..*pos + length + 2] != b"\r\n" {
        return Err(FrameError::Protocol(
            "missing CRLF after bulk string".to_string(),
        ));
    }
    *pos += length + 2;

    Ok(Frame::BulkString(Bytes::copy_from_slice(data)))
}

fn parse_array(buf: &[u8], pos: &mut usize) -> Result<Frame, FrameError> {
    let length = parse_decimal(read_line(buf, pos)?)?;

    if length == -1 {
        return Ok(Frame::NullArray);
    }
    if length < 0 {
        return Err(FrameError::Protocol(format!(
            "invalid array length: {}",
            length
        )));
    }
    if length > MAX_ARRAY_LEN {
        return Err(FrameError::Protocol(format!(
            "array length {} exceeds maximum allowed size",
            length
        )));
    }

    let length = length as usize;
    let mut items = Vec::with_capacity(length.min(64));
    for _ in 0..length {
        items.push(parse_at(buf, pos)?);
    }

    Ok(Frame::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_input(input: &[u8]) -> Result<Frame, FrameError> {
        let mut pos = 0;
        parse(input, &mut pos)
    }

    #[test]
    fn test_simple_string() {
        let result = parse_input(b"+OK\r\n").unwrap();
        assert!(matches!(result, Frame::SimpleString(s) if s == "OK"));
    }

    #[test]
    fn test_error() {
        let result = parse_input(b"-Error message\r\n").unwrap();
        assert!(matches!(result, Frame::Error(s) if s == "Error message"));
    }

    #[test]
    fn test_integer() {
        let result = parse_input(b":1234\r\n").unwrap();
        assert!(matches!(result, Frame::Integer(n) if n == 1234));

        let result = parse_input(b":-42\r\n").unwrap();
        assert!(matches!(result, Frame::Integer(n) if n == -42));
    }

    #[test]
    fn test_bulk_string() {
        let result = parse_input(b"$5\r\nhello\r\n").unwrap();
        assert!(matches!(result, Frame::BulkString(b) if b == "hello"));

        let result = parse_input(b"$0\r\n\r\n").unwrap();
        assert!(matches!(result, Frame::BulkString(b) if b.is_empty()));

        let result = parse_input(b"$-1\r\n").unwrap();
        assert!(matches!(result, Frame::NullBulkString));
    }

    #[test]
    fn test_array() {
        let result = parse_input(b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n").unwrap();
        match result {
            Frame::Array(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], Frame::BulkString(b) if b == "hello"));
                assert!(matches!(&items[1], Frame::BulkString(b) if b == "world"));
            }
            _ => panic!("Expected array"),
        }

        let result = parse_input(b"*-1\r\n").unwrap();
        assert!(matches!(result, Frame::NullArray));
    }

    #[test]
    fn test_nested_array() {
        let result = parse_input(b"*2\r\n*1\r\n:7\r\n+ok\r\n").unwrap();
        match result {
            Frame::Array(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], Frame::Array(inner) if inner.len() == 1));
            }
            _ => panic!("Expected array"),
        }
    }

    #[test]
    fn test_incomplete_leaves_cursor_unchanged() {
        // Missing terminator, missing bulk payload, missing array elements.
        for input in [
            &b"+OK"[..],
            &b"$5\r\nhel"[..],
            &b"$5\r\nhello\r"[..],
            &b"*2\r\n$3\r\nfoo\r\n"[..],
            &b""[..],
        ] {
            let mut pos = 0;
            assert!(
                matches!(parse(input, &mut pos), Err(FrameError::Incomplete)),
                "input {:?} should be incomplete",
                input
            );
            assert_eq!(pos, 0, "cursor must not advance on incomplete input");
        }
    }

    #[test]
    fn test_streaming_restart() {
        // Parsing succeeds once the missing suffix arrives.
        let mut buf = b"$5\r\nhel".to_vec();
        let mut pos = 0;
        assert!(matches!(
            parse(&buf, &mut pos),
            Err(FrameError::Incomplete)
        ));

        buf.extend_from_slice(b"lo\r\n");
        let frame = parse(&buf, &mut pos).unwrap();
        assert!(matches!(frame, Frame::BulkString(b) if b == "hello"));
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_pipelined_frames() {
        let buf = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let mut pos = 0;

        let first = parse(buf, &mut pos).unwrap();
        assert!(matches!(first, Frame::Array(_)));
        assert_eq!(pos, 14);

        let second = parse(buf, &mut pos).unwrap();
        assert!(matches!(second, Frame::Array(_)));
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_invalid_type_byte() {
        let result = parse_input(b"!bogus\r\n");
        assert!(matches!(result, Err(FrameError::Protocol(_))));
    }

    #[test]
    fn test_bulk_string_negative_length() {
        // -1 is valid (null), but other negative values are protocol errors.
        let result = parse_input(b"$-2\r\n");
        match result {
            Err(FrameError::Protocol(msg)) => {
                assert!(msg.contains("invalid bulk string length"))
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_array_negative_length() {
        let result = parse_input(b"*-2\r\n");
        match result {
            Err(FrameError::Protocol(msg)) => assert!(msg.contains("invalid array length")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_bulk_string_exceeds_max_size() {
        let result = parse_input(b"$600000000\r\n");
        match result {
            Err(FrameError::Protocol(msg)) => assert!(msg.contains("exceeds maximum")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_array_exceeds_max_size() {
        let result = parse_input(b"*2000000\r\n");
        match result {
            Err(FrameError::Protocol(msg)) => assert!(msg.contains("exceeds maximum")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_bulk_string_bad_terminator() {
        let result = parse_input(b"$5\r\nhelloXX");
        assert!(matches!(result, Err(FrameError::Protocol(_))));
    }

    #[test]
    fn test_non_integer_length() {
        let result = parse_input(b"$abc\r\n");
        assert!(matches!(result, Err(FrameError::Protocol(_))));
    }
}
