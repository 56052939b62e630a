//! Server Introspection Commands

use super::CommandHandler;
use anyhow::Result;
use bytes::Bytes;
use kestrel_core::resp::Frame;
use kestrel_core::store::Db;

/// INFO command - server and keyspace statistics
///
/// Multi-line output, so the reply is a bulk string (a simple string cannot
/// contain CRLF).
#[derive(Debug)]
pub struct Info;

impl CommandHandler for Info {
    fn name(&self) -> &'static str {
        "INFO"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        let body = format!(
            "# Server\r\nversion:{}\r\n\r\n# Keyspace\r\nkeys={},expires={}\r\n",
            env!("CARGO_PKG_VERSION"),
            db.len(),
            db.expiring_count(),
        );
        Ok(Frame::BulkString(Bytes::from(body.into_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_sections() {
        let mut db = Db::new();
        db.set(b"k".to_vec(), Bytes::from_static(b"v"));

        match Info.execute(&mut db).unwrap() {
            Frame::BulkString(body) => {
                let text = String::from_utf8_lossy(&body).into_owned();
                assert!(text.contains("# Server"));
                assert!(text.contains("keys=1,expires=0"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
