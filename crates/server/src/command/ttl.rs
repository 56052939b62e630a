//! TTL/Expiration Command Implementations
//!
//! - EXPIRE - set a key's time to live in seconds
//! - TTL - get the remaining time to live

use super::CommandHandler;
use anyhow::Result;
use bytes::Bytes;
use kestrel_core::error::CommandError;
use kestrel_core::resp::Frame;
use kestrel_core::store::Db;

fn next_bulk(args: &mut Vec<Frame>) -> Result<Bytes> {
    if args.is_empty() {
        return Err(CommandError::syntax().into());
    }
    match args.remove(0) {
        Frame::BulkString(bytes) => Ok(bytes),
        _ => Err(CommandError::syntax().into()),
    }
}

fn parse_integer(frame: Frame) -> Result<i64> {
    let bytes = match frame {
        Frame::BulkString(bytes) => bytes,
        Frame::Integer(n) => return Ok(n),
        _ => return Err(CommandError::not_integer().into()),
    };
    std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| CommandError::not_integer().into())
}

/// EXPIRE command - set a key's time to live in seconds
#[derive(Debug)]
pub struct Expire {
    pub key: Bytes,
    pub seconds: i64,
}

impl Expire {
    pub fn parse(mut args: Vec<Frame>) -> Result<Self> {
        let key = next_bulk(&mut args)?;
        if args.is_empty() {
            return Err(CommandError::syntax().into());
        }
        let seconds = parse_integer(args.remove(0))?;
        Ok(Expire { key, seconds })
    }
}

impl CommandHandler for Expire {
    fn name(&self) -> &'static str {
        "EXPIRE"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        let set = db.expire(&self.key, self.seconds);
        Ok(Frame::Integer(if set { 1 } else { 0 }))
    }
}

/// TTL command - remaining time to live in seconds
///
/// Replies -2 when the key is absent or expired and -1 when it carries no
/// expiration.
#[derive(Debug)]
pub struct Ttl {
    pub key: Bytes,
}

impl Ttl {
    pub fn parse(mut args: Vec<Frame>) -> Result<Self> {
        Ok(Ttl {
            key: next_bulk(&mut args)?,
        })
    }
}

impl CommandHandler for Ttl {
    fn name(&self) -> &'static str {
        "TTL"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        Ok(Frame::Integer(db.ttl_secs(&self.key)))
    }
}
