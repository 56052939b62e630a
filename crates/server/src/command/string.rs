//! String Command Implementations

use super::CommandHandler;
use anyhow::Result;
use bytes::Bytes;
use kestrel_core::error::CommandError;
use kestrel_core::resp::Frame;
use kestrel_core::store::Db;

/// INCR command - increment the integer value of a key by one
///
/// An absent key is created as "1". A value that does not parse as a
/// signed 64-bit integer, or an increment that would overflow, is an error.
#[derive(Debug)]
pub struct Incr {
    pub key: Bytes,
}

impl Incr {
    pub fn parse(mut args: Vec<Frame>) -> Result<Self> {
        if args.is_empty() {
            return Err(CommandError::syntax().into());
        }
        match args.remove(0) {
            Frame::BulkString(key) => Ok(Incr { key }),
            _ => Err(CommandError::syntax().into()),
        }
    }
}

impl CommandHandler for Incr {
    fn name(&self) -> &'static str {
        "INCR"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        let next = db.incr(&self.key).map_err(CommandError::from)?;
        Ok(Frame::Integer(next))
    }
}
