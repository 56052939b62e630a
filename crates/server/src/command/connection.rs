//! Connection Command Implementations

use super::CommandHandler;
use anyhow::Result;
use kestrel_core::resp::Frame;
use kestrel_core::store::Db;

/// PING command - liveness check, always replies PONG
#[derive(Debug)]
pub struct Ping;

impl Ping {
    pub fn parse(_args: Vec<Frame>) -> Result<Self> {
        Ok(Ping)
    }
}

impl CommandHandler for Ping {
    fn name(&self) -> &'static str {
        "PING"
    }

    fn execute(&self, _db: &mut Db) -> Result<Frame> {
        Ok(Frame::SimpleString("PONG".to_string()))
    }
}
