//! SET/GET/DEL/EXISTS Command Implementations

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

/// GET command - retrieve a value by key
#[derive(Debug)]
pub struct Get {
    pub key: Bytes,
}

impl Get {
    pub fn parse(mut args: Vec<Frame>) -> Result<Self> {
        Ok(Get {
            key: next_bulk(&mut args)?,
        })
    }
}

impl CommandHandler for Get {
    fn name(&self) -> &'static str {
        "GET"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        Ok(match db.get(&self.key) {
            Some(value) => Frame::BulkString(value),
            None => Frame::NullBulkString,
        })
    }
}

/// SET command - store a key-value pair, optionally with a TTL
///
/// `SET key value [EX seconds | PX milliseconds]`
#[derive(Debug)]
pub struct Set {
    pub key: Bytes,
    pub value: Bytes,
    /// TTL in milliseconds; None means no expiration
    pub expiry_ms: Option<i64>,
}

impl Set {
    pub fn parse(mut args: Vec<Frame>) -> Result<Self> {
        let key = next_bulk(&mut args)?;
        let value = next_bulk(&mut args)?;

        let mut expiry_ms = None;
        while !args.is_empty() {
            let opt = next_bulk(&mut args)?;
            if opt.eq_ignore_ascii_case(b"EX") {
                // EX and PX are mutually exclusive and may appear once.
                if expiry_ms.is_some() {
                    return Err(CommandError::syntax().into());
                }
                let seconds = Self::parse_expiry_arg(&mut args)?;
                expiry_ms = Some(
                    seconds
                        .checked_mul(1000)
                        .ok_or_else(CommandError::not_integer)?,
                );
            } else if opt.eq_ignore_ascii_case(b"PX") {
                if expiry_ms.is_some() {
                    return Err(CommandError::syntax().into());
                }
                expiry_ms = Some(Self::parse_expiry_arg(&mut args)?);
            } else {
                return Err(CommandError::syntax().into());
            }
        }

        Ok(Set {
            key,
            value,
            expiry_ms,
        })
    }

    /// Parse the follow-on value of EX/PX: a positive integer.
    fn parse_expiry_arg(args: &mut Vec<Frame>) -> Result<i64> {
        if args.is_empty() {
            return Err(CommandError::syntax().into());
        }
        let bytes = match args.remove(0) {
            Frame::BulkString(bytes) => bytes,
            _ => return Err(CommandError::not_integer().into()),
        };
        let n = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(CommandError::not_integer)?;
        if n <= 0 {
            return Err(CommandError::syntax().into());
        }
        Ok(n)
    }
}

impl CommandHandler for Set {
    fn name(&self) -> &'static str {
        "SET"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        match self.expiry_ms {
            Some(ms) => db.set_px(self.key.to_vec(), self.value.clone(), ms),
            None => db.set(self.key.to_vec(), self.value.clone()),
        }
        Ok(Frame::SimpleString("OK".to_string()))
    }
}

/// DEL command - remove one or more keys, replying with the removed count
#[derive(Debug)]
pub struct Del {
    pub keys: Vec<Bytes>,
}

impl Del {
    pub fn parse(mut args: Vec<Frame>) -> Result<Self> {
        let mut keys = Vec::with_capacity(args.len());
        while !args.is_empty() {
            keys.push(next_bulk(&mut args)?);
        }
        Ok(Del { keys })
    }
}

impl CommandHandler for Del {
    fn name(&self) -> &'static str {
        "DEL"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        let mut removed = 0;
        for key in &self.keys {
            if db.del(key) {
                removed += 1;
            }
        }
        Ok(Frame::Integer(removed))
    }
}

/// EXISTS command - check whether a key is present and unexpired
#[derive(Debug)]
pub struct Exists {
    pub key: Bytes,
}

impl Exists {
    pub fn parse(mut args: Vec<Frame>) -> Result<Self> {
        Ok(Exists {
            key: next_bulk(&mut args)?,
        })
    }
}

impl CommandHandler for Exists {
    fn name(&self) -> &'static str {
        "EXISTS"
    }

    fn execute(&self, db: &mut Db) -> Result<Frame> {
        Ok(Frame::Integer(if db.exists(&self.key) { 1 } else { 0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&[u8]]) -> Vec<Frame> {
        values
            .iter()
            .map(|v| Frame::BulkString(Bytes::copy_from_slice(v)))
            .collect()
    }

    #[test]
    fn test_set_parse_plain() {
        let set = Set::parse(args(&[b"k", b"v"])).unwrap();
        assert_eq!(set.key, "k");
        assert_eq!(set.value, "v");
        assert_eq!(set.expiry_ms, None);
    }

    #[test]
    fn test_set_parse_ex() {
        let set = Set::parse(args(&[b"k", b"v", b"EX", b"10"])).unwrap();
        assert_eq!(set.expiry_ms, Some(10_000));

        // Options are case-insensitive.
        let set = Set::parse(args(&[b"k", b"v", b"ex", b"1"])).unwrap();
        assert_eq!(set.expiry_ms, Some(1000));
    }

    #[test]
    fn test_set_parse_px() {
        let set = Set::parse(args(&[b"k", b"v", b"PX", b"1500"])).unwrap();
        assert_eq!(set.expiry_ms, Some(1500));
    }

    #[test]
    fn test_set_parse_missing_follow_on() {
        let err = Set::parse(args(&[b"k", b"v", b"EX"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR syntax error");
    }

    #[test]
    fn test_set_parse_unknown_option() {
        let err = Set::parse(args(&[b"k", b"v", b"NX"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR syntax error");
    }

    #[test]
    fn test_set_parse_repeated_expiry() {
        let err = Set::parse(args(&[b"k", b"v", b"EX", b"1", b"PX", b"1000"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR syntax error");

        let err = Set::parse(args(&[b"k", b"v", b"EX", b"1", b"EX", b"2"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR syntax error");
    }

    #[test]
    fn test_set_parse_bad_expiry_values() {
        let err = Set::parse(args(&[b"k", b"v", b"EX", b"ten"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ERR value is not an integer or out of range"
        );

        let err = Set::parse(args(&[b"k", b"v", b"EX", b"0"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR syntax error");

        let err = Set::parse(args(&[b"k", b"v", b"PX", b"-5"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR syntax error");
    }

    #[test]
    fn test_set_execute_with_ttl() {
        let mut db = Db::new();
        let set = Set::parse(args(&[b"k", b"v", b"EX", b"100"])).unwrap();
        assert_eq!(
            set.execute(&mut db).unwrap(),
            Frame::SimpleString("OK".to_string())
        );
        assert!((90..=100).contains(&db.ttl_secs(b"k")));
    }

    #[test]
    fn test_del_parse() {
        let del = Del::parse(args(&[b"a", b"b", b"c"])).unwrap();
        assert_eq!(del.keys.len(), 3);
    }
}
