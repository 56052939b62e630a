//! Command parsing and dispatch.
//!
//! A static table maps each command name to its arity and flags; a decoded
//! request frame is validated against the table, parsed into a typed
//! command and executed against the store. All failures become single-line
//! error frames; the connection stays open.

use anyhow::Result;
use bytes::Bytes;

use kestrel_core::error::CommandError;
use kestrel_core::resp::Frame;
use kestrel_core::store::Db;

pub mod connection;
pub mod server_info;
pub mod set_get;
pub mod string;
pub mod ttl;

/// Command mutates the store and is appended to the log.
pub const CMD_WRITE: u8 = 1 << 0;
/// Command never mutates the store.
pub const CMD_READONLY: u8 = 1 << 1;
/// Command runs in constant or near-constant time.
pub const CMD_FAST: u8 = 1 << 2;

/// One row of the static command table.
pub struct CommandSpec {
    pub name: &'static str,
    /// Arity including the command name itself: `n >= 0` means exactly `n`
    /// arguments, `-n` means at least `n`.
    pub arity: i8,
    pub flags: u8,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "PING",
        arity: -1,
        flags: CMD_READONLY | CMD_FAST,
    },
    CommandSpec {
        name: "SET",
        arity: -3,
        flags: CMD_WRITE,
    },
    CommandSpec {
        name: "GET",
        arity: 2,
        flags: CMD_READONLY | CMD_FAST,
    },
    CommandSpec {
        name: "TTL",
        arity: 2,
        flags: CMD_READONLY | CMD_FAST,
    },
    CommandSpec {
        name: "EXISTS",
        arity: 2,
        flags: CMD_READONLY | CMD_FAST,
    },
    CommandSpec {
        name: "DEL",
        arity: -2,
        flags: CMD_WRITE,
    },
    CommandSpec {
        name: "EXPIRE",
        arity: 3,
        flags: CMD_WRITE,
    },
    CommandSpec {
        name: "INCR",
        arity: 2,
        flags: CMD_WRITE,
    },
    CommandSpec {
        name: "INFO",
        arity: -1,
        flags: CMD_READONLY,
    },
    // Never logged; executed at the connection layer because it drives the
    // append log rather than the store.
    CommandSpec {
        name: "BGREWRITEAOF",
        arity: 1,
        flags: 0,
    },
];

/// Find the table row for a (case-insensitive) command name.
pub fn lookup(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| name.eq_ignore_ascii_case(spec.name.as_bytes()))
}

/// Whether an undispatched request frame names a write command.
pub fn is_write(frame: &Frame) -> bool {
    let Frame::Array(items) = frame else {
        return false;
    };
    let Some(Frame::BulkString(name)) = items.first() else {
        return false;
    };
    lookup(name).is_some_and(|spec| spec.flags & CMD_WRITE != 0)
}

/// Executable behavior shared by all typed commands.
pub trait CommandHandler {
    fn name(&self) -> &'static str;
    fn execute(&self, db: &mut Db) -> Result<Frame>;
}

#[derive(Debug)]
pub enum Command {
    Ping(connection::Ping),
    Set(set_get::Set),
    Get(set_get::Get),
    Del(set_get::Del),
    Exists(set_get::Exists),
    Ttl(ttl::Ttl),
    Expire(ttl::Expire),
    Incr(string::Incr),
    Info(server_info::Info),
    BgRewriteAof,
}

impl Command {
    /// Validate a request frame against the command table and parse it.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let items = match frame {
            Frame::Array(items) if !items.is_empty() => items,
            _ => return Err(CommandError::invalid_command().into()),
        };

        let name: Bytes = match &items[0] {
            Frame::BulkString(bytes) => bytes.clone(),
            _ => return Err(CommandError::invalid_command().into()),
        };
        let display_name = String::from_utf8_lossy(&name).to_uppercase();
        let spec =
            lookup(&name).ok_or_else(|| CommandError::unknown_command(&display_name))?;

        let argc = items.len() as i64;
        if (spec.arity >= 0 && argc != i64::from(spec.arity))
            || (spec.arity < 0 && argc < i64::from(-spec.arity))
        {
            return Err(CommandError::wrong_arity(spec.name).into());
        }

        let mut args = items;
        args.remove(0);

        Ok(match spec.name {
            "PING" => Command::Ping(connection::Ping::parse(args)?),
            "SET" => Command::Set(set_get::Set::parse(args)?),
            "GET" => Command::Get(set_get::Get::parse(args)?),
            "DEL" => Command::Del(set_get::Del::parse(args)?),
            "EXISTS" => Command::Exists(set_get::Exists::parse(args)?),
            "TTL" => Command::Ttl(ttl::Ttl::parse(args)?),
            "EXPIRE" => Command::Expire(ttl::Expire::parse(args)?),
            "INCR" => Command::Incr(string::Incr::parse(args)?),
            "INFO" => Command::Info(server_info::Info),
            "BGREWRITEAOF" => Command::BgRewriteAof,
            other => return Err(CommandError::unknown_command(other).into()),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(cmd) => cmd.name(),
            Command::Set(cmd) => cmd.name(),
            Command::Get(cmd) => cmd.name(),
            Command::Del(cmd) => cmd.name(),
            Command::Exists(cmd) => cmd.name(),
            Command::Ttl(cmd) => cmd.name(),
            Command::Expire(cmd) => cmd.name(),
            Command::Incr(cmd) => cmd.name(),
            Command::Info(cmd) => cmd.name(),
            Command::BgRewriteAof => "BGREWRITEAOF",
        }
    }

    pub fn execute(&self, db: &mut Db) -> Result<Frame> {
        match self {
            Command::Ping(cmd) => cmd.execute(db),
            Command::Set(cmd) => cmd.execute(db),
            Command::Get(cmd) => cmd.execute(db),
            Command::Del(cmd) => cmd.execute(db),
            Command::Exists(cmd) => cmd.execute(db),
            Command::Ttl(cmd) => cmd.execute(db),
            Command::Expire(cmd) => cmd.execute(db),
            Command::Incr(cmd) => cmd.execute(db),
            Command::Info(cmd) => cmd.execute(db),
            Command::BgRewriteAof => {
                Err(CommandError::generic("BGREWRITEAOF handled by the server").into())
            }
        }
    }
}

/// Parse and execute one request frame, turning every failure into an
/// error frame.
pub fn dispatch(frame: Frame, db: &mut Db) -> Frame {
    match Command::from_frame(frame) {
        Ok(cmd) => match cmd.execute(db) {
            Ok(reply) => reply,
            Err(e) => Frame::Error(e.to_string()),
        },
        Err(e) => Frame::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: &[&[u8]]) -> Frame {
        Frame::Array(
            args.iter()
                .map(|a| Frame::BulkString(Bytes::copy_from_slice(a)))
                .collect(),
        )
    }

    #[test]
    fn test_ping() {
        let mut db = Db::new();
        let reply = dispatch(request(&[b"PING"]), &mut db);
        assert_eq!(reply, Frame::SimpleString("PONG".to_string()));
    }

    #[test]
    fn test_ping_lowercase() {
        let mut db = Db::new();
        let reply = dispatch(request(&[b"ping"]), &mut db);
        assert_eq!(reply, Frame::SimpleString("PONG".to_string()));
    }

    #[test]
    fn test_set_then_get() {
        let mut db = Db::new();
        let reply = dispatch(request(&[b"SET", b"k", b"v"]), &mut db);
        assert_eq!(reply, Frame::SimpleString("OK".to_string()));

        let reply = dispatch(request(&[b"GET", b"k"]), &mut db);
        assert_eq!(reply, Frame::BulkString(Bytes::from_static(b"v")));

        let reply = dispatch(request(&[b"GET", b"missing"]), &mut db);
        assert_eq!(reply, Frame::NullBulkString);
    }

    #[test]
    fn test_invalid_command_frame() {
        let mut db = Db::new();
        let reply = dispatch(Frame::Integer(7), &mut db);
        assert_eq!(reply, Frame::Error("ERR invalid command".to_string()));

        let reply = dispatch(Frame::Array(vec![]), &mut db);
        assert_eq!(reply, Frame::Error("ERR invalid command".to_string()));
    }

    #[test]
    fn test_unknown_command() {
        let mut db = Db::new();
        let reply = dispatch(request(&[b"flush", b"now"]), &mut db);
        assert_eq!(reply, Frame::Error("ERR unknown command 'FLUSH'".to_string()));
    }

    #[test]
    fn test_arity_exact() {
        let mut db = Db::new();
        let reply = dispatch(request(&[b"GET"]), &mut db);
        assert_eq!(
            reply,
            Frame::Error("ERR wrong number of arguments for 'GET' command".to_string())
        );

        let reply = dispatch(request(&[b"GET", b"a", b"b"]), &mut db);
        assert_eq!(
            reply,
            Frame::Error("ERR wrong number of arguments for 'GET' command".to_string())
        );
    }

    #[test]
    fn test_arity_at_least() {
        let mut db = Db::new();
        let reply = dispatch(request(&[b"SET", b"k"]), &mut db);
        assert_eq!(
            reply,
            Frame::Error("ERR wrong number of arguments for 'SET' command".to_string())
        );
        // Extra PING arguments are allowed by the -1 arity.
        let reply = dispatch(request(&[b"PING", b"hello"]), &mut db);
        assert_eq!(reply, Frame::SimpleString("PONG".to_string()));
    }

    #[test]
    fn test_del_counts_removed_keys() {
        let mut db = Db::new();
        dispatch(request(&[b"SET", b"a", b"1"]), &mut db);
        dispatch(request(&[b"SET", b"b", b"2"]), &mut db);

        let reply = dispatch(request(&[b"DEL", b"a", b"b", b"missing"]), &mut db);
        assert_eq!(reply, Frame::Integer(2));

        let reply = dispatch(request(&[b"DEL", b"a"]), &mut db);
        assert_eq!(reply, Frame::Integer(0));
    }

    #[test]
    fn test_exists() {
        let mut db = Db::new();
        dispatch(request(&[b"SET", b"k", b"v"]), &mut db);
        assert_eq!(dispatch(request(&[b"EXISTS", b"k"]), &mut db), Frame::Integer(1));
        assert_eq!(
            dispatch(request(&[b"EXISTS", b"nope"]), &mut db),
            Frame::Integer(0)
        );
    }

    #[test]
    fn test_incr_sequence() {
        let mut db = Db::new();
        dispatch(request(&[b"SET", b"n", b"10"]), &mut db);
        assert_eq!(dispatch(request(&[b"INCR", b"n"]), &mut db), Frame::Integer(11));
        assert_eq!(dispatch(request(&[b"INCR", b"n"]), &mut db), Frame::Integer(12));

        // Absent key starts from 1.
        assert_eq!(dispatch(request(&[b"INCR", b"m"]), &mut db), Frame::Integer(1));
    }

    #[test]
    fn test_incr_non_integer() {
        let mut db = Db::new();
        dispatch(request(&[b"SET", b"s", b"abc"]), &mut db);
        let reply = dispatch(request(&[b"INCR", b"s"]), &mut db);
        assert_eq!(
            reply,
            Frame::Error("ERR value is not an integer or out of range".to_string())
        );
    }

    #[test]
    fn test_incr_overflow() {
        let mut db = Db::new();
        dispatch(
            request(&[b"SET", b"n", i64::MAX.to_string().as_bytes()]),
            &mut db,
        );
        let reply = dispatch(request(&[b"INCR", b"n"]), &mut db);
        assert_eq!(
            reply,
            Frame::Error("ERR value is not an integer or out of range".to_string())
        );
    }

    #[test]
    fn test_expire_and_ttl() {
        let mut db = Db::new();
        dispatch(request(&[b"SET", b"k", b"v"]), &mut db);

        assert_eq!(dispatch(request(&[b"TTL", b"k"]), &mut db), Frame::Integer(-1));
        assert_eq!(
            dispatch(request(&[b"EXPIRE", b"k", b"100"]), &mut db),
            Frame::Integer(1)
        );
        match dispatch(request(&[b"TTL", b"k"]), &mut db) {
            Frame::Integer(ttl) => assert!((90..=100).contains(&ttl)),
            other => panic!("unexpected reply {:?}", other),
        }

        assert_eq!(
            dispatch(request(&[b"EXPIRE", b"missing", b"100"]), &mut db),
            Frame::Integer(0)
        );
        assert_eq!(
            dispatch(request(&[b"TTL", b"missing"]), &mut db),
            Frame::Integer(-2)
        );
    }

    #[test]
    fn test_expire_non_integer_seconds() {
        let mut db = Db::new();
        dispatch(request(&[b"SET", b"k", b"v"]), &mut db);
        let reply = dispatch(request(&[b"EXPIRE", b"k", b"soon"]), &mut db);
        assert_eq!(
            reply,
            Frame::Error("ERR value is not an integer or out of range".to_string())
        );
    }

    #[test]
    fn test_info_keyspace() {
        let mut db = Db::new();
        dispatch(request(&[b"SET", b"a", b"1"]), &mut db);
        dispatch(request(&[b"SET", b"b", b"2"]), &mut db);
        dispatch(request(&[b"EXPIRE", b"b", b"100"]), &mut db);

        match dispatch(request(&[b"INFO"]), &mut db) {
            Frame::BulkString(body) => {
                let text = String::from_utf8_lossy(&body).into_owned();
                assert!(text.contains("# Keyspace"));
                assert!(text.contains("keys=2,expires=1"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_is_write() {
        assert!(is_write(&request(&[b"SET", b"k", b"v"])));
        assert!(is_write(&request(&[b"del", b"k"])));
        assert!(!is_write(&request(&[b"GET", b"k"])));
        assert!(!is_write(&request(&[b"PING"])));
        assert!(!is_write(&request(&[b"BGREWRITEAOF"])));
        assert!(!is_write(&Frame::Integer(1)));
    }

    #[test]
    fn test_table_lookup() {
        assert!(lookup(b"get").is_some());
        assert!(lookup(b"GET").is_some());
        assert!(lookup(b"NOPE").is_none());

        let spec = lookup(b"SET").unwrap();
        assert_eq!(spec.arity, -3);
        assert_ne!(spec.flags & CMD_WRITE, 0);
    }
}
