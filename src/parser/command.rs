//! Command table and lookup

use super::request::{ParseError, MAX_ARGS};
use std::fmt;
use std::str::FromStr;

/// Marker for commands without an upper argument bound
pub const VARIADIC: usize = MAX_ARGS;

/// Longer command tokens are never looked up
pub(crate) const MAX_COMMAND_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandType {
    #[default]
    Unknown,
    // Strings
    Get,
    Set,
    Incr,
    Decr,
    IncrBy,
    Append,
    // Lists
    LPush,
    RPush,
    LPop,
    RPop,
    LRange,
    LLen,
    // Sets
    SAdd,
    SRem,
    SIsMember,
    SMembers,
    SCard,
    // Hashes
    HSet,
    HGet,
    HDel,
    HGetAll,
    HExists,
    // Sorted sets
    ZAdd,
    ZRem,
    ZScore,
    ZRange,
    ZCard,
    // JSON documents
    JsonSet,
    JsonGet,
    JsonDel,
    // Streams
    XAdd,
    XLen,
    XRange,
    // Keyspace and server
    Type,
    Exists,
    Del,
    Ping,
    Echo,
    FlushDb,
    Info,
}

/// Name and arity of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: &'static str,
    pub command: CommandType,
    pub min_args: usize,
    /// [`VARIADIC`] for commands taking any number of trailing arguments
    pub max_args: usize,
}

impl CommandInfo {
    const fn new(name: &'static str, command: CommandType, min_args: usize, max_args: usize) -> Self {
        Self {
            name,
            command,
            min_args,
            max_args,
        }
    }

    pub fn is_variadic(&self) -> bool {
        self.max_args >= VARIADIC
    }

    /// Whether the first argument names a key
    pub fn has_key(&self) -> bool {
        self.min_args >= 1
    }
}

pub static COMMANDS: [CommandInfo; 40] = [
    CommandInfo::new("GET", CommandType::Get, 1, 1),
    CommandInfo::new("SET", CommandType::Set, 2, 2),
    CommandInfo::new("INCR", CommandType::Incr, 1, 1),
    CommandInfo::new("DECR", CommandType::Decr, 1, 1),
    CommandInfo::new("INCRBY", CommandType::IncrBy, 2, 2),
    CommandInfo::new("APPEND", CommandType::Append, 2, 2),
    CommandInfo::new("LPUSH", CommandType::LPush, 2, VARIADIC),
    CommandInfo::new("RPUSH", CommandType::RPush, 2, VARIADIC),
    CommandInfo::new("LPOP", CommandType::LPop, 1, 1),
    CommandInfo::new("RPOP", CommandType::RPop, 1, 1),
    CommandInfo::new("LRANGE", CommandType::LRange, 3, 3),
    CommandInfo::new("LLEN", CommandType::LLen, 1, 1),
    CommandInfo::new("SADD", CommandType::SAdd, 2, VARIADIC),
    CommandInfo::new("SREM", CommandType::SRem, 2, VARIADIC),
    CommandInfo::new("SISMEMBER", CommandType::SIsMember, 2, 2),
    CommandInfo::new("SMEMBERS", CommandType::SMembers, 1, 1),
    CommandInfo::new("SCARD", CommandType::SCard, 1, 1),
    CommandInfo::new("HSET", CommandType::HSet, 3, 3),
    CommandInfo::new("HGET", CommandType::HGet, 2, 2),
    CommandInfo::new("HDEL", CommandType::HDel, 2, VARIADIC),
    CommandInfo::new("HGETALL", CommandType::HGetAll, 1, 1),
    CommandInfo::new("HEXISTS", CommandType::HExists, 2, 2),
    CommandInfo::new("ZADD", CommandType::ZAdd, 3, VARIADIC),
    CommandInfo::new("ZREM", CommandType::ZRem, 2, VARIADIC),
    CommandInfo::new("ZSCORE", CommandType::ZScore, 2, 2),
    CommandInfo::new("ZRANGE", CommandType::ZRange, 3, 4),
    CommandInfo::new("ZCARD", CommandType::ZCard, 1, 1),
    CommandInfo::new("JSON.SET", CommandType::JsonSet, 3, 3),
    CommandInfo::new("JSON.GET", CommandType::JsonGet, 2, 2),
    CommandInfo::new("JSON.DEL", CommandType::JsonDel, 2, 2),
    CommandInfo::new("XADD", CommandType::XAdd, 3, VARIADIC),
    CommandInfo::new("XLEN", CommandType::XLen, 1, 1),
    CommandInfo::new("XRANGE", CommandType::XRange, 3, 5),
    CommandInfo::new("TYPE", CommandType::Type, 1, 1),
    CommandInfo::new("EXISTS", CommandType::Exists, 1, VARIADIC),
    CommandInfo::new("DEL", CommandType::Del, 1, VARIADIC),
    CommandInfo::new("PING", CommandType::Ping, 0, 1),
    CommandInfo::new("ECHO", CommandType::Echo, 1, 1),
    CommandInfo::new("FLUSHDB", CommandType::FlushDb, 0, 0),
    CommandInfo::new("INFO", CommandType::Info, 0, 1),
];

/// Case-insensitive table lookup of a command token
pub(crate) fn lookup(token: &[u8]) -> Option<&'static CommandInfo> {
    if token.len() > MAX_COMMAND_LEN {
        return None;
    }
    COMMANDS
        .iter()
        .find(|info| info.name.as_bytes().eq_ignore_ascii_case(token))
}

pub fn get_command_type(token: &[u8]) -> CommandType {
    lookup(token).map_or(CommandType::Unknown, |info| info.command)
}

/// Canonical upper-case name, `"UNKNOWN"` for [`CommandType::Unknown`]
pub fn get_command_name(command: CommandType) -> &'static str {
    command_info(command).map_or("UNKNOWN", |info| info.name)
}

pub fn command_info(command: CommandType) -> Option<&'static CommandInfo> {
    COMMANDS.iter().find(|info| info.command == command)
}

impl CommandType {
    pub fn name(self) -> &'static str {
        get_command_name(self)
    }

    pub fn info(self) -> Option<&'static CommandInfo> {
        command_info(self)
    }

    pub fn is_known(self) -> bool {
        self != CommandType::Unknown
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match get_command_type(s.as_bytes()) {
            CommandType::Unknown => Err(ParseError::UnknownCommand),
            command => Ok(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(get_command_type(b"get"), CommandType::Get);
        assert_eq!(get_command_type(b"GeT"), CommandType::Get);
        assert_eq!(get_command_type(b"json.set"), CommandType::JsonSet);
        assert_eq!(get_command_type(b"GETX"), CommandType::Unknown);
        assert_eq!(get_command_type(b""), CommandType::Unknown);
    }

    #[test]
    fn test_long_tokens_are_unknown() {
        let token = [b'A'; MAX_COMMAND_LEN + 1];
        assert_eq!(get_command_type(&token), CommandType::Unknown);
    }

    #[test]
    fn test_names_round_trip_through_table() {
        for info in &COMMANDS {
            assert_eq!(get_command_name(info.command), info.name);
            assert_eq!(info.name.parse::<CommandType>().unwrap(), info.command);
            assert!(info.min_args <= info.max_args);
        }
        assert_eq!(get_command_name(CommandType::Unknown), "UNKNOWN");
        assert_eq!(CommandType::Unknown.to_string(), "UNKNOWN");
        assert_eq!(
            "nope".parse::<CommandType>(),
            Err(ParseError::UnknownCommand)
        );
    }

    #[test]
    fn test_arity_table_entries() {
        let zrange = command_info(CommandType::ZRange).unwrap();
        assert_eq!((zrange.min_args, zrange.max_args), (3, 4));
        assert!(!zrange.is_variadic());
        assert!(command_info(CommandType::Del).unwrap().is_variadic());
        assert!(!command_info(CommandType::Ping).unwrap().has_key());
        assert!(command_info(CommandType::Unknown).is_none());
    }
}
