use super::command::{get_command_name, CommandType};
use std::fmt;
use thiserror::Error;

/// Arguments kept per request; extra ones are dropped
pub const MAX_ARGS: usize = 128;

const EMPTY_ARG: &[u8] = &[];

/// In-band parse failures. The messages are part of the wire contract.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command")]
    UnknownCommand,

    #[error("Too few arguments")]
    TooFewArguments,

    #[error("Too many arguments")]
    TooManyArguments,

    #[error("Unclosed quote")]
    UnclosedQuote,

    #[error("Invalid integer")]
    InvalidInteger,
}

/// Pre-parsed numeric argument.
///
/// Only `INCRBY` amounts are pre-parsed today; scores and indices are left
/// to the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Numeric {
    #[default]
    None,
    Integer(i64),
    Float(f64),
}

/// A request tokenized in place.
///
/// Every byte slice borrows the caller's input buffer; quotes are stripped
/// but escapes are left as written.
#[derive(Clone, Copy)]
pub struct ParsedRequest<'buf> {
    pub command: CommandType,
    /// First argument for keyed commands, empty otherwise
    pub key: &'buf [u8],
    pub numeric: Numeric,
    pub error: Option<ParseError>,
    args: [&'buf [u8]; MAX_ARGS],
    arg_count: usize,
}

impl<'buf> ParsedRequest<'buf> {
    pub(crate) fn new() -> Self {
        Self {
            command: CommandType::Unknown,
            key: &[],
            numeric: Numeric::None,
            error: None,
            args: [EMPTY_ARG; MAX_ARGS],
            arg_count: 0,
        }
    }

    pub(crate) fn push_arg(&mut self, arg: &'buf [u8]) {
        debug_assert!(self.arg_count < MAX_ARGS);
        self.args[self.arg_count] = arg;
        self.arg_count += 1;
    }

    pub fn args(&self) -> &[&'buf [u8]] {
        &self.args[..self.arg_count]
    }

    pub fn arg(&self, index: usize) -> Option<&'buf [u8]> {
        self.args().get(index).copied()
    }

    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    pub fn integer(&self) -> Option<i64> {
        match self.numeric {
            Numeric::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn float(&self) -> Option<f64> {
        match self.numeric {
            Numeric::Float(value) => Some(value),
            _ => None,
        }
    }

    pub fn command_name(&self) -> &'static str {
        get_command_name(self.command)
    }

    /// `true` when the command is known and no error was recorded
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.command.is_known()
    }

    pub fn check(&self) -> Result<(), ParseError> {
        match self.error {
            Some(err) => Err(err),
            None if !self.command.is_known() => Err(ParseError::UnknownCommand),
            None => Ok(()),
        }
    }
}

pub fn validate_request(request: &ParsedRequest<'_>) -> bool {
    request.is_valid()
}

impl fmt::Debug for ParsedRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self
            .args()
            .iter()
            .map(|arg| String::from_utf8_lossy(arg))
            .collect();
        f.debug_struct("ParsedRequest")
            .field("command", &self.command)
            .field("key", &String::from_utf8_lossy(self.key))
            .field("args", &args)
            .field("numeric", &self.numeric)
            .field("error", &self.error)
            .finish()
    }
}
