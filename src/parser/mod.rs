//! Zero-copy command parser.
//!
//! Requests are single lines of whitespace-separated tokens. The parsed
//! request lives in a caller-supplied [`Arena`] and every argument borrows
//! the input buffer, so a parse performs no heap allocation.

mod command;
mod request;

pub use command::{
    command_info, get_command_name, get_command_type, CommandInfo, CommandType, COMMANDS,
    VARIADIC,
};
pub use request::{validate_request, Numeric, ParseError, ParsedRequest, MAX_ARGS};

use crate::arena::Arena;
use std::mem;
use tracing::trace;

/// Arena bytes one parse needs in the worst case
pub const fn request_footprint() -> usize {
    mem::size_of::<ParsedRequest<'static>>() + mem::align_of::<ParsedRequest<'static>>()
}

/// Parse one request into `arena`.
///
/// Returns `None` for empty input or when the arena cannot hold the
/// request. Every other failure is reported through
/// [`ParsedRequest::error`] with the fields parsed so far left in place.
pub fn parse<'a, 'buf: 'a>(
    input: &'buf [u8],
    arena: &'a Arena,
) -> Option<&'a mut ParsedRequest<'buf>> {
    if input.is_empty() {
        return None;
    }

    let request = arena.alloc_value(ParsedRequest::new())?;
    if let Err(err) = parse_into(input, request) {
        request.error = Some(err);
    }
    trace!(
        command = %request.command,
        args = request.arg_count(),
        error = ?request.error,
        "Parsed request"
    );
    Some(request)
}

fn parse_into<'buf>(
    input: &'buf [u8],
    request: &mut ParsedRequest<'buf>,
) -> Result<(), ParseError> {
    let mut pos = skip_blanks(input, 0);
    if pos >= input.len() {
        return Err(ParseError::EmptyCommand);
    }

    let cmd_end = token_end(input, pos);
    let info = command::lookup(&input[pos..cmd_end]).ok_or(ParseError::UnknownCommand)?;
    request.command = info.command;
    pos = cmd_end;

    while pos < input.len() && request.arg_count() < MAX_ARGS {
        pos = skip_blanks(input, pos);
        if pos >= input.len() || input[pos] == b'\n' {
            break;
        }

        match input[pos] {
            quote @ (b'"' | b'\'') => {
                let start = pos + 1;
                let close = closing_quote(input, start, quote).ok_or(ParseError::UnclosedQuote)?;
                request.push_arg(&input[start..close]);
                pos = close + 1;
            }
            _ => {
                let end = token_end(input, pos);
                request.push_arg(&input[pos..end]);
                pos = end;
            }
        }
    }

    if info.has_key() {
        if let Some(key) = request.arg(0) {
            request.key = key;
        }
    }

    let count = request.arg_count();
    if count < info.min_args {
        return Err(ParseError::TooFewArguments);
    }
    if !info.is_variadic() && count > info.max_args {
        return Err(ParseError::TooManyArguments);
    }

    if info.command == CommandType::IncrBy {
        if let Some(amount) = request.arg(1) {
            let parsed = parse_integer(amount);
            request.numeric = Numeric::Integer(parsed.unwrap_or_else(|prefix| prefix));
            parsed.map_err(|_| ParseError::InvalidInteger)?;
        }
    }

    Ok(())
}

#[inline]
fn is_blank(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r')
}

#[inline]
fn skip_blanks(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && is_blank(input[pos]) {
        pos += 1;
    }
    pos
}

#[inline]
fn token_end(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && !is_blank(input[pos]) && input[pos] != b'\n' {
        pos += 1;
    }
    pos
}

/// Index of the matching quote. A backslash and the byte after it are
/// skipped as a unit.
fn closing_quote(input: &[u8], mut pos: usize, quote: u8) -> Option<usize> {
    while pos < input.len() {
        match input[pos] {
            b if b == quote => return Some(pos),
            b'\\' if pos + 1 < input.len() => pos += 2,
            _ => pos += 1,
        }
    }
    None
}

/// Base-10 `i64` with optional leading whitespace and sign.
///
/// Out-of-range values saturate. An empty slice is zero. Anything else must
/// be consumed whole; otherwise the error carries the value of the numeric
/// prefix (zero when there is none).
fn parse_integer(bytes: &[u8]) -> Result<i64, i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    let mut rest = bytes;
    while let [first, tail @ ..] = rest {
        if first.is_ascii_whitespace() || *first == 0x0b {
            rest = tail;
        } else {
            break;
        }
    }

    let negative = match rest {
        [b'-', tail @ ..] => {
            rest = tail;
            true
        }
        [b'+', tail @ ..] => {
            rest = tail;
            false
        }
        _ => false,
    };
    if !rest.first().is_some_and(u8::is_ascii_digit) {
        return Err(0);
    }

    let mut value: i64 = 0;
    let mut saturated = false;
    for &byte in rest {
        if !byte.is_ascii_digit() {
            return Err(value);
        }
        if saturated {
            continue;
        }
        let digit = i64::from(byte - b'0');
        let next = value.checked_mul(10).and_then(|v| {
            if negative {
                v.checked_sub(digit)
            } else {
                v.checked_add(digit)
            }
        });
        match next {
            Some(v) => value = v,
            None => {
                saturated = true;
                value = if negative { i64::MIN } else { i64::MAX };
            }
        }
    }
    Ok(value)
}
