#![allow(clippy::module_name_repetitions)]

//! Parser for the bridge control REPL.
//!
//! Lines are parsed directly from `&str` with `winnow` combinators, so the
//! grammar stays allocation free and usable from `no_std` targets. Keywords
//! and switch values are case-insensitive.

use core::fmt;

use winnow::ModalResult;
use winnow::ascii::{Caseless, space0};
use winnow::combinator::{alt, preceded};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

/// Parse failures, borrowing the offending text from the input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    /// The line held nothing but whitespace.
    Empty,
    UnknownCommand(&'a str),
    MissingArgument {
        command: &'static str,
    },
    InvalidArgument {
        command: &'static str,
        found: &'a str,
    },
    /// The command parsed but more text followed it.
    TrailingInput(&'a str),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::UnknownCommand(word) => {
                write!(f, "unknown command `{word}` (try `help`)")
            }
            ParseError::MissingArgument { command } => {
                write!(f, "`{command}` needs an argument")
            }
            ParseError::InvalidArgument { command, found } => {
                write!(f, "invalid argument `{found}` for `{command}`")
            }
            ParseError::TrailingInput(rest) => write!(f, "unexpected input `{rest}`"),
        }
    }
}

/// Equalizer selection requested by the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EqMode {
    /// Learn the configuration.
    Auto,
    /// Pin the bypass setting.
    Forced(bool),
}

impl EqMode {
    #[must_use]
    pub const fn as_override(self) -> Option<bool> {
        match self {
            EqMode::Auto => None,
            EqMode::Forced(bypass) => Some(bypass),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Status,
    Timing,
    Stats,
    Eq(EqMode),
    Stream(bool),
    Pattern(bool),
    Help(HelpCommand<'a>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

/// Parse a REPL command from the provided line.
///
/// # Errors
///
/// Returns a [`ParseError`] naming the first token that could not be used.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let mut input = line.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let keyword = word
        .parse_next(&mut input)
        .map_err(|_| ParseError::UnknownCommand(next_token(input)))?;

    let command = if keyword.eq_ignore_ascii_case("status") {
        Command::Status
    } else if keyword.eq_ignore_ascii_case("timing") {
        Command::Timing
    } else if keyword.eq_ignore_ascii_case("stats") {
        Command::Stats
    } else if keyword.eq_ignore_ascii_case("eq") {
        Command::Eq(argument(&mut input, "eq", eq_mode)?)
    } else if keyword.eq_ignore_ascii_case("stream") {
        Command::Stream(argument(&mut input, "stream", switch)?)
    } else if keyword.eq_ignore_ascii_case("pattern") {
        Command::Pattern(argument(&mut input, "pattern", switch)?)
    } else if keyword.eq_ignore_ascii_case("help") {
        let topic = word.parse_next(&mut input).ok();
        Command::Help(HelpCommand { topic })
    } else {
        return Err(ParseError::UnknownCommand(keyword));
    };

    let rest = input.trim_start();
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::TrailingInput(rest))
    }
}

fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        space0,
        take_while(1.., |c: char| {
            c.is_ascii_alphanumeric() || c == '-' || c == '_'
        }),
    )
    .parse_next(input)
}

fn switch(input: &mut &str) -> ModalResult<bool> {
    alt((
        alt((
            literal(Caseless("on")),
            literal(Caseless("enable")),
            literal("1"),
        ))
        .value(true),
        alt((
            literal(Caseless("off")),
            literal(Caseless("disable")),
            literal("0"),
        ))
        .value(false),
    ))
    .parse_next(input)
}

fn eq_mode(input: &mut &str) -> ModalResult<EqMode> {
    alt((
        literal(Caseless("auto")).value(EqMode::Auto),
        switch.map(EqMode::Forced),
    ))
    .parse_next(input)
}

/// Reads the next word and requires `value` to consume all of it.
fn argument<'a, O>(
    input: &mut &'a str,
    command: &'static str,
    mut value: impl FnMut(&mut &'a str) -> ModalResult<O>,
) -> Result<O, ParseError<'a>> {
    let Ok(token) = word.parse_next(input) else {
        let rest = input.trim_start();
        return Err(if rest.is_empty() {
            ParseError::MissingArgument { command }
        } else {
            ParseError::InvalidArgument {
                command,
                found: next_token(rest),
            }
        });
    };

    let mut remaining = token;
    match value(&mut remaining) {
        Ok(parsed) if remaining.is_empty() => Ok(parsed),
        _ => Err(ParseError::InvalidArgument {
            command,
            found: token,
        }),
    }
}

fn next_token(input: &str) -> &str {
    let input = input.trim_start();
    input
        .split(|c: char| c.is_ascii_whitespace())
        .next()
        .unwrap_or(input)
}
