//! Command interpreter.
//!
//! The control protocol is one ASCII character per line (CR, LF or CRLF terminated) plus two
//! raw control bytes that act immediately, even in the middle of a line:
//!
//! | input | command |
//! |---|---|
//! | `i` / `k` | START (channel A) HIGH window +1 / -1 |
//! | `w` / `s` | STOP (channel B) LOW prefix +1 / -1 |
//! | `a` | auto mode on |
//! | `0x03` | abort |
//! | `0x04` | restart |
//!
//! Input is trimmed and case-insensitive. Blank lines are skipped.

use core::fmt;

use thiserror::Error;

use crate::codec::Channel;
use crate::lifecycle::{Backend, Flow, Lifecycle};

pub const KEY_START_INCREMENT: char = 'i';
pub const KEY_START_DECREMENT: char = 'k';
pub const KEY_STOP_INCREMENT: char = 'w';
pub const KEY_STOP_DECREMENT: char = 's';
pub const KEY_AUTO: char = 'a';

/// Ctrl+C
pub const ABORT: u8 = 0x03;
/// Ctrl+D
pub const RESTART: u8 = 0x04;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Increment(Channel),
    Decrement(Channel),
    AutoToggle,
    Abort,
    Restart,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty line")]
    Empty,
    #[error("unknown command")]
    Unknown,
    #[error("line too long")]
    TooLong,
}

/// Parse one line, terminator already stripped.
pub fn parse_line(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let mut chars = line.chars();
    let (Some(key), None) = (chars.next(), chars.next()) else {
        return Err(if line.is_empty() {
            CommandError::Empty
        } else {
            CommandError::Unknown
        });
    };
    match key.to_ascii_lowercase() {
        KEY_START_INCREMENT => Ok(Command::Increment(Channel::Start)),
        KEY_START_DECREMENT => Ok(Command::Decrement(Channel::Start)),
        KEY_STOP_INCREMENT => Ok(Command::Increment(Channel::Stop)),
        KEY_STOP_DECREMENT => Ok(Command::Decrement(Channel::Stop)),
        KEY_AUTO => Ok(Command::AutoToggle),
        _ => Err(CommandError::Unknown),
    }
}

/// Collects bytes into lines and picks out the control bytes.
pub struct LineAssembler {
    buf: [u8; config::LINE_SIZE],
    len: usize,
    overflow: bool,
}

/// One decoded event.
pub type Input = Result<Command, CommandError>;

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; config::LINE_SIZE],
            len: 0,
            overflow: false,
        }
    }

    /// Feed one byte. Returns an event once a line is complete or a control byte arrives.
    pub fn push(&mut self, byte: u8) -> Option<Input> {
        match byte {
            ABORT => {
                self.clear();
                Some(Ok(Command::Abort))
            }
            RESTART => {
                self.clear();
                Some(Ok(Command::Restart))
            }
            b'\r' | b'\n' => {
                let input = if self.overflow {
                    Err(CommandError::TooLong)
                } else {
                    match core::str::from_utf8(&self.buf[..self.len]) {
                        Ok(line) => parse_line(line),
                        Err(_) => Err(CommandError::Unknown),
                    }
                };
                self.clear();
                match input {
                    Err(CommandError::Empty) => None,
                    other => Some(other),
                }
            }
            _ => {
                if self.len < self.buf.len() {
                    self.buf[self.len] = byte;
                    self.len += 1;
                } else {
                    self.overflow = true;
                }
                None
            }
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.overflow = false;
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes in, lifecycle calls out.
#[derive(Default)]
pub struct Interpreter {
    line: LineAssembler,
}

impl Interpreter {
    pub const fn new() -> Self {
        Self {
            line: LineAssembler::new(),
        }
    }

    pub fn feed<B: Backend, W: fmt::Write>(
        &mut self,
        byte: u8,
        lifecycle: &mut Lifecycle<B>,
        out: &mut W,
    ) -> Option<Flow> {
        match self.line.push(byte)? {
            Ok(command) => Some(lifecycle.apply(command, out)),
            Err(error) => Some(lifecycle.reject(error, out)),
        }
    }

    /// Feed a whole chunk. Returns the flow after the last complete event, if any.
    pub fn feed_all<B: Backend, W: fmt::Write>(
        &mut self,
        bytes: &[u8],
        lifecycle: &mut Lifecycle<B>,
        out: &mut W,
    ) -> Option<Flow> {
        bytes
            .iter()
            .fold(None, |flow, byte| self.feed(*byte, lifecycle, out).or(flow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(bytes: &[u8]) -> Vec<Input> {
        let mut line = LineAssembler::new();
        bytes.iter().filter_map(|b| line.push(*b)).collect()
    }

    #[test]
    fn parses_key_map() {
        assert_eq!(parse_line("i"), Ok(Command::Increment(Channel::Start)));
        assert_eq!(parse_line("k"), Ok(Command::Decrement(Channel::Start)));
        assert_eq!(parse_line("w"), Ok(Command::Increment(Channel::Stop)));
        assert_eq!(parse_line("s"), Ok(Command::Decrement(Channel::Stop)));
        assert_eq!(parse_line("a"), Ok(Command::AutoToggle));
    }

    #[test]
    fn trims_and_ignores_case() {
        assert_eq!(parse_line("  W \t"), Ok(Command::Increment(Channel::Stop)));
    }

    #[test]
    fn rejects_unknown_and_multi_char() {
        assert_eq!(parse_line("x"), Err(CommandError::Unknown));
        assert_eq!(parse_line("ww"), Err(CommandError::Unknown));
        assert_eq!(parse_line("   "), Err(CommandError::Empty));
    }

    #[test]
    fn crlf_lines_yield_one_event_each() {
        assert_eq!(
            events(b"w\r\ns\r\n\r\na\n"),
            vec![
                Ok(Command::Increment(Channel::Stop)),
                Ok(Command::Decrement(Channel::Stop)),
                Ok(Command::AutoToggle),
            ]
        );
    }

    #[test]
    fn control_bytes_cut_through_a_partial_line() {
        assert_eq!(
            events(b"ww\x03i\r\n\x04"),
            vec![
                Ok(Command::Abort),
                Ok(Command::Increment(Channel::Start)),
                Ok(Command::Restart),
            ]
        );
    }

    #[test]
    fn overlong_line_is_rejected_once() {
        let mut bytes = vec![b'w'; config::LINE_SIZE + 5];
        bytes.extend_from_slice(b"\r\ni\r\n");
        assert_eq!(
            events(&bytes),
            vec![Err(CommandError::TooLong), Ok(Command::Increment(Channel::Start))]
        );
    }

    #[test]
    fn invalid_utf8_is_unknown() {
        assert_eq!(events(b"\xff\n"), vec![Err(CommandError::Unknown)]);
    }
}
