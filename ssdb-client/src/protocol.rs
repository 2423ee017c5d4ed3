//! # Block Protocol Encoding and Parsing
//!
//! Purpose: Encode client commands and parse server responses for the
//! length-prefixed text protocol, keeping allocations under control.
//!
//! ## Wire Format
//! Every unit on the wire is a block: `<decimal length>\n<raw bytes>\n`.
//! A request is the command name block followed by one block per argument;
//! a response is a status block followed by payload blocks. Both end with an
//! empty length line (a bare `\n`).
//!
//! ```text
//! 3\nget\n3\nkey\n\n          -> get key
//! 2\nok\n5\nvalue\n\n         <- ok value
//! ```
//!
//! ## Design Principles
//! 1. **Length-Governed**: Payload extent comes from the size line, so blocks
//!    may contain `\n` freely.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Blocks are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::BufRead;

use bytes::Bytes;

use crate::error::{ClientError, ClientResult};

/// One command argument.
///
/// The set of kinds is closed: only values with a defined wire encoding can
/// be turned into an `Arg`. A `List` is expanded into one block per element,
/// not wrapped as a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg<'a> {
    /// Signed integer, written as decimal ASCII.
    Int(i64),
    /// Unsigned integer, written as decimal ASCII.
    UInt(u64),
    /// A single raw byte.
    Byte(u8),
    /// Raw bytes (strings included), written verbatim.
    Bytes(&'a [u8]),
    /// Sequence of blocks written positionally.
    List(Vec<&'a [u8]>),
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg<'_> {
    fn from(value: i32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<u32> for Arg<'_> {
    fn from(value: u32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<u64> for Arg<'_> {
    fn from(value: u64) -> Self {
        Arg::UInt(value)
    }
}

impl From<usize> for Arg<'_> {
    fn from(value: usize) -> Self {
        Arg::UInt(value as u64)
    }
}

impl From<u8> for Arg<'_> {
    fn from(value: u8) -> Self {
        Arg::Byte(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Bytes(value.as_bytes())
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(value: &'a String) -> Self {
        Arg::Bytes(value.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(value: &'a [u8]) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Arg<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a> From<&'a Vec<u8>> for Arg<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a> From<&'a [String]> for Arg<'a> {
    fn from(values: &'a [String]) -> Self {
        Arg::List(values.iter().map(|v| v.as_bytes()).collect())
    }
}

impl<'a> From<&'a Vec<String>> for Arg<'a> {
    fn from(values: &'a Vec<String>) -> Self {
        Arg::from(values.as_slice())
    }
}

impl<'a> From<&'a [&'a str]> for Arg<'a> {
    fn from(values: &'a [&'a str]) -> Self {
        Arg::List(values.iter().map(|v| v.as_bytes()).collect())
    }
}

/// Encodes a command and its arguments into the provided buffer.
///
/// The buffer is appended to, not cleared, so several commands can be
/// batched before a flush.
pub fn encode_command(cmd: &str, args: &[Arg<'_>], out: &mut Vec<u8>) {
    push_block(out, cmd.as_bytes());
    for arg in args {
        match arg {
            Arg::Int(value) => push_block(out, Decimal::signed(*value).as_bytes()),
            Arg::UInt(value) => push_block(out, Decimal::unsigned(*value).as_bytes()),
            Arg::Byte(byte) => push_block(out, &[*byte]),
            Arg::Bytes(data) => push_block(out, data),
            Arg::List(items) => {
                for item in items {
                    push_block(out, item);
                }
            }
        }
    }
    out.push(b'\n');
}

/// Reads one response (all blocks up to the empty terminator line).
///
/// A stream holding only the terminator yields an empty list.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Vec<Bytes>> {
    let mut blocks = Vec::new();
    loop {
        read_line(reader, line_buf)?;
        if line_buf.is_empty() {
            return Ok(blocks);
        }

        let size = parse_usize(line_buf)?;
        let mut data = vec![0u8; size];
        // read_exact keeps reading across short reads until `size` bytes arrive.
        reader.read_exact(&mut data)?;
        blocks.push(Bytes::from(data));

        read_block_end(reader)?;
    }
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 || buf.last() != Some(&b'\n') {
        return Err(ClientError::Protocol("unexpected end of stream".to_string()));
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(())
}

fn read_block_end<R: BufRead>(reader: &mut R) -> ClientResult<()> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    if byte[0] == b'\r' {
        reader.read_exact(&mut byte)?;
    }
    if byte[0] != b'\n' {
        return Err(ClientError::Protocol("missing newline after block".to_string()));
    }
    Ok(())
}

fn parse_usize(data: &[u8]) -> ClientResult<usize> {
    let mut value: usize = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol(format!(
                "invalid block size {:?}",
                String::from_utf8_lossy(data)
            )));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as usize))
            .ok_or_else(|| ClientError::Protocol("block size overflow".to_string()))?;
    }
    Ok(value)
}

fn push_block(out: &mut Vec<u8>, data: &[u8]) {
    push_usize(out, data.len());
    out.push(b'\n');
    out.extend_from_slice(data);
    out.push(b'\n');
}

fn push_usize(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(Decimal::unsigned(value as u64).as_bytes());
}

/// Decimal rendering of an integer, right-aligned in a stack buffer.
struct Decimal {
    // 20 digits for u64::MAX, plus room for a sign.
    buf: [u8; 21],
    start: usize,
}

impl Decimal {
    fn unsigned(mut value: u64) -> Self {
        let mut buf = [0u8; 21];
        let mut start = buf.len();
        loop {
            start -= 1;
            buf[start] = b'0' + (value % 10) as u8;
            value /= 10;
            if value == 0 {
                break;
            }
        }
        Decimal { buf, start }
    }

    fn signed(value: i64) -> Self {
        let mut decimal = Decimal::unsigned(value.unsigned_abs());
        if value < 0 {
            decimal.start -= 1;
            decimal.buf[decimal.start] = b'-';
        }
        decimal
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }
}
