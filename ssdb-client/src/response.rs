//! # Response Decoding
//!
//! Purpose: Turn the ordered blocks of one response into typed values.
//!
//! Block 0 is the status token. Every decoder checks it first: anything other
//! than `ok` becomes `ClientError::Server` carrying the token text, and the
//! payload is left untouched.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{ClientError, ClientResult};

/// Status token signalling success.
pub const STATUS_OK: &[u8] = b"ok";

/// One decoded response: the status block followed by payload blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    blocks: Vec<Bytes>,
}

impl Response {
    /// Wraps raw blocks as read from the wire.
    pub fn new(blocks: Vec<Bytes>) -> Self {
        Response { blocks }
    }

    /// All blocks, status included.
    pub fn blocks(&self) -> &[Bytes] {
        &self.blocks
    }

    /// Consumes the response and returns its blocks.
    pub fn into_blocks(self) -> Vec<Bytes> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Status block, if the server sent one.
    pub fn status(&self) -> Option<&[u8]> {
        self.blocks.first().map(|b| b.as_ref())
    }

    /// True when the status block is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status() == Some(STATUS_OK)
    }

    /// Payload blocks (everything after the status) of a successful response.
    pub fn payload(&self) -> ClientResult<&[Bytes]> {
        match self.status() {
            None => Err(ClientError::UnexpectedResponse("missing status block")),
            Some(STATUS_OK) => Ok(&self.blocks[1..]),
            Some(status) => Err(ClientError::Server(
                String::from_utf8_lossy(status).into_owned(),
            )),
        }
    }

    /// Succeeds when the status is `ok`, ignoring any payload.
    pub fn ok(&self) -> ClientResult<()> {
        self.payload().map(|_| ())
    }

    /// Block 1 equals `1`.
    pub fn bool_value(&self) -> ClientResult<bool> {
        Ok(self.first_block()?.as_ref() == b"1")
    }

    /// Block 1 parsed as a decimal 64-bit integer.
    pub fn i64_value(&self) -> ClientResult<i64> {
        parse_i64(self.first_block()?)
    }

    /// Block 1 parsed as a decimal integer.
    pub fn int_value(&self) -> ClientResult<i32> {
        let block = self.first_block()?;
        let value = parse_i64(block)?;
        i32::try_from(value).map_err(|_| invalid_integer(block))
    }

    /// Block 1 as a UTF-8 string.
    pub fn string_value(&self) -> ClientResult<String> {
        to_string(self.first_block()?)
    }

    /// Block 1 as raw bytes.
    pub fn bytes_value(&self) -> ClientResult<Bytes> {
        self.first_block().cloned()
    }

    /// Blocks 1..n as strings, in order.
    pub fn string_list(&self) -> ClientResult<Vec<String>> {
        self.payload()?.iter().map(to_string).collect()
    }

    /// Blocks 1..n as alternating key/value strings.
    pub fn string_map(&self) -> ClientResult<HashMap<String, String>> {
        self.payload()?
            .chunks_exact(2)
            .map(|pair| Ok((to_string(&pair[0])?, to_string(&pair[1])?)))
            .collect()
    }

    /// Blocks 1..n as alternating key/value pairs with decimal values.
    pub fn int_map(&self) -> ClientResult<HashMap<String, i64>> {
        self.payload()?
            .chunks_exact(2)
            .map(|pair| Ok((to_string(&pair[0])?, parse_i64(&pair[1])?)))
            .collect()
    }

    fn first_block(&self) -> ClientResult<&Bytes> {
        self.payload()?
            .first()
            .ok_or(ClientError::UnexpectedResponse("missing payload block"))
    }
}

impl From<Vec<Bytes>> for Response {
    fn from(blocks: Vec<Bytes>) -> Self {
        Response::new(blocks)
    }
}

fn to_string(block: &Bytes) -> ClientResult<String> {
    std::str::from_utf8(block)
        .map(str::to_owned)
        .map_err(|_| ClientError::InvalidUtf8)
}

fn parse_i64(block: &Bytes) -> ClientResult<i64> {
    std::str::from_utf8(block)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| invalid_integer(block))
}

fn invalid_integer(block: &Bytes) -> ClientError {
    ClientError::InvalidInteger(String::from_utf8_lossy(block).into_owned())
}
