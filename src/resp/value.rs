//! RESP value model.
//!
//! A [`Value`] is one of five wire types. Simple strings and errors are
//! line-delimited on the wire, so their payloads are held in a [`Line`],
//! which can only be built from bytes that contain neither CR nor LF.

use super::error::InvalidLine;
use bytes::{Bytes, BytesMut};
use std::fmt::{self, Write as _};

/// Wire type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `:` signed 64-bit integer
    Integer,
    /// `+` CRLF-terminated text
    SimpleString,
    /// `-` CRLF-terminated error text
    Error,
    /// `$` length-prefixed binary-safe string
    BulkString,
    /// `*` count-prefixed sequence of values
    Array,
}

impl Kind {
    /// The prefix byte that introduces this type on the wire.
    pub const fn prefix(self) -> u8 {
        match self {
            Kind::Integer => b':',
            Kind::SimpleString => b'+',
            Kind::Error => b'-',
            Kind::BulkString => b'$',
            Kind::Array => b'*',
        }
    }

    /// Map a prefix byte back to its type.
    pub const fn from_prefix(byte: u8) -> Option<Kind> {
        match byte {
            b':' => Some(Kind::Integer),
            b'+' => Some(Kind::SimpleString),
            b'-' => Some(Kind::Error),
            b'$' => Some(Kind::BulkString),
            b'*' => Some(Kind::Array),
            _ => None,
        }
    }

    /// Human-readable type name, used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Integer => "integer",
            Kind::SimpleString => "simple string",
            Kind::Error => "error",
            Kind::BulkString => "bulk string",
            Kind::Array => "array",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a simple string or error: bytes without CR or LF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Line(Bytes);

impl Line {
    /// Validate and wrap a line payload.
    pub fn new<B: Into<Bytes>>(data: B) -> Result<Self, InvalidLine> {
        let data = data.into();
        match data.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(offset) => Err(InvalidLine {
                byte: data[offset],
                offset,
            }),
            None => Ok(Line(data)),
        }
    }

    /// Wrap bytes the parser has already checked for CR and LF.
    pub(crate) fn from_checked(data: Bytes) -> Self {
        debug_assert!(!data.iter().any(|&b| b == b'\r' || b == b'\n'));
        Line(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for Line {
    type Error = InvalidLine;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Line::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl TryFrom<String> for Line {
    type Error = InvalidLine;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Line::new(s)
    }
}

impl AsRef<[u8]> for Line {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A decoded or constructed RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer: :1000\r\n
    ///
    /// `i64::MIN` encodes but is rejected by the decoder.
    Integer(i64),
    /// Simple string: +OK\r\n
    SimpleString(Line),
    /// Error: -ERR message\r\n
    Error(Line),
    /// Bulk string: $5\r\nhello\r\n
    BulkString(Bytes),
    /// Array: *2\r\n:1\r\n:2\r\n
    Array(Vec<Value>),
}

impl Value {
    /// Create an integer value
    pub fn integer(n: i64) -> Value {
        Value::Integer(n)
    }

    /// Create a simple string value, rejecting CR and LF
    pub fn simple<L: TryInto<Line, Error = InvalidLine>>(text: L) -> Result<Value, InvalidLine> {
        Ok(Value::SimpleString(text.try_into()?))
    }

    /// Create an error value, rejecting CR and LF
    pub fn error<L: TryInto<Line, Error = InvalidLine>>(text: L) -> Result<Value, InvalidLine> {
        Ok(Value::Error(text.try_into()?))
    }

    /// Create a bulk string value
    pub fn bulk<B: Into<Bytes>>(data: B) -> Value {
        Value::BulkString(data.into())
    }

    /// Create an array value
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Integer(_) => Kind::Integer,
            Value::SimpleString(_) => Kind::SimpleString,
            Value::Error(_) => Kind::Error,
            Value::BulkString(_) => Kind::BulkString,
            Value::Array(_) => Kind::Array,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Raw payload of a simple string, error or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(line) | Value::Error(line) => Some(line.as_bytes()),
            Value::BulkString(data) => Some(data),
            Value::Integer(_) | Value::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Serialize this value into an existing buffer.
    ///
    /// Line payloads are not re-validated; [`Line`] guarantees them.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Value::Integer(n) => {
                buf.extend_from_slice(b":");
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Value::SimpleString(line) => {
                buf.extend_from_slice(b"+");
                buf.extend_from_slice(line.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Value::Error(line) => {
                buf.extend_from_slice(b"-");
                buf.extend_from_slice(line.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Value::BulkString(data) => {
                buf.extend_from_slice(b"$");
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            Value::Array(items) => {
                buf.extend_from_slice(b"*");
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }

    /// Exact number of bytes [`Value::encode_into`] will append.
    pub fn encoded_len(&self) -> usize {
        // prefix byte + CRLF
        const FRAMING: usize = 3;
        match self {
            Value::Integer(n) => {
                FRAMING + usize::from(*n < 0) + decimal_len(n.unsigned_abs())
            }
            Value::SimpleString(line) | Value::Error(line) => FRAMING + line.len(),
            Value::BulkString(data) => {
                FRAMING + decimal_len(data.len() as u64) + data.len() + 2
            }
            Value::Array(items) => {
                FRAMING
                    + decimal_len(items.len() as u64)
                    + items.iter().map(Value::encoded_len).sum::<usize>()
            }
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "(integer) {n}"),
            Value::SimpleString(line) => write_escaped(f, line.as_bytes(), false),
            Value::Error(line) => {
                f.write_str("(error) ")?;
                write_escaped(f, line.as_bytes(), false)
            }
            Value::BulkString(data) => {
                f.write_char('"')?;
                write_escaped(f, data, true)?;
                f.write_char('"')
            }
            Value::Array(items) if items.is_empty() => f.write_str("(empty array)"),
            Value::Array(items) => {
                let width = decimal_len(items.len() as u64);
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\n{:indent$}", "")?;
                    }
                    let label = format!("{})", i + 1);
                    write!(f, "{label:>w$} ", w = width + 1)?;
                    item.fmt_nested(f, indent + width + 2)?;
                }
                Ok(())
            }
        }
    }
}

/// Renders values the way redis-cli prints replies.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f, 0)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::BulkString(data)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

fn write_escaped(f: &mut fmt::Formatter<'_>, data: &[u8], quoted: bool) -> fmt::Result {
    for &b in data {
        match b {
            b'\r' => f.write_str("\\r")?,
            b'\n' => f.write_str("\\n")?,
            b'\t' => f.write_str("\\t")?,
            b'"' | b'\\' if quoted => write!(f, "\\{}", b as char)?,
            0x20..=0x7e => f.write_char(b as char)?,
            _ => write!(f, "\\x{b:02x}")?,
        }
    }
    Ok(())
}
