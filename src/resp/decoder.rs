//! Blocking decoder over a buffered reader.
//!
//! The decoder peeks at the reader's buffer and only consumes the bytes that
//! belong to the value it returns, so anything after that value stays in the
//! reader for the next call. Values that span several buffer fills are
//! staged in a scratch buffer owned by the decoder, and the parse resumes
//! where the previous fill left off.
//!
//! After an error the reader position is unspecified: the bytes examined so
//! far have been consumed. Resynchronizing is up to the caller.

use super::error::{DecodeError, Stage};
use super::parser::{DecodeLimits, ParseResult, ParseState, Parser};
use super::value::{Kind, Line, Value};
use bytes::{Bytes, BytesMut};
use std::io::{self, BufRead};
use tracing::{debug, trace};

/// Decode exactly one value from `reader`.
pub fn decode<R: BufRead>(reader: &mut R) -> Result<Value, DecodeError> {
    Decoder::new(reader).decode()
}

/// Decodes RESP values from a [`BufRead`] source.
pub struct Decoder<R> {
    reader: R,
    parser: Parser,
    state: ParseState,
    /// Bytes of the value in progress, once it outgrows one buffer fill
    scratch: BytesMut,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DecodeLimits::default())
    }

    pub fn with_limits(reader: R, limits: DecodeLimits) -> Self {
        Self {
            reader,
            parser: Parser::new(limits),
            state: ParseState::new(),
            scratch: BytesMut::new(),
        }
    }

    /// Decode the next value. End of input is [`DecodeError::TruncatedInput`].
    pub fn decode(&mut self) -> Result<Value, DecodeError> {
        match self.next_value(None)? {
            Some(value) => Ok(value),
            None => Err(DecodeError::truncated(Stage::Prefix, None)),
        }
    }

    /// Decode the next value, or `None` if input ended cleanly between values.
    pub fn decode_next(&mut self) -> Result<Option<Value>, DecodeError> {
        self.next_value(None)
    }

    /// Decode a value that must be of type `kind`.
    pub fn decode_as(&mut self, kind: Kind) -> Result<Value, DecodeError> {
        match self.next_value(Some(kind))? {
            Some(value) => Ok(value),
            None => Err(DecodeError::truncated(Stage::Prefix, None)),
        }
    }

    pub fn decode_integer(&mut self) -> Result<i64, DecodeError> {
        match self.decode_as(Kind::Integer)? {
            Value::Integer(n) => Ok(n),
            other => Err(mismatch(Kind::Integer, &other)),
        }
    }

    pub fn decode_simple_string(&mut self) -> Result<Line, DecodeError> {
        match self.decode_as(Kind::SimpleString)? {
            Value::SimpleString(line) => Ok(line),
            other => Err(mismatch(Kind::SimpleString, &other)),
        }
    }

    pub fn decode_error(&mut self) -> Result<Line, DecodeError> {
        match self.decode_as(Kind::Error)? {
            Value::Error(line) => Ok(line),
            other => Err(mismatch(Kind::Error, &other)),
        }
    }

    pub fn decode_bulk_string(&mut self) -> Result<Bytes, DecodeError> {
        match self.decode_as(Kind::BulkString)? {
            Value::BulkString(data) => Ok(data),
            other => Err(mismatch(Kind::BulkString, &other)),
        }
    }

    pub fn decode_array(&mut self) -> Result<Vec<Value>, DecodeError> {
        match self.decode_as(Kind::Array)? {
            Value::Array(items) => Ok(items),
            other => Err(mismatch(Kind::Array, &other)),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn next_value(&mut self, kind: Option<Kind>) -> Result<Option<Value>, DecodeError> {
        self.scratch.clear();
        self.state.reset();
        let mut stage = Stage::Prefix;

        loop {
            let chunk = match self.reader.fill_buf() {
                Ok(chunk) => chunk,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(%stage, error = %e, "read failed mid-value");
                    self.scratch.clear();
                    self.state.reset();
                    return Err(DecodeError::truncated(stage, Some(e)));
                }
            };

            if chunk.is_empty() {
                if self.scratch.is_empty() && stage == Stage::Prefix {
                    return Ok(None);
                }
                debug!(%stage, buffered = self.scratch.len(), "input ended mid-value");
                self.scratch.clear();
                self.state.reset();
                return Err(DecodeError::truncated(stage, None));
            }

            let available = chunk.len();
            let staged = self.scratch.len();
            let result = if staged == 0 {
                self.parser.resume(&mut self.state, kind, chunk)
            } else {
                self.scratch.extend_from_slice(chunk);
                self.parser.resume(&mut self.state, kind, &self.scratch)
            };

            match result {
                ParseResult::Complete(value, consumed) => {
                    debug_assert!(consumed > staged);
                    self.reader.consume(consumed - staged);
                    self.scratch.clear();
                    trace!(kind = %value.kind(), consumed, "decoded value");
                    return Ok(Some(value));
                }
                ParseResult::Incomplete(next) => {
                    if staged == 0 {
                        self.scratch.extend_from_slice(chunk);
                    }
                    self.reader.consume(available);
                    trace!(stage = %next, buffered = self.scratch.len(), "need more input");
                    stage = next;
                }
                ParseResult::Error(err) => {
                    self.reader.consume(available);
                    self.scratch.clear();
                    return Err(err);
                }
            }
        }
    }
}

fn mismatch(expected: Kind, found: &Value) -> DecodeError {
    DecodeError::TypeMismatch {
        expected,
        found: found.kind().prefix(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::error::ErrorKind;
    use std::cell::Cell;
    use std::io::{BufReader, Cursor, Read};

    fn decode_bytes(input: &[u8]) -> Result<Value, DecodeError> {
        decode(&mut Cursor::new(input))
    }

    fn decode_kind(input: &[u8]) -> ErrorKind {
        decode_bytes(input).unwrap_err().kind()
    }

    /// Reader that hands out at most `step` bytes per fill.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Reader that counts how often it is asked for more bytes.
    struct Counted<'a> {
        data: &'a [u8],
        reads: &'a Cell<usize>,
    }

    impl Read for Counted<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.set(self.reads.get() + 1);
            self.data.read(buf)
        }
    }

    /// Reader that fails after its data runs out.
    struct Broken<'a>(&'a [u8]);

    impl Read for Broken<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
            }
            let n = buf.len().min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_decode_integer_cases() {
        assert_eq!(decode_bytes(b":9223372036854775807\r\n").unwrap(), Value::Integer(i64::MAX));
        assert_eq!(
            decode_bytes(b":-9223372036854775807\r\n").unwrap(),
            Value::Integer(-9223372036854775807)
        );
        assert_eq!(decode_kind(b":9223372036854775808\r\n"), ErrorKind::InvalidInteger);
        assert_eq!(decode_kind(b":-9223372036854775808\r\n"), ErrorKind::InvalidInteger);
        assert_eq!(decode_kind(b":abcd\r\n"), ErrorKind::InvalidInteger);
        assert_eq!(decode_kind(b":1234"), ErrorKind::TruncatedInput);
        assert_eq!(decode_kind(b""), ErrorKind::TruncatedInput);
    }

    #[test]
    fn test_decode_simple_string_cases() {
        assert_eq!(
            decode_bytes(b"+hello world\r\n").unwrap(),
            Value::simple("hello world").unwrap()
        );
        assert!(decode_bytes(b"+ab\rcd\r\n").is_err());
        assert!(decode_bytes(b"+ab\ncd\r\n").is_err());
        assert_eq!(decode_kind(b"+simple string"), ErrorKind::TruncatedInput);
    }

    #[test]
    fn test_decode_bulk_string_cases() {
        assert_eq!(
            decode_bytes(b"$12\r\nabcd\r\nab\ncd\r\r\n").unwrap(),
            Value::bulk(&b"abcd\r\nab\ncd\r"[..])
        );
        assert_eq!(decode_kind(b"$5\r\nbulk string\r\n"), ErrorKind::MissingTerminator);
        assert_eq!(decode_kind(b"$12\r\nbulk string\r\n"), ErrorKind::TruncatedInput);
        assert_eq!(decode_kind(b"$11\r\nbulk string\r"), ErrorKind::TruncatedInput);
        assert_eq!(decode_kind(b"$11\r\nbulk string\n"), ErrorKind::TruncatedInput);
        assert_eq!(decode_kind(b"$11\r\nbulk string"), ErrorKind::TruncatedInput);
        assert_eq!(decode_kind(b"$bulk string\r\n"), ErrorKind::InvalidLength);
        assert_eq!(decode_kind(b"$12bulk string\r\n"), ErrorKind::InvalidLength);
    }

    #[test]
    fn test_decode_array_cases() {
        assert_eq!(decode_kind(b"*2\r\n+hello world\r\n"), ErrorKind::TruncatedInput);
        assert_eq!(
            decode_kind(b"*5\r\n+hello world\r\n-Error\r\n$5\r\nabcd\r\r\n:9223372036854775807\r\n"),
            ErrorKind::TruncatedInput
        );

        let value = decode_bytes(
            b"*4\r\n+hello world\r\n-Error\r\n$5\r\nabcd\r\r\n:9223372036854775807\r\n",
        )
        .unwrap();
        assert_eq!(
            value,
            Value::array(vec![
                Value::simple("hello world").unwrap(),
                Value::error("Error").unwrap(),
                Value::bulk(&b"abcd\r"[..]),
                Value::Integer(9223372036854775807),
            ])
        );
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let mut reader = Cursor::new(&b"*0\r\n+hello world\r\n"[..]);
        assert_eq!(decode(&mut reader).unwrap(), Value::array(vec![]));
        assert_eq!(reader.position(), 4);
        assert_eq!(decode(&mut reader).unwrap(), Value::simple("hello world").unwrap());
    }

    #[test]
    fn test_decode_next_stream() {
        let input = b":1\r\n$3\r\nfoo\r\n*1\r\n-ERR x\r\n";
        let mut decoder = Decoder::new(Cursor::new(&input[..]));
        assert_eq!(decoder.decode_next().unwrap(), Some(Value::Integer(1)));
        assert_eq!(decoder.decode_next().unwrap(), Some(Value::bulk(&b"foo"[..])));
        assert_eq!(
            decoder.decode_next().unwrap(),
            Some(Value::array(vec![Value::error("ERR x").unwrap()]))
        );
        assert_eq!(decoder.decode_next().unwrap(), None);
    }

    #[test]
    fn test_decode_across_small_fills() {
        let input = b"*3\r\n$12\r\nabcd\r\nab\ncd\r\r\n:-17\r\n*1\r\n+OK\r\n:5\r\n";
        for capacity in [1, 2, 3, 7, 64] {
            let reader = BufReader::with_capacity(capacity, Trickle { data: input, step: 5 });
            let mut decoder = Decoder::new(reader);
            let value = decoder.decode().unwrap();
            assert_eq!(
                value,
                Value::array(vec![
                    Value::bulk(&b"abcd\r\nab\ncd\r"[..]),
                    Value::Integer(-17),
                    Value::array(vec![Value::simple("OK").unwrap()]),
                ])
            );
            assert_eq!(decoder.decode_integer().unwrap(), 5);
            assert_eq!(decoder.decode_next().unwrap(), None);
        }
    }

    #[test]
    fn test_decode_typed() {
        let input = b":7\r\n+OK\r\n-ERR\r\n$2\r\nhi\r\n*1\r\n:1\r\n";
        let mut decoder = Decoder::new(Cursor::new(&input[..]));
        assert_eq!(decoder.decode_integer().unwrap(), 7);
        assert_eq!(decoder.decode_simple_string().unwrap().as_str(), Some("OK"));
        assert_eq!(decoder.decode_error().unwrap().as_bytes(), b"ERR");
        assert_eq!(&decoder.decode_bulk_string().unwrap()[..], b"hi");
        assert_eq!(decoder.decode_array().unwrap(), vec![Value::Integer(1)]);
    }

    #[test]
    fn test_decode_typed_mismatch() {
        let mut decoder = Decoder::new(Cursor::new(&b"*1234\r\n"[..]));
        let err = decoder.decode_integer().unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TypeMismatch {
                expected: Kind::Integer,
                found: b'*'
            }
        ));
    }

    #[test]
    fn test_decode_io_error_is_truncation_with_cause() {
        let reader = BufReader::new(Broken(b"$10\r\nabc"));
        let err = Decoder::new(reader).decode().unwrap_err();
        match err {
            DecodeError::TruncatedInput { stage, source } => {
                assert_eq!(stage, Stage::BulkPayload);
                assert_eq!(source.unwrap().kind(), io::ErrorKind::ConnectionReset);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_with_limits() {
        let limits = DecodeLimits {
            max_bulk_len: Some(3),
            ..DecodeLimits::default()
        };
        let mut decoder = Decoder::with_limits(Cursor::new(&b"$4\r\nabcd\r\n"[..]), limits);
        assert_eq!(decoder.decode().unwrap_err().kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_decode_rejects_deep_nesting_by_default() {
        let mut input = b"*1\r\n".repeat(200_000);
        input.extend_from_slice(b":1\r\n");
        let err = decode(&mut Cursor::new(&input)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_decode_large_array_through_small_buffer() {
        let count = 50_000;
        let mut input = format!("*{count}\r\n").into_bytes();
        for i in 0..count {
            input.extend_from_slice(format!("${}\r\n{}\r\n", i.to_string().len(), i).as_bytes());
        }
        input.extend_from_slice(b":7\r\n");

        let reads = Cell::new(0);
        let reader = BufReader::with_capacity(
            16,
            Counted {
                data: &input,
                reads: &reads,
            },
        );
        let mut decoder = Decoder::new(reader);
        let items = decoder.decode_array().unwrap();
        assert_eq!(items.len(), count);
        assert_eq!(items[12_345], Value::bulk(&b"12345"[..]));

        // One parse per fill, each picking up where the last one stopped
        assert!(reads.get() <= input.len() / 16 + 2);
        assert_eq!(decoder.decode_integer().unwrap(), 7);
    }

    #[test]
    fn test_decode_huge_declared_length_fails_cleanly() {
        assert_eq!(
            decode_kind(b"$9223372036854775807\r\nabc"),
            ErrorKind::TruncatedInput
        );
        assert_eq!(
            decode_kind(b"*9223372036854775807\r\n:1\r\n"),
            ErrorKind::TruncatedInput
        );
    }
}
