//! Async frame reader.
//!
//! Reads from a tokio [`AsyncRead`] into a read-ahead buffer and parses one
//! value at a time. Bytes past the returned value stay buffered for the next
//! call. Parse progress is kept alongside the buffer, so each read only
//! parses the bytes it added. A reader must not be shared between concurrent
//! decodes; wrap the call in `tokio::time::timeout` for a bounded wait.

use super::error::{DecodeError, Stage};
use super::parser::{DecodeLimits, ParseResult, ParseState, Parser};
use super::value::Value;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Decodes RESP values from an async byte stream.
pub struct FrameReader<R> {
    stream: R,
    buffer: BytesMut,
    parser: Parser,
    state: ParseState,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self::with_limits(stream, DecodeLimits::default())
    }

    pub fn with_limits(stream: R, limits: DecodeLimits) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            parser: Parser::new(limits),
            state: ParseState::new(),
        }
    }

    /// Read the next value, or `None` if the stream closed between values.
    ///
    /// On error the read-ahead buffer is discarded.
    pub async fn read_value(&mut self) -> Result<Option<Value>, DecodeError> {
        let mut stage = Stage::Prefix;

        loop {
            if !self.buffer.is_empty() {
                match self.parser.resume(&mut self.state, None, &self.buffer) {
                    ParseResult::Complete(value, consumed) => {
                        trace!(kind = %value.kind(), consumed, "decoded value");
                        self.buffer.advance(consumed);
                        return Ok(Some(value));
                    }
                    ParseResult::Incomplete(next) => stage = next,
                    ParseResult::Error(err) => {
                        warn!(error = %err, "RESP decode error");
                        self.buffer.clear();
                        return Err(err);
                    }
                }
            }

            if self.buffer.capacity() - self.buffer.len() < BUFFER_SIZE / 4 {
                self.buffer.reserve(BUFFER_SIZE);
            }
            let n = match self.stream.read_buf(&mut self.buffer).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(%stage, error = %e, "stream read failed");
                    self.buffer.clear();
                    self.state.reset();
                    return Err(DecodeError::truncated(stage, Some(e)));
                }
            };

            if n == 0 {
                if self.buffer.is_empty() {
                    trace!("stream closed");
                    return Ok(None);
                }
                warn!(%stage, buffered = self.buffer.len(), "stream closed with incomplete frame");
                self.buffer.clear();
                self.state.reset();
                return Err(DecodeError::truncated(stage, None));
            }
        }
    }

    /// Number of bytes read ahead but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.stream
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::error::ErrorKind;
    use std::io;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_values_across_chunks() {
        let stream = Builder::new()
            .read(b"*2\r\n$3\r\nfo")
            .read(b"o\r\n:4")
            .read(b"2\r\n+OK\r\n")
            .build();
        let mut reader = FrameReader::new(stream);

        let value = reader.read_value().await.unwrap().unwrap();
        assert_eq!(
            value,
            Value::array(vec![Value::bulk(&b"foo"[..]), Value::Integer(42)])
        );
        let value = reader.read_value().await.unwrap().unwrap();
        assert_eq!(value, Value::simple("OK").unwrap());
        assert!(reader.read_value().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pipelined_values_stay_buffered() {
        let stream = Builder::new().read(b":1\r\n:2\r\n").build();
        let mut reader = FrameReader::new(stream);

        assert_eq!(reader.read_value().await.unwrap(), Some(Value::Integer(1)));
        assert_eq!(reader.buffered(), 4);
        assert_eq!(reader.read_value().await.unwrap(), Some(Value::Integer(2)));
        assert_eq!(reader.read_value().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let stream = Builder::new().read(b"*2\r\n+hello world\r\n").build();
        let mut reader = FrameReader::new(stream);

        let err = reader.read_value().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
        assert_eq!(err.stage(), Stage::ArrayElement);
    }

    #[tokio::test]
    async fn test_read_error_is_truncation_with_cause() {
        let stream = Builder::new()
            .read(b"$10\r\nabc")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut reader = FrameReader::new(stream);

        match reader.read_value().await.unwrap_err() {
            DecodeError::TruncatedInput { stage, source } => {
                assert_eq!(stage, Stage::BulkPayload);
                assert_eq!(source.unwrap().kind(), io::ErrorKind::ConnectionReset);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let stream = Builder::new().read(b"+ab\ncd\r\n").build();
        let mut reader = FrameReader::new(stream);

        let err = reader.read_value().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmbeddedNewline);
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_limits_apply() {
        let stream = Builder::new().read(b"*1\r\n*1\r\n:1\r\n").build();
        let limits = DecodeLimits {
            max_depth: Some(1),
            ..DecodeLimits::default()
        };
        let mut reader = FrameReader::with_limits(stream, limits);

        let err = reader.read_value().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }
}
