//! Value to wire bytes.
//!
//! Encoding is total: every constructible [`Value`] has exactly one encoding.
//! The decoder accepts all of them except `Value::Integer(i64::MIN)`, whose
//! magnitude does not fit in 63 bits and which decodes as an invalid integer.

use super::value::Value;
use bytes::BytesMut;
use std::io::{self, Write};

/// Encode a value into a new, exactly-sized buffer.
pub fn encode(value: &Value) -> BytesMut {
    let mut buf = BytesMut::with_capacity(value.encoded_len());
    value.encode_into(&mut buf);
    buf
}

/// Append a value's encoding to `buf`.
pub fn encode_into(value: &Value, buf: &mut BytesMut) {
    buf.reserve(value.encoded_len());
    value.encode_into(buf);
}

/// Write a value's encoding to a blocking sink.
///
/// Errors come from `writer` only.
pub fn write_value<W: Write + ?Sized>(writer: &mut W, value: &Value) -> io::Result<()> {
    writer.write_all(&encode(value))
}
