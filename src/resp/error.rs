//! Decode and construction error types.

use super::value::Kind;
use std::fmt;
use std::io;
use thiserror::Error;

/// The parsing step a decode error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the type prefix byte of a value
    Prefix,
    Integer,
    SimpleString,
    Error,
    BulkLength,
    BulkPayload,
    BulkTerminator,
    ArrayLength,
    /// Waiting for the next element of an array
    ArrayElement,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prefix => "type prefix",
            Stage::Integer => "integer",
            Stage::SimpleString => "simple string",
            Stage::Error => "error string",
            Stage::BulkLength => "bulk string length",
            Stage::BulkPayload => "bulk string payload",
            Stage::BulkTerminator => "bulk string terminator",
            Stage::ArrayLength => "array length",
            Stage::ArrayElement => "array element",
        };
        f.write_str(name)
    }
}

/// Category of a [`DecodeError`], with array context stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownType,
    TypeMismatch,
    MissingTerminator,
    InvalidInteger,
    InvalidLength,
    EmbeddedNewline,
    TruncatedInput,
    LimitExceeded,
}

/// Errors raised while decoding a value from the wire.
///
/// Every error aborts the decode in progress. Nothing is retried and no
/// partial value is returned.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown type prefix {}", show_byte(.0))]
    UnknownType(u8),

    #[error("expected {expected} prefix, found {}", show_byte(.found))]
    TypeMismatch { expected: Kind, found: u8 },

    #[error("{stage}: missing CRLF terminator")]
    MissingTerminator { stage: Stage },

    #[error("{stage}: invalid integer {text:?}")]
    InvalidInteger { stage: Stage, text: String },

    #[error("{stage}: invalid length {text:?}")]
    InvalidLength { stage: Stage, text: String },

    #[error("{stage}: line feed inside payload at offset {offset}")]
    EmbeddedNewline { stage: Stage, offset: usize },

    #[error("{stage}: input truncated")]
    TruncatedInput {
        stage: Stage,
        #[source]
        source: Option<io::Error>,
    },

    #[error("{stage}: {value} exceeds limit of {limit}")]
    LimitExceeded {
        stage: Stage,
        value: usize,
        limit: usize,
    },

    #[error("while decoding array element {index}")]
    InArray {
        index: usize,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    /// Error category, looking through array element context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::UnknownType(_) => ErrorKind::UnknownType,
            DecodeError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            DecodeError::MissingTerminator { .. } => ErrorKind::MissingTerminator,
            DecodeError::InvalidInteger { .. } => ErrorKind::InvalidInteger,
            DecodeError::InvalidLength { .. } => ErrorKind::InvalidLength,
            DecodeError::EmbeddedNewline { .. } => ErrorKind::EmbeddedNewline,
            DecodeError::TruncatedInput { .. } => ErrorKind::TruncatedInput,
            DecodeError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            DecodeError::InArray { source, .. } => source.kind(),
        }
    }

    /// Stage of the innermost error.
    pub fn stage(&self) -> Stage {
        match self {
            DecodeError::UnknownType(_) => Stage::Prefix,
            DecodeError::TypeMismatch { expected, .. } => match expected {
                Kind::Integer => Stage::Integer,
                Kind::SimpleString => Stage::SimpleString,
                Kind::Error => Stage::Error,
                Kind::BulkString => Stage::BulkLength,
                Kind::Array => Stage::ArrayLength,
            },
            DecodeError::MissingTerminator { stage }
            | DecodeError::InvalidInteger { stage, .. }
            | DecodeError::InvalidLength { stage, .. }
            | DecodeError::EmbeddedNewline { stage, .. }
            | DecodeError::TruncatedInput { stage, .. }
            | DecodeError::LimitExceeded { stage, .. } => *stage,
            DecodeError::InArray { source, .. } => source.stage(),
        }
    }

    /// Element indices from the outermost array down to the failing value.
    pub fn path(&self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut err = self;
        while let DecodeError::InArray { index, source } = err {
            path.push(*index);
            err = source;
        }
        path
    }

    pub(crate) fn truncated(stage: Stage, source: Option<io::Error>) -> Self {
        DecodeError::TruncatedInput { stage, source }
    }
}

/// A simple string or error payload contained CR or LF.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line payload contains {} at offset {offset}", show_byte(.byte))]
pub struct InvalidLine {
    /// The offending byte (`\r` or `\n`).
    pub byte: u8,
    pub offset: usize,
}

fn show_byte(byte: &u8) -> String {
    format!("{:?}", char::from(*byte))
}
