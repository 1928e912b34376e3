//! RESP (Redis Serialization Protocol) codec.
//!
//! Five wire types, each introduced by a prefix byte:
//!
//! ```text
//! :<[+|-]digits>\r\n              integer
//! +<text without CR/LF>\r\n        simple string
//! -<text without CR/LF>\r\n        error
//! $<length>\r\n<bytes>\r\n         bulk string (binary safe)
//! *<count>\r\n<value>...          array
//! ```
//!
//! There is no null bulk string or null array: negative lengths are
//! rejected. Integers are accepted in `-(2^63 - 1)..=2^63 - 1`.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod parser;
pub mod stream;
pub mod value;

pub use decoder::{decode, Decoder};
pub use encoder::{encode, encode_into, write_value};
pub use error::{DecodeError, ErrorKind, InvalidLine, Stage};
pub use parser::{parse, DecodeLimits, ParseResult, ParseState, Parser, DEFAULT_MAX_DEPTH};
pub use stream::FrameReader;
pub use value::{Kind, Line, Value};
