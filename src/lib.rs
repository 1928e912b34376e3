//! respwire: RESP wire format decoder and encoder.
//!
//! - [`resp::Decoder`] reads values from any [`std::io::BufRead`]
//! - [`resp::FrameReader`] reads values from a tokio `AsyncRead`
//! - [`resp::encode`] turns a [`resp::Value`] back into wire bytes
//!
//! The `respwire` binary built on top of this inspects or canonicalizes a
//! stream of RESP values; its settings live in [`config`].

pub mod config;
pub mod resp;

pub use resp::{decode, encode, DecodeError, DecodeLimits, Decoder, FrameReader, Kind, Line, Value};
