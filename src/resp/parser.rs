//! RESP frame parser.
//!
//! Descends into arrays with an explicit stack rather than recursion. A parse
//! either completes with the number of bytes consumed, reports that more
//! input is needed, or fails. An incomplete parse leaves its progress in a
//! [`ParseState`], so resuming on the same buffer with more bytes appended
//! only looks at the new part. Both the blocking [`Decoder`](super::Decoder)
//! and the async [`FrameReader`](super::FrameReader) drive this parser over
//! their read-ahead buffers.

use super::error::{DecodeError, Stage};
use super::value::{Kind, Line, Value};
use bytes::Bytes;

/// Shortest possible encoded value (`+\r\n`).
const MIN_VALUE_LEN: usize = 3;

/// Array nesting accepted by [`DecodeLimits::default`].
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Optional ceilings applied while decoding.
///
/// The default only bounds nesting depth, at [`DEFAULT_MAX_DEPTH`]. Dropping,
/// comparing and encoding a [`Value`] recurse once per array level, so
/// [`DecodeLimits::UNLIMITED`] should only be used on trusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest accepted bulk string length in bytes
    pub max_bulk_len: Option<usize>,
    /// Largest accepted array element count
    pub max_array_len: Option<usize>,
    /// Deepest accepted array nesting (a top-level array is depth 1)
    pub max_depth: Option<usize>,
}

impl DecodeLimits {
    /// No ceilings at all.
    pub const UNLIMITED: DecodeLimits = DecodeLimits {
        max_bulk_len: None,
        max_array_len: None,
        max_depth: None,
    };
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_depth: Some(DEFAULT_MAX_DEPTH),
            ..Self::UNLIMITED
        }
    }
}

/// Parse result
#[derive(Debug)]
pub enum ParseResult {
    /// Successfully parsed a value with bytes consumed
    Complete(Value, usize),
    /// Need more data; the stage that ran out of input
    Incomplete(Stage),
    /// Parse error
    Error(DecodeError),
}

/// Progress through a value whose bytes are still arriving.
///
/// Only valid for one growing buffer: each resume must see the same bytes
/// as the previous call, possibly with more appended. Reset after a
/// complete value or an error.
#[derive(Debug, Default)]
pub struct ParseState {
    /// Bytes already turned into values or array headers
    offset: usize,
    /// Open arrays, outermost first
    frames: Vec<ArrayFrame>,
    /// Bytes from the current line's start known to hold no CR
    scanned: usize,
}

#[derive(Debug)]
struct ArrayFrame {
    items: Vec<Value>,
    count: usize,
}

impl ParseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes that will not be looked at again.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of arrays still waiting for elements.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.frames.clear();
        self.scanned = 0;
    }
}

/// Why a parse step stopped short.
enum Halt {
    Incomplete(Stage),
    Error(DecodeError),
}

impl From<DecodeError> for Halt {
    fn from(err: DecodeError) -> Self {
        Halt::Error(err)
    }
}

type Step<T> = Result<(T, usize), Halt>;

/// What one step over the buffer produced.
enum Item {
    Value(Value),
    /// Header of a non-empty array with this many elements
    Array(usize),
}

/// Parse a RESP value from a buffer with default limits.
pub fn parse(buffer: &[u8]) -> ParseResult {
    Parser::default().parse(buffer)
}

/// Parse a value that must be of the given type.
pub fn parse_as(kind: Kind, buffer: &[u8]) -> ParseResult {
    Parser::default().parse_as(kind, buffer)
}

/// Limit-aware RESP parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser {
    limits: DecodeLimits,
}

impl Parser {
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Parse one value of any type from the start of `buffer`.
    pub fn parse(&self, buffer: &[u8]) -> ParseResult {
        self.resume(&mut ParseState::new(), None, buffer)
    }

    /// Parse one value, failing with a type mismatch if the buffer starts
    /// with a different prefix than `kind`'s.
    pub fn parse_as(&self, kind: Kind, buffer: &[u8]) -> ParseResult {
        self.resume(&mut ParseState::new(), Some(kind), buffer)
    }

    /// Continue a parse recorded in `state` over a buffer that has grown.
    ///
    /// `expected`, if set, is checked against the top-level prefix.
    pub fn resume(
        &self,
        state: &mut ParseState,
        expected: Option<Kind>,
        buffer: &[u8],
    ) -> ParseResult {
        let result = self.drive(state, expected, buffer);
        if !matches!(result, ParseResult::Incomplete(_)) {
            state.reset();
        }
        result
    }

    fn drive(&self, state: &mut ParseState, expected: Option<Kind>, buffer: &[u8]) -> ParseResult {
        loop {
            let rest = &buffer[state.offset..];
            let Some(&prefix) = rest.first() else {
                let stage = if state.frames.is_empty() {
                    Stage::Prefix
                } else {
                    Stage::ArrayElement
                };
                return ParseResult::Incomplete(stage);
            };

            let kind = match expected {
                Some(kind) if state.offset == 0 => kind,
                _ => match Kind::from_prefix(prefix) {
                    Some(kind) => kind,
                    None => {
                        let err = DecodeError::UnknownType(prefix);
                        return ParseResult::Error(in_frames(&state.frames, err));
                    }
                },
            };

            let step = self.step(kind, rest, state.frames.len(), &mut state.scanned);
            let (item, used) = match step {
                Ok(done) => done,
                Err(Halt::Incomplete(stage)) => return ParseResult::Incomplete(stage),
                Err(Halt::Error(err)) => {
                    return ParseResult::Error(in_frames(&state.frames, err));
                }
            };
            state.offset += used;
            state.scanned = 0;

            let mut value = match item {
                Item::Value(value) => value,
                Item::Array(count) => {
                    // Never reserve more slots than the buffered bytes could fill
                    let room = (buffer.len() - state.offset) / MIN_VALUE_LEN;
                    state.frames.push(ArrayFrame {
                        items: Vec::with_capacity(count.min(room)),
                        count,
                    });
                    continue;
                }
            };

            // Hand the finished value up through every array it completes
            loop {
                let Some(mut frame) = state.frames.pop() else {
                    return ParseResult::Complete(value, state.offset);
                };
                frame.items.push(value);
                if frame.items.len() < frame.count {
                    state.frames.push(frame);
                    break;
                }
                value = Value::Array(frame.items);
            }
        }
    }

    /// Parse one leaf value or array header from the start of `buffer`.
    fn step(&self, kind: Kind, buffer: &[u8], depth: usize, scanned: &mut usize) -> Step<Item> {
        let (value, consumed) = match kind {
            Kind::Array => return self.array_header(buffer, depth, scanned),
            Kind::Integer => self.integer(buffer, scanned)?,
            Kind::SimpleString => {
                let (line, consumed) = self.line(buffer, kind, Stage::SimpleString, scanned)?;
                (Value::SimpleString(line), consumed)
            }
            Kind::Error => {
                let (line, consumed) = self.line(buffer, kind, Stage::Error, scanned)?;
                (Value::Error(line), consumed)
            }
            Kind::BulkString => self.bulk_string(buffer, scanned)?,
        };
        Ok((Item::Value(value), consumed))
    }

    /// Parse an integer: :1000\r\n
    fn integer(&self, buffer: &[u8], scanned: &mut usize) -> Step<Value> {
        expect_prefix(buffer, Kind::Integer, Stage::Integer)?;
        let (text, end) = read_line(buffer, 1, Stage::Integer, scanned)?;
        let n = parse_signed(text).ok_or_else(|| DecodeError::InvalidInteger {
            stage: Stage::Integer,
            text: String::from_utf8_lossy(text).into_owned(),
        })?;
        Ok((Value::Integer(n), end))
    }

    /// Parse a simple string or error: +OK\r\n, -ERR message\r\n
    fn line(&self, buffer: &[u8], kind: Kind, stage: Stage, scanned: &mut usize) -> Step<Line> {
        expect_prefix(buffer, kind, stage)?;
        let (payload, end) = read_line(buffer, 1, stage, scanned)?;
        if let Some(offset) = payload.iter().position(|&b| b == b'\n') {
            return Err(DecodeError::EmbeddedNewline { stage, offset }.into());
        }
        Ok((Line::from_checked(Bytes::copy_from_slice(payload)), end))
    }

    /// Parse a bulk string: $5\r\nhello\r\n
    fn bulk_string(&self, buffer: &[u8], scanned: &mut usize) -> Step<Value> {
        expect_prefix(buffer, Kind::BulkString, Stage::BulkLength)?;
        let (len, data_start) =
            read_length(buffer, Stage::BulkLength, self.limits.max_bulk_len, scanned)?;

        // A length that overflows the address space can never be satisfied
        let data_end = data_start
            .checked_add(len)
            .ok_or(Halt::Incomplete(Stage::BulkPayload))?;
        if buffer.len() < data_end {
            return Err(Halt::Incomplete(Stage::BulkPayload));
        }
        if buffer.len() < data_end + 2 {
            return Err(Halt::Incomplete(Stage::BulkTerminator));
        }
        if &buffer[data_end..data_end + 2] != b"\r\n" {
            return Err(DecodeError::MissingTerminator {
                stage: Stage::BulkTerminator,
            }
            .into());
        }

        let data = Bytes::copy_from_slice(&buffer[data_start..data_end]);
        Ok((Value::BulkString(data), data_end + 2))
    }

    /// Parse an array header: *2\r\n
    ///
    /// An empty array is a finished value; otherwise its elements follow.
    fn array_header(&self, buffer: &[u8], depth: usize, scanned: &mut usize) -> Step<Item> {
        expect_prefix(buffer, Kind::Array, Stage::ArrayLength)?;
        let (count, end) =
            read_length(buffer, Stage::ArrayLength, self.limits.max_array_len, scanned)?;

        let level = depth + 1;
        if let Some(max_depth) = self.limits.max_depth {
            if level > max_depth {
                return Err(DecodeError::LimitExceeded {
                    stage: Stage::ArrayElement,
                    value: level,
                    limit: max_depth,
                }
                .into());
            }
        }

        if count == 0 {
            return Ok((Item::Value(Value::Array(Vec::new())), end));
        }
        Ok((Item::Array(count), end))
    }
}

/// Wrap an error with the element index of every open array.
fn in_frames(frames: &[ArrayFrame], err: DecodeError) -> DecodeError {
    frames.iter().rev().fold(err, |source, frame| DecodeError::InArray {
        index: frame.items.len(),
        source: Box::new(source),
    })
}

/// Check the first byte is `kind`'s prefix.
fn expect_prefix(buffer: &[u8], kind: Kind, stage: Stage) -> Result<(), Halt> {
    match buffer.first() {
        None => Err(Halt::Incomplete(stage)),
        Some(&found) if found == kind.prefix() => Ok(()),
        Some(&found) => Err(DecodeError::TypeMismatch {
            expected: kind,
            found,
        }
        .into()),
    }
}

/// Read from `start` up to the first CR, which must be followed by LF.
///
/// Returns the line without its terminator and the offset just past the LF.
/// `scanned` remembers how far a previous attempt got without finding CR.
fn read_line<'a>(
    buffer: &'a [u8],
    start: usize,
    stage: Stage,
    scanned: &mut usize,
) -> Result<(&'a [u8], usize), Halt> {
    let from = start.max(*scanned);
    let Some(pos) = buffer[from..].iter().position(|&b| b == b'\r') else {
        *scanned = buffer.len();
        return Err(Halt::Incomplete(stage));
    };
    let cr = from + pos;
    match buffer.get(cr + 1) {
        None => {
            *scanned = cr;
            Err(Halt::Incomplete(stage))
        }
        Some(b'\n') => Ok((&buffer[start..cr], cr + 2)),
        Some(_) => Err(DecodeError::MissingTerminator { stage }.into()),
    }
}

/// Read an unsigned decimal length field following the prefix byte.
fn read_length(
    buffer: &[u8],
    stage: Stage,
    limit: Option<usize>,
    scanned: &mut usize,
) -> Step<usize> {
    let (text, end) = read_line(buffer, 1, stage, scanned)?;
    let len = parse_digits(text)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| DecodeError::InvalidLength {
            stage,
            text: String::from_utf8_lossy(text).into_owned(),
        })?;
    if let Some(limit) = limit {
        if len > limit {
            return Err(DecodeError::LimitExceeded {
                stage,
                value: len,
                limit,
            }
            .into());
        }
    }
    Ok((len, end))
}

/// Parse one or more ASCII digits, rejecting overflow.
fn parse_digits(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
    })
}

/// Optional sign followed by digits.
///
/// The magnitude must fit in 63 bits before the sign is applied, so the
/// smallest accepted value is `-i64::MAX`, not `i64::MIN`.
fn parse_signed(text: &[u8]) -> Option<i64> {
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, text),
    };
    let magnitude = i64::try_from(parse_digits(digits)?).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
