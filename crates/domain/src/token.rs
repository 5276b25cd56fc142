//! Token codec — the byte-level encoding of history log shards.
//!
//! A shard is a sequence of tokens, each written as a two-byte key, a
//! payload and a single [`SEPARATOR`] byte:
//!
//! ```text
//! b:000000.000 v:19.5 e:123059.000 b:123100.000 v:21.5 e:235959.000
//! ```
//!
//! Begin/End payloads are fixed-width `HHMMSS.fff` offsets from midnight of
//! the shard's day. Value payloads are URL form encoded, so neither the
//! separator nor control bytes can ever appear inside a payload.

use std::fmt;

use chrono::{TimeDelta, Timelike};

use crate::time::Timestamp;

/// Byte terminating every token.
pub const SEPARATOR: u8 = b' ';

/// Width of an encoded [`DayOffset`].
pub const DURATION_WIDTH: usize = 10;

const BEGIN_KEY: [u8; 2] = *b"b:";
const VALUE_KEY: [u8; 2] = *b"v:";
const END_KEY: [u8; 2] = *b"e:";

const MILLIS_PER_SECOND: u32 = 1_000;
const MILLIS_PER_MINUTE: u32 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u32 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u32 = 24 * MILLIS_PER_HOUR;

/// Codec failures, without position information.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token payload: {0}")]
    Malformed(&'static str),

    #[error("unsupported token `{0}`")]
    Unsupported(String),
}

/// Millisecond offset from midnight, always within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DayOffset(u32);

impl DayOffset {
    /// Midnight.
    pub const MIDNIGHT: Self = Self(0);

    /// The last representable instant of a day, `23:59:59.999`.
    pub const LAST: Self = Self(MILLIS_PER_DAY - 1);

    /// Build from milliseconds since midnight; `None` past the end of the day.
    #[must_use]
    pub fn from_millis(millis: u32) -> Option<Self> {
        (millis < MILLIS_PER_DAY).then_some(Self(millis))
    }

    /// Build from a duration since midnight; `None` if negative or a day or longer.
    #[must_use]
    pub fn from_duration(duration: TimeDelta) -> Option<Self> {
        u32::try_from(duration.num_milliseconds())
            .ok()
            .and_then(Self::from_millis)
    }

    /// Offset of `timestamp` within its own UTC day, truncated to milliseconds.
    #[must_use]
    pub fn of(timestamp: Timestamp) -> Self {
        let time = timestamp.time();
        // Leap seconds report nanoseconds above 999_999_999; clamp them into the last millisecond.
        let millis = (time.nanosecond() / 1_000_000).min(MILLIS_PER_SECOND - 1);
        Self(time.num_seconds_from_midnight() * MILLIS_PER_SECOND + millis)
    }

    /// Milliseconds since midnight.
    #[must_use]
    pub fn as_millis(self) -> u32 {
        self.0
    }

    /// Duration since midnight.
    #[must_use]
    pub fn to_duration(self) -> TimeDelta {
        TimeDelta::milliseconds(i64::from(self.0))
    }
}

impl fmt::Display for DayOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = encode_duration(*self);
        f.write_str(std::str::from_utf8(&bytes).map_err(|_| fmt::Error)?)
    }
}

/// The three token kinds making up an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Begin(DayOffset),
    Value(String),
    End(DayOffset),
}

impl Token {
    /// The two-byte key prefix of this token kind.
    #[must_use]
    pub fn key(&self) -> [u8; 2] {
        match self {
            Self::Begin(_) => BEGIN_KEY,
            Self::Value(_) => VALUE_KEY,
            Self::End(_) => END_KEY,
        }
    }

    /// Serialize as `key || payload || separator`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(2 + DURATION_WIDTH + 1);
        buffer.extend_from_slice(&self.key());
        match self {
            Self::Begin(offset) | Self::End(offset) => {
                buffer.extend_from_slice(&encode_duration(*offset));
            }
            Self::Value(value) => buffer.extend_from_slice(&encode_value(value)),
        }
        buffer.push(SEPARATOR);
        buffer
    }

    /// Parse a token without its trailing separator.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Unsupported`] if the key is missing or unknown,
    /// [`TokenError::Malformed`] if the payload does not decode.
    pub fn decode(raw: &[u8]) -> Result<Self, TokenError> {
        if raw.len() < 2 {
            return Err(TokenError::Unsupported(
                String::from_utf8_lossy(raw).into_owned(),
            ));
        }
        let (key, payload) = raw.split_at(2);
        parse_token(key, payload)
    }
}

/// Dispatch on a token key and decode its payload.
///
/// # Errors
///
/// Returns [`TokenError::Unsupported`] for an unknown first key byte or a
/// second key byte other than `:`, [`TokenError::Malformed`] for a payload
/// that fails strict decoding.
pub fn parse_token(key: &[u8], payload: &[u8]) -> Result<Token, TokenError> {
    let unsupported = || TokenError::Unsupported(String::from_utf8_lossy(key).into_owned());

    if key.len() != 2 || key[1] != b':' {
        return Err(unsupported());
    }

    match key[0] {
        b'b' => decode_duration(payload).map(Token::Begin),
        b'v' => decode_value(payload).map(Token::Value),
        b'e' => decode_duration(payload).map(Token::End),
        _ => Err(unsupported()),
    }
}

/// Render an offset as `HHMMSS.fff`.
#[must_use]
pub fn encode_duration(offset: DayOffset) -> [u8; DURATION_WIDTH] {
    let millis = offset.as_millis();
    let hours = millis / MILLIS_PER_HOUR;
    let minutes = millis % MILLIS_PER_HOUR / MILLIS_PER_MINUTE;
    let seconds = millis % MILLIS_PER_MINUTE / MILLIS_PER_SECOND;
    let fraction = millis % MILLIS_PER_SECOND;

    let mut out = [b'.'; DURATION_WIDTH];
    write_digits(&mut out[0..2], hours);
    write_digits(&mut out[2..4], minutes);
    write_digits(&mut out[4..6], seconds);
    write_digits(&mut out[7..10], fraction);
    out
}

/// Strict fixed-width parse of `HHMMSS.fff`.
///
/// # Errors
///
/// Returns [`TokenError::Malformed`] on a wrong width, a non-digit, a missing
/// `.` or an out-of-range field.
pub fn decode_duration(payload: &[u8]) -> Result<DayOffset, TokenError> {
    if payload.len() != DURATION_WIDTH {
        return Err(TokenError::Malformed("duration must be 10 bytes"));
    }
    if payload[6] != b'.' {
        return Err(TokenError::Malformed("duration is missing the `.`"));
    }

    let hours = read_digits(&payload[0..2])?;
    let minutes = read_digits(&payload[2..4])?;
    let seconds = read_digits(&payload[4..6])?;
    let fraction = read_digits(&payload[7..10])?;

    if hours >= 24 {
        return Err(TokenError::Malformed("hours out of range"));
    }
    if minutes >= 60 {
        return Err(TokenError::Malformed("minutes out of range"));
    }
    if seconds >= 60 {
        return Err(TokenError::Malformed("seconds out of range"));
    }

    Ok(DayOffset(
        hours * MILLIS_PER_HOUR + minutes * MILLIS_PER_MINUTE + seconds * MILLIS_PER_SECOND + fraction,
    ))
}

/// URL form encode a value. The empty string encodes to zero bytes.
#[must_use]
pub fn encode_value(value: &str) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = Vec::with_capacity(value.len());
    for &byte in value.as_bytes() {
        match byte {
            b' ' => out.push(b'+'),
            byte if is_unreserved(byte) => out.push(byte),
            byte => {
                out.push(b'%');
                out.push(HEX[usize::from(byte >> 4)]);
                out.push(HEX[usize::from(byte & 0x0F)]);
            }
        }
    }
    out
}

/// Reverse of [`encode_value`].
///
/// # Errors
///
/// Returns [`TokenError::Malformed`] for a truncated or non-hex `%` escape,
/// or when the decoded bytes are not UTF-8.
pub fn decode_value(payload: &[u8]) -> Result<String, TokenError> {
    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.iter();

    while let Some(&byte) = bytes.next() {
        match byte {
            b'+' => out.push(b' '),
            b'%' => {
                let high = bytes.next().copied().and_then(hex_value);
                let low = bytes.next().copied().and_then(hex_value);
                match (high, low) {
                    (Some(high), Some(low)) => out.push((high << 4) | low),
                    _ => return Err(TokenError::Malformed("invalid percent escape")),
                }
            }
            byte => out.push(byte),
        }
    }

    String::from_utf8(out).map_err(|_| TokenError::Malformed("value is not valid UTF-8"))
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'!' | b'*' | b'(' | b')')
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn write_digits(out: &mut [u8], mut value: u32) {
    for slot in out.iter_mut().rev() {
        // value % 10 always fits in a u8
        #[allow(clippy::cast_possible_truncation)]
        let digit = (value % 10) as u8;
        *slot = b'0' + digit;
        value /= 10;
    }
}

fn read_digits(digits: &[u8]) -> Result<u32, TokenError> {
    digits.iter().try_fold(0_u32, |acc, &byte| {
        if byte.is_ascii_digit() {
            Ok(acc * 10 + u32::from(byte - b'0'))
        } else {
            Err(TokenError::Malformed("duration contains a non-digit"))
        }
    })
}
