//! Token-level cursor over one day shard.
//!
//! The cursor always sits on a token boundary. Forward reads consume a token
//! and its separator; backward moves leave the cursor on the start of the
//! token they read, so a following [`IntervalLogStream::write_token`]
//! overwrites it.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use hubhist_domain::day_path::DayPath;
use hubhist_domain::interval::Interval;
use hubhist_domain::token::{DayOffset, SEPARATOR, Token};

use crate::error::LogError;

/// Chunk size used when scanning for separators.
pub const TOKEN_BUFFER_SIZE: usize = 24;

const VALUE_KEY: &[u8; 2] = b"v:";

/// One Begin/Value/End triple as stored in a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogElement {
    pub begin: DayOffset,
    pub value: String,
    pub end: DayOffset,
}

impl LogElement {
    /// Resolve the offsets against the shard's day.
    #[must_use]
    pub fn into_interval(self, day: DayPath) -> Interval {
        Interval {
            range_start: day.at(self.begin),
            range_end: day.at(self.end),
            value: self.value,
        }
    }
}

/// Forward/backward token navigation over a random access byte stream.
pub struct IntervalLogStream<S> {
    inner: S,
    position: u64,
    len: u64,
    current: Option<Token>,
}

impl<S: Read + Write + Seek> IntervalLogStream<S> {
    /// Wrap `inner` with the cursor at the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the stream length cannot be determined.
    pub fn new(mut inner: S) -> Result<Self, LogError> {
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            position: 0,
            len,
            current: None,
        })
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Byte offset of the cursor.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The token read by the last successful move.
    #[must_use]
    pub fn current_token(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn at_beginning(&self) -> bool {
        self.position == 0
    }

    #[must_use]
    pub fn at_end(&self) -> bool {
        self.position >= self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn seek_begin(&mut self) {
        self.position = 0;
        self.current = None;
    }

    pub fn seek_end(&mut self) {
        self.position = self.len;
        self.current = None;
    }

    /// Read the token at the cursor and advance past its separator.
    ///
    /// Returns `false` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Truncated`] when the stream ends before the
    /// separator, [`LogError::Token`] when the token does not decode. The
    /// cursor stays on the start of the failing token.
    pub fn move_next(&mut self) -> Result<bool, LogError> {
        let start = self.position;
        let Some(raw) = self.read_raw()? else {
            self.current = None;
            return Ok(false);
        };
        let token = Token::decode(&raw).map_err(|source| LogError::Token {
            offset: start,
            source,
        })?;
        self.position = start + raw.len() as u64 + 1;
        self.current = Some(token);
        Ok(true)
    }

    /// Move onto the token preceding the cursor and read it.
    ///
    /// Returns `false` at the beginning of the stream. On success the cursor
    /// is left on the start of the token that was read.
    ///
    /// # Errors
    ///
    /// Same as [`Self::move_next`] for the token being read.
    pub fn move_previous(&mut self) -> Result<bool, LogError> {
        if self.position == 0 {
            self.current = None;
            return Ok(false);
        }

        // The byte before the cursor terminates the previous token; its start
        // follows the separator before that one.
        let mut scan_end = self.position - 1;
        let mut buffer = [0_u8; TOKEN_BUFFER_SIZE];
        let start = loop {
            if scan_end == 0 {
                break 0;
            }
            let chunk_start = scan_end.saturating_sub(TOKEN_BUFFER_SIZE as u64);
            let chunk = &mut buffer[..usize::try_from(scan_end - chunk_start).unwrap_or(0)];
            self.inner.seek(SeekFrom::Start(chunk_start))?;
            self.inner.read_exact(chunk)?;
            if let Some(index) = chunk.iter().rposition(|byte| *byte == SEPARATOR) {
                break chunk_start + index as u64 + 1;
            }
            scan_end = chunk_start;
        };

        let origin = self.position;
        self.position = start;
        if let Err(err) = self.move_next() {
            self.position = origin;
            return Err(err);
        }
        self.position = start;
        Ok(true)
    }

    /// Write `key || payload || separator` at the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the write fails.
    pub fn write_token(&mut self, token: Token) -> Result<(), LogError> {
        let bytes = token.encode();
        self.inner.seek(SeekFrom::Start(self.position))?;
        self.inner.write_all(&bytes)?;
        self.position += bytes.len() as u64;
        self.len = self.len.max(self.position);
        self.current = Some(token);
        Ok(())
    }

    /// Write a full Begin/Value/End triple at the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if a write fails.
    pub fn write_element(
        &mut self,
        begin: DayOffset,
        value: &str,
        end: DayOffset,
    ) -> Result<(), LogError> {
        self.write_token(Token::Begin(begin))?;
        self.write_token(Token::Value(value.to_string()))?;
        self.write_token(Token::End(end))
    }

    /// Read the triple at the cursor; `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Truncated`] for a partial triple or a token of the
    /// wrong kind, and codec errors from [`Self::move_next`]. The cursor is
    /// restored to the start of the triple.
    pub fn next_element(&mut self) -> Result<Option<LogElement>, LogError> {
        let start = self.position;
        let result = self.read_element();
        if result.is_err() {
            self.position = start;
        }
        result
    }

    /// Like [`Self::next_element`] but skips the value without decoding it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::next_element`].
    pub fn next_span(&mut self) -> Result<Option<(DayOffset, DayOffset)>, LogError> {
        let start = self.position;
        let result = self.read_span();
        if result.is_err() {
            self.position = start;
        }
        result
    }

    /// Read the final triple of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Truncated`] when the stream does not end with a
    /// complete triple.
    pub fn last_element(&mut self) -> Result<Option<LogElement>, LogError> {
        self.seek_end();
        for _ in 0..3 {
            if !self.move_previous()? {
                return if self.is_empty() {
                    Ok(None)
                } else {
                    Err(LogError::Truncated { offset: 0 })
                };
            }
        }
        let element = self.read_element()?;
        if !self.at_end() {
            return Err(LogError::Truncated {
                offset: self.position,
            });
        }
        Ok(element)
    }

    /// Overwrite the last End token of the stream in place.
    ///
    /// The encoded width is fixed, so the stream length and every other
    /// offset are unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Truncated`] if the stream does not end with an
    /// End token.
    pub fn patch_last_end(&mut self, end: DayOffset) -> Result<(), LogError> {
        self.seek_end();
        if !self.move_previous()? || !matches!(self.current, Some(Token::End(_))) {
            return Err(LogError::Truncated {
                offset: self.position,
            });
        }
        self.write_token(Token::End(end))
    }

    /// Flush buffered writes to the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the flush fails.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.inner.flush()?;
        Ok(())
    }

    fn read_element(&mut self) -> Result<Option<LogElement>, LogError> {
        let begin_at = self.position;
        if !self.move_next()? {
            return Ok(None);
        }
        let Some(Token::Begin(begin)) = self.current else {
            return Err(LogError::Truncated { offset: begin_at });
        };

        let value_at = self.position;
        if !self.move_next()? {
            return Err(LogError::Truncated { offset: value_at });
        }
        let Some(Token::Value(value)) = self.current.take() else {
            return Err(LogError::Truncated { offset: value_at });
        };

        let end = self.expect_end()?;
        Ok(Some(LogElement { begin, value, end }))
    }

    fn read_span(&mut self) -> Result<Option<(DayOffset, DayOffset)>, LogError> {
        let begin_at = self.position;
        if !self.move_next()? {
            return Ok(None);
        }
        let Some(Token::Begin(begin)) = self.current else {
            return Err(LogError::Truncated { offset: begin_at });
        };

        let value_at = self.position;
        match self.read_raw()? {
            Some(raw) if raw.starts_with(VALUE_KEY) => {
                self.position = value_at + raw.len() as u64 + 1;
            }
            _ => return Err(LogError::Truncated { offset: value_at }),
        }

        let end = self.expect_end()?;
        Ok(Some((begin, end)))
    }

    fn expect_end(&mut self) -> Result<DayOffset, LogError> {
        let end_at = self.position;
        if !self.move_next()? {
            return Err(LogError::Truncated { offset: end_at });
        }
        match self.current {
            Some(Token::End(end)) => Ok(end),
            _ => Err(LogError::Truncated { offset: end_at }),
        }
    }

    /// Bytes from the cursor up to (excluding) the next separator, without
    /// moving the cursor. `None` at the end of the stream.
    fn read_raw(&mut self) -> Result<Option<Vec<u8>>, LogError> {
        let start = self.position;
        self.inner.seek(SeekFrom::Start(start))?;

        let mut raw = Vec::new();
        let mut buffer = [0_u8; TOKEN_BUFFER_SIZE];
        loop {
            let read = match self.inner.read(&mut buffer) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                if raw.is_empty() {
                    return Ok(None);
                }
                return Err(LogError::Truncated { offset: start });
            }
            if let Some(index) = buffer[..read].iter().position(|byte| *byte == SEPARATOR) {
                raw.extend_from_slice(&buffer[..index]);
                return Ok(Some(raw));
            }
            raw.extend_from_slice(&buffer[..read]);
        }
    }
}
