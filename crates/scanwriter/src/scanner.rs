//! Token scanner over any [`io::Read`].
//!
//! The scanner owns a growable buffer that never exceeds the configured
//! maximum. Each call to [`Scanner::scan`] offers the unconsumed part of the
//! buffer to the split policy and reads more input only when the policy asks
//! for it. Tokens are ranges into the buffer, so [`Scanner::token`] is valid
//! until the next call to `scan`.
//!
//! Errors are sticky. Once one is latched, `scan` keeps returning `false`.
//! A read error does not discard buffered data: the policy still sees it with
//! `at_eof = true`, so a trailing partial token is delivered before the
//! error surfaces.

use core::ops::Range;
use std::io::{self, Read};

use bstr::{BStr, ByteSlice};
use tracing::warn;

use crate::{
    error::ScanError,
    options::{OverflowMode, ScanWriterOptions},
    split::{Lines, Split, SplitPolicy},
};

const INITIAL_BUFFER_SIZE: usize = 4096;
const MAX_CONSECUTIVE_EMPTY: usize = 100;

/// Splits the bytes of a reader into tokens.
///
/// # Examples
///
/// ```rust
/// use scanwriter::Scanner;
///
/// let mut scanner = Scanner::new(&b"one\r\ntwo\nthree"[..]);
/// let mut lines = Vec::new();
/// while scanner.scan() {
///     lines.push(scanner.token().to_string());
/// }
/// assert_eq!(lines, ["one", "two", "three"]);
/// assert!(scanner.err().is_none());
/// ```
pub struct Scanner<R> {
    reader: R,
    split: Box<dyn SplitPolicy>,
    max_buffer_size: usize,
    overflow: OverflowMode,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    token: Range<usize>,
    eof: bool,
    read_err: Option<ScanError>,
    /// Latched on the call after a truncated token was handed out.
    deferred_err: Option<ScanError>,
    err: Option<ScanError>,
    empties: usize,
    done: bool,
}

enum Fill {
    Read,
    Token,
    Stop,
}

impl<R: Read> Scanner<R> {
    /// Creates a line scanner with default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ScanWriterOptions::default())
    }

    /// Creates a line scanner with `options`.
    pub fn with_options(reader: R, options: ScanWriterOptions) -> Self {
        Self {
            reader,
            split: Box::new(Lines),
            max_buffer_size: options.max_buffer_size.max(1),
            overflow: options.overflow,
            buf: Vec::new(),
            start: 0,
            end: 0,
            token: 0..0,
            eof: false,
            read_err: None,
            deferred_err: None,
            err: None,
            empties: 0,
            done: false,
        }
    }

    /// Replaces the split policy.
    #[must_use]
    pub fn with_split(mut self, split: impl SplitPolicy + 'static) -> Self {
        self.split = Box::new(split);
        self
    }

    pub(crate) fn set_split(&mut self, split: Box<dyn SplitPolicy>) {
        self.split = split;
    }

    /// Advances to the next token.
    ///
    /// Returns `false` once input is exhausted or an error is latched; see
    /// [`Scanner::err`] to tell the two apart.
    pub fn scan(&mut self) -> bool {
        if self.done {
            return false;
        }
        if let Some(err) = self.deferred_err.take() {
            self.fail(err);
            return false;
        }
        loop {
            if self.end > self.start || self.eof {
                let available = self.end - self.start;
                let outcome = self
                    .split
                    .split(&self.buf[self.start..self.end], self.eof);
                match outcome {
                    Err(err) => {
                        self.fail(err.into());
                        return false;
                    }
                    Ok(Split::NeedMore) => {
                        if self.eof {
                            self.finish();
                            return false;
                        }
                    }
                    Ok(Split::Skip(advance)) => {
                        if !self.consume(advance, available) {
                            return false;
                        }
                        continue;
                    }
                    Ok(Split::Token { advance, range }) => {
                        if !self.set_token(&range, available) || !self.consume(advance, available)
                        {
                            return false;
                        }
                        return true;
                    }
                    Ok(Split::Final(range)) => {
                        if !self.set_token(&range, available) {
                            return false;
                        }
                        self.finish();
                        return true;
                    }
                }
            }

            match self.fill() {
                Fill::Read => {}
                Fill::Token => return true,
                Fill::Stop => return false,
            }
        }
    }

    /// The most recent token. Empty before the first successful `scan`.
    #[must_use]
    pub fn token(&self) -> &BStr {
        self.buf[self.token.clone()].as_bstr()
    }

    /// The latched error, if scanning stopped because of one.
    #[must_use]
    pub fn err(&self) -> Option<&ScanError> {
        self.err.as_ref()
    }

    /// Maximum number of bytes buffered while looking for a token.
    #[must_use]
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// What happens when the buffer fills without a token boundary.
    #[must_use]
    pub fn overflow_mode(&self) -> OverflowMode {
        self.overflow
    }

    /// Consumes the scanner, returning the underlying reader.
    ///
    /// Bytes already buffered are discarded.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn set_token(&mut self, range: &Range<usize>, available: usize) -> bool {
        if range.start > range.end || range.end > available {
            self.fail(ScanError::TokenOutOfRange {
                start: range.start,
                end: range.end,
                available,
            });
            return false;
        }
        self.token = self.start + range.start..self.start + range.end;
        true
    }

    fn consume(&mut self, advance: usize, available: usize) -> bool {
        if advance > available {
            self.fail(ScanError::AdvanceTooFar { advance, available });
            return false;
        }
        if advance == 0 {
            self.empties += 1;
            if self.empties > MAX_CONSECUTIVE_EMPTY {
                self.fail(ScanError::NoProgress);
                return false;
            }
        } else {
            self.empties = 0;
        }
        self.start += advance;
        true
    }

    /// Makes room and reads more input, or applies the overflow policy when
    /// the buffer is already at its limit.
    fn fill(&mut self) -> Fill {
        if self.start > 0 && (self.end == self.buf.len() || self.start > self.buf.len() / 2) {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.token = 0..0;
            self.start = 0;
        }

        if self.end == self.buf.len() {
            if self.buf.len() >= self.max_buffer_size {
                return self.overflow();
            }
            let grown = if self.buf.is_empty() {
                INITIAL_BUFFER_SIZE
            } else {
                self.buf.len().saturating_mul(2)
            };
            self.buf.resize(grown.min(self.max_buffer_size), 0);
        }

        // `Ok(0)` is end-of-input; only interruptions are retried, and not forever.
        for _ in 0..MAX_CONSECUTIVE_EMPTY {
            match self.reader.read(&mut self.buf[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    return Fill::Read;
                }
                Ok(n) => {
                    self.end += n.min(self.buf.len() - self.end);
                    return Fill::Read;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.eof = true;
                    self.read_err = Some(err.into());
                    return Fill::Read;
                }
            }
        }
        self.fail(ScanError::NoProgress);
        Fill::Stop
    }

    fn overflow(&mut self) -> Fill {
        let max = self.max_buffer_size;
        match self.overflow {
            OverflowMode::Reject => {
                warn!(max, "token exceeds buffer limit; rejecting");
                self.fail(ScanError::Overflow { max });
                Fill::Stop
            }
            OverflowMode::Truncate => {
                warn!(max, "token exceeds buffer limit; delivering truncated token");
                self.take_all();
                self.deferred_err = Some(ScanError::Overflow { max });
                Fill::Token
            }
            OverflowMode::Chunk => {
                self.take_all();
                Fill::Token
            }
        }
    }

    fn take_all(&mut self) {
        self.token = self.start..self.end;
        self.start = self.end;
        self.empties = 0;
    }

    fn finish(&mut self) {
        self.done = true;
        self.err = self.read_err.take();
    }

    fn fail(&mut self, err: ScanError) {
        self.done = true;
        self.token = 0..0;
        self.err.get_or_insert(err);
    }
}

impl<R> core::fmt::Debug for Scanner<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scanner")
            .field("max_buffer_size", &self.max_buffer_size)
            .field("overflow", &self.overflow)
            .field("buffered", &(self.end - self.start))
            .field("eof", &self.eof)
            .field("err", &self.err)
            .finish_non_exhaustive()
    }
}
