//! Split policies decide where one token ends and the next begins.
//!
//! A policy is handed the unconsumed part of the scanner's buffer and a flag
//! saying whether the input has ended. It answers with a [`Split`]: either a
//! token (as a range into `data`) plus how many bytes to consume, a request
//! for more data, or an instruction to skip bytes.
//!
//! Policies never see more than the scanner's maximum buffer size at once.
//! What happens when the buffer is full and a policy still returns
//! [`Split::NeedMore`] is governed by
//! [`OverflowMode`](crate::OverflowMode), not by the policy.

use core::ops::Range;

use bstr::ByteSlice;

use crate::error::SplitError;

/// Outcome of a single [`SplitPolicy::split`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Split {
    /// No complete token yet; read more input.
    NeedMore,
    /// Consume `n` bytes without producing a token.
    Skip(usize),
    /// Produce `data[range]` as a token and consume `advance` bytes.
    Token {
        /// Bytes to consume from the front of the buffer.
        advance: usize,
        /// Position of the token inside the buffer handed to the policy.
        range: Range<usize>,
    },
    /// Produce `data[range]` as the last token and stop scanning cleanly.
    Final(Range<usize>),
}

impl Split {
    /// Token covering `data[..len]`, consuming `advance` bytes.
    #[must_use]
    pub fn token(advance: usize, len: usize) -> Self {
        Self::Token {
            advance,
            range: 0..len,
        }
    }
}

/// A replaceable rule for cutting a byte stream into tokens.
///
/// Any `FnMut(&[u8], bool) -> Result<Split, SplitError> + Send` closure is a
/// policy:
///
/// ```rust
/// use scanwriter::{Split, SplitError, SplitPolicy};
///
/// // Fixed-size records of four bytes; a short tail is emitted at EOF.
/// let mut records = |data: &[u8], at_eof: bool| {
///     Ok::<_, SplitError>(match data.len() {
///         n if n >= 4 => Split::token(4, 4),
///         0 => Split::NeedMore,
///         n if at_eof => Split::token(n, n),
///         _ => Split::NeedMore,
///     })
/// };
/// assert_eq!(records.split(b"abcdef", false), Ok(Split::token(4, 4)));
/// ```
pub trait SplitPolicy: Send {
    /// Examine `data` and decide on the next token.
    ///
    /// `at_eof` is `true` once no more input will arrive; `data` may then be
    /// empty. Returning [`Split::NeedMore`] at EOF ends scanning.
    ///
    /// # Errors
    ///
    /// An error stops scanning and is latched by the scanner.
    fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Split, SplitError>;
}

impl<F> SplitPolicy for F
where
    F: FnMut(&[u8], bool) -> Result<Split, SplitError> + Send,
{
    fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Split, SplitError> {
        self(data, at_eof)
    }
}

/// Splits on `\n`, dropping the newline and one trailing `\r`.
///
/// The last line is emitted at EOF even without a terminating newline. An
/// empty line in the middle of the input is an empty token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lines;

impl SplitPolicy for Lines {
    fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Split, SplitError> {
        if at_eof && data.is_empty() {
            return Ok(Split::NeedMore);
        }
        if let Some(i) = data.find_byte(b'\n') {
            return Ok(Split::token(i + 1, trim_cr(&data[..i])));
        }
        if at_eof {
            return Ok(Split::token(data.len(), trim_cr(data)));
        }
        Ok(Split::NeedMore)
    }
}

fn trim_cr(line: &[u8]) -> usize {
    match line.last() {
        Some(b'\r') => line.len() - 1,
        _ => line.len(),
    }
}

/// Splits on an arbitrary delimiter byte, which is dropped.
#[derive(Debug, Clone, Copy)]
pub struct Delimiter(pub u8);

impl SplitPolicy for Delimiter {
    fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Split, SplitError> {
        if at_eof && data.is_empty() {
            return Ok(Split::NeedMore);
        }
        match data.find_byte(self.0) {
            Some(i) => Ok(Split::token(i + 1, i)),
            None if at_eof => Ok(Split::token(data.len(), data.len())),
            None => Ok(Split::NeedMore),
        }
    }
}

/// One byte per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bytes;

impl SplitPolicy for Bytes {
    fn split(&mut self, data: &[u8], _at_eof: bool) -> Result<Split, SplitError> {
        if data.is_empty() {
            return Ok(Split::NeedMore);
        }
        Ok(Split::token(1, 1))
    }
}

/// One UTF-8 encoded scalar per token.
///
/// Bytes that cannot start or complete a valid scalar are emitted one at a
/// time, so no input is lost.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chars;

impl SplitPolicy for Chars {
    fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Split, SplitError> {
        let Some(&first) = data.first() else {
            return Ok(Split::NeedMore);
        };
        let width = utf8_width(first);
        if width <= 1 {
            return Ok(Split::token(1, 1));
        }
        if data.len() < width && !at_eof {
            // Incomplete but plausible prefix: only wait if what we have so
            // far could still become a valid scalar.
            if data[1..].iter().all(|b| b & 0xC0 == 0x80) {
                return Ok(Split::NeedMore);
            }
            return Ok(Split::token(1, 1));
        }
        let len = width.min(data.len());
        if core::str::from_utf8(&data[..len]).is_ok() {
            Ok(Split::token(len, len))
        } else {
            Ok(Split::token(1, 1))
        }
    }
}

fn utf8_width(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// Whitespace-separated words; runs of ASCII and Unicode whitespace between
/// words are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Words;

impl SplitPolicy for Words {
    fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Split, SplitError> {
        let start = leading_space(data);
        if start == data.len() {
            return Ok(if start > 0 {
                Split::Skip(start)
            } else {
                Split::NeedMore
            });
        }
        for (begin, end, ch) in data[start..].char_indices() {
            if ch.is_whitespace() {
                return Ok(Split::Token {
                    advance: start + end,
                    range: start..start + begin,
                });
            }
        }
        if at_eof {
            return Ok(Split::Token {
                advance: data.len(),
                range: start..data.len(),
            });
        }
        if start > 0 {
            return Ok(Split::Skip(start));
        }
        Ok(Split::NeedMore)
    }
}

fn leading_space(data: &[u8]) -> usize {
    data.char_indices()
        .take_while(|&(_, _, ch)| ch.is_whitespace())
        .last()
        .map_or(0, |(_, end, _)| end)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    /// Runs `policy` over `input` the way a scanner with an unbounded buffer
    /// and all input available would.
    fn run(policy: &mut dyn SplitPolicy, input: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut pos = 0;
        loop {
            match policy.split(&input[pos..], true).unwrap() {
                Split::NeedMore => break,
                Split::Skip(n) => pos += n,
                Split::Token { advance, range } => {
                    out.push(input[pos..][range].to_vec());
                    pos += advance;
                }
                Split::Final(range) => {
                    out.push(input[pos..][range].to_vec());
                    break;
                }
            }
        }
        out
    }

    fn strings(tokens: &[Vec<u8>]) -> Vec<&str> {
        tokens
            .iter()
            .map(|t| core::str::from_utf8(t).unwrap())
            .collect()
    }

    #[rstest]
    #[case::plain("a\nb\n", &["a", "b"])]
    #[case::no_trailing_newline("a\nb", &["a", "b"])]
    #[case::crlf("a\r\nb\r\n", &["a", "b"])]
    #[case::lone_cr_kept("a\rb\n", &["a\rb"])]
    #[case::cr_at_eof("a\r", &["a"])]
    #[case::empty_lines("\n\nx\n", &["", "", "x"])]
    #[case::empty_input("", &[])]
    fn lines(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(strings(&run(&mut Lines, input.as_bytes())), expected);
    }

    #[test]
    fn lines_waits_for_newline() {
        assert_eq!(Lines.split(b"abc", false), Ok(Split::NeedMore));
        assert_eq!(Lines.split(b"abc\nd", false), Ok(Split::token(4, 3)));
    }

    #[rstest]
    #[case::comma("a,b,,c", b',', &["a", "b", "", "c"])]
    #[case::keeps_cr("a\r\nb", b'\n', &["a\r", "b"])]
    fn delimiter(#[case] input: &str, #[case] delim: u8, #[case] expected: &[&str]) {
        assert_eq!(
            strings(&run(&mut Delimiter(delim), input.as_bytes())),
            expected
        );
    }

    #[test]
    fn bytes() {
        assert_eq!(strings(&run(&mut Bytes, b"abc")), ["a", "b", "c"]);
    }

    #[rstest]
    #[case::ascii("ab", &["a", "b"])]
    #[case::multibyte("åβ👍", &["å", "β", "👍"])]
    fn chars(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(strings(&run(&mut Chars, input.as_bytes())), expected);
    }

    #[test]
    fn chars_waits_for_split_scalar() {
        let snowman = "☃".as_bytes();
        assert_eq!(Chars.split(&snowman[..2], false), Ok(Split::NeedMore));
        assert_eq!(Chars.split(snowman, false), Ok(Split::token(3, 3)));
    }

    #[test]
    fn chars_invalid_bytes_pass_through() {
        let tokens = run(&mut Chars, b"\xFFa\xE2(");
        assert_eq!(
            tokens,
            [b"\xFF".to_vec(), b"a".to_vec(), b"\xE2".to_vec(), b"(".to_vec()]
        );
    }

    #[rstest]
    #[case::simple("  hello world  ", &["hello", "world"])]
    #[case::tabs_newlines("a\tb\nc", &["a", "b", "c"])]
    #[case::unicode_space("a\u{2003}b", &["a", "b"])]
    #[case::only_space("   ", &[])]
    fn words(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(strings(&run(&mut Words, input.as_bytes())), expected);
    }

    #[test]
    fn words_skips_space_before_data_arrives() {
        assert_eq!(Words.split(b"  ", false), Ok(Split::Skip(2)));
        assert_eq!(Words.split(b"  ab", false), Ok(Split::Skip(2)));
        assert_eq!(Words.split(b"ab c", false), Ok(Split::token(3, 2)));
    }

    #[quickcheck_macros::quickcheck]
    fn chars_lose_no_bytes(input: Vec<u8>) -> bool {
        run(&mut Chars, &input).concat() == input
    }

    #[quickcheck_macros::quickcheck]
    fn chars_tokens_are_scalars_or_single_bytes(input: Vec<u8>) -> bool {
        run(&mut Chars, &input)
            .iter()
            .all(|t| t.len() == 1 || core::str::from_utf8(t).is_ok_and(|s| s.chars().count() == 1))
    }

    #[test]
    fn closures_are_policies() {
        let mut calls = 0;
        let mut policy = |data: &[u8], _at_eof: bool| {
            calls += 1;
            Ok::<_, SplitError>(Split::Final(0..data.len()))
        };
        assert_eq!(policy.split(b"xyz", false), Ok(Split::Final(0..3)));
        drop(policy);
        assert_eq!(calls, 1);
    }
}
