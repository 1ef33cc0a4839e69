use bstr::BString;
use quickcheck::{QuickCheck, TestResult};

use super::{iterations, run_chunked};
use crate::{Error, OverflowMode, ScanError, ScanWriterOptions, split::Lines};

fn options(max: usize, overflow: OverflowMode) -> ScanWriterOptions {
    ScanWriterOptions {
        max_buffer_size: max,
        overflow,
    }
}

fn no_newlines(raw: &[u8]) -> Vec<u8> {
    raw.iter().map(|b| b'a' + b % 26).collect()
}

/// Property: a run longer than the limit always fails the writer, delivers
/// only the first `max` bytes, and never delivers anything after them.
#[test]
fn truncate_delivers_one_prefix_then_fails() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(raw: Vec<u8>, max: u8, splits: Vec<usize>) -> TestResult {
        let max = usize::from(max % 16) + 1;
        let mut input = no_newlines(&raw);
        if input.len() <= max {
            return TestResult::discard();
        }
        input.extend_from_slice(b"\nafter\n");

        let (tokens, closed) = run_chunked(&input, &splits, Lines, options(max, OverflowMode::Truncate));
        let overflowed = matches!(closed, Err(Error::Scan(ScanError::Overflow { max: m })) if m == max);
        TestResult::from_bool(overflowed && tokens == [BString::from(&input[..max])])
    }

    QuickCheck::new()
        .tests(iterations())
        .quickcheck(prop as fn(Vec<u8>, u8, Vec<usize>) -> TestResult);
}

/// Property: rejecting never delivers the over-long token.
#[test]
fn reject_delivers_nothing() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(raw: Vec<u8>, max: u8, splits: Vec<usize>) -> TestResult {
        let max = usize::from(max % 16) + 1;
        let input = no_newlines(&raw);
        if input.len() <= max {
            return TestResult::discard();
        }
        let (tokens, closed) = run_chunked(&input, &splits, Lines, options(max, OverflowMode::Reject));
        TestResult::from_bool(
            tokens.is_empty() && matches!(closed, Err(Error::Scan(ref e)) if e.is_overflow()),
        )
    }

    QuickCheck::new()
        .tests(iterations())
        .quickcheck(prop as fn(Vec<u8>, u8, Vec<usize>) -> TestResult);
}

/// Property: chunk mode cuts over-long runs into `max`-sized pieces, loses
/// nothing, and closes cleanly regardless of how the input was written.
#[test]
fn chunk_mode_is_lossless() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(raw: Vec<u8>, max: u8, splits: Vec<usize>) -> bool {
        let max = usize::from(max % 16) + 1;
        let input = no_newlines(&raw);
        let (tokens, closed) = run_chunked(&input, &splits, Lines, options(max, OverflowMode::Chunk));
        let expected: Vec<BString> = input.chunks(max).map(BString::from).collect();
        closed.is_ok() && tokens == expected
    }

    QuickCheck::new()
        .tests(iterations())
        .quickcheck(prop as fn(Vec<u8>, u8, Vec<usize>) -> bool);
}
