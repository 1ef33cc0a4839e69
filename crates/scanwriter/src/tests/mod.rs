use std::sync::{Arc, Mutex};

use bstr::{BStr, BString};

use crate::{Error, ScanWriter, ScanWriterOptions, SplitPolicy};

mod property_overflow;

fn iterations() -> u64 {
    #[cfg(not(any(miri, feature = "test-fast")))]
    let tests = if is_ci::cached() { 10_000 } else { 1_000 };
    #[cfg(any(miri, feature = "test-fast"))]
    let tests = 10;
    tests
}

/// Writes `input` through a fresh writer, cutting it at the positions derived
/// from `splits`, and returns the delivered tokens plus the close result.
fn run_chunked(
    input: &[u8],
    splits: &[usize],
    split: impl SplitPolicy + 'static,
    options: ScanWriterOptions,
) -> (Vec<BString>, Result<(), Error>) {
    let tokens = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tokens);
    let writer = ScanWriter::with_split(
        move |token: &BStr| sink.lock().unwrap().push(token.to_owned()),
        split,
        options,
    );

    let mut rest = input;
    for &s in splits {
        if rest.is_empty() {
            break;
        }
        let (chunk, tail) = rest.split_at(1 + s % rest.len());
        writer.write(chunk).unwrap();
        rest = tail;
    }
    if !rest.is_empty() {
        writer.write(rest).unwrap();
    }

    let closed = writer.close();
    let tokens = tokens.lock().unwrap().clone();
    (tokens, closed)
}
