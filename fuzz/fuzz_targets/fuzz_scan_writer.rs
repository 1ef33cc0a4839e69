#![no_main]
use std::sync::{Arc, Mutex};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use scanwriter::{
    OverflowMode, ScanWriter, ScanWriterOptions, Split, SplitError, SplitPolicy,
    split::{Bytes, Chars, Delimiter, Lines, Words},
};

#[derive(Debug, Arbitrary)]
struct Input {
    flags: u8,
    max_buffer_size: u8,
    split_seed: u64,
    data: Vec<u8>,
}

fn policy(flags: u8) -> Box<dyn Fn() -> Box<dyn SplitPolicy>> {
    match flags & 7 {
        0 | 5 => Box::new(|| Box::new(Lines)),
        1 => Box::new(|| Box::new(Words)),
        2 => Box::new(|| Box::new(Chars)),
        3 => Box::new(|| Box::new(Bytes)),
        _ => Box::new(|| Box::new(Delimiter(b','))),
    }
}

/// Run `chunks` through a fresh writer and return tokens plus whether close
/// reported an error.
fn run<'a>(
    chunks: impl IntoIterator<Item = &'a [u8]>,
    split: Box<dyn SplitPolicy>,
    options: ScanWriterOptions,
) -> (Vec<Vec<u8>>, bool) {
    let tokens = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tokens);
    let writer = ScanWriter::with_split(
        move |token| sink.lock().unwrap().push(token.to_vec()),
        BoxedSplit(split),
        options,
    );
    for chunk in chunks {
        writer.write(chunk).expect("write before close must succeed");
    }
    let failed = writer.close().is_err();
    let tokens = tokens.lock().unwrap().clone();
    (tokens, failed)
}

struct BoxedSplit(Box<dyn SplitPolicy>);

impl SplitPolicy for BoxedSplit {
    fn split(&mut self, data: &[u8], at_eof: bool) -> Result<Split, SplitError> {
        self.0.split(data, at_eof)
    }
}

/// Cut `data` at deterministic pseudo-random points derived from `seed`.
fn split_into_chunks(data: &[u8], seed: u64) -> Vec<&[u8]> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut chunks = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let take = rng.random_range(1..=rest.len());
        let (chunk, tail) = rest.split_at(take);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}

fn scan_writer(input: Input) {
    let make = policy(input.flags);
    let options = ScanWriterOptions {
        // Lossless mode keeps chunked and one-shot runs comparable even when
        // tokens hit the limit.
        max_buffer_size: usize::from(input.max_buffer_size).max(4),
        overflow: OverflowMode::Chunk,
    };

    let whole = run([&input.data[..]], make(), options);
    let chunked = run(split_into_chunks(&input.data, input.split_seed), make(), options);

    // Where a forced cut lands depends on how reads line up with the buffer,
    // so only compare runs in which no token filled it.
    let limit = options.max_buffer_size;
    let hit_limit = |tokens: &[Vec<u8>]| tokens.iter().any(|t| t.len() >= limit);
    if !hit_limit(&whole.0) && !hit_limit(&chunked.0) {
        assert_eq!(whole, chunked);
    }
    assert!(!whole.1 && !chunked.1, "lossless scan reported an error");
}

fuzz_target!(|input: Input| scan_writer(input));
