#![allow(missing_docs)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bstr::{BStr, BString};
use scanwriter::{ScanWriter, ScanWriterOptions, SplitPolicy, split::Lines};

/// Split `payload` into at most `parts` contiguous chunks of near-equal size.
///
/// # Panics
///
/// Panics if `parts` is zero.
pub fn produce_chunks(payload: &[u8], parts: usize) -> Vec<&[u8]> {
    assert!(parts > 0);
    let chunk_size = payload.len().div_ceil(parts).max(1);
    payload.chunks(chunk_size).collect()
}

/// Shared list of the tokens a writer delivered.
#[derive(Clone, Default)]
pub struct Tokens(Arc<Mutex<Vec<BString>>>);

impl Tokens {
    pub fn callback(&self) -> impl FnMut(&BStr) + Send + 'static {
        let tokens = Arc::clone(&self.0);
        move |token: &BStr| tokens.lock().unwrap().push(token.to_owned())
    }

    pub fn take(&self) -> Vec<BString> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}

pub fn line_writer(options: ScanWriterOptions) -> (ScanWriter, Tokens) {
    split_writer(Lines, options)
}

pub fn split_writer(
    split: impl SplitPolicy + 'static,
    options: ScanWriterOptions,
) -> (ScanWriter, Tokens) {
    let tokens = Tokens::default();
    let writer = ScanWriter::with_split(tokens.callback(), split, options);
    (writer, tokens)
}
