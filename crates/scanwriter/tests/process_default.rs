#![allow(missing_docs)]

//! Runs in its own binary: the default buffer size is process-wide.

use std::time::Duration;

use rstest::rstest;
use scanwriter::{
    DEFAULT_MAX_BUFFER_SIZE, Error, ScanError, ScanWriterOptions, default_max_buffer_size,
    set_default_max_buffer_size,
};

mod common;
use common::line_writer;

#[rstest]
#[timeout(Duration::from_secs(5))]
fn process_default_applies_to_new_options() {
    assert_eq!(default_max_buffer_size(), DEFAULT_MAX_BUFFER_SIZE);
    let before = ScanWriterOptions::default();

    set_default_max_buffer_size(3);
    assert_eq!(ScanWriterOptions::default().max_buffer_size, 3);

    let (small, small_tokens) = line_writer(ScanWriterOptions::default());
    small.write(b"abcdef\n").unwrap();
    assert!(matches!(
        small.close(),
        Err(Error::Scan(ScanError::Overflow { max: 3 }))
    ));
    assert_eq!(small_tokens.take(), ["abc"]);

    // Options captured before the change keep their size.
    let (large, large_tokens) = line_writer(before);
    large.write(b"abcdef\n").unwrap();
    large.close().unwrap();
    assert_eq!(large_tokens.take(), ["abcdef"]);

    set_default_max_buffer_size(0);
    assert_eq!(default_max_buffer_size(), 1);

    set_default_max_buffer_size(DEFAULT_MAX_BUFFER_SIZE);
}
