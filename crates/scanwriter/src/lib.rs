//! Turn a stream of arbitrary byte writes into a sequence of tokens.
//!
//! [`ScanWriter`] is an [`io::Write`](std::io::Write) sink that re-segments
//! whatever is written to it (in any chunking, from any thread) into
//! delimiter-bounded tokens and calls a callback once per token, in write
//! order. Lines are the default unit; any [`SplitPolicy`] can be plugged in.
//!
//! ```rust
//! use std::io::Write;
//! use std::sync::mpsc;
//!
//! use scanwriter::ScanWriter;
//!
//! let (tx, rx) = mpsc::channel();
//! let mut writer = ScanWriter::new(move |line| tx.send(line.to_string()).unwrap());
//! write!(writer, "first\nsec").unwrap();
//! write!(writer, "ond\r\nthird").unwrap();
//! writer.close().unwrap();
//!
//! assert_eq!(rx.iter().collect::<Vec<_>>(), ["first", "second", "third"]);
//! ```
//!
//! The building blocks are public as well: [`pipe()`] is the blocking
//! hand-off between writers and the consumer thread, and [`Scanner`] splits
//! any [`io::Read`](std::io::Read) with the same policies.

mod error;
mod options;
mod pipe;
mod scanner;
pub mod split;
mod writer;

#[cfg(test)]
mod tests;

pub use error::{AbortReason, Error, PipeError, ScanError, SplitError};
pub use options::{
    DEFAULT_MAX_BUFFER_SIZE, OverflowMode, ScanWriterOptions, default_max_buffer_size,
    set_default_max_buffer_size,
};
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use scanner::Scanner;
pub use split::{Split, SplitPolicy};
pub use writer::{Callback, ScanWriter};
