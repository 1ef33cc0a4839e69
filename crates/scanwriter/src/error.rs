use std::{error::Error as StdError, io, sync::Arc};

use thiserror::Error;

/// Reason supplied to [`ScanWriter::close_with_error`](crate::ScanWriter::close_with_error).
pub type AbortReason = Arc<dyn StdError + Send + Sync>;

/// Errors returned by [`ScanWriter`](crate::ScanWriter) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A write was attempted after the writer was closed.
    #[error("write to closed scan writer")]
    Closed,
    /// `close` was called on a writer that is already closed.
    #[error("scan writer already closed")]
    AlreadyClosed,
    /// The split policy was replaced after scanning had started.
    #[error("split policy cannot change after scanning has started")]
    AlreadyStarted,
    /// The consumer thread stopped before taking the written bytes.
    #[error("consumer stopped: {0}")]
    ConsumerStopped(#[source] ScanError),
    /// The scanner latched a fatal error; reported by `close`.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The consumer thread could not be started.
    #[error("failed to spawn consumer thread: {0}")]
    Spawn(#[source] io::Error),
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Closed | Error::AlreadyClosed | Error::ConsumerStopped(_) => {
                io::ErrorKind::BrokenPipe
            }
            Error::AlreadyStarted | Error::Scan(_) | Error::Spawn(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Errors latched by a [`Scanner`](crate::Scanner).
///
/// Scanner errors are sticky: once one is recorded, scanning stops. They are
/// cheap to clone so diagnostics can hand out snapshots.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// The buffer reached `max` bytes without the split policy finding a token.
    #[error("token too long: no boundary within {max} buffered bytes")]
    Overflow {
        /// The configured maximum buffer size.
        max: usize,
    },
    /// The split policy asked to advance past the end of the buffered data.
    #[error("split policy advanced {advance} bytes with only {available} buffered")]
    AdvanceTooFar {
        /// Requested advance.
        advance: usize,
        /// Bytes available to the policy.
        available: usize,
    },
    /// The split policy returned a token range outside the buffered data.
    #[error("split policy returned token {start}..{end} with only {available} buffered")]
    TokenOutOfRange {
        /// Start of the returned range.
        start: usize,
        /// End of the returned range.
        end: usize,
        /// Bytes available to the policy.
        available: usize,
    },
    /// The reader kept being interrupted, or the split policy kept returning
    /// empty tokens without advancing.
    #[error("no progress after repeated interrupted reads or empty tokens")]
    NoProgress,
    /// The split policy returned an error.
    #[error(transparent)]
    Split(#[from] SplitError),
    /// The writing side closed the stream with an explicit reason.
    #[error("stream aborted: {0}")]
    Aborted(AbortReason),
    /// The token callback panicked.
    #[error("token callback panicked: {0}")]
    CallbackPanicked(String),
    /// The split policy panicked.
    #[error("split policy panicked: {0}")]
    SplitPanicked(String),
    /// The underlying reader failed.
    #[error("read error: {0}")]
    Io(Arc<io::Error>),
}

impl ScanError {
    /// Returns `true` for [`ScanError::Overflow`].
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}

impl From<io::Error> for ScanError {
    fn from(err: io::Error) -> Self {
        // Errors raised by the pipe carry their cause so it survives the trip
        // through `io::Read`.
        if !err.get_ref().is_some_and(|inner| inner.is::<PipeError>()) {
            return ScanError::Io(Arc::new(err));
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<PipeError>()) {
            Some(Ok(pipe)) => ScanError::from(*pipe),
            Some(Err(inner)) => ScanError::Io(Arc::new(io::Error::new(kind, inner))),
            None => ScanError::Io(Arc::new(io::Error::from(kind))),
        }
    }
}

impl From<PipeError> for ScanError {
    fn from(err: PipeError) -> Self {
        match err {
            PipeError::Aborted(reason) => ScanError::Aborted(reason),
            PipeError::ReaderClosed(scan) => scan,
            err @ (PipeError::Closed | PipeError::BrokenPipe) => ScanError::Io(Arc::new(err.into())),
        }
    }
}

/// Error returned by a [`SplitPolicy`](crate::SplitPolicy).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("split error: {msg}")]
pub struct SplitError {
    msg: String,
}

impl SplitError {
    /// Creates a split error carrying `msg`.
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Errors produced by the in-memory [`pipe`](crate::pipe).
#[derive(Debug, Clone, Error)]
pub enum PipeError {
    /// The write half was already closed.
    #[error("write on closed pipe")]
    Closed,
    /// The write half was closed with an explicit reason; seen by the reader.
    #[error("pipe closed by writer: {0}")]
    Aborted(AbortReason),
    /// The read half was closed without a reason; seen by writers.
    #[error("read half of pipe closed")]
    BrokenPipe,
    /// The read half was closed with an error; seen by writers.
    #[error("pipe closed by reader: {0}")]
    ReaderClosed(ScanError),
}

impl From<PipeError> for io::Error {
    fn from(err: PipeError) -> Self {
        io::Error::new(io::ErrorKind::BrokenPipe, err)
    }
}
