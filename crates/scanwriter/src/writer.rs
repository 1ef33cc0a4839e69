use core::{fmt, mem};
use std::{
    any::Any,
    error::Error as StdError,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use bstr::{BStr, BString};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    error::{AbortReason, Error, PipeError, ScanError},
    options::ScanWriterOptions,
    pipe::{PipeReader, PipeWriter, pipe},
    scanner::Scanner,
    split::{Lines, SplitPolicy},
};

/// Token callback run on the consumer thread.
pub type Callback = Box<dyn FnMut(&BStr) + Send>;

/// A byte sink that splits everything written to it into tokens and hands
/// each token to a callback, in order, on a background thread.
///
/// Writes block until the consumer has taken the bytes, so a slow callback
/// slows writers down instead of growing a queue. The consumer thread is
/// started by the first write and stopped by [`close`](Self::close), which
/// waits for every buffered token (including an unterminated last one) to be
/// delivered.
///
/// Close exactly once: a second close is an error, not a no-op.
///
/// # Examples
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use scanwriter::ScanWriter;
///
/// let lines = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&lines);
/// let writer = ScanWriter::new(move |line| sink.lock().unwrap().push(line.to_string()));
///
/// writer.write(b"ab").unwrap();
/// writer.write(b"c\nde").unwrap();
/// writer.close().unwrap();
///
/// assert_eq!(*lines.lock().unwrap(), ["abc", "de"]);
/// ```
pub struct ScanWriter {
    pipe: PipeWriter,
    consumer: Mutex<Consumer>,
    started: AtomicBool,
    closed: AtomicBool,
    diagnostics: Arc<Diagnostics>,
}

enum Consumer {
    Idle(Box<ConsumerTask>),
    Running(JoinHandle<()>),
    /// The thread could not be spawned; the task went down with it.
    SpawnFailed(io::ErrorKind),
    Finished,
}

struct ConsumerTask {
    scanner: Scanner<PipeReader>,
    callback: Callback,
    diagnostics: Arc<Diagnostics>,
}

#[derive(Debug, Default)]
struct Diagnostics {
    last_error: Mutex<Option<ScanError>>,
    last_token: Mutex<BString>,
}

impl Diagnostics {
    fn record_token(&self, token: &BStr) {
        let mut last = self.last_token.lock();
        last.clear();
        last.extend_from_slice(token);
    }

    fn record_error(&self, err: ScanError) {
        *self.last_error.lock() = Some(err);
    }
}

impl ScanWriter {
    /// Creates a line-splitting writer with default options.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&BStr) + Send + 'static,
    {
        Self::with_options(callback, ScanWriterOptions::default())
    }

    /// Creates a line-splitting writer with `options`.
    pub fn with_options<F>(callback: F, options: ScanWriterOptions) -> Self
    where
        F: FnMut(&BStr) + Send + 'static,
    {
        Self::with_split(callback, Lines, options)
    }

    /// Creates a writer that cuts tokens with `split`.
    pub fn with_split<F, S>(callback: F, split: S, options: ScanWriterOptions) -> Self
    where
        F: FnMut(&BStr) + Send + 'static,
        S: SplitPolicy + 'static,
    {
        let (reader, writer) = pipe();
        let diagnostics = Arc::new(Diagnostics::default());
        let scanner = Scanner::with_options(reader, options).with_split(split);
        Self {
            pipe: writer,
            consumer: Mutex::new(Consumer::Idle(Box::new(ConsumerTask {
                scanner,
                callback: Box::new(callback),
                diagnostics: Arc::clone(&diagnostics),
            }))),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            diagnostics,
        }
    }

    /// Replaces the split policy.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] once the first write (or close) has started
    /// scanning.
    pub fn set_split(&self, split: impl SplitPolicy + 'static) -> Result<(), Error> {
        match &mut *self.consumer.lock() {
            Consumer::Idle(task) => {
                task.scanner.set_split(Box::new(split));
                Ok(())
            }
            Consumer::Running(_) | Consumer::SpawnFailed(_) | Consumer::Finished => {
                Err(Error::AlreadyStarted)
            }
        }
    }

    /// Writes all of `buf`, blocking until the consumer has taken it.
    ///
    /// The first call starts the consumer thread. Once scanning has stopped
    /// because of an error, writes are still accepted but their bytes are
    /// discarded; the error is reported by [`close`](Self::close) and
    /// [`last_error`](Self::last_error).
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] after `close`.
    /// - [`Error::Spawn`] if the consumer thread cannot be started, on this
    ///   and every later call.
    /// - [`Error::ConsumerStopped`] if the consumer went away without
    ///   draining.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.ensure_started()?;
        let mut written = 0;
        while written < buf.len() {
            match self.pipe.write(&buf[written..]) {
                Ok(n) => written += n,
                Err(err) => return Err(self.write_error(err)),
            }
        }
        Ok(written)
    }

    /// Closes the writer, flushes the last partial token and waits for the
    /// consumer thread to exit.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyClosed`] on every call after the first.
    /// - [`Error::Scan`] with the scanner's latched error, such as
    ///   [`ScanError::Overflow`].
    pub fn close(&self) -> Result<(), Error> {
        self.shutdown(None)
    }

    /// Like [`close`](Self::close), but the scanner sees `reason` as a read
    /// error instead of a clean end of input.
    ///
    /// Buffered bytes are still delivered as a final token. Unless scanning
    /// had already failed, the result is `Err(Error::Scan(ScanError::Aborted(reason)))`.
    ///
    /// # Errors
    ///
    /// As for [`close`](Self::close).
    pub fn close_with_error<E>(&self, reason: E) -> Result<(), Error>
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.shutdown(Some(Arc::from(reason.into())))
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The error latched by the scanner, if any. Never blocks.
    #[must_use]
    pub fn last_error(&self) -> Option<ScanError> {
        self.diagnostics.last_error.lock().clone()
    }

    /// A copy of the most recently delivered token; empty before the first.
    #[must_use]
    pub fn most_recent_token(&self) -> BString {
        self.diagnostics.last_token.lock().clone()
    }

    fn shutdown(&self, reason: Option<AbortReason>) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyClosed);
        }
        debug!(aborted = reason.is_some(), "closing scan writer");
        match reason {
            Some(reason) => self.pipe.close_with_error(reason),
            None => self.pipe.close(),
        }
        // A writer that was never written to still reports a close reason.
        self.ensure_started()?;
        self.join();
        match self.last_error() {
            Some(err) => Err(Error::Scan(err)),
            None => Ok(()),
        }
    }

    fn ensure_started(&self) -> Result<(), Error> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut slot = self.consumer.lock();
        let task = match mem::replace(&mut *slot, Consumer::Finished) {
            Consumer::Idle(task) => task,
            Consumer::SpawnFailed(kind) => {
                *slot = Consumer::SpawnFailed(kind);
                return Err(Error::Spawn(io::Error::new(
                    kind,
                    "consumer thread failed to start",
                )));
            }
            other => {
                // Another first write won the race.
                *slot = other;
                return Ok(());
            }
        };
        match thread::Builder::new()
            .name("scan-writer".into())
            .spawn(move || task.run())
        {
            Ok(handle) => {
                *slot = Consumer::Running(handle);
                self.started.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "failed to spawn scan writer consumer");
                *slot = Consumer::SpawnFailed(err.kind());
                Err(Error::Spawn(err))
            }
        }
    }

    fn join(&self) {
        let slot = mem::replace(&mut *self.consumer.lock(), Consumer::Finished);
        let Consumer::Running(handle) = slot else {
            return;
        };
        // Policy and callback panics are caught on the thread; anything
        // reaching here escaped the consumer's own bookkeeping.
        if let Err(payload) = handle.join() {
            let msg = panic_message(&*payload);
            warn!(%msg, "scan writer consumer panicked");
            self.diagnostics.record_error(ScanError::CallbackPanicked(msg));
        }
    }

    fn write_error(&self, err: PipeError) -> Error {
        match err {
            PipeError::Closed => Error::Closed,
            PipeError::ReaderClosed(err) => Error::ConsumerStopped(err),
            other => Error::ConsumerStopped(self.last_error().unwrap_or_else(|| other.into())),
        }
    }
}

impl ConsumerTask {
    fn run(self: Box<Self>) {
        let Self {
            mut scanner,
            mut callback,
            diagnostics,
        } = *self;
        debug!(
            max_buffer_size = scanner.max_buffer_size(),
            "scan writer consumer started"
        );

        let mut delivered = 0usize;
        let mut panicked = None;
        loop {
            match panic::catch_unwind(AssertUnwindSafe(|| scanner.scan())) {
                Ok(true) => {}
                Ok(false) => break,
                Err(payload) => {
                    let msg = panic_message(&*payload);
                    warn!(%msg, "split policy panicked; delivery stopped");
                    panicked = Some(ScanError::SplitPanicked(msg));
                    break;
                }
            }
            let token = scanner.token();
            trace!(len = token.len(), "token");
            diagnostics.record_token(token);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(token))) {
                let msg = panic_message(&*payload);
                warn!(%msg, "token callback panicked; delivery stopped");
                panicked = Some(ScanError::CallbackPanicked(msg));
                break;
            }
            delivered += 1;
        }
        if let Some(err) = panicked.or_else(|| scanner.err().cloned()) {
            diagnostics.record_error(err);
        }

        // No more tokens will be delivered; keep writers from blocking until
        // the write half closes.
        let mut reader = scanner.into_inner();
        let drained = io::copy(&mut reader, &mut io::sink()).unwrap_or(0);
        debug!(delivered, drained, "scan writer consumer stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl io::Write for ScanWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ScanWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &ScanWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ScanWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for ScanWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanWriter")
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("last_error", &self.last_error())
            .finish_non_exhaustive()
    }
}
