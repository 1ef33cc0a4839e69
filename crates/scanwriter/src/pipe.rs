//! In-memory, unbuffered byte pipe.
//!
//! A write hands its bytes to the reader and blocks until the reader has
//! taken all of them, so at most one write's worth of data is ever in
//! flight. Concurrent writes are serialized and never interleave.
//!
//! Closing either half is visible to the other:
//! - closing the writer makes the reader see end-of-input (or the given
//!   reason) once it has drained what was already handed over;
//! - closing the reader makes pending and future writes fail.

use std::{io, sync::Arc};

use parking_lot::{Condvar, Mutex};

use crate::error::{AbortReason, PipeError, ScanError};

/// Creates a connected reader/writer pair.
#[must_use]
pub fn pipe() -> (PipeReader, PipeWriter) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        readable: Condvar::new(),
        drained: Condvar::new(),
        write_lock: Mutex::new(()),
    });
    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter { shared },
    )
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    /// Signalled when data or a close becomes visible to the reader.
    readable: Condvar,
    /// Signalled when the reader drains the pending write or closes.
    drained: Condvar,
    /// Held for the duration of a write to keep writes whole.
    write_lock: Mutex<()>,
}

#[derive(Debug, Default)]
struct State {
    pending: Vec<u8>,
    offset: usize,
    write_end: Option<WriteEnd>,
    read_end: Option<ReadEnd>,
}

#[derive(Debug)]
enum WriteEnd {
    Eof,
    Aborted(AbortReason),
}

#[derive(Debug)]
enum ReadEnd {
    Closed,
    Failed(ScanError),
}

impl State {
    fn has_pending(&self) -> bool {
        self.offset < self.pending.len()
    }

    fn reset_pending(&mut self) {
        self.pending.clear();
        self.offset = 0;
    }

    fn reader_error(&self) -> Option<PipeError> {
        self.read_end.as_ref().map(|end| match end {
            ReadEnd::Closed => PipeError::BrokenPipe,
            ReadEnd::Failed(err) => PipeError::ReaderClosed(err.clone()),
        })
    }
}

/// Read half of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Reads bytes handed over by a writer, blocking until some are available
    /// or the write half is closed.
    ///
    /// Returns `Ok(0)` at end-of-input.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Aborted`] if the writer closed with a reason.
    /// - [`PipeError::Closed`] if this half was already closed.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, PipeError> {
        let mut state = self.shared.state.lock();
        loop {
            if state.read_end.is_some() {
                return Err(PipeError::Closed);
            }
            if state.has_pending() {
                if buf.is_empty() {
                    return Ok(0);
                }
                let start = state.offset;
                let n = buf.len().min(state.pending.len() - start);
                buf[..n].copy_from_slice(&state.pending[start..start + n]);
                state.offset += n;
                if !state.has_pending() {
                    self.shared.drained.notify_all();
                }
                return Ok(n);
            }
            match &state.write_end {
                Some(WriteEnd::Eof) => return Ok(0),
                Some(WriteEnd::Aborted(reason)) => {
                    return Err(PipeError::Aborted(Arc::clone(reason)));
                }
                None => self.shared.readable.wait(&mut state),
            }
        }
    }

    /// Closes the read half; writers then fail with
    /// [`PipeError::BrokenPipe`].
    pub fn close(&self) {
        self.close_with(ReadEnd::Closed);
    }

    /// Closes the read half; writers then fail with
    /// [`PipeError::ReaderClosed`] carrying `err`.
    pub fn close_with_error(&self, err: ScanError) {
        self.close_with(ReadEnd::Failed(err));
    }

    fn close_with(&self, end: ReadEnd) {
        let mut state = self.shared.state.lock();
        if state.read_end.is_none() {
            state.read_end = Some(end);
        }
        self.shared.drained.notify_all();
        self.shared.readable.notify_all();
    }
}

impl io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        PipeReader::read(self, buf).map_err(io::Error::from)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Write half of a [`pipe`].
///
/// Shared references may write concurrently; each write is delivered whole.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Hands `buf` to the reader and blocks until it has been read.
    ///
    /// Returns the number of bytes the reader took. This is `buf.len()`
    /// unless the reader closed part way through.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Closed`] if the write half is closed.
    /// - [`PipeError::BrokenPipe`] or [`PipeError::ReaderClosed`] if the read
    ///   half closed before taking any of `buf`.
    pub fn write(&self, buf: &[u8]) -> Result<usize, PipeError> {
        let _whole = self.shared.write_lock.lock();
        let mut state = self.shared.state.lock();
        if state.write_end.is_some() {
            return Err(PipeError::Closed);
        }
        if let Some(err) = state.reader_error() {
            return Err(err);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        state.reset_pending();
        state.pending.extend_from_slice(buf);
        self.shared.readable.notify_all();

        loop {
            if !state.has_pending() {
                state.reset_pending();
                return Ok(buf.len());
            }
            if let Some(err) = state.reader_error() {
                let taken = state.offset;
                state.reset_pending();
                return if taken > 0 { Ok(taken) } else { Err(err) };
            }
            self.shared.drained.wait(&mut state);
        }
    }

    /// Closes the write half. The reader sees end-of-input after draining.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        self.close_with(WriteEnd::Eof);
    }

    /// Closes the write half; the reader sees [`PipeError::Aborted`] with
    /// `reason` instead of end-of-input.
    pub fn close_with_error(&self, reason: AbortReason) {
        self.close_with(WriteEnd::Aborted(reason));
    }

    fn close_with(&self, end: WriteEnd) {
        let mut state = self.shared.state.lock();
        if state.write_end.is_none() {
            state.write_end = Some(end);
        }
        self.shared.readable.notify_all();
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PipeWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PipeWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}
