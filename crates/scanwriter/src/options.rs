use core::sync::atomic::{AtomicUsize, Ordering};

/// Default upper bound on bytes a scanner may buffer while looking for a
/// token boundary (1 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

static PROCESS_MAX_BUFFER_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_BUFFER_SIZE);

/// Returns the process-wide default maximum buffer size.
///
/// This is what [`ScanWriterOptions::default`] uses for
/// [`ScanWriterOptions::max_buffer_size`].
#[must_use]
pub fn default_max_buffer_size() -> usize {
    PROCESS_MAX_BUFFER_SIZE.load(Ordering::Relaxed)
}

/// Overrides the process-wide default maximum buffer size.
///
/// Only affects options created after the call; existing writers keep the
/// size they were built with. A size of zero is clamped to one byte.
pub fn set_default_max_buffer_size(size: usize) {
    PROCESS_MAX_BUFFER_SIZE.store(size.max(1), Ordering::Relaxed);
}

/// What a scanner does when its buffer is full and the split policy still
/// wants more data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverflowMode {
    /// Deliver the full buffer as one truncated token, then stop with
    /// [`ScanError::Overflow`](crate::ScanError::Overflow).
    #[default]
    Truncate,
    /// Stop with [`ScanError::Overflow`](crate::ScanError::Overflow) without
    /// delivering the buffered bytes.
    Reject,
    /// Deliver the full buffer as if a boundary had been found and keep
    /// scanning. Over-long tokens arrive as several chunks and no error is
    /// recorded.
    Chunk,
}

/// Configuration for a [`ScanWriter`](crate::ScanWriter) or
/// [`Scanner`](crate::Scanner).
///
/// # Examples
///
/// ```rust
/// use scanwriter::{OverflowMode, ScanWriter, ScanWriterOptions};
///
/// let options = ScanWriterOptions {
///     max_buffer_size: 64 * 1024,
///     overflow: OverflowMode::Reject,
/// };
/// let writer = ScanWriter::with_options(|_line| {}, options);
/// writer.close().unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScanWriterOptions {
    /// Maximum number of un-split bytes held while looking for a boundary.
    ///
    /// # Default
    ///
    /// [`default_max_buffer_size()`], which is [`DEFAULT_MAX_BUFFER_SIZE`]
    /// unless overridden.
    pub max_buffer_size: usize,

    /// Behavior once `max_buffer_size` bytes are buffered without a boundary.
    ///
    /// # Default
    ///
    /// [`OverflowMode::Truncate`]
    pub overflow: OverflowMode,
}

impl Default for ScanWriterOptions {
    fn default() -> Self {
        Self {
            max_buffer_size: default_max_buffer_size(),
            overflow: OverflowMode::default(),
        }
    }
}
