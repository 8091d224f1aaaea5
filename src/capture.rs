//! Capturing what a function writes to a standard stream
//!
//! For each call a fresh conduit (an OS pipe) is created and a collector thread
//! starts draining its read end. Once the collector reports it is running, the
//! target stream is pointed at the write end and the function runs. Afterwards
//! the stream is restored, which releases the write end, and the collector hands
//! back everything it read.
//!
//! The redirection is process-wide while the function runs. Other threads writing
//! to the same stream during that window are captured too, and two captures of
//! the same stream must not overlap. Capturing standard output on one thread and
//! standard error on another is fine.
//!
//! If the function panics, the stream is restored while unwinding and the panic
//! keeps propagating. If it never returns or terminates the process, the stream
//! stays redirected.

use crate::collector::Collector;
use crate::config::CaptureConfig;
use crate::handle::{ProcessStream, Stream, StreamHandle, conduit};
use std::io;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to create conduit: {0}")]
    Conduit(io::Error),

    #[error("Failed to start collector thread: {0}")]
    CollectorSpawn(io::Error),

    #[error("Collector thread terminated unexpectedly")]
    CollectorLost,

    #[error("Failed to flush stream before redirecting: {0}")]
    Flush(io::Error),

    #[error("Failed to redirect stream: {0}")]
    Redirect(io::Error),

    #[error("Failed to restore stream: {0}")]
    Restore(io::Error),

    #[error("Failed to read captured output: {0}")]
    Drain(io::Error),
}

/// Runs functions with one standard stream redirected into a conduit.
#[derive(Debug, Clone, Default)]
pub struct Capturer {
    config: CaptureConfig,
}

impl Capturer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Captures what `function` writes to `stream`, as text.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD; use [`Capturer::capture_bytes`]
    /// for the raw bytes.
    pub fn capture<F: FnOnce()>(
        &self,
        stream: Stream,
        function: F,
    ) -> Result<String, CaptureError> {
        self.capture_bytes(stream, function).map(into_text)
    }

    /// Captures the exact bytes `function` writes to `stream`.
    pub fn capture_bytes<F: FnOnce()>(
        &self,
        stream: Stream,
        function: F,
    ) -> Result<Vec<u8>, CaptureError> {
        debug!("Capturing {stream}");
        self.capture_with(&mut ProcessStream::new(stream), function)
    }

    /// Captures what `function` writes through `handle`.
    ///
    /// `function` is invoked only after the conduit exists, the collector is
    /// running and the handle is redirected. If any of those steps fails the
    /// error is returned and `function` never runs.
    pub fn capture_with<H, F>(
        &self,
        handle: &mut H,
        function: F,
    ) -> Result<Vec<u8>, CaptureError>
    where
        H: StreamHandle + ?Sized,
        F: FnOnce(),
    {
        let (reader, writer) = conduit().map_err(CaptureError::Conduit)?;
        let collector = Collector::spawn(reader, &self.config)?;
        debug!("Redirecting stream into conduit");

        // Output buffered before the swap belongs to the original destination.
        handle.flush().map_err(CaptureError::Flush)?;
        handle.redirect(writer).map_err(CaptureError::Redirect)?;

        // No logging until the guard has restored the handle: a subscriber
        // writing to the redirected stream would feed the conduit.
        let mut guard = RestoreGuard::new(handle);
        function();
        if let Err(e) = guard.restore() {
            // The guard still holds the handle and tries once more as it drops.
            drop(guard);
            return Err(CaptureError::Restore(e));
        }

        let captured = collector.finish()?;
        debug!(bytes = captured.len(), "Capture complete");
        Ok(captured)
    }
}

/// Restores a redirected handle exactly once: explicitly, or on drop.
///
/// A failed explicit restore leaves the handle in the guard, so dropping it
/// makes a second attempt.
struct RestoreGuard<'a, H: StreamHandle + ?Sized> {
    handle: Option<&'a mut H>,
}

impl<'a, H: StreamHandle + ?Sized> RestoreGuard<'a, H> {
    fn new(handle: &'a mut H) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn restore(&mut self) -> io::Result<()> {
        match self.handle.as_deref_mut() {
            Some(handle) => flush_and_restore(handle)?,
            None => return Ok(()),
        }
        self.handle = None;
        Ok(())
    }
}

impl<H: StreamHandle + ?Sized> Drop for RestoreGuard<'_, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = flush_and_restore(handle) {
                warn!("Failed to restore stream: {e}");
            }
        }
    }
}

fn flush_and_restore<H: StreamHandle + ?Sized>(handle: &mut H) -> io::Result<()> {
    // Output still buffered in-process was written during the capture.
    let flushed = handle.flush();
    handle.restore()?;

    if let Err(e) = flushed {
        warn!("Failed to flush captured stream: {e}");
    }
    Ok(())
}

fn into_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Captures what `function` writes to `stream`, as text.
pub fn capture<F: FnOnce()>(stream: Stream, function: F) -> Result<String, CaptureError> {
    Capturer::default().capture(stream, function)
}

/// Captures the exact bytes `function` writes to `stream`.
pub fn capture_bytes<F: FnOnce()>(stream: Stream, function: F) -> Result<Vec<u8>, CaptureError> {
    Capturer::default().capture_bytes(stream, function)
}

/// Captures what `function` writes to standard output.
///
/// ```no_run
/// use std::io::Write;
///
/// let captured = stdcapture::standard_output(|| {
///     std::io::stdout().write_all(b"Hello!").unwrap();
/// })?;
/// assert_eq!(captured, "Hello!");
/// # Ok::<(), stdcapture::CaptureError>(())
/// ```
pub fn standard_output<F: FnOnce()>(function: F) -> Result<String, CaptureError> {
    capture(Stream::Stdout, function)
}

/// Captures what `function` writes to standard error.
pub fn error_output<F: FnOnce()>(function: F) -> Result<String, CaptureError> {
    capture(Stream::Stderr, function)
}

pub fn standard_output_bytes<F: FnOnce()>(function: F) -> Result<Vec<u8>, CaptureError> {
    capture_bytes(Stream::Stdout, function)
}

pub fn error_output_bytes<F: FnOnce()>(function: F) -> Result<Vec<u8>, CaptureError> {
    capture_bytes(Stream::Stderr, function)
}
