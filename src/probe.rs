//! Round-trip check of the capture mechanism on the running platform

use crate::capture::{CaptureError, Capturer};
use crate::handle::Stream;
use std::fmt;
use std::io;

/// Outcome of writing a known message to a stream under capture.
#[derive(Debug)]
pub struct ProbeReport {
    pub stream: Stream,
    pub expected: Vec<u8>,
    pub captured: Vec<u8>,
    pub write_error: Option<io::Error>,
}

impl ProbeReport {
    pub fn is_match(&self) -> bool {
        self.write_error.is_none() && self.captured == self.expected
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_match() { "ok" } else { "MISMATCH" };
        write!(
            f,
            "{}: captured {} bytes, {}",
            self.stream,
            self.captured.len(),
            verdict
        )?;
        if let Some(e) = &self.write_error {
            write!(f, " (write failed: {e})")?;
        }
        Ok(())
    }
}

/// Writes `message` to `stream` `repeat` times under capture and compares
/// what came back.
pub fn probe(
    capturer: &Capturer,
    stream: Stream,
    message: &str,
    repeat: usize,
) -> Result<ProbeReport, CaptureError> {
    let expected = message.repeat(repeat).into_bytes();
    let mut write_error = None;

    let captured = capturer.capture_bytes(stream, || {
        for _ in 0..repeat {
            if let Err(e) = stream.write_all(message.as_bytes()) {
                write_error = Some(e);
                break;
            }
        }
    })?;

    Ok(ProbeReport {
        stream,
        expected,
        captured,
        write_error,
    })
}
