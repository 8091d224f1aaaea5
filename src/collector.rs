//! Background draining of the conduit's read end

use crate::capture::CaptureError;
use crate::config::CaptureConfig;
use std::io::{self, PipeReader, Read};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::trace;

/// A running collector thread.
pub(crate) struct Collector {
    handle: JoinHandle<io::Result<Vec<u8>>>,
}

impl Collector {
    /// Spawns the collector and blocks until the thread reports it is running.
    ///
    /// A writer that fills the conduit blocks until the collector reads, so a
    /// running collector is all that is needed to rule out lost or stalled writes.
    pub(crate) fn spawn(reader: PipeReader, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let chunk_size = config.read_chunk_size.max(1);
        let (ready_tx, ready_rx) = mpsc::sync_channel(0);

        let handle = thread::Builder::new()
            .name(config.collector_thread_name.clone())
            .spawn(move || {
                let mut reader = reader;
                // The receiver only goes away if spawn already failed on the other side.
                let _ = ready_tx.send(());
                drain(&mut reader, chunk_size)
            })
            .map_err(CaptureError::CollectorSpawn)?;

        ready_rx.recv().map_err(|_| CaptureError::CollectorLost)?;
        Ok(Self { handle })
    }

    /// Waits for end-of-data and returns everything drained.
    pub(crate) fn finish(self) -> Result<Vec<u8>, CaptureError> {
        match self.handle.join() {
            Ok(Ok(buffer)) => Ok(buffer),
            Ok(Err(e)) => Err(CaptureError::Drain(e)),
            Err(_) => Err(CaptureError::CollectorLost),
        }
    }
}

/// Reads `reader` to end-of-data in `chunk_size` pieces.
fn drain<R: Read>(reader: &mut R, chunk_size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; chunk_size];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    // End-of-data means the stream is already restored, so logging is safe here.
    trace!(bytes = buffer.len(), "Collector reached end of data");
    Ok(buffer)
}
