//! Process-wide standard stream handles
//!
//! A [`StreamHandle`] is the indirection point that decides where writes to a
//! logical stream go. The capture algorithm only ever talks to this trait, so it
//! can run against the real process streams ([`ProcessStream`]) or against an
//! injected handle in tests.

use std::fmt;
use std::io::{self, PipeReader, PipeWriter, Write};

/// One of the two standard output streams of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Writes `bytes` through Rust's handle for this stream.
    pub fn write_all(self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Stream::Stdout => io::stdout().write_all(bytes),
            Stream::Stderr => io::stderr().write_all(bytes),
        }
    }

    /// Pushes output buffered inside the process to the stream's current destination.
    pub fn flush(self) -> io::Result<()> {
        match self {
            Stream::Stdout => io::stdout().flush(),
            Stream::Stderr => io::stderr().flush(),
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("standard output"),
            Stream::Stderr => f.write_str("standard error"),
        }
    }
}

/// Swap/restore contract for a stream handle.
///
/// `redirect` takes ownership of the conduit's write end. After `restore`
/// returns, the handle must hold no reference to it any more, so the reader
/// observes end-of-data.
#[cfg_attr(test, mockall::automock)]
pub trait StreamHandle {
    /// Points the stream at `conduit`, remembering the original destination.
    fn redirect(&mut self, conduit: PipeWriter) -> io::Result<()>;

    /// Points the stream back at the destination saved by `redirect` and
    /// releases the write end.
    fn restore(&mut self) -> io::Result<()>;

    /// Pushes in-process buffered output to wherever the stream currently points.
    fn flush(&mut self) -> io::Result<()>;
}

#[cfg(unix)]
mod unix {
    use super::{Stream, StreamHandle};
    use std::io::{self, PipeReader, PipeWriter};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

    /// Lowest descriptor that is not one of the standard streams.
    const FIRST_FREE_FD: RawFd = libc::STDERR_FILENO + 1;

    /// What the target descriptor referred to before the redirect.
    #[derive(Debug)]
    enum Original {
        Open(OwnedFd),
        Closed,
    }

    /// A standard stream substituted at the file descriptor level.
    ///
    /// Descriptor 1 or 2 is replaced with a duplicate of the conduit's write end,
    /// which catches every writer in the process, including ones that bypass
    /// Rust's `std::io` handles. A stream that was closed before the redirect is
    /// closed again on restore.
    #[derive(Debug)]
    pub struct ProcessStream {
        stream: Stream,
        saved: Option<Original>,
    }

    impl ProcessStream {
        pub fn new(stream: Stream) -> Self {
            Self {
                stream,
                saved: None,
            }
        }

        pub fn stream(&self) -> Stream {
            self.stream
        }

        fn target_fd(&self) -> RawFd {
            match self.stream {
                Stream::Stdout => libc::STDOUT_FILENO,
                Stream::Stderr => libc::STDERR_FILENO,
            }
        }
    }

    impl StreamHandle for ProcessStream {
        fn redirect(&mut self, conduit: PipeWriter) -> io::Result<()> {
            if self.saved.is_some() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is already redirected", self.stream),
                ));
            }

            let target = self.target_fd();
            let original = match duplicate(target) {
                Ok(fd) => Original::Open(fd),
                Err(e) if e.raw_os_error() == Some(libc::EBADF) => Original::Closed,
                Err(e) => return Err(e),
            };
            replace(conduit.as_raw_fd(), target)?;

            // The target descriptor is now the only reference to the write end.
            drop(conduit);
            self.saved = Some(original);
            Ok(())
        }

        fn restore(&mut self) -> io::Result<()> {
            let target = self.target_fd();
            match &self.saved {
                Some(Original::Open(fd)) => replace(fd.as_raw_fd(), target)?,
                Some(Original::Closed) => close(target)?,
                None => {
                    return Err(io::Error::other(format!(
                        "{} is not redirected",
                        self.stream
                    )));
                }
            }

            // Cleared only once the target is back, so a failed restore can be retried.
            self.saved = None;
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.stream.flush()
        }
    }

    /// Creates a conduit whose ends never occupy a standard stream's descriptor.
    ///
    /// When descriptor 0, 1 or 2 is closed, `pipe` reuses the free slot, and the
    /// later `dup2` onto that slot would close one end of the conduit.
    pub(crate) fn conduit() -> io::Result<(PipeReader, PipeWriter)> {
        let (reader, writer) = io::pipe()?;
        Ok((above_std_streams(reader)?, above_std_streams(writer)?))
    }

    fn above_std_streams<T>(end: T) -> io::Result<T>
    where
        T: AsRawFd + From<OwnedFd>,
    {
        if end.as_raw_fd() >= FIRST_FREE_FD {
            return Ok(end);
        }
        // Dropping `end` afterwards frees the standard slot again.
        let moved = duplicate(end.as_raw_fd())?;
        Ok(T::from(moved))
    }

    /// Duplicates `fd` onto a new close-on-exec descriptor above the standard streams.
    fn duplicate(fd: RawFd) -> io::Result<OwnedFd> {
        // SAFETY: F_DUPFD_CLOEXEC does not touch `fd` and returns a fresh descriptor.
        let duplicated = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, FIRST_FREE_FD) };
        if duplicated < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `duplicated` is open and nothing else owns it.
        Ok(unsafe { OwnedFd::from_raw_fd(duplicated) })
    }

    /// Makes `target` refer to the same open file as `source`.
    fn replace(source: RawFd, target: RawFd) -> io::Result<()> {
        loop {
            // SAFETY: both descriptors stay open for the duration of the call.
            if unsafe { libc::dup2(source, target) } >= 0 {
                return Ok(());
            }
            let error = io::Error::last_os_error();
            if error.kind() != io::ErrorKind::Interrupted {
                return Err(error);
            }
        }
    }

    /// Closes a standard stream's descriptor that we redirected ourselves.
    fn close(target: RawFd) -> io::Result<()> {
        // SAFETY: `target` holds our duplicate of the write end and nothing else owns it.
        if unsafe { libc::close(target) } < 0 {
            let error = io::Error::last_os_error();
            // The descriptor is released even when close is interrupted.
            if error.kind() != io::ErrorKind::Interrupted {
                return Err(error);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn conduit_ends_stay_clear_of_standard_streams() {
            let (reader, writer) = conduit().unwrap();
            assert!(reader.as_raw_fd() >= FIRST_FREE_FD);
            assert!(writer.as_raw_fd() >= FIRST_FREE_FD);
        }

        #[test]
        fn high_descriptor_is_kept() {
            let (reader, _writer) = io::pipe().unwrap();
            let fd = reader.as_raw_fd();
            assert!(fd >= FIRST_FREE_FD, "Standard streams should be open in tests");

            let kept = above_std_streams(reader).unwrap();
            assert_eq!(kept.as_raw_fd(), fd);
        }
    }
}

#[cfg(windows)]
mod win32 {
    use super::{Stream, StreamHandle};
    use std::io::{self, PipeWriter};
    use std::os::windows::io::AsRawHandle;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Console::{
        GetStdHandle, STD_ERROR_HANDLE, STD_HANDLE, STD_OUTPUT_HANDLE, SetStdHandle,
    };

    #[derive(Debug)]
    struct Saved {
        original: HANDLE,
        conduit: PipeWriter,
    }

    /// A standard stream substituted through the process's standard handle table.
    ///
    /// Rust's `std::io` looks the handle up on every write, so swapping it with
    /// `SetStdHandle` redirects `io::stdout()` and `io::stderr()`.
    #[derive(Debug)]
    pub struct ProcessStream {
        stream: Stream,
        saved: Option<Saved>,
    }

    impl ProcessStream {
        pub fn new(stream: Stream) -> Self {
            Self {
                stream,
                saved: None,
            }
        }

        pub fn stream(&self) -> Stream {
            self.stream
        }

        fn handle_id(&self) -> STD_HANDLE {
            match self.stream {
                Stream::Stdout => STD_OUTPUT_HANDLE,
                Stream::Stderr => STD_ERROR_HANDLE,
            }
        }
    }

    impl StreamHandle for ProcessStream {
        fn redirect(&mut self, conduit: PipeWriter) -> io::Result<()> {
            if self.saved.is_some() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is already redirected", self.stream),
                ));
            }

            let id = self.handle_id();
            unsafe {
                let original = GetStdHandle(id)?;
                SetStdHandle(id, HANDLE(conduit.as_raw_handle()))?;
                self.saved = Some(Saved { original, conduit });
            }
            Ok(())
        }

        fn restore(&mut self) -> io::Result<()> {
            let original = self
                .saved
                .as_ref()
                .map(|saved| saved.original)
                .ok_or_else(|| io::Error::other(format!("{} is not redirected", self.stream)))?;
            unsafe { SetStdHandle(self.handle_id(), original)? };

            // Dropping the saved conduit releases the write end.
            self.saved = None;
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.stream.flush()
        }
    }
}

/// Creates the conduit a capture drains.
pub(crate) fn conduit() -> io::Result<(PipeReader, PipeWriter)> {
    #[cfg(unix)]
    {
        unix::conduit()
    }
    #[cfg(not(unix))]
    {
        io::pipe()
    }
}

#[cfg(unix)]
pub use unix::ProcessStream;
#[cfg(windows)]
pub use win32::ProcessStream;
