//! Test utilities for stdcapture tests

use std::path::PathBuf;
use std::process::{Command, Output};
use stdcapture::Stream;

/// Writes straight to the stream's handle.
///
/// The test harness intercepts the `print!` family before it reaches the
/// descriptor, so captures under test must be fed through `io::stdout()` and
/// `io::stderr()` instead.
pub fn write_to(stream: Stream, text: &str) {
    stream
        .write_all(text.as_bytes())
        .expect("Failed to write to stream");
}

/// Device and inode of the open file behind a standard stream's descriptor.
#[cfg(unix)]
pub fn stream_identity(stream: Stream) -> (u64, u64) {
    use std::io;
    use std::os::fd::AsFd;
    use std::os::unix::fs::MetadataExt;

    let owned = match stream {
        Stream::Stdout => io::stdout().as_fd().try_clone_to_owned(),
        Stream::Stderr => io::stderr().as_fd().try_clone_to_owned(),
    }
    .expect("Failed to duplicate stream descriptor");

    let metadata = std::fs::File::from(owned)
        .metadata()
        .expect("Failed to stat stream descriptor");
    (metadata.dev(), metadata.ino())
}

/// Path of the built stdcapture binary
pub fn get_stdcapture_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stdcapture"))
}

/// Runs the stdcapture binary with `args` and collects its output
pub fn run_stdcapture(args: &[&str]) -> Output {
    Command::new(get_stdcapture_exe())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run stdcapture")
}

/// Runs the stdcapture binary with `RUST_LOG` set to `filter`
pub fn run_stdcapture_logged(filter: &str, args: &[&str]) -> Output {
    Command::new(get_stdcapture_exe())
        .args(args)
        .env("RUST_LOG", filter)
        .output()
        .expect("Failed to run stdcapture")
}
