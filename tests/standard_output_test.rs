//! Standard output capture against the real descriptor
//!
//! The harness reports test results on stdout from its main thread, so this
//! binary holds a single test: nothing else writes to stdout while it is
//! redirected.

mod common;

use common::test_util::write_to;
use std::panic::{self, AssertUnwindSafe};
use stdcapture::{CaptureConfig, Capturer, Stream};

#[test]
fn standard_output_is_captured() {
    no_output();
    empty_output();
    output_without_newline();
    output_with_newline();
    output_to_stderr_is_not_captured();
    output_to_stdout_and_stderr();
    sequential_writes_keep_order();
    large_output_with_small_chunks();
    non_utf8_bytes_are_exact();
    #[cfg(unix)]
    descriptor_is_restored();
    restored_after_panic();
}

fn no_output() {
    let captured =
        stdcapture::standard_output(|| {}).expect("Unable to capture standard output");
    assert_eq!(captured, "", "Standard output should be empty");
}

fn empty_output() {
    let captured = stdcapture::standard_output(|| write_to(Stream::Stdout, ""))
        .expect("Unable to capture standard output");
    assert_eq!(captured, "", "Standard output should be empty");
}

fn output_without_newline() {
    let captured = stdcapture::standard_output(|| write_to(Stream::Stdout, "Hello!"))
        .expect("Unable to capture standard output");
    assert_eq!(captured, "Hello!", "Incorrect output has been captured");
}

fn output_with_newline() {
    let captured = stdcapture::standard_output(|| write_to(Stream::Stdout, "Hello!\n"))
        .expect("Unable to capture standard output");
    assert_eq!(captured, "Hello!\n", "Incorrect output has been captured");
}

fn output_to_stderr_is_not_captured() {
    let captured = stdcapture::standard_output(|| write_to(Stream::Stderr, "Hello!"))
        .expect("Unable to capture standard output");
    assert_eq!(captured, "", "Standard error should pass through");
}

fn output_to_stdout_and_stderr() {
    let captured = stdcapture::standard_output(|| {
        write_to(Stream::Stdout, "Hello to stdout!");
        write_to(Stream::Stderr, "Hello to stderr!");
    })
    .expect("Unable to capture standard output");
    assert_eq!(captured, "Hello to stdout!", "Incorrect output has been captured");
}

fn sequential_writes_keep_order() {
    let captured = stdcapture::standard_output(|| {
        write_to(Stream::Stdout, "A");
        write_to(Stream::Stdout, "B");
    })
    .expect("Unable to capture standard output");
    assert_eq!(captured, "AB");
}

fn large_output_with_small_chunks() {
    let line = "0123456789abcdef\n";
    let capturer = Capturer::new(CaptureConfig {
        read_chunk_size: 100,
        ..CaptureConfig::default()
    });

    let captured = capturer
        .capture(Stream::Stdout, || {
            for _ in 0..20_000 {
                write_to(Stream::Stdout, line);
            }
        })
        .expect("Unable to capture standard output");

    assert_eq!(captured.len(), line.len() * 20_000);
    assert!(captured.lines().all(|l| l == line.trim_end()));
}

fn non_utf8_bytes_are_exact() {
    let bytes = [0x66, 0x6f, 0xff, 0x00, 0x6f];
    let captured = stdcapture::standard_output_bytes(|| {
        Stream::Stdout
            .write_all(&bytes)
            .expect("Failed to write to stream");
    })
    .expect("Unable to capture standard output");
    assert_eq!(captured, bytes);
}

#[cfg(unix)]
fn descriptor_is_restored() {
    use common::test_util::stream_identity;

    let before = stream_identity(Stream::Stdout);
    stdcapture::standard_output(|| write_to(Stream::Stdout, "transient"))
        .expect("Unable to capture standard output");
    assert_eq!(
        stream_identity(Stream::Stdout),
        before,
        "Descriptor 1 should point at its original file again"
    );
}

fn restored_after_panic() {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        stdcapture::standard_output(|| {
            write_to(Stream::Stdout, "partial");
            panic!("function failed");
        })
    }));
    assert!(result.is_err(), "Panic should reach the caller");

    let captured = stdcapture::standard_output(|| write_to(Stream::Stdout, "after panic"))
        .expect("Unable to capture standard output");
    assert_eq!(captured, "after panic", "Capture should work after a panic");
}
