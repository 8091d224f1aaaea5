//! stdcapture - Capture what a block of code writes to standard output or standard error
//!
//! This crate runs a function with one of the process's standard streams redirected
//! into a pipe, and returns everything the function wrote to it. It is meant for
//! tests that assert on console output without letting it reach the terminal.

pub mod capture;
pub mod cli;
mod collector;
pub mod config;
pub mod handle;
pub mod probe;
pub mod sink;

pub use capture::{
    CaptureError, Capturer, capture, capture_bytes, error_output, error_output_bytes,
    standard_output, standard_output_bytes,
};
pub use config::CaptureConfig;
pub use handle::{ProcessStream, Stream, StreamHandle};
pub use sink::CaptureBuffer;
