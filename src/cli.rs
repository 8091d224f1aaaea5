use crate::handle::Stream;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "stdcapture",
    version,
    about = "Capture what in-process code writes to standard output or standard error."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Which standard streams a command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamSelection {
    Stdout,
    Stderr,
    Both,
}

impl StreamSelection {
    pub fn streams(self) -> &'static [Stream] {
        match self {
            StreamSelection::Stdout => &[Stream::Stdout],
            StreamSelection::Stderr => &[Stream::Stderr],
            StreamSelection::Both => &[Stream::Stdout, Stream::Stderr],
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a known message under capture and check it comes back intact
    #[command(visible_alias = "check")]
    Probe {
        /// Stream or streams to probe
        #[arg(short, long, value_enum, default_value = "both")]
        stream: StreamSelection,

        /// Text written on each repetition
        #[arg(short, long, default_value = "Hello!")]
        message: String,

        /// Number of times the message is written
        #[arg(short = 'n', long, default_value = "1")]
        repeat: usize,

        /// Read buffer size of the collector thread, in bytes
        #[arg(short = 'c', long, default_value = "8192")]
        chunk_size: usize,
    },

    /// Capture TEXT written to a stream and print the captured value
    Show {
        /// Stream the text is written to
        #[arg(short, long, value_enum, default_value = "stdout")]
        stream: Stream,

        /// Text to write
        text: String,
    },
}
