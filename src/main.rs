use anyhow::{Result, anyhow};
use clap::Parser;
use stdcapture::Capturer;
use stdcapture::cli::{Cli, Commands};
use stdcapture::config::CaptureConfig;
use stdcapture::probe;
use std::io;
use std::process::ExitCode;
use tracing::{error, info};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_logging();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr, which stays untouched while a capture is active since the
/// library only logs outside the redirection window. `RUST_LOG` overrides the
/// default `warn` level.
fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Probe {
            stream,
            message,
            repeat,
            chunk_size,
        } => {
            let config = CaptureConfig {
                read_chunk_size: chunk_size,
                ..CaptureConfig::default()
            };
            let capturer = Capturer::new(config);

            let mut mismatched = Vec::new();
            for &target in stream.streams() {
                let report = probe::probe(&capturer, target, &message, repeat)?;
                println!("{report}");
                if !report.is_match() {
                    mismatched.push(target.to_string());
                }
            }

            if !mismatched.is_empty() {
                return Err(anyhow!(
                    "Captured output did not match for {}",
                    mismatched.join(", ")
                ));
            }
            info!("Capture round-trip succeeded");
        }
        Commands::Show { stream, text } => {
            let mut written = Ok(());
            let captured = stdcapture::capture(stream, || {
                written = stream.write_all(text.as_bytes());
            })?;
            written?;

            println!("{captured:?}");
        }
    }

    Ok(())
}
