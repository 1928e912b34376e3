//! respwire: RESP stream inspection tool
//!
//! Reads a stream of RESP values from a file or stdin and either:
//! - prints each value in a redis-cli style view (`--format inspect`)
//! - writes the canonical encoding of each value (`--format wire`)
//!
//! Decoding stops at the first malformed or truncated value.

use respwire::config::{Config, OutputFormat};
use respwire::resp::{encoder, Decoder};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode, Box<dyn Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout carries the decoded output
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!(
        input = ?config.input,
        format = ?config.format,
        max_bulk_len = ?config.limits.max_bulk_len,
        max_array_len = ?config.limits.max_array_len,
        max_depth = ?config.limits.max_depth,
        "Starting respwire"
    );

    let input: Box<dyn BufRead> = match &config.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());

    let mut decoder = Decoder::with_limits(input, config.limits);
    let mut count = 0u64;

    loop {
        match decoder.decode_next() {
            Ok(Some(value)) => {
                count += 1;
                match config.format {
                    OutputFormat::Inspect => writeln!(output, "{value}")?,
                    OutputFormat::Wire => encoder::write_value(&mut output, &value)?,
                }
            }
            Ok(None) => break,
            Err(err) => {
                output.flush()?;
                error!(
                    kind = ?err.kind(),
                    stage = %err.stage(),
                    path = ?err.path(),
                    decoded = count,
                    "decode failed: {}",
                    report(&err)
                );
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    output.flush()?;
    info!(decoded = count, "Finished");
    Ok(ExitCode::SUCCESS)
}

/// Render an error with its whole source chain.
fn report(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
