//! `cowmerge` binary entry point.
//!
//! Thin wrapper around the cowmerge library that parses the command line,
//! initializes logging, opens the devices and runs one operation. Output
//! goes to stdout; logs go to stderr.

use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use cowmerge::{AccessMode, Cli, Command, ConsoleReporter, FileDevice, Session};

fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG takes precedence over --log-level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    cli.validate()?;

    let store_path = cli.command.store_path();
    let store_mode = match cli.command {
        Command::Scrub { .. } => AccessMode::ReadWrite,
        _ => AccessMode::ReadOnly,
    };
    let store = FileDevice::open(store_path, store_mode)?;
    let mut session = Session::open(store, cli.session_config())
        .with_context(|| format!("Failed to open exception store {}", store_path.display()))?;

    let limit = match cli.command {
        Command::Dump { limit, .. } => limit,
        _ => None,
    };
    let mut reporter =
        ConsoleReporter::new(BufWriter::new(io::stdout().lock())).with_dump_limit(limit);

    match &cli.command {
        Command::Inspect { .. } => {
            session.inspect(&mut reporter)?;
        }
        Command::Dump { .. } => {
            session.dump(&mut reporter)?;
        }
        Command::Merge { backing, .. } => {
            let mut target = FileDevice::open(backing, AccessMode::WriteOnly)?;
            session
                .merge_all(&mut target, &mut reporter)
                .with_context(|| format!("Merge onto {} stopped", backing.display()))?;
        }
        Command::Verify { backing, .. } => {
            let mut target = FileDevice::open(backing, AccessMode::ReadOnly)?;
            session.verify_all(&mut target, &mut reporter)?;
        }
        Command::Scrub { .. } => {
            session.scrub_all(&mut reporter)?;
        }
    }

    reporter.finish().context("Failed to write report")?;
    Ok(())
}
