//! `campusctl` - CLI for campusease
//!
//! This binary reads and edits the shared dashboard state from the command
//! line, alongside any other context using the same database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io;

use clap::Parser;

use campusease::cli::{dispatch, Cli};
use campusease::{init_logging, Config};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    let mut stdout = io::stdout().lock();
    dispatch(&config, cli.command, &mut stdout)
}
