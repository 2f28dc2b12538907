//! # fanwrite
//!
//! Command-line front end for the fan-out writer.
//!
//! ## Usage
//!
//! ```bash
//! # Append a line to three files
//! fanwrite write a.log b.log c.log --message "rotated\n"
//!
//! # Truncate, with settings from a TOML file and JSON output
//! fanwrite write --config fanwrite.toml --mode w --json
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
