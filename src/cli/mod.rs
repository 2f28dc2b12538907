use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fanwrite::mode::WriteMode;

mod config;
mod write;

pub use write::WriteArgs;

/// fanwrite - write one message to many files concurrently
#[derive(Parser)]
#[command(name = "fanwrite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a message to every target file
    Write {
        /// Target files
        #[arg(value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Message written to every file
        #[arg(short, long)]
        message: Option<String>,

        /// Write mode: "a" (append, default) or "w" (truncate)
        #[arg(long)]
        mode: Option<WriteMode>,

        /// Worker threads (0 = number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Attempts per file (0 = single attempt)
        #[arg(short, long)]
        retries: Option<u64>,

        /// Initial backoff between attempts, in milliseconds
        #[arg(short, long)]
        backoff: Option<u64>,

        /// Maximum number of simultaneously open files
        #[arg(long)]
        max_pool: Option<u64>,

        /// Stop starting new attempts after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the accepted write modes
    Modes,
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Write {
            files,
            message,
            mode,
            workers,
            retries,
            backoff,
            max_pool,
            timeout_ms,
            config,
            json,
        } => write::run(WriteArgs {
            files,
            message,
            mode,
            workers,
            retries,
            backoff,
            max_pool,
            timeout_ms,
            config,
            json,
        }),
        Commands::Modes => {
            for mode in WriteMode::available_modes() {
                println!("{}", mode);
            }
            Ok(())
        }
    }
}
