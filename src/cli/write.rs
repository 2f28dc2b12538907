use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

use fanwrite::engine::WriteEngine;
use fanwrite::mode::WriteMode;

use super::config::Config;

/// Flags of the `write` subcommand
pub struct WriteArgs {
    pub files: Vec<PathBuf>,
    pub message: Option<String>,
    pub mode: Option<WriteMode>,
    pub workers: Option<usize>,
    pub retries: Option<u64>,
    pub backoff: Option<u64>,
    pub max_pool: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

/// Write the message to every target and report the results
pub fn run(args: WriteArgs) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let mut writer = file_config.writer;
    if !args.files.is_empty() {
        writer.files = Some(args.files);
    }
    if let Some(message) = args.message {
        writer.message = Some(message);
    }
    if let Some(mode) = args.mode {
        writer.mode = Some(mode);
    }
    writer.mode.get_or_insert(WriteMode::Append);
    if let Some(retries) = args.retries {
        writer.retries = retries;
    }
    if let Some(backoff) = args.backoff {
        writer.backoff = backoff;
    }
    if let Some(max_pool) = args.max_pool {
        writer.max_pool = max_pool;
    }
    let workers = args.workers.or(file_config.run.workers).unwrap_or(0);
    let timeout = args
        .timeout_ms
        .or(file_config.run.timeout_ms)
        .map(Duration::from_millis);

    if writer.files.as_ref().map_or(true, Vec::is_empty) {
        anyhow::bail!("No target files given (pass FILES or set writer.files in the config)");
    }

    info!("fanwrite");
    info!("========");
    info!("Targets: {}", writer.files.as_ref().map_or(0, Vec::len));
    info!("Mode: {}", writer.mode.unwrap_or_default());
    info!("Retries: {}, backoff: {} ms", writer.retries, writer.backoff);
    info!("Max pool: {}", writer.max_pool);

    let engine = WriteEngine::from_config(writer).context("Invalid writer configuration")?;
    let results = match timeout {
        Some(timeout) => engine.write_with_timeout(workers, timeout),
        None => engine.write(workers),
    }
    .context("Write failed")?;

    if let Err(e) = engine.close_all_conns() {
        warn!("Failed to close some files: {}", e);
    }

    if args.json {
        println!("{}", results.to_json().context("Failed to serialize results")?);
    } else {
        #[cfg(feature = "colorized_output")]
        {
            println!("{}", results.format_colored());
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            println!("{}", results);
        }
    }

    // Exit with error code if any target failed
    if !results.is_complete_success() {
        std::process::exit(1);
    }

    Ok(())
}
