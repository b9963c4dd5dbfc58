//! Comet CLI: scan source directories and ingest them into the configured object store.

use anyhow::Result;
use clap::Parser;
use comet::engine::arg_parser::Cli;
use comet::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
