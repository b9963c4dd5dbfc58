use clap::Parser;
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

/// Bulk ingestion of files and generated metadata into an HTTP object store.
#[derive(Clone, Parser)]
#[command(name = "comet")]
#[command(about = "Scan source directories and ingest their files into the configured object store.")]
pub struct Cli {
    /// Path to the config file. Default: `comet.toml` in the current directory.
    #[arg(long, short = 'C')]
    pub config: Option<PathBuf>,

    /// Source directory (repeatable). Replaces the sources listed in the config file.
    #[arg(long, short = 's')]
    pub source: Vec<PathBuf>,

    /// Resume point applied to every `--source`.
    #[arg(long)]
    pub start_trigger: Option<PathBuf>,

    /// Passes over the sources; -1 runs until stopped.
    #[arg(long, short = 'n', allow_negative_numbers = true, value_parser = clap::value_parser!(i64))]
    pub loop_count: Option<i64>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Use the echo processor: nothing is written, existing files count as successes.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub echo: Option<bool>,

    /// Delete source files once object and metadata writes both succeed.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub delete_on_success: Option<bool>,
}

impl Cli {
    /// Config path, defaulting to the package config filename in the working directory.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().config_filename()))
    }
}
