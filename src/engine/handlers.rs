//! Command handler: resolve config, wire stop handling, run the pipeline.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::engine::arg_parser::Cli;
use crate::pipeline::{CancelToken, SentinelFiles};
use crate::processor::HttpStore;
use crate::utils::{
    CometConfig, ProcessorKind, SourceSpec, load_config, set_verbose, setup_logging,
};

/// Overwrite a config field only when the flag was given.
macro_rules! apply_cli_opt {
    ($cli:expr, $cfg:expr, $cli_field:ident => $($cfg_path:ident).+) => {
        if let Some(v) = $cli.$cli_field {
            $cfg.$($cfg_path).+ = v;
        }
    };
}

/// Layer command-line flags over the loaded config.
pub fn apply_cli_overrides(cli: &Cli, config: &mut CometConfig) {
    if !cli.source.is_empty() {
        config.run.sources = cli
            .source
            .iter()
            .map(|path| SourceSpec {
                path: path.clone(),
                start_trigger: cli.start_trigger.clone(),
            })
            .collect();
    } else if cli.start_trigger.is_some() {
        log::warn!("--start-trigger has no effect without --source");
    }
    apply_cli_opt!(cli, config, loop_count => run.loop_count);
    apply_cli_opt!(cli, config, verbose => run.verbose);
    apply_cli_opt!(cli, config, delete_on_success => run.delete_on_success);
    if let Some(echo) = cli.echo {
        config.processor.kind = if echo {
            ProcessorKind::Echo
        } else {
            ProcessorKind::Remote
        };
    }
}

/// Handle the (single) run command.
pub fn handle_run(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose.unwrap_or(false));
    let mut config = load_config(&cli.config_path(), cli.config.is_some())?;
    apply_cli_overrides(cli, &mut config);
    set_verbose(config.run.verbose);

    let token = CancelToken::new();
    let ctrlc_token = token.clone();
    ctrlc::set_handler(move || {
        log::info!("Interrupt received; stopping");
        ctrlc_token.cancel();
    })
    .context("set Ctrl+C handler")?;

    let signal = Arc::new(SentinelFiles {
        stop_file: config.run.stop_file.clone(),
        pause_file: config.run.pause_file.clone(),
    });
    let store = Arc::new(HttpStore::new(&config.processor.http).context("build HTTP client")?);

    let totals = crate::run(config, signal, store, token)?;
    if totals.object.failure > 0 || totals.metadata.failure > 0 {
        log::warn!(
            "{} object and {} metadata writes failed",
            totals.object.failure,
            totals.metadata.failure
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::try_parse_from([
            "comet",
            "-s",
            "/in",
            "--start-trigger",
            "/in/2023",
            "-n",
            "2",
            "--echo",
            "--delete-on-success",
        ])
        .unwrap();
        let mut config = CometConfig::default();
        config.run.sources = vec![SourceSpec::new("/old")];
        apply_cli_overrides(&cli, &mut config);
        assert_eq!(
            config.run.sources,
            vec![SourceSpec {
                path: PathBuf::from("/in"),
                start_trigger: Some(PathBuf::from("/in/2023")),
            }]
        );
        assert_eq!(config.run.loop_count, 2);
        assert!(config.run.delete_on_success);
        assert_eq!(config.processor.kind, ProcessorKind::Echo);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let cli = Cli::try_parse_from(["comet"]).unwrap();
        let mut config = CometConfig::default();
        config.run.loop_count = 4;
        config.run.sources = vec![SourceSpec::new("/old")];
        apply_cli_overrides(&cli, &mut config);
        assert_eq!(config.run.loop_count, 4);
        assert_eq!(config.run.sources.len(), 1);
        assert_eq!(config.processor.kind, ProcessorKind::Remote);
    }
}
