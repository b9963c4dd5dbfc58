//! Comet: multi-threaded bulk ingestion of files and generated metadata into an HTTP object store.

pub mod engine;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod processor;
pub mod source;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use error::{Cancelled, CometError};
pub use pipeline::{CancelToken, ControlSignal, ManualSignal, SentinelFiles, Statistics};
pub use processor::{HttpStore, RemoteStore};
pub use types::*;
pub use utils::CometConfig;

use log::debug;
use std::sync::Arc;

/// Result alias used by public comet API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: run every configured loop over the sources and return the totals.
///
/// `signal` is polled for stop/pause; `token` may be cancelled from outside (e.g. Ctrl+C) to stop
/// the run at the next safe point. Config errors abort before any thread starts.
pub fn run(
    config: CometConfig,
    signal: Arc<dyn ControlSignal>,
    store: Arc<dyn RemoteStore>,
    token: CancelToken,
) -> Result<Statistics> {
    let config_str = format!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        config
    );
    debug!("{}", config_str);

    let ctx = pipeline::create_pipeline_context(config, signal, store, token);
    pipeline::run_pipeline(&ctx)
}
