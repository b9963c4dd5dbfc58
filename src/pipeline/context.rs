//! Shared state handed to every pipeline thread.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::processor::store::RemoteStore;
use crate::utils::settings::CometConfig;

use super::control::{CancelToken, ControlSignal, Controller};
use super::stats::Statistics;

/// Resolved config, stop/pause control, global totals and the shared store client.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<CometConfig>,
    pub controller: Arc<Controller>,
    pub totals: Arc<Mutex<Statistics>>,
    pub store: Arc<dyn RemoteStore>,
}

impl PipelineContext {
    pub fn token(&self) -> &CancelToken {
        self.controller.token()
    }

    pub fn totals(&self) -> Statistics {
        *self.totals.lock().unwrap()
    }
}

pub fn create_pipeline_context(
    config: CometConfig,
    signal: Arc<dyn ControlSignal>,
    store: Arc<dyn RemoteStore>,
    token: CancelToken,
) -> PipelineContext {
    let pause_slice = Duration::from_secs(config.run.pause_sleep_secs);
    PipelineContext {
        config: Arc::new(config),
        controller: Arc::new(Controller::new(signal, token, pause_slice)),
        totals: Arc::new(Mutex::new(Statistics::default())),
        store,
    }
}
