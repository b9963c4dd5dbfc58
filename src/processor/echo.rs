//! Dry-run processor: reports what would be written without touching the store.

use crate::error::CometError;
use crate::types::{WorkItem, WriteStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct EchoProcessor;

impl EchoProcessor {
    pub fn process(&self, item: &mut WorkItem) -> Result<(), CometError> {
        let status = if item.exists()? {
            log::info!("ECHO {}", item.name());
            WriteStatus::Success
        } else {
            log::warn!("ECHO {} (missing)", item.name());
            WriteStatus::NotAttempted
        };
        item.status.object = status;
        item.status.metadata = status;
        Ok(())
    }
}
