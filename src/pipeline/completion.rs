//! Completion bookkeeping for one scanner worker.
//!
//! Processors hand finished items back over the worker's completion channel. The worker drains it
//! here: log the outcome, count it, and delete the source when the policy allows.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Cancelled;
use crate::source::{CompletionDrain, delete_source_item};
use crate::types::{WorkItem, WriteStatus};

use super::context::PipelineContext;
use super::control::Controller;
use super::stats::Statistics;

/// Source deletion policy for a completed item.
pub fn should_delete(
    object: WriteStatus,
    metadata: WriteStatus,
    delete_on_success: bool,
    delete_on_not_attempted: bool,
) -> bool {
    let metadata_ok = matches!(metadata, WriteStatus::Success | WriteStatus::NotAttempted);
    if delete_on_success && object == WriteStatus::Success && metadata_ok {
        return true;
    }
    delete_on_not_attempted && object == WriteStatus::NotAttempted && metadata_ok
}

pub struct CompletionTracker {
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
    controller: Arc<Controller>,
    outstanding: u64,
    stats: Statistics,
    stats_countdown: u64,
    stats_threshold: u64,
    completion_poll: Duration,
    check_complete_threshold: u64,
    delete_on_success: bool,
    delete_on_not_attempted: bool,
    force_delete: bool,
}

impl CompletionTracker {
    pub fn new(ctx: &PipelineContext) -> Self {
        let run = &ctx.config.run;
        let scanner = &ctx.config.scanner;
        let (tx, rx) = bounded(scanner.task_queue_size.max(1));
        CompletionTracker {
            tx,
            rx,
            controller: Arc::clone(&ctx.controller),
            outstanding: 0,
            stats: Statistics::default(),
            stats_countdown: run.stats_threshold,
            stats_threshold: run.stats_threshold,
            completion_poll: scanner.completion_poll(),
            check_complete_threshold: scanner.check_complete_threshold,
            delete_on_success: run.delete_on_success,
            delete_on_not_attempted: run.delete_on_not_attempted,
            force_delete: scanner.force_delete,
        }
    }

    /// Sender to attach to each submitted item.
    pub fn sender(&self) -> Sender<WorkItem> {
        self.tx.clone()
    }

    pub fn submitted(&mut self) {
        self.outstanding += 1;
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn start_assignment(&mut self) {
        self.stats.reset();
        self.stats_countdown = self.stats_threshold;
    }

    /// Handle up to `max` completions that are already waiting; never blocks.
    pub fn process_complete_items(&mut self, max: u64) -> u64 {
        let mut handled = 0;
        while handled < max {
            match self.rx.try_recv() {
                Ok(item) => {
                    self.process_base_work_item(item);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Drain while paused so processors are never stuck on a full completion channel.
    pub fn pause_drain(&mut self) {
        let handled = self.process_complete_items(self.check_complete_threshold);
        if handled > 0 {
            log::debug!("Drained {} completions while paused", handled);
        }
    }

    fn process_base_work_item(&mut self, item: WorkItem) {
        self.outstanding = self.outstanding.saturating_sub(1);
        let (object, metadata) = item.status.pair();
        match item.status.error() {
            Some(e) => log::info!(
                "Object: {} Metadata: {} {} ({:#})",
                object,
                metadata,
                item.name(),
                e
            ),
            None => log::info!("Object: {} Metadata: {} {}", object, metadata, item.name()),
        }
        self.stats.update(object, metadata);

        if should_delete(
            object,
            metadata,
            self.delete_on_success,
            self.delete_on_not_attempted,
        ) {
            match delete_source_item(&item, self.force_delete) {
                Ok(()) => log::debug!("Deleted source {}", item.name()),
                Err(e) => log::warn!("Failed to delete source {}: {}", item.name(), e),
            }
        }

        if self.stats_threshold > 0 {
            self.stats_countdown = self.stats_countdown.saturating_sub(1);
            if self.stats_countdown == 0 {
                self.stats.log_stats("PERIODIC STATISTICS");
                self.stats_countdown = self.stats_threshold;
            }
        }
    }
}

impl CompletionDrain for CompletionTracker {
    fn finalize_complete_items(&mut self) -> Result<u64, Cancelled> {
        let controller = Arc::clone(&self.controller);
        let mut handled = 0;
        while self.outstanding > 0 {
            controller.check_continue(|| self.pause_drain())?;
            match self.rx.recv_timeout(self.completion_poll) {
                Ok(item) => {
                    self.process_base_work_item(item);
                    handled += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!("Waiting on {} outstanding items", self.outstanding);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WriteStatus::*;

    #[test]
    fn delete_policy() {
        assert!(should_delete(Success, Success, true, false));
        assert!(should_delete(Success, NotAttempted, true, false));
        assert!(!should_delete(Success, Failure, true, false));
        assert!(!should_delete(Success, PartialSuccess, true, false));
        assert!(!should_delete(Success, Success, false, false));
        assert!(should_delete(NotAttempted, NotAttempted, false, true));
        assert!(!should_delete(NotAttempted, NotAttempted, true, false));
        assert!(!should_delete(Failure, Success, true, true));
    }
}
