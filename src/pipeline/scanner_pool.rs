//! Scanner stage: one thread per container (up to `max_threads`), each walking its assignment and
//! feeding the processor queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Cancelled, CometError};
use crate::source::{CompletionDrain, ItemSource};
use crate::types::WorkItem;
use crate::utils::config::PollConsts;

use super::completion::CompletionTracker;
use super::context::PipelineContext;
use super::control::{CancelToken, join_bounded};
use super::queue::{Offer, WorkQueue};

/// A container to scan and where to resume. The container item goes back to the orchestrator
/// through its completion channel once scanned; failures are recorded on its status.
#[derive(Debug)]
pub struct Assignment {
    pub container: WorkItem,
    pub start_trigger: Option<PathBuf>,
}

pub struct ScannerPool {
    intake: WorkQueue<Assignment>,
    token: CancelToken,
    handles: Vec<JoinHandle<()>>,
    max_join_wait: Duration,
}

/// `min(max(containers, 1), max(max_threads, 1))`
pub fn scanner_thread_count(containers: usize, max_threads: usize) -> usize {
    containers.max(1).min(max_threads.max(1))
}

impl ScannerPool {
    pub fn start(ctx: &PipelineContext, processors: &WorkQueue<WorkItem>, containers: usize) -> Self {
        let token = ctx.token().child();
        let intake = WorkQueue::unbounded(token.clone());
        let threads = scanner_thread_count(containers, ctx.config.scanner.max_threads);
        let handles = (0..threads)
            .filter_map(|i| {
                let ctx = ctx.clone();
                let intake = intake.clone();
                let processors = processors.clone();
                let token = token.clone();
                thread::Builder::new()
                    .name(format!("scanner-{}", i))
                    .spawn(move || scanner_worker(ctx, intake, processors, token))
                    .inspect_err(|e| log::error!("Failed to spawn scanner thread {}: {}", i, e))
                    .ok()
            })
            .collect::<Vec<_>>();
        log::debug!("Started {} scanner threads", handles.len());
        ScannerPool {
            intake,
            token,
            handles,
            max_join_wait: Duration::from_secs(ctx.config.scanner.max_join_wait_secs),
        }
    }

    pub fn submit(&self, assignment: Assignment) -> Result<(), Cancelled> {
        self.intake.put(assignment)
    }

    pub fn stop(self) {
        self.token.cancel();
        join_bounded(self.handles, self.max_join_wait, "Scanner");
    }
}

fn scanner_worker(
    ctx: PipelineContext,
    intake: WorkQueue<Assignment>,
    processors: WorkQueue<WorkItem>,
    token: CancelToken,
) {
    let mut source = match ItemSource::build(&ctx.config.scanner) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Scanner initialization failed: {}", e);
            return;
        }
    };
    let mut tracker = CompletionTracker::new(&ctx);
    let controller = Arc::clone(&ctx.controller);

    loop {
        if controller.check_continue(|| tracker.pause_drain()).is_err() {
            break;
        }
        let Ok(mut assignment) = intake.take() else {
            break;
        };
        let result = run_assignment(
            &ctx,
            &mut source,
            &mut tracker,
            &assignment,
            &processors,
            &token,
        );

        ctx.totals.lock().unwrap().merge(tracker.statistics());
        tracker.statistics().log_stats(&format!(
            "SCANNER COMPLETION STATISTICS ({})",
            assignment.container.name()
        ));

        let cancelled = match result {
            Ok(()) => false,
            Err(e) if e.is_cancelled() => {
                log::info!("Scan of {} stopped", assignment.container.name());
                assignment.container.status.set_error(e);
                true
            }
            Err(e) => {
                log::error!("Scan of {} failed: {}", assignment.container.name(), e);
                assignment.container.status.set_error(e);
                false
            }
        };
        assignment.container.mark_processed();
        if cancelled {
            break;
        }
    }
    log::debug!("Scanner thread exiting");
}

fn run_assignment(
    ctx: &PipelineContext,
    source: &mut ItemSource,
    tracker: &mut CompletionTracker,
    assignment: &Assignment,
    processors: &WorkQueue<WorkItem>,
    token: &CancelToken,
) -> Result<(), CometError> {
    let scanner = &ctx.config.scanner;
    let controller = Arc::clone(&ctx.controller);
    let base = assignment
        .container
        .file_path()
        .ok_or_else(|| CometError::Config("scanner containers must be directories".to_string()))?;

    tracker.start_assignment();
    source.initialize(base, assignment.start_trigger.as_deref())?;
    log::info!("Scanning {}", base.display());

    loop {
        token.check()?;
        controller.check_continue(|| tracker.pause_drain())?;
        let Some(mut item) = source.next_item(tracker)? else {
            break;
        };
        item.set_completion(tracker.sender());

        let mut pending = item;
        loop {
            match processors.offer(pending, scanner.submit_wait())? {
                Offer::Accepted => break,
                Offer::TimedOut(back) => {
                    log::debug!("Processor queue full; draining completions before retry");
                    tracker.process_complete_items(scanner.completion_processing_threshold);
                    token.check()?;
                    controller.check_continue(|| tracker.pause_drain())?;
                    pending = back;
                }
            }
        }
        tracker.submitted();

        if tracker.outstanding() > scanner.check_complete_threshold {
            tracker.process_complete_items(scanner.completion_processing_threshold);
        }
        if scanner.load_sleep_ms > 0 {
            token.sleep(
                Duration::from_millis(scanner.load_sleep_ms),
                PollConsts::QUEUE_POLL,
            )?;
        }
    }

    tracker.finalize_complete_items()?;
    Ok(())
}
