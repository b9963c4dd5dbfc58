//! Processor stage: a fixed set of threads taking items off one bounded queue.

use crossbeam_channel::{Sender, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::CometError;
use crate::processor::ItemProcessor;
use crate::types::WorkItem;
use crate::utils::config::PollConsts;

use super::context::PipelineContext;
use super::control::{CancelToken, join_bounded};
use super::queue::WorkQueue;

pub struct ProcessorPool {
    queue: WorkQueue<WorkItem>,
    token: CancelToken,
    handles: Vec<JoinHandle<()>>,
    max_join_wait: Duration,
}

impl ProcessorPool {
    /// Spawn the workers and wait for each to finish initializing. Fails when none came up.
    pub fn start(ctx: &PipelineContext) -> Result<Self, CometError> {
        let settings = &ctx.config.processor;
        let token = ctx.token().child();
        let queue = WorkQueue::bounded(settings.task_queue_size, token.clone());
        let (ready_tx, ready_rx) = bounded(settings.threads.max(1));
        let handles = (0..settings.threads)
            .filter_map(|i| {
                let ctx = ctx.clone();
                let queue = queue.clone();
                let ready = ready_tx.clone();
                thread::Builder::new()
                    .name(format!("processor-{}", i))
                    .spawn(move || processor_worker(ctx, queue, ready))
                    .inspect_err(|e| log::error!("Failed to spawn processor thread {}: {}", i, e))
                    .ok()
            })
            .collect::<Vec<_>>();
        drop(ready_tx);

        let mut ready = 0;
        let mut first_error = None;
        for result in ready_rx.iter() {
            match result {
                Ok(()) => ready += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        let pool = ProcessorPool {
            queue,
            token,
            handles,
            max_join_wait: Duration::from_secs(settings.max_join_wait_secs),
        };
        if ready == 0 {
            pool.stop();
            return Err(first_error.unwrap_or_else(|| {
                CometError::Config("no processor threads could be started".to_string())
            }));
        }
        log::debug!("Started {} processor threads", ready);
        Ok(pool)
    }

    /// Queue the scanner pool submits into.
    pub fn queue(&self) -> &WorkQueue<WorkItem> {
        &self.queue
    }

    pub fn stop(self) {
        self.token.cancel();
        join_bounded(self.handles, self.max_join_wait, "Processor");
    }
}

fn processor_worker(
    ctx: PipelineContext,
    queue: WorkQueue<WorkItem>,
    ready: Sender<Result<(), CometError>>,
) {
    let processor = match ItemProcessor::build(&ctx.config, Arc::clone(&ctx.store)) {
        Ok(p) => {
            let _ = ready.send(Ok(()));
            p
        }
        Err(e) => {
            log::error!("Processor initialization failed: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };
    drop(ready);
    let load_sleep = Duration::from_millis(ctx.config.processor.load_sleep_ms);

    loop {
        if ctx.controller.check().is_err() {
            break;
        }
        let Ok(mut item) = queue.take() else {
            break;
        };
        if let Err(e) = processor.process(&mut item) {
            log::debug!("Processing {} failed: {}", item.name(), e);
            item.status.fail_unset();
            item.status.set_error(e);
        }
        item.mark_processed();

        if !load_sleep.is_zero() && queue.token().sleep(load_sleep, PollConsts::QUEUE_POLL).is_err() {
            break;
        }
    }
    log::debug!("Processor thread exiting");
}
