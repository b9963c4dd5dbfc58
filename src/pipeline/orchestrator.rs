//! Top-level run: validate, start both pools, loop over the sources, shut down in order.

use anyhow::Result;
use crossbeam_channel::{RecvTimeoutError, unbounded};
use std::time::Duration;

use crate::error::Cancelled;
use crate::types::WorkItem;
use crate::utils::config::PollConsts;
use crate::utils::settings::{INFINITE_LOOPS, SourceSpec};

use super::context::PipelineContext;
use super::processor_pool::ProcessorPool;
use super::scanner_pool::{Assignment, ScannerPool};
use super::stats::Statistics;

/// Drop sources that are not directories and start triggers that are not inside their source.
pub fn sanitize_sources(sources: &[SourceSpec]) -> Vec<SourceSpec> {
    sources
        .iter()
        .filter_map(|spec| {
            if !spec.path.is_dir() {
                log::warn!(
                    "Source {} does not exist or is not a directory; skipping",
                    spec.path.display()
                );
                return None;
            }
            let start_trigger = match &spec.start_trigger {
                Some(t) if t.starts_with(&spec.path) && t != &spec.path => Some(t.clone()),
                Some(t) => {
                    log::warn!(
                        "Start trigger {} is not inside {}; ignoring it",
                        t.display(),
                        spec.path.display()
                    );
                    None
                }
                None => None,
            };
            Some(SourceSpec {
                path: spec.path.clone(),
                start_trigger,
            })
        })
        .collect()
}

fn loops_remaining(loop_count: i64, done: i64) -> bool {
    loop_count == INFINITE_LOOPS || done < loop_count
}

/// Run the configured passes and return the accumulated statistics.
pub fn run_pipeline(ctx: &PipelineContext) -> Result<Statistics> {
    let config = &ctx.config;
    config.validate()?;

    let sources = sanitize_sources(&config.run.sources);
    if sources.is_empty() {
        log::warn!("No usable sources configured; nothing to do");
        return Ok(Statistics::default());
    }

    let processors = ProcessorPool::start(ctx)?;
    let scanners = ScannerPool::start(ctx, processors.queue(), sources.len());

    let outcome = run_loops(ctx, &scanners, &sources);

    log::info!("Shutting down scanner threads");
    scanners.stop();
    log::info!("Shutting down processor threads");
    processors.stop();

    let totals = ctx.totals();
    totals.log_stats("FINAL STATISTICS");
    match outcome {
        Ok(loops) => log::info!("Completed {} loop(s)", loops),
        Err(Cancelled) => log::info!("Run stopped before completion"),
    }
    Ok(totals)
}

fn run_loops(
    ctx: &PipelineContext,
    scanners: &ScannerPool,
    sources: &[SourceSpec],
) -> Result<i64, Cancelled> {
    let run = &ctx.config.run;
    let poll = Duration::from_millis(run.completion_poll_ms.max(1));
    let mut done = 0_i64;

    while loops_remaining(run.loop_count, done) {
        ctx.controller.check()?;
        log::info!("Starting loop {}", done + 1);
        let before = ctx.totals();

        let (tx, rx) = unbounded::<WorkItem>();
        for spec in sources {
            let mut container = WorkItem::file(&spec.path, &spec.path);
            container.set_completion(tx.clone());
            scanners.submit(Assignment {
                container,
                start_trigger: spec.start_trigger.clone(),
            })?;
        }
        drop(tx);

        let mut outstanding = sources.len();
        while outstanding > 0 {
            ctx.controller.check()?;
            match rx.recv_timeout(poll) {
                Ok(container) => {
                    outstanding -= 1;
                    match container.status.error() {
                        Some(e) => log::warn!("Container {} finished with error: {:#}", container.name(), e),
                        None => log::debug!("Container {} finished", container.name()),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("Scanner threads exited with {} containers unfinished", outstanding);
                    return Err(Cancelled);
                }
            }
        }

        done += 1;
        let mut this_loop = ctx.totals();
        this_loop.subtract(&before);
        this_loop.log_stats(&format!("LOOP {} STATISTICS", done));

        if loops_remaining(run.loop_count, done) && run.loop_sleep_secs > 0 {
            log::info!("Sleeping {}s before next loop", run.loop_sleep_secs);
            sleep_between_loops(ctx, Duration::from_secs(run.loop_sleep_secs))?;
        }
    }
    Ok(done)
}

/// Sleep in slices, honoring stop and pause between slices.
fn sleep_between_loops(ctx: &PipelineContext, total: Duration) -> Result<(), Cancelled> {
    let mut left = total;
    while !left.is_zero() {
        ctx.controller.check()?;
        let step = left.min(PollConsts::SLEEP_SLICE);
        ctx.token().sleep(step, PollConsts::QUEUE_POLL)?;
        left -= step;
    }
    ctx.controller.check()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn loop_count_semantics() {
        assert!(loops_remaining(3, 2));
        assert!(!loops_remaining(3, 3));
        assert!(!loops_remaining(0, 0));
        assert!(loops_remaining(INFINITE_LOOPS, 1_000_000));
    }

    #[test]
    fn sanitize_drops_missing_and_foreign_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("2023");
        let specs = vec![
            SourceSpec {
                path: dir.path().to_path_buf(),
                start_trigger: Some(inside.clone()),
            },
            SourceSpec {
                path: dir.path().to_path_buf(),
                start_trigger: Some(PathBuf::from("/elsewhere")),
            },
            SourceSpec::new("/nonexistent/comet/src"),
        ];
        let clean = sanitize_sources(&specs);
        assert_eq!(clean.len(), 2);
        assert_eq!(clean[0].start_trigger, Some(inside));
        assert_eq!(clean[1].start_trigger, None);
    }
}
