//! Cooperative stop/pause control.
//!
//! Every worker loop and blocking wait calls [`Controller::check_continue`] at its safe points.
//! Stop comes from an external signal (sentinel file, Ctrl+C) and is latched into the global
//! [`CancelToken`], so queue waits anywhere in the pipeline observe it without polling the filesystem.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Cancelled;
use crate::utils::config::PollConsts;

/// Shared cancellation flag. A child token also reports cancelled when any ancestor is.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep `total`, waking every `slice` to honor cancellation.
    pub fn sleep(&self, total: Duration, slice: Duration) -> Result<(), Cancelled> {
        let mut left = total;
        while !left.is_zero() {
            self.check()?;
            let step = left.min(slice);
            thread::sleep(step);
            left -= step;
        }
        self.check()
    }
}

/// External stop/pause conditions.
pub trait ControlSignal: Send + Sync {
    fn stop_requested(&self) -> bool;
    fn pause_requested(&self) -> bool;
}

/// Presence of a file means the condition is on.
#[derive(Clone, Debug)]
pub struct SentinelFiles {
    pub stop_file: PathBuf,
    pub pause_file: PathBuf,
}

impl ControlSignal for SentinelFiles {
    fn stop_requested(&self) -> bool {
        self.stop_file.exists()
    }

    fn pause_requested(&self) -> bool {
        self.pause_file.exists()
    }
}

/// Signal driven directly by code (library callers, tests).
#[derive(Debug, Default)]
pub struct ManualSignal {
    stop: AtomicBool,
    pause: AtomicBool,
}

impl ManualSignal {
    pub fn set_stop(&self, on: bool) {
        self.stop.store(on, Ordering::Relaxed);
    }

    pub fn set_pause(&self, on: bool) {
        self.pause.store(on, Ordering::Relaxed);
    }
}

impl ControlSignal for ManualSignal {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::Relaxed)
    }
}

pub struct Controller {
    signal: Arc<dyn ControlSignal>,
    token: CancelToken,
    pause_slice: Duration,
}

impl Controller {
    pub fn new(signal: Arc<dyn ControlSignal>, token: CancelToken, pause_slice: Duration) -> Self {
        Controller {
            signal,
            token,
            pause_slice,
        }
    }

    /// Global token; pools derive their own children from it.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Non-blocking. Latches an external stop into the token.
    pub fn stop_requested(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        if self.signal.stop_requested() {
            log::info!("Stop requested");
            self.token.cancel();
            return true;
        }
        false
    }

    /// Return `Err(Cancelled)` on stop; while paused, call `on_pause` and sleep in slices.
    pub fn check_continue<F: FnMut()>(&self, mut on_pause: F) -> Result<(), Cancelled> {
        if self.stop_requested() {
            return Err(Cancelled);
        }
        if self.signal.pause_requested() {
            log::info!("Pause requested; waiting for it to clear");
            while self.signal.pause_requested() {
                on_pause();
                if self.stop_requested() {
                    return Err(Cancelled);
                }
                thread::sleep(self.pause_slice);
                if self.stop_requested() {
                    return Err(Cancelled);
                }
            }
            log::info!("Pause cleared; resuming");
        }
        Ok(())
    }

    /// [`Self::check_continue`] with nothing to drain while paused.
    pub fn check(&self) -> Result<(), Cancelled> {
        self.check_continue(|| {})
    }
}

/// Join each thread, waiting at most `max_wait` per thread. Returns how many were left running.
pub fn join_bounded(handles: Vec<JoinHandle<()>>, max_wait: Duration, pool: &str) -> usize {
    let mut detached = 0;
    for handle in handles {
        let deadline = Instant::now() + max_wait;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(PollConsts::JOIN_POLL);
        }
        let name = handle.thread().name().unwrap_or("unnamed").to_string();
        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("{} thread {} panicked", pool, name);
            }
        } else {
            log::warn!(
                "{} thread {} did not stop within {:?}; leaving it detached",
                pool,
                name,
                max_wait
            );
            detached += 1;
        }
    }
    detached
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(signal: Arc<ManualSignal>) -> Controller {
        Controller::new(signal, CancelToken::new(), Duration::from_millis(10))
    }

    #[test]
    fn child_sees_parent_cancel() {
        let root = CancelToken::new();
        let child = root.child();
        assert!(!child.is_cancelled());
        root.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn cancelling_child_leaves_parent() {
        let root = CancelToken::new();
        let child = root.child();
        child.cancel();
        assert!(!root.is_cancelled());
    }

    #[test]
    fn stop_latches_into_token() {
        let signal = Arc::new(ManualSignal::default());
        let ctl = controller(Arc::clone(&signal));
        assert!(ctl.check().is_ok());
        signal.set_stop(true);
        assert_eq!(ctl.check(), Err(Cancelled));
        signal.set_stop(false);
        assert!(ctl.token().is_cancelled());
        assert_eq!(ctl.check(), Err(Cancelled));
    }

    #[test]
    fn pause_runs_callback_until_cleared() {
        let signal = Arc::new(ManualSignal::default());
        let ctl = controller(Arc::clone(&signal));
        signal.set_pause(true);
        let mut calls = 0;
        let clear = Arc::clone(&signal);
        let res = ctl.check_continue(|| {
            calls += 1;
            if calls == 3 {
                clear.set_pause(false);
            }
        });
        assert!(res.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn stop_during_pause_cancels() {
        let signal = Arc::new(ManualSignal::default());
        let ctl = controller(Arc::clone(&signal));
        signal.set_pause(true);
        let stopper = Arc::clone(&signal);
        let res = ctl.check_continue(|| stopper.set_stop(true));
        assert_eq!(res, Err(Cancelled));
    }

    #[test]
    fn join_bounded_detaches_stuck_thread() {
        let token = CancelToken::new();
        let t = token.clone();
        let quick = thread::spawn(|| {});
        let stuck = thread::spawn(move || {
            while !t.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
        });
        assert_eq!(
            join_bounded(vec![quick, stuck], Duration::from_millis(100), "test"),
            1
        );
        token.cancel();
    }

    #[test]
    fn token_sleep_returns_early_on_cancel() {
        let token = CancelToken::new();
        let t = token.clone();
        let start = Instant::now();
        let h = thread::spawn(move || t.sleep(Duration::from_secs(10), Duration::from_millis(10)));
        thread::sleep(Duration::from_millis(50));
        token.cancel();
        assert_eq!(h.join().unwrap(), Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
