//! Periodic background sweeps that can be stopped on shutdown.

use std::{sync::Mutex, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Something that can evict stale entries on demand.
pub trait Sweep: Send + Sync + 'static {
    /// Evict stale entries and return how many were removed.
    fn sweep(&self) -> usize;
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one sweep task. `start` replaces a running task, `stop`
/// cancels it.
#[derive(Default)]
pub struct Sweeper {
    running: Mutex<Option<Running>>,
}

impl Sweeper {
    pub fn start<S>(&self, name: &'static str, target: std::sync::Arc<S>, interval: Duration)
    where
        S: Sweep + ?Sized,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = target.sweep();
                        if evicted > 0 {
                            tracing::info!(sweeper = name, evicted, "sweep evicted stale entries");
                        }
                    }
                }
            }
            tracing::debug!(sweeper = name, "sweeper stopped");
        });

        let previous = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Running { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    /// Cancel the running task, if any, and wait for it to exit.
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(running) = running {
            running.cancel.cancel();
            let _ = running.handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}
