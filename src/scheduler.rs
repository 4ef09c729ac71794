//! Periodic refresh with an explicit stop handle.

use log::{debug, info};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default refresh period of network facts.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Run `task` every `interval`, starting with an immediate tick.
    ///
    /// Ticks for which `skip` returns true are passed over, and ticks
    /// missed while `task` was still running are dropped rather than
    /// replayed. Must be called from within a tokio runtime.
    pub fn start<F, Fut, S>(interval: Duration, skip: S, mut task: F) -> SchedulerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Fn() -> bool + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        let join = {
            let running = running.clone();
            let ticks = ticks.clone();
            tokio::spawn(async move {
                let mut timer = tokio::time::interval(interval);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = timer.tick() => {
                            if skip() {
                                debug!("Refresh skipped");
                                continue;
                            }
                            ticks.fetch_add(1, Ordering::SeqCst);
                            task().await;
                        }
                    }
                }

                running.store(false, Ordering::SeqCst);
                info!("Refresh scheduler stopped");
            })
        };

        SchedulerHandle { stop: Some(stop_tx), join: Some(join), running, ticks }
    }
}

/// Controls a running [`RefreshScheduler`].
///
/// Dropping the handle stops the refresh without waiting for it.
pub struct SchedulerHandle {
    stop: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Stop refreshing and wait for an in-flight refresh to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of refreshes run so far.
    pub fn refresh_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let handle = RefreshScheduler::start(Duration::from_secs(30), || false, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Immediate tick plus ticks at 30s and 60s.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(handle.is_running());
        assert_eq!(handle.refresh_count(), 3);

        handle.stop().await;
        let after_stop = count.load(Ordering::SeqCst);
        assert_eq!(after_stop, 3);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_while_busy() {
        let busy = Arc::new(AtomicBool::new(true));
        let flag = busy.clone();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let handle = RefreshScheduler::start(
            Duration::from_secs(30),
            move || flag.load(Ordering::SeqCst),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        busy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        handle.stop().await;
    }
}
