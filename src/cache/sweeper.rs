//! Background expiry sweep.
//!
//! Lazy expiry on read only reclaims entries that are read again; the sweeper
//! periodically drops the rest. One task per unified cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Segment;

/// Something the sweeper can purge expired entries from.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &str;

    /// Remove entries expired at `now`, returning how many went.
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

impl<T: Clone + Send + Sync> Sweep for Segment<T> {
    fn name(&self) -> &str {
        Segment::name(self)
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.cleanup_expired(now)
    }
}

/// Handle to the periodic sweep task.
pub struct Sweeper {
    stop: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    /// Spawn the sweep task on the current Tokio runtime.
    ///
    /// Without a runtime no task is started and the cache relies on lazy
    /// expiry alone.
    pub fn start(targets: Vec<Arc<dyn Sweep>>, interval: Duration) -> Self {
        let (stop, stop_rx) = watch::channel(false);

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(run(targets, interval, stop_rx))),
            Err(_) => {
                warn!("No Tokio runtime, cache sweeper not started");
                None
            }
        };

        Self {
            stop,
            handle: Mutex::new(handle),
        }
    }

    /// Ask the task to exit. Idempotent and safe to call concurrently.
    pub fn stop(&self) {
        let was_stopped = self.stop.send_replace(true);
        if !was_stopped {
            info!("Cache sweeper stop requested");
        }
    }

    /// Whether the task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("stopped", &*self.stop.borrow())
            .finish()
    }
}

/// Sweep every target once.
pub fn sweep_all(targets: &[Arc<dyn Sweep>], now: DateTime<Utc>) -> usize {
    targets
        .iter()
        .map(|target| {
            let removed = target.sweep(now);
            if removed > 0 {
                debug!("Swept {} expired entries from {}", removed, target.name());
            }
            removed
        })
        .sum()
}

async fn run(targets: Vec<Arc<dyn Sweep>>, interval: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    debug!("Cache sweeper running every {:?}", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_all(&targets, Utc::now());
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Cache sweeper exited");
}
