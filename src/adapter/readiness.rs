//! Readiness Poller
//!
//! Wallet extensions inject their API some time after the host starts. The
//! poller checks an [`EnvironmentProbe`] on a fixed interval for a bounded
//! number of attempts and fires a callback once the wallet shows up.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Presence check for a wallet transport
pub trait EnvironmentProbe: Send + Sync {
    fn is_present(&self) -> bool;
}

impl<F> EnvironmentProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_present(&self) -> bool {
        self()
    }
}

/// Poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    /// Delay before each check, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum number of checks
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_count() -> u32 {
    3
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            count: default_count(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Owner of at most one poll task
///
/// The task is aborted on [`ReadinessPoller::cancel`] and on drop.
pub struct ReadinessPoller {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReadinessPoller {
    pub fn new() -> Self {
        Self {
            task: Mutex::new(None),
        }
    }

    /// Start polling unless a poll is already running
    ///
    /// Returns false when nothing was started, either because a poll is in
    /// flight or because no tokio runtime is available.
    pub fn start<F>(&self, probe: Arc<dyn EnvironmentProbe>, config: PollConfig, on_ready: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime, readiness polling skipped");
                return false;
            }
        };

        *task = Some(runtime.spawn(async move {
            for attempt in 1..=config.count {
                tokio::time::sleep(config.interval()).await;
                if probe.is_present() {
                    debug!("Wallet detected after {} attempts", attempt);
                    on_ready();
                    return;
                }
            }
            debug!("Wallet not detected after {} attempts", config.count);
        }));
        true
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    pub fn cancel(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReadinessPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn counting_probe(present_after: usize) -> (Arc<dyn EnvironmentProbe>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let probe: Arc<dyn EnvironmentProbe> =
            Arc::new(move || c.fetch_add(1, Ordering::SeqCst) + 1 >= present_after);
        (probe, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_fires_once() {
        let poller = ReadinessPoller::new();
        let (probe, calls) = counting_probe(2);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();

        assert!(poller.start(probe, PollConfig::default(), move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_silent() {
        let poller = ReadinessPoller::new();
        let (probe, calls) = counting_probe(usize::MAX);
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();

        poller.start(probe, PollConfig { interval_ms: 100, count: 3 }, move || {
            f.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let poller = ReadinessPoller::new();
        let (probe, calls) = counting_probe(usize::MAX);

        assert!(poller.start(probe.clone(), PollConfig::default(), || {}));
        assert!(!poller.start(probe, PollConfig::default(), || {}));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let (probe, calls) = counting_probe(usize::MAX);
        {
            let poller = ReadinessPoller::new();
            poller.start(probe, PollConfig::default(), || {});
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_without_runtime() {
        let poller = ReadinessPoller::new();
        let (probe, _) = counting_probe(1);
        assert!(!poller.start(probe, PollConfig::default(), || {}));
    }
}
