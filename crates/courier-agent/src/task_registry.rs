//! Background task registry for the agent's timers.
//!
//! Tasks share one shutdown channel. Interval tasks only observe shutdown
//! between iterations, so an iteration that is waiting on a ledger
//! confirmation finishes before the task exits.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A named task handle
#[derive(Debug)]
pub struct RegisteredTask {
    /// Name used in logs
    pub name: &'static str,
    /// Tokio handle
    pub handle: JoinHandle<()>,
}

/// Tracks spawned tasks and their shared shutdown signal
#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<RegisteredTask>>,
}

impl TaskRegistry {
    /// Empty registry
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run `f` every `interval` until shutdown or until it returns `false`.
    ///
    /// The first run happens immediately. Ticks missed while `f` was running
    /// are skipped rather than bunched up.
    pub fn spawn_interval_until<F, Fut>(&self, name: &'static str, interval: Duration, mut f: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }
                if !f().await {
                    break;
                }
            }
            tracing::debug!(task = name, "Interval task stopped");
        });
        self.tasks.lock().push(RegisteredTask { name, handle });
    }

    /// Signal shutdown without waiting
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Take ownership of the registered tasks
    pub fn take_tasks(&self) -> Vec<RegisteredTask> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

/// Wait up to `grace` for `handles`, aborting whatever is still running.
/// Returns how many were aborted.
pub async fn join_with_grace(handles: Vec<JoinHandle<()>>, grace: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + grace;
    let mut aborted = 0;
    for mut handle in handles {
        if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
            handle.abort();
            aborted += 1;
        }
    }
    aborted
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.lock().drain(..) {
            task.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_interval_runs_until_shutdown() {
        let registry = TaskRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        registry.spawn_interval_until("count", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        registry.shutdown();
        let handles = registry.take_tasks().into_iter().map(|t| t.handle).collect();
        assert_eq!(join_with_grace(handles, Duration::from_secs(1)).await, 0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_stops_when_closure_declines() {
        let registry = TaskRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        registry.spawn_interval_until("once", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) < 1 }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_is_aborted_after_grace() {
        let handle = tokio::spawn(std::future::pending::<()>());
        assert_eq!(join_with_grace(vec![handle], Duration::from_secs(1)).await, 1);
    }
}
