//! Timer runtime around the lifecycle manager
//!
//! Runs the discovery and active-poll timers on a [`TaskRegistry`] and
//! stops them on an external shutdown signal or when a timer task dies.

use crate::lifecycle::{LifecycleManager, TickOutcome};
use crate::task_registry::{join_with_grace, TaskRegistry};
use courier_core::{CourierError, Result};
use futures::future::select_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Time in-flight ticks get to finish after shutdown is requested
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Poll intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeIntervals {
    /// Discovery timer period
    pub discovery: Duration,
    /// Active-poll timer period
    pub active: Duration,
}

/// Why the runtime stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeExit {
    /// The shutdown signal fired
    Signal,
    /// A timer task ended on its own
    TaskEnded {
        /// Name of the task
        task: &'static str,
        /// Whether it panicked
        panicked: bool,
    },
}

/// Running timers for one lifecycle manager
#[derive(Debug)]
pub struct LifecycleRuntime {
    registry: TaskRegistry,
    manager: Arc<LifecycleManager>,
    grace: Duration,
}

impl LifecycleRuntime {
    /// Start both timers; the first ticks run immediately
    pub fn start(manager: Arc<LifecycleManager>, intervals: RuntimeIntervals) -> Self {
        let registry = TaskRegistry::new();

        let discovery = manager.clone();
        registry.spawn_interval_until("discovery", intervals.discovery, move || {
            let manager = discovery.clone();
            async move {
                log_tick("discovery", manager.discovery_tick().await);
                true
            }
        });

        let active = manager.clone();
        registry.spawn_interval_until("active-poll", intervals.active, move || {
            let manager = active.clone();
            async move {
                log_tick("active poll", manager.active_tick().await);
                true
            }
        });

        tracing::info!(
            address = %manager.local_address(),
            discovery_secs = intervals.discovery.as_secs(),
            active_secs = intervals.active.as_secs(),
            "Lifecycle timers started"
        );
        Self {
            registry,
            manager,
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Override how long shutdown waits for in-flight ticks
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Manager driven by this runtime
    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    /// Run until `signal` resolves or a timer task ends, then shut down.
    ///
    /// A timer task ending on its own (a panic included) is reported as an
    /// error after the remaining tasks were stopped.
    pub async fn run_until<S>(self, signal: S) -> Result<RuntimeExit>
    where
        S: Future<Output = ()>,
    {
        let tasks = self.registry.take_tasks();
        let names: Vec<&'static str> = tasks.iter().map(|t| t.name).collect();
        let handles: Vec<_> = tasks.into_iter().map(|t| t.handle).collect();

        let (exit, remaining) = if handles.is_empty() {
            signal.await;
            (RuntimeExit::Signal, Vec::new())
        } else {
            let mut watched = select_all(handles);
            tokio::pin!(signal);
            let ended = tokio::select! {
                _ = &mut signal => None,
                ended = &mut watched => Some(ended),
            };
            match ended {
                None => {
                    tracing::info!("Shutdown requested");
                    (RuntimeExit::Signal, watched.into_inner())
                }
                Some((result, index, remaining)) => {
                    let task = names.get(index).copied().unwrap_or("unknown");
                    let panicked = matches!(&result, Err(err) if err.is_panic());
                    tracing::error!(task, panicked, "Timer task ended unexpectedly");
                    (RuntimeExit::TaskEnded { task, panicked }, remaining)
                }
            }
        };

        self.registry.shutdown();
        let aborted = join_with_grace(remaining, self.grace).await;
        if aborted > 0 {
            tracing::warn!(aborted, "Timer tasks aborted after grace period");
        }
        tracing::info!("Lifecycle timers stopped");

        match exit {
            RuntimeExit::TaskEnded { task, panicked } => Err(CourierError::internal(format!(
                "timer task '{task}' ended{}",
                if panicked { " by panicking" } else { "" }
            ))),
            RuntimeExit::Signal => Ok(RuntimeExit::Signal),
        }
    }
}

fn log_tick(kind: &'static str, outcome: Result<TickOutcome>) {
    match outcome {
        Ok(TickOutcome::Skipped) => tracing::debug!(kind, "Tick skipped, previous one still running"),
        Ok(TickOutcome::Completed(_)) => {}
        Err(err) if err.is_retryable() => tracing::warn!(kind, error = %err, "Tick failed"),
        Err(err) => tracing::error!(kind, error = %err, "Tick failed"),
    }
}
