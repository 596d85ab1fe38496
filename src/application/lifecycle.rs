//! Background maintenance and graceful shutdown.
//!
//! Each limiter family is swept on its own timer, alongside one task for
//! block list, behavior and counter housekeeping and one for behavior decay.
//! Every task works through the engine's per-key locking, so a sweep never
//! stalls admission checks on unrelated keys.

use crate::application::engine::{AdmissionEngine, LimiterFamily};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Error returned when stopping the background tasks fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// A task panicked or was cancelled before it could be joined
    TaskFailed(&'static str),
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownError::TaskFailed(task) => {
                write!(f, "lifecycle task {} failed during shutdown", task)
            }
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Starts the periodic maintenance tasks of an engine.
pub struct LifecycleManager;

impl LifecycleManager {
    /// Spawn the maintenance tasks on the current tokio runtime.
    ///
    /// Sweeps run every `cleanup_interval` of the engine's policy. Decay
    /// runs every `decay_interval` while adaptive scoring is enabled.
    ///
    /// Dropping the returned handle leaves the tasks running until the
    /// engine is closed; call [`LifecycleHandle::shutdown`] to stop them.
    pub fn start(engine: Arc<AdmissionEngine>) -> LifecycleHandle {
        let stop_rx = engine.close_receiver();
        let cleanup_interval = engine.policy().cleanup_interval;
        let mut tasks = Vec::new();

        for family in LimiterFamily::ALL {
            let worker = Arc::clone(&engine);
            tasks.push((
                family_task_name(family),
                spawn_periodic(cleanup_interval, stop_rx.clone(), &engine, move || {
                    worker.sweep(family);
                }),
            ));
        }

        let worker = Arc::clone(&engine);
        tasks.push((
            "housekeeping",
            spawn_periodic(cleanup_interval, stop_rx.clone(), &engine, move || {
                worker.sweep_auxiliary();
            }),
        ));

        let adaptive = &engine.policy().adaptive;
        if adaptive.enabled {
            let worker = Arc::clone(&engine);
            tasks.push((
                "decay",
                spawn_periodic(adaptive.decay_interval, stop_rx, &engine, move || {
                    worker.decay();
                }),
            ));
        }

        info!(
            tasks = tasks.len(),
            cleanup_secs = cleanup_interval.as_secs(),
            "admission lifecycle started"
        );

        LifecycleHandle { engine, tasks }
    }
}

fn family_task_name(family: LimiterFamily) -> &'static str {
    match family {
        LimiterFamily::Ip => "ip_sweep",
        LimiterFamily::Account => "account_sweep",
        LimiterFamily::Endpoint => "endpoint_sweep",
    }
}

fn spawn_periodic<F>(
    period: Duration,
    stop: watch::Receiver<bool>,
    engine: &Arc<AdmissionEngine>,
    work: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(run_periodic(period, stop, Arc::clone(engine), work))
}

async fn run_periodic<F>(
    period: Duration,
    mut stop: watch::Receiver<bool>,
    engine: Arc<AdmissionEngine>,
    mut work: F,
) where
    F: FnMut() + Send + 'static,
{
    if *stop.borrow() {
        return;
    }
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if engine.is_closed() {
                    break;
                }
                work();
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}

/// Handle to the running maintenance tasks.
pub struct LifecycleHandle {
    engine: Arc<AdmissionEngine>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl fmt::Debug for LifecycleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHandle")
            .field(
                "tasks",
                &self.tasks.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl LifecycleHandle {
    /// The engine being maintained.
    pub fn engine(&self) -> &Arc<AdmissionEngine> {
        &self.engine
    }

    /// Number of running tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Close the engine and stop every task.
    ///
    /// The engine rejects all traffic from the moment this is called, even
    /// if joining a task fails.
    ///
    /// # Errors
    /// Returns `ShutdownError::TaskFailed` naming the first task that could
    /// not be joined.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        // Wakes every task through the engine's close signal
        self.engine.close();

        let mut result = Ok(());
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "lifecycle task failed");
                if result.is_ok() {
                    result = Err(ShutdownError::TaskFailed(name));
                }
            } else {
                debug!(task = name, "lifecycle task stopped");
            }
        }

        info!("admission lifecycle stopped");
        result
    }
}
