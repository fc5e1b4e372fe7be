//! Background run submission.
//!
//! Triggers never wait on generation: [`RunSupervisor::submit`] spawns the
//! run and hands back a [`RunHandle`] the caller may await, poll or abort.

use crate::context::CampaignTrigger;
use crate::pipeline::{describe_join_error, RunResult, WorkflowEngine};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// A submitted run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    handle: JoinHandle<RunResult>,
}

impl RunHandle {
    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Aborts the run. Writes already issued stay committed.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the run's result.
    ///
    /// An aborted or panicked run task is reported as
    /// [`RunResult::Error`].
    pub async fn wait(self) -> RunResult {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => RunResult::Error {
                run_id: self.run_id,
                message: describe_join_error(e),
            },
        }
    }
}

#[derive(Debug, Default)]
struct ActiveRuns {
    runs: DashMap<Uuid, Option<AbortHandle>>,
    idle: Notify,
}

/// Removes a run from the active set when its task ends or is dropped.
struct ActiveGuard {
    active: Arc<ActiveRuns>,
    run_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.runs.remove(&self.run_id);
        self.active.idle.notify_waiters();
    }
}

/// Spawns engine runs and tracks the ones still in flight.
#[derive(Debug, Clone)]
pub struct RunSupervisor {
    engine: Arc<WorkflowEngine>,
    active: Arc<ActiveRuns>,
}

impl RunSupervisor {
    /// Creates a supervisor over an engine.
    #[must_use]
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            active: Arc::new(ActiveRuns::default()),
        }
    }

    /// Starts a run in the background and returns immediately.
    pub fn submit(&self, trigger: CampaignTrigger) -> RunHandle {
        let run_id = Uuid::now_v7();
        self.active.runs.insert(run_id, None);

        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
            run_id,
        };
        let engine = Arc::clone(&self.engine);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                engine.run_as(run_id, trigger).await
            }
            .in_current_span(),
        );

        // The task may already be gone, in which case its guard removed the entry.
        if let Some(mut entry) = self.active.runs.get_mut(&run_id) {
            *entry = Some(handle.abort_handle());
        }
        info!(run_id = %run_id, "Run submitted");
        RunHandle { run_id, handle }
    }

    /// Returns the number of runs still in flight.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.runs.len()
    }

    /// Returns true if the run is still in flight.
    #[must_use]
    pub fn is_active(&self, run_id: Uuid) -> bool {
        self.active.runs.contains_key(&run_id)
    }

    /// Waits up to `grace` for in-flight runs, then aborts the rest.
    ///
    /// Returns the number of runs aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let drained = tokio::time::timeout(grace, async {
            loop {
                let notified = self.active.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.active.runs.is_empty() {
                    break;
                }
                notified.await;
            }
        })
        .await;

        if drained.is_ok() {
            debug!("All runs finished before shutdown");
            return 0;
        }

        let handles: Vec<AbortHandle> = self
            .active
            .runs
            .iter()
            .filter_map(|entry| entry.value().clone())
            .collect();
        for handle in &handles {
            handle.abort();
        }
        let aborted = handles.len();
        warn!(aborted, "Aborted runs still in flight at shutdown");
        aborted
    }
}
