//! Step-by-step driver animation with per-driver cancellation.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{DriverId, NodeId},
    error::ValidationError,
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::{error::ClientError, store::StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Stepping,
    Done,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Cancelled)
    }
}

/// Read side of a run's status, handed to the poll loop that accompanies it.
#[derive(Clone)]
pub struct RunWatch {
    run_id: RunId,
    rx: watch::Receiver<RunStatus>,
}

impl RunWatch {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        *self.rx.borrow()
    }

    /// Resolves once the run is done or cancelled, or once its owner is gone.
    pub async fn finished(&mut self) -> RunStatus {
        let ended = self
            .rx
            .wait_for(|status| status.is_terminal())
            .await
            .map(|status| *status);
        match ended {
            Ok(status) => status,
            Err(_) => *self.rx.borrow(),
        }
    }
}

pub struct AnimationRun {
    run_id: RunId,
    driver_id: DriverId,
    path: Vec<NodeId>,
    current_step_index: usize,
    status: Arc<watch::Sender<RunStatus>>,
}

impl AnimationRun {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn driver_id(&self) -> &DriverId {
        &self.driver_id
    }

    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Number of steps already written to the store.
    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    pub fn watch(&self) -> RunWatch {
        RunWatch {
            run_id: self.run_id,
            rx: self.status.subscribe(),
        }
    }

    pub fn path_label(&self) -> String {
        self.path
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join("->")
    }
}

/// Callbacks the controller fires around each write. Implemented by the
/// client session to re-render and to pick up post-trip state.
#[async_trait]
pub trait AnimationHooks: Send + Sync {
    async fn step_applied(&self, run: &AnimationRun, node_id: &NodeId);
    async fn run_finished(&self, run: &AnimationRun, failure: Option<&ClientError>);
}

struct ActiveRun {
    run_id: RunId,
    status: Arc<watch::Sender<RunStatus>>,
}

pub struct AnimationController {
    store: Arc<StateStore>,
    step_delay: Duration,
    next_run_id: AtomicU64,
    active: Mutex<HashMap<DriverId, ActiveRun>>,
}

impl AnimationController {
    pub fn new(store: Arc<StateStore>, step_delay: Duration) -> Self {
        Self {
            store,
            step_delay,
            next_run_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    /// Creates a run for `driver_id` and takes override authority from any
    /// run already animating that driver, cancelling it.
    pub async fn start(
        &self,
        driver_id: DriverId,
        path: Vec<NodeId>,
    ) -> Result<AnimationRun, ClientError> {
        if driver_id.is_blank() {
            return Err(ValidationError::EmptyId("driver_id").into());
        }
        if path.is_empty() {
            return Err(ValidationError::EmptyPath.into());
        }

        let run_id = RunId(self.next_run_id.fetch_add(1, Ordering::Relaxed));
        let (status, _) = watch::channel(RunStatus::Pending);
        let status = Arc::new(status);

        // Authority and the active entry change under one lock.
        let (displaced, previous) = {
            let mut active = self.active.lock().await;
            let displaced = self.store.acquire_override(&driver_id, run_id).await?;
            status.send_replace(RunStatus::Stepping);
            let previous = active.insert(
                driver_id.clone(),
                ActiveRun {
                    run_id,
                    status: Arc::clone(&status),
                },
            );
            (displaced, previous)
        };
        if let Some(previous) = previous {
            previous.status.send_if_modified(|current| {
                if current.is_terminal() {
                    return false;
                }
                *current = RunStatus::Cancelled;
                true
            });
            info!(
                driver = %driver_id,
                cancelled = %previous.run_id,
                replacement = %run_id,
                "animation: superseded by new assignment"
            );
        } else if let Some(displaced) = displaced {
            debug!(driver = %driver_id, %displaced, "animation: took over stale override");
        }

        info!(driver = %driver_id, run = %run_id, steps = path.len(), "animation: started");

        Ok(AnimationRun {
            run_id,
            driver_id,
            path,
            current_step_index: 0,
            status,
        })
    }

    /// Walks the run through its path, one store write per step delay.
    pub async fn drive(&self, mut run: AnimationRun, hooks: &dyn AnimationHooks) -> RunStatus {
        let mut failure = None;

        for index in 0..run.path.len() {
            tokio::time::sleep(self.step_delay).await;
            if run.status().is_terminal() {
                break;
            }

            let node_id = run.path[index].clone();
            match self
                .store
                .set_driver_location(run.run_id, &run.driver_id, &node_id)
                .await
            {
                Ok(()) => {
                    run.current_step_index = index + 1;
                    debug!(
                        driver = %run.driver_id,
                        run = %run.run_id,
                        step = run.current_step_index,
                        node = %node_id,
                        "animation: step"
                    );
                    hooks.step_applied(&run, &node_id).await;
                }
                Err(ClientError::Superseded { .. }) => {
                    debug!(run = %run.run_id, "animation: write refused, authority lost");
                    break;
                }
                Err(err) => {
                    warn!(
                        driver = %run.driver_id,
                        run = %run.run_id,
                        error = %err,
                        "animation: step failed, cancelling run"
                    );
                    failure = Some(err);
                    break;
                }
            }
        }

        let status = if run.current_step_index == run.path.len() && failure.is_none() {
            RunStatus::Done
        } else {
            RunStatus::Cancelled
        };
        self.finish(&run, status).await;
        hooks.run_finished(&run, failure.as_ref()).await;
        run.status()
    }

    /// Cancels whatever run currently animates `driver_id`.
    pub async fn cancel(&self, driver_id: &DriverId) -> Option<RunId> {
        let removed = {
            let mut active = self.active.lock().await;
            active.remove(driver_id)
        };
        let removed = removed?;
        removed.status.send_replace(RunStatus::Cancelled);
        self.store.release_override(driver_id, removed.run_id).await;
        info!(driver = %driver_id, run = %removed.run_id, "animation: cancelled");
        Some(removed.run_id)
    }

    pub async fn active_run(&self, driver_id: &DriverId) -> Option<RunId> {
        let active = self.active.lock().await;
        active.get(driver_id).map(|run| run.run_id)
    }

    async fn finish(&self, run: &AnimationRun, status: RunStatus) {
        let final_status = if run.status().is_terminal() {
            run.status()
        } else {
            run.status.send_replace(status);
            status
        };

        {
            let mut active = self.active.lock().await;
            if active
                .get(&run.driver_id)
                .is_some_and(|entry| entry.run_id == run.run_id)
            {
                active.remove(&run.driver_id);
            }
        }
        self.store.release_override(&run.driver_id, run.run_id).await;

        info!(
            driver = %run.driver_id,
            run = %run.run_id,
            status = ?final_status,
            steps = run.current_step_index,
            "animation: finished"
        );
    }
}

#[cfg(test)]
#[path = "tests/animation_tests.rs"]
mod tests;
