use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::animation::RunWatch;

#[async_trait]
pub trait PollTarget: Send + Sync {
    async fn poll_once(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub iterations: usize,
    pub stopped_early: bool,
}

/// Fixed-cadence refresh with an iteration budget, optionally tied to the
/// animation run it accompanies.
pub struct PollLoop {
    interval: Duration,
    budget: usize,
    until: Option<RunWatch>,
}

impl PollLoop {
    pub fn new(interval: Duration, budget: usize) -> Self {
        Self {
            interval,
            budget,
            until: None,
        }
    }

    /// Stop as soon as `run` is done or cancelled.
    pub fn until_finished(mut self, run: RunWatch) -> Self {
        self.until = Some(run);
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub async fn run(mut self, target: &dyn PollTarget) -> PollSummary {
        let mut iterations = 0;

        while iterations < self.budget {
            match self.until.as_mut() {
                Some(run) => {
                    let run_id = run.run_id();
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        status = run.finished() => {
                            info!(
                                run = %run_id,
                                ?status,
                                iterations,
                                budget = self.budget,
                                "poll: animation ended, stopping early"
                            );
                            return PollSummary {
                                iterations,
                                stopped_early: true,
                            };
                        }
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }

            target.poll_once().await;
            iterations += 1;
        }

        info!(iterations, "poll: budget exhausted");
        PollSummary {
            iterations,
            stopped_early: false,
        }
    }
}

#[cfg(test)]
#[path = "tests/poll_tests.rs"]
mod tests;
