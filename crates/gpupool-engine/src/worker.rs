//! Scheduler loop workers
//!
//! Each worker runs scheduling passes on a timer and on submission kicks.
//! Any number of workers may run concurrently, in one process or many;
//! they coordinate only through the store's conditional updates, so two
//! workers picking up the same queued job simply race and one of them loses
//! quietly.

use gpupool_core::{PoolResult, SchedulerConfig};
use gpupool_store::PoolStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::matcher::{AllocationMatcher, MatchOutcome};

/// A single scheduling worker
pub struct SchedulerWorker {
    id: usize,
    store: Arc<dyn PoolStore>,
    matcher: AllocationMatcher,
    tick_interval: Duration,
    pass_limit: usize,
    kick: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl SchedulerWorker {
    /// Create a worker
    pub fn new(
        id: usize,
        store: Arc<dyn PoolStore>,
        matcher: AllocationMatcher,
        config: &SchedulerConfig,
        kick: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            store,
            matcher,
            tick_interval: config.tick_interval(),
            pass_limit: config.pass_limit.max(1),
            kick,
            shutdown,
        }
    }

    /// Spawn the worker loop onto the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run passes until shutdown
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(worker = self.id, "Scheduler worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.kick.notified() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.run_pass().await {
                Ok(placed) if placed > 0 => {
                    debug!(worker = self.id, placed = placed, "Scheduling pass placed jobs");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(worker = self.id, error = %e, "Scheduling pass failed");
                }
            }
        }

        info!(worker = self.id, "Scheduler worker stopped");
    }

    /// One scheduling pass: queued jobs by priority then age, each offered
    /// to the matcher, up to the configured pass limit.
    ///
    /// Returns the number of jobs placed. Lost races against other workers
    /// are absorbed here; only infrastructure faults end the pass early.
    pub async fn run_pass(&self) -> PoolResult<usize> {
        let queued = self.store.list_queued_jobs(self.pass_limit).await?;
        let mut placed = 0usize;

        for job in queued {
            match self.matcher.try_place(&job).await {
                Ok(MatchOutcome::Allocated { gpu_id }) => {
                    debug!(worker = self.id, job_id = %job.id, gpu_id = %gpu_id, "Placed job");
                    placed += 1;
                }
                Ok(MatchOutcome::NoMatch) => {}
                Err(e) if e.is_conflict() => {
                    debug!(worker = self.id, job_id = %job.id, "Another worker took the job");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(placed)
    }
}
