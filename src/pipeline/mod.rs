//! Scheduler loop: drives the task handler over the configured task list.
//!
//! ## Loop
//!
//! Tasks run one at a time, round robin, forever:
//!   1. run the task
//!   2. on failure, recover according to its kind:
//!      network / extraction / cache miss → short pause, move on
//!      store → long pause, then reconnect until the store answers
//!   3. rebuild player stats (store failures recover as in 2)
//!   4. pause `task_delay`
//!
//! A failed task is not retried; it comes round again on its next turn.
//! The cancellation token is checked before every task and raced against
//! every pause and the reconnect loop.

pub mod handler;

use crate::cache::ScanState;
use crate::config::SchedulerConfig;
use crate::error::{HarvestError, Recovery, StoreError};
use crate::models::{GlobalPlace, Task};
use crate::scraper::MatchSource;
use crate::storage::MatchStore;
use std::cell::Cell;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use self::handler::TaskHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Recovering(Recovery),
}

/// The cancellation token fired.
#[derive(Debug)]
pub struct Shutdown;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub tasks_run: usize,
    pub failures: usize,
    pub reconnects: usize,
}

pub struct Scheduler<S, R> {
    handler: TaskHandler<S, R>,
    tasks: Vec<Task>,
    config: SchedulerConfig,
    scan: ScanState,
    next: usize,
    state: LoopState,
    stats: SchedulerStats,
}

impl<S: MatchSource, R: MatchStore> Scheduler<S, R> {
    pub fn new(handler: TaskHandler<S, R>, tasks: Vec<Task>, config: SchedulerConfig) -> Self {
        Self {
            handler,
            tasks,
            config,
            scan: ScanState::default(),
            next: 0,
            state: LoopState::Running,
            stats: SchedulerStats::default(),
        }
    }

    /// Pick up the scan cursors saved by a previous run.
    pub fn restore_cursors(&mut self) -> Result<usize, StoreError> {
        let saved = self.handler.store().load_cursors()?;
        for (seed, place) in &saved {
            info!("Resuming history scan seeded at {} from {}", seed, place);
        }
        Ok(self.scan.cursors.restore(saved))
    }

    /// Run until cancelled.
    pub async fn run(&mut self, cancel: &CancellationToken) -> SchedulerStats {
        info!("Scheduler started with {} tasks", self.tasks.len());
        while self.step(cancel).await.is_ok() {}
        for seed in self.seeds() {
            if let Some(place) = self.scan.cursors.get(seed) {
                info!("History scan seeded at {} stopped at {}", seed, place);
            }
        }
        info!(
            "Scheduler stopped: {} tasks, {} failures, {} reconnects",
            self.stats.tasks_run, self.stats.failures, self.stats.reconnects
        );
        self.stats.clone()
    }

    /// Distinct seed places of the history-scan tasks, in order.
    fn seeds(&self) -> Vec<GlobalPlace> {
        let mut seeds: Vec<GlobalPlace> = self
            .tasks
            .iter()
            .filter_map(|task| match task {
                Task::FetchLastMatch(seed) => Some(*seed),
                _ => None,
            })
            .collect();
        seeds.sort();
        seeds.dedup();
        seeds
    }

    /// Run every task in the list once.
    pub async fn run_pass(&mut self, cancel: &CancellationToken) -> SchedulerStats {
        for _ in 0..self.tasks.len() {
            if self.step(cancel).await.is_err() {
                break;
            }
        }
        self.stats.clone()
    }

    async fn step(&mut self, cancel: &CancellationToken) -> Result<(), Shutdown> {
        if cancel.is_cancelled() || self.tasks.is_empty() {
            return Err(Shutdown);
        }

        let task = self.tasks[self.next].clone();
        self.next = (self.next + 1) % self.tasks.len();

        let result = self.handler.handle(&task, &mut self.scan).await;
        self.stats.tasks_run += 1;
        match result {
            Ok(report) => debug!("{}: {:?}", task, report),
            Err(e) => self.recover(&task.to_string(), e, cancel).await?,
        }

        if let Err(e) = self.handler.store().record_stats() {
            self.recover("update stats", e.into(), cancel).await?;
        }

        pause(self.config.task_delay(), cancel).await
    }

    async fn recover(
        &mut self,
        what: &str,
        err: HarvestError,
        cancel: &CancellationToken,
    ) -> Result<(), Shutdown> {
        self.stats.failures += 1;
        let kind = err.recovery();
        self.state = LoopState::Recovering(kind);
        debug!("state: {:?}", self.state);

        match kind {
            Recovery::Parse => {
                warn!("{} failed, skipping: {}", what, err);
                pause(self.config.error_delay(), cancel).await?;
            }
            Recovery::Network => {
                warn!("{} failed on the network, skipping: {}", what, err);
                pause(self.config.error_delay(), cancel).await?;
            }
            Recovery::Store => {
                error!("{} failed on the store: {}", what, err);
                pause(self.config.store_error_delay(), cancel).await?;
                let attempts = self.reconnect(cancel).await?;
                self.stats.reconnects += 1;
                info!("Store reachable again after {} attempt(s)", attempts);
            }
        }

        self.state = LoopState::Running;
        Ok(())
    }

    /// Reconnect sub-loop: fixed interval, unbounded attempts.
    async fn reconnect(&self, cancel: &CancellationToken) -> Result<usize, Shutdown> {
        let store = self.handler.store();
        let attempts = Cell::new(0usize);
        let counter = &attempts;

        let retry = Retry::spawn(
            FixedInterval::from_millis(self.config.reconnect_delay_ms),
            move || async move {
                counter.set(counter.get() + 1);
                store.reconnect().inspect_err(|e| {
                    warn!("Reconnect attempt {} failed: {}", counter.get(), e);
                })
            },
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Shutdown),
            res = retry => match res {
                Ok(()) => Ok(attempts.get()),
                // FixedInterval never runs out, so this only fires if that changes.
                Err(e) => {
                    error!("Gave up reconnecting: {}", e);
                    Err(Shutdown)
                }
            },
        }
    }
}

/// Sleep unless cancelled first.
async fn pause(d: Duration, cancel: &CancellationToken) -> Result<(), Shutdown> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Shutdown),
        _ = sleep(d) => Ok(()),
    }
}
