//! Fans targets out to workers, shares cancellation with them and tears
//! them down within a bounded grace period.

mod handle;
mod task_spawner;
mod types;

#[cfg(test)]
mod tests;

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use slotwatch_domain::{
    Clock, DateOutcomeRegistry, OutcomeStore, RunId, RunResult, SchedulerConfig, SessionFactory,
    StopReason, SystemClock, Target, WonRecord, WorkerId,
};

use crate::application::events::{EventDispatcher, OutcomeListener};
use crate::application::services::worker::WorkerContext;

pub use handle::SchedulerHandle;
pub use types::{SchedulerError, ShutdownReport};

pub struct SlotScheduler {
    config: SchedulerConfig,
    factory: Arc<dyn SessionFactory>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn OutcomeStore>>,
    listeners: Vec<Arc<dyn OutcomeListener>>,
    parallelism: usize,
}

impl SlotScheduler {
    pub fn new(config: SchedulerConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            config,
            factory,
            clock: Arc::new(SystemClock),
            store: None,
            listeners: Vec::new(),
            parallelism,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store consulted at start so dates won by an earlier run are skipped.
    pub fn with_store(mut self, store: Arc<dyn OutcomeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn OutcomeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Override the detected CPU count used to size the pool ceiling.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Validate, resume, and spawn one worker per target that still needs one.
    ///
    /// Fails before any worker is spawned.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn start(self, targets: Vec<Target>) -> Result<SchedulerHandle, SchedulerError> {
        self.config.validate()?;
        if targets.is_empty() {
            return Err(slotwatch_domain::ConfigError::NoTargets.into());
        }

        let won = self.resume_state().await?;

        let registry = Arc::new(DateOutcomeRegistry::new(targets.iter().map(Target::date)));
        for record in won {
            if registry.restore_won(record.date, record.source, record.timeslot) {
                info!(date = %record.date, "📌 Date already won in an earlier run");
            }
        }

        let run_id = RunId::new();
        let worker_count = self
            .config
            .pool
            .worker_count(targets.len(), self.parallelism);
        let permits = Arc::new(Semaphore::new(worker_count));
        let cancel = CancellationToken::new();
        let (window_tx, _) = watch::channel(self.config.window);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(EventDispatcher::new(self.listeners).run(events_rx));

        let date_won: HashMap<NaiveDate, CancellationToken> = registry
            .dates()
            .map(|date| (date, CancellationToken::new()))
            .collect();

        let grace_timeout = self.config.grace_timeout;
        let config = Arc::new(self.config);
        let mut tasks = JoinSet::new();
        let mut pending = BTreeMap::new();
        let mut results = Vec::new();
        let mut next_id = WorkerId::first();

        for target in targets {
            if registry.is_won(target.date()) {
                info!(
                    source = %target.source(),
                    date = %target.date(),
                    "⏭️  Skipping target, date already won"
                );
                results.push(RunResult::stopped(
                    target,
                    None,
                    StopReason::AlreadyWon,
                    self.clock.now(),
                ));
                continue;
            }

            let id = next_id;
            next_id = next_id.next();

            let ctx = WorkerContext {
                config: Arc::clone(&config),
                registry: Arc::clone(&registry),
                factory: Arc::clone(&self.factory),
                clock: Arc::clone(&self.clock),
                events: events_tx.clone(),
                window: window_tx.subscribe(),
                cancel: cancel.clone(),
                date_won: date_won.get(&target.date()).cloned().unwrap_or_default(),
            };
            task_spawner::spawn_worker(&mut tasks, id, target.clone(), ctx, Arc::clone(&permits));
            pending.insert(id, target);
        }

        info!(
            run_id = %run_id,
            workers = pending.len(),
            skipped = results.len(),
            pool = worker_count,
            "✅ Scheduler started"
        );

        Ok(SchedulerHandle {
            run_id,
            tasks,
            pending,
            results,
            cancel,
            registry,
            window: window_tx,
            dispatcher,
            clock: self.clock,
            grace_timeout,
            worker_count,
        })
    }

    /// Drop stale records, then load the dates already won.
    async fn resume_state(&self) -> Result<Vec<WonRecord>, SchedulerError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };

        let today = self
            .clock
            .now()
            .with_timezone(&self.config.window.offset())
            .date_naive();
        match store.prune_before(today).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "🧹 Pruned reservations before {}", today),
            Err(e) => warn!("Failed to prune old reservations: {}", e.format_with_code()),
        }

        store.load_won().await.map_err(SchedulerError::Resume)
    }
}
