use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use slotwatch_domain::outcome::{OutcomeStore, WonRecord};
use slotwatch_domain::{Clock, DomainError, Outcome, SchedulerEvent};

use super::OutcomeListener;

/// Persists every won date so a restart does not schedule it again.
pub struct RecordingListener {
    store: Arc<dyn OutcomeStore>,
    clock: Arc<dyn Clock>,
}

impl RecordingListener {
    pub fn new(store: Arc<dyn OutcomeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl OutcomeListener for RecordingListener {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn on_event(&self, event: &SchedulerEvent) -> Result<(), DomainError> {
        let SchedulerEvent::Outcome(Outcome::Won {
            date,
            source,
            timeslot,
        }) = event
        else {
            return Ok(());
        };

        self.store
            .record_won(&WonRecord {
                date: *date,
                source: source.clone(),
                timeslot: timeslot.clone(),
                won_at: self.clock.now(),
            })
            .await
    }
}

pub struct LoggingListener;

#[async_trait]
impl OutcomeListener for LoggingListener {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn on_event(&self, event: &SchedulerEvent) -> Result<(), DomainError> {
        match event {
            SchedulerEvent::Outcome(Outcome::Won {
                date,
                source,
                timeslot,
            }) => {
                info!(%date, %source, %timeslot, "🎉 Reservation confirmed");
            }
            SchedulerEvent::Outcome(Outcome::Lost { date, source }) => {
                info!(%date, %source, "Target finished without a reservation");
            }
            SchedulerEvent::WorkerFailure {
                target,
                kind,
                attempt,
            } => {
                warn!(
                    source = %target.source(),
                    date = %target.date(),
                    %kind,
                    attempt,
                    "Worker failure"
                );
            }
            SchedulerEvent::WindowGated { target, until_open } => {
                debug!(
                    source = %target.source(),
                    date = %target.date(),
                    until_open_secs = until_open.as_secs(),
                    "Outside monitoring window"
                );
            }
        }
        Ok(())
    }
}
