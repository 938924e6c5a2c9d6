use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use slotwatch_domain::{DomainError, SchedulerEvent};

/// Consumer of scheduler events (persistence, notification, ...).
///
/// Delivery is at-least-once; implementations deduplicate outcomes by date.
#[async_trait]
pub trait OutcomeListener: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_event(&self, event: &SchedulerEvent) -> Result<(), DomainError>;
}

/// Drains the scheduler's event queue into every registered listener.
///
/// Listeners run sequentially per event; a failing listener is logged and
/// the remaining listeners still receive the event.
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn OutcomeListener>>,
}

impl EventDispatcher {
    pub fn new(listeners: Vec<Arc<dyn OutcomeListener>>) -> Self {
        Self { listeners }
    }

    pub async fn dispatch(&self, event: &SchedulerEvent) {
        for listener in &self.listeners {
            match listener.on_event(event).await {
                Ok(()) => {
                    debug!(
                        listener = listener.name(),
                        event = event.event_type(),
                        "Listener processed event"
                    );
                }
                Err(e) => {
                    error!(
                        listener = listener.name(),
                        event = event.event_type(),
                        "Listener failed: {}",
                        e.format_with_code()
                    );
                }
            }
        }
    }

    /// Run until every sender has been dropped.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<SchedulerEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(&event).await;
        }
        debug!("Event queue closed, dispatcher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use slotwatch_domain::{Outcome, SourceId};
    use std::sync::Mutex;

    struct Failing;

    #[async_trait]
    impl OutcomeListener for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn on_event(&self, _event: &SchedulerEvent) -> Result<(), DomainError> {
            Err(DomainError::Infrastructure("listener down".into()))
        }
    }

    #[derive(Default)]
    struct Collecting {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl OutcomeListener for Collecting {
        fn name(&self) -> &'static str {
            "collecting"
        }

        async fn on_event(&self, event: &SchedulerEvent) -> Result<(), DomainError> {
            self.seen.lock().unwrap().push(event.event_type());
            Ok(())
        }
    }

    fn lost() -> SchedulerEvent {
        SchedulerEvent::Outcome(Outcome::Lost {
            date: NaiveDate::from_ymd_opt(2026, 10, 25).unwrap(),
            source: SourceId::from_string("room-a"),
        })
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_block_others() {
        let collecting = Arc::new(Collecting::default());
        let dispatcher = EventDispatcher::new(vec![Arc::new(Failing), collecting.clone()]);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(lost()).unwrap();
        tx.send(lost()).unwrap();
        drop(tx);

        dispatcher.run(rx).await;

        assert_eq!(*collecting.seen.lock().unwrap(), vec!["outcome_lost", "outcome_lost"]);
    }
}
