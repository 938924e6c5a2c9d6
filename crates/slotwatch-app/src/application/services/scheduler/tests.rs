use super::*;
use crate::application::events::RecordingListener;
use crate::application::test_support::*;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mockall::mock;
use slotwatch_domain::{
    ConfigError, DomainError, MonitoringWindow, ProbeOutcome, SlotError, SlotSession, SourceId,
};
use slotwatch_infrastructure::persistence::InMemoryOutcomeStore;
use std::time::Duration;

mock! {
    Factory {}

    #[async_trait]
    impl SessionFactory for Factory {
        async fn open(&self, source: &SourceId) -> Result<Box<dyn SlotSession>, SlotError>;
    }
}

mock! {
    Store {}

    #[async_trait]
    impl OutcomeStore for Store {
        async fn load_won(&self) -> Result<Vec<WonRecord>, DomainError>;
        async fn record_won(&self, record: &WonRecord) -> Result<(), DomainError>;
        async fn prune_before(&self, date: NaiveDate) -> Result<usize, DomainError>;
    }
}

fn won_record(source: &str, day: u32) -> WonRecord {
    WonRecord {
        date: date(day),
        source: SourceId::from_string(source),
        timeslot: slot("19:00"),
        won_at: morning(),
    }
}

fn reasons(results: &[RunResult]) -> Vec<StopReason> {
    results.iter().map(|r| r.reason).collect()
}

#[tokio::test(start_paused = true)]
async fn test_one_winner_per_date_and_wins_recorded() {
    let clock = TestClock::at(morning());
    let factory = Arc::new(
        FakeFactory::new()
            .with("room-a", FakeSource::always_available())
            .with("room-b", FakeSource::always_available()),
    );
    let store = Arc::new(InMemoryOutcomeStore::new());

    let handle = SlotScheduler::new(config(), factory.clone())
        .with_clock(clock.clone())
        .with_store(store.clone())
        .with_listener(Arc::new(RecordingListener::new(store.clone(), clock.clone())))
        .start(vec![
            target("room-a", 25, &["19:00"]),
            target("room-b", 25, &["19:00"]),
            target("room-a", 26, &["19:00"]),
            target("room-b", 26, &["19:00"]),
        ])
        .await
        .unwrap();
    let registry = handle.registry();
    let results = handle.await_all().await;

    assert_eq!(results.len(), 4);
    for day in [25, 26] {
        let for_date: Vec<&RunResult> = results
            .iter()
            .filter(|r| r.target.date() == date(day))
            .collect();
        assert_eq!(for_date.iter().filter(|r| r.succeeded).count(), 1);
        assert_eq!(
            for_date.iter().filter(|r| r.reason == StopReason::PeerWon).count(),
            1
        );
        assert!(registry.is_won(date(day)));
    }

    let recorded: Vec<NaiveDate> = store
        .load_won()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.date)
        .collect();
    assert_eq!(recorded, vec![date(25), date(26)]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_skips_dates_won_earlier() {
    let clock = TestClock::at(morning());
    let factory = Arc::new(
        FakeFactory::new()
            .with("room-a", FakeSource::always_available())
            .with("room-b", FakeSource::new()),
    );
    let store = Arc::new(InMemoryOutcomeStore::with_records([
        won_record("room-a", 10),
        won_record("room-a", 25),
    ]));

    let handle = SlotScheduler::new(config(), factory.clone())
        .with_clock(clock.clone())
        .with_store(store.clone())
        .with_listener(Arc::new(RecordingListener::new(store.clone(), clock.clone())))
        .start(vec![
            target("room-a", 25, &["19:00"]),
            target("room-b", 25, &["19:00"]),
            target("room-a", 26, &["19:00"]),
        ])
        .await
        .unwrap();
    let results = handle.await_all().await;

    assert_eq!(
        reasons(&results),
        vec![StopReason::AlreadyWon, StopReason::AlreadyWon, StopReason::Won]
    );
    assert!(results[..2].iter().all(|r| r.worker.is_none()));
    assert_eq!(FakeSource::count(&factory.source("room-b").opens), 0);
    assert_eq!(FakeSource::count(&factory.source("room-a").opens), 1);

    // the record from before today is pruned at start
    let remaining: Vec<NaiveDate> = store
        .load_won()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.date)
        .collect();
    assert_eq!(remaining, vec![date(25), date(26)]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_workers_past_grace() {
    let factory = Arc::new(FakeFactory::new().with(
        "room-a",
        FakeSource::always_available().slow_confirm(Duration::from_secs(600)),
    ));

    let handle = SlotScheduler::new(config(), factory.clone())
        .with_clock(TestClock::at(morning()))
        .start(vec![target("room-a", 25, &["19:00"])])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(FakeSource::count(&factory.source("room-a").confirms), 1);

    let report = handle.stop(Duration::from_secs(2)).await;

    assert!(report.deadline_exceeded);
    assert_eq!(report.abandoned, 1);
    assert!(report.elapsed >= Duration::from_secs(2));
    assert!(report.elapsed <= Duration::from_millis(2500));
    assert_eq!(reasons(&report.results), vec![StopReason::Aborted]);
    assert!(matches!(
        report.into_result(),
        Err(SchedulerError::ShutdownDeadlineExceeded { abandoned: 1 })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_graceful_stop_cancels_every_worker() {
    let factory = Arc::new(
        FakeFactory::new()
            .with("room-a", FakeSource::new())
            .with("room-b", FakeSource::new()),
    );

    let handle = SlotScheduler::new(config(), factory.clone())
        .with_clock(TestClock::at(morning()))
        .start(vec![
            target("room-a", 25, &["19:00"]),
            target("room-b", 25, &["19:00"]),
            target("room-a", 26, &["19:00"]),
            target("room-b", 26, &["19:00"]),
        ])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(12)).await;
    let report = handle.stop(Duration::from_secs(30)).await;

    assert!(!report.deadline_exceeded);
    assert_eq!(report.abandoned, 0);
    assert!(report.elapsed < Duration::from_secs(1));
    assert_eq!(report.results.len(), 4);
    assert!(report
        .results
        .iter()
        .all(|r| r.reason == StopReason::Cancelled));

    for name in ["room-a", "room-b"] {
        let source = factory.source(name);
        assert_eq!(FakeSource::count(&source.opens), 2);
        assert_eq!(FakeSource::count(&source.closes), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_await_all_drains_after_external_cancel() {
    let factory = Arc::new(FakeFactory::new().with("room-a", FakeSource::new()));

    let handle = SlotScheduler::new(config(), factory)
        .with_clock(TestClock::at(morning()))
        .start(vec![
            target("room-a", 25, &["19:00"]),
            target("room-a", 26, &["19:00"]),
        ])
        .await
        .unwrap();

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        token.cancel();
    });

    let results = handle.await_all().await;
    assert_eq!(
        reasons(&results),
        vec![StopReason::Cancelled, StopReason::Cancelled]
    );
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_spawns_nothing() {
    let mut factory = MockFactory::new();
    factory.expect_open().never();
    let factory = Arc::new(factory);

    let mut config = config();
    config.polling_interval = Duration::from_millis(200);
    let err = SlotScheduler::new(config, factory.clone())
        .start(vec![target("room-a", 25, &["19:00"])])
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        SchedulerError::Configuration(ConfigError::Invalid { .. })
    ));

    let err = SlotScheduler::new(crate::application::test_support::config(), factory)
        .start(Vec::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        SchedulerError::Configuration(ConfigError::NoTargets)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_store_load_failure_is_fatal() {
    let mut store = MockStore::new();
    store.expect_prune_before().returning(|_| Ok(0));
    store
        .expect_load_won()
        .times(1)
        .returning(|| Err(DomainError::Repository("disk unavailable".to_string())));
    store.expect_record_won().never();
    let factory = Arc::new(FakeFactory::new().with("room-a", FakeSource::always_available()));

    let err = SlotScheduler::new(config(), factory.clone())
        .with_clock(TestClock::at(morning()))
        .with_store(Arc::new(store))
        .start(vec![target("room-a", 25, &["19:00"])])
        .await
        .err()
        .unwrap();

    assert!(matches!(err, SchedulerError::Resume(DomainError::Repository(_))));
    assert_eq!(FakeSource::count(&factory.source("room-a").opens), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_ceiling_limits_concurrent_sessions() {
    let mut config = config();
    config.pool.ceiling = Some(1);
    let factory = Arc::new(FakeFactory::new().with("room-a", FakeSource::always_available()));

    let handle = SlotScheduler::new(config, factory.clone())
        .with_clock(TestClock::at(morning()))
        .start(vec![
            target("room-a", 25, &["19:00"]),
            target("room-a", 26, &["19:00"]),
            target("room-a", 27, &["19:00"]),
        ])
        .await
        .unwrap();
    assert_eq!(handle.worker_count(), 1);

    let results = handle.await_all().await;
    assert!(results.iter().all(|r| r.succeeded));

    let source = factory.source("room-a");
    assert_eq!(FakeSource::count(&source.opens), 3);
    assert_eq!(FakeSource::count(&source.max_active), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_worker_reports_aborted() {
    let factory = Arc::new(
        FakeFactory::new()
            .with("room-a", FakeSource::new().probe_with(|_, _| panic!("probe exploded")))
            .with("room-b", FakeSource::always_available()),
    );

    let handle = SlotScheduler::new(config(), factory)
        .with_clock(TestClock::at(morning()))
        .start(vec![
            target("room-a", 25, &["19:00"]),
            target("room-b", 26, &["19:00"]),
        ])
        .await
        .unwrap();
    let results = handle.await_all().await;

    assert_eq!(reasons(&results), vec![StopReason::Aborted, StopReason::Won]);
    assert_eq!(results[0].worker, WorkerId::new(1));
}

#[tokio::test(start_paused = true)]
async fn test_panic_while_holding_claim_releases_date_for_peers() {
    let factory = Arc::new(
        FakeFactory::new()
            .with(
                "room-a",
                FakeSource::always_available().acquire_with(|_, _| panic!("acquire exploded")),
            )
            .with(
                "room-b",
                FakeSource::new().probe_with(|n, _| {
                    Ok(if n >= 2 {
                        ProbeOutcome::Available
                    } else {
                        ProbeOutcome::Unavailable
                    })
                }),
            ),
    );

    let handle = SlotScheduler::new(config(), factory.clone())
        .with_clock(TestClock::at(morning()))
        .start(vec![
            target("room-a", 25, &["19:00"]),
            target("room-b", 25, &["19:00"]),
        ])
        .await
        .unwrap();
    let registry = handle.registry();
    let results = handle.await_all().await;

    assert_eq!(reasons(&results), vec![StopReason::Aborted, StopReason::Won]);
    assert_eq!(FakeSource::count(&factory.source("room-b").acquires), 1);
    assert_eq!(
        registry.winner(date(25)).map(|w| w.source),
        Some(SourceId::from_string("room-b"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_update_window_wakes_gated_workers() {
    let mut config = config();
    config.window = MonitoringWindow::new(true, 9, 20, 0).unwrap();
    let base = Utc.with_ymd_and_hms(2026, 10, 18, 3, 0, 0).unwrap();
    let factory = Arc::new(FakeFactory::new().with("room-a", FakeSource::always_available()));

    let handle = SlotScheduler::new(config, factory)
        .with_clock(TestClock::at(base))
        .start(vec![target("room-a", 25, &["19:00"])])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.update_window(MonitoringWindow::always_open());
    let results = handle.await_all().await;

    assert_eq!(reasons(&results), vec![StopReason::Won]);
    assert_eq!(results[0].finished_at, base + chrono::Duration::seconds(10));
}
