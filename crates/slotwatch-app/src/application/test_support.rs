//! Deterministic collaborators for worker and scheduler tests.
//!
//! Everything here runs on tokio's paused clock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use slotwatch_domain::schedule::{MonitoringWindow, ReservationContact, SchedulerConfig};
use slotwatch_domain::session::{
    AcquireResult, ProbeOutcome, Reservation, SessionFactory, SlotError, SlotSession,
};
use slotwatch_domain::{Clock, SourceId, Target, Timeslot};

/// Wall clock that follows tokio's (paused) clock plus a manual skew.
pub struct TestClock {
    base: DateTime<Utc>,
    start: Instant,
    skew: Mutex<chrono::Duration>,
}

impl TestClock {
    pub fn at(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            start: Instant::now(),
            skew: Mutex::new(chrono::Duration::zero()),
        })
    }

    /// Jump the wall clock forward without monotonic time passing,
    /// as a suspended host would see it.
    pub fn suspend_for(&self, gap: Duration) {
        let gap = chrono::Duration::from_std(gap).unwrap();
        *self.skew.lock().unwrap() += gap;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed()).unwrap();
        self.base + elapsed + *self.skew.lock().unwrap()
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
}

pub fn slot(raw: &str) -> Timeslot {
    Timeslot::parse(raw).unwrap()
}

pub fn target(source: &str, day: u32, slots: &[&str]) -> Target {
    Target::new(
        SourceId::from_string(source),
        date(day),
        slots.iter().map(|s| slot(s)).collect(),
    )
}

pub fn config() -> SchedulerConfig {
    let mut config = SchedulerConfig::new(ReservationContact {
        name: "Hanako".to_string(),
        email: "hanako@example.test".to_string(),
    });
    config.window = MonitoringWindow::always_open();
    config
}

type ProbeFn = dyn Fn(usize, &Timeslot) -> Result<ProbeOutcome, SlotError> + Send + Sync;
type AcquireFn = dyn Fn(usize, &Timeslot) -> Result<AcquireResult, SlotError> + Send + Sync;
type ConfirmFn = dyn Fn(usize, &Timeslot) -> Result<bool, SlotError> + Send + Sync;
type OpenFn = dyn Fn(usize) -> Result<(), SlotError> + Send + Sync;

/// One scripted booking source. Callbacks receive the 0-based call index.
pub struct FakeSource {
    probe: Box<ProbeFn>,
    acquire: Box<AcquireFn>,
    confirm: Box<ConfirmFn>,
    open: Box<OpenFn>,
    healthy: bool,
    confirm_delay: Duration,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub probes: AtomicUsize,
    pub acquires: AtomicUsize,
    pub confirms: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            probe: Box::new(|_, _| Ok(ProbeOutcome::Unavailable)),
            acquire: Box::new(|_, _| Ok(AcquireResult::claimed())),
            confirm: Box::new(|_, _| Ok(true)),
            open: Box::new(|_| Ok(())),
            healthy: true,
            confirm_delay: Duration::ZERO,
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            acquires: AtomicUsize::new(0),
            confirms: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_available() -> Self {
        Self::new().probe_with(|_, _| Ok(ProbeOutcome::Available))
    }

    pub fn probe_with(
        mut self,
        f: impl Fn(usize, &Timeslot) -> Result<ProbeOutcome, SlotError> + Send + Sync + 'static,
    ) -> Self {
        self.probe = Box::new(f);
        self
    }

    pub fn acquire_with(
        mut self,
        f: impl Fn(usize, &Timeslot) -> Result<AcquireResult, SlotError> + Send + Sync + 'static,
    ) -> Self {
        self.acquire = Box::new(f);
        self
    }

    pub fn confirm_with(
        mut self,
        f: impl Fn(usize, &Timeslot) -> Result<bool, SlotError> + Send + Sync + 'static,
    ) -> Self {
        self.confirm = Box::new(f);
        self
    }

    pub fn open_with(
        mut self,
        f: impl Fn(usize) -> Result<(), SlotError> + Send + Sync + 'static,
    ) -> Self {
        self.open = Box::new(f);
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn slow_confirm(mut self, delay: Duration) -> Self {
        self.confirm_delay = delay;
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }

    /// Calls whose label starts with `prefix`, with their offset from `since`.
    pub fn calls(&self, prefix: &str, since: Instant) -> Vec<(Duration, String)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, call)| call.starts_with(prefix))
            .map(|(at, call)| (at.duration_since(since), call.clone()))
            .collect()
    }
}

struct FakeSession {
    source: Arc<FakeSource>,
    closed: bool,
}

#[async_trait]
impl SlotSession for FakeSession {
    async fn healthcheck(&mut self) -> bool {
        !self.closed && self.source.healthy
    }

    async fn probe(&mut self, _date: NaiveDate, timeslot: &Timeslot) -> Result<ProbeOutcome, SlotError> {
        let n = self.source.probes.fetch_add(1, Ordering::SeqCst);
        self.source.record(format!("probe {}", timeslot));
        (self.source.probe)(n, timeslot)
    }

    async fn acquire(&mut self, _date: NaiveDate, timeslot: &Timeslot) -> Result<AcquireResult, SlotError> {
        let n = self.source.acquires.fetch_add(1, Ordering::SeqCst);
        self.source.record(format!("acquire {}", timeslot));
        (self.source.acquire)(n, timeslot)
    }

    async fn confirm(&mut self, reservation: &Reservation) -> Result<bool, SlotError> {
        let n = self.source.confirms.fetch_add(1, Ordering::SeqCst);
        self.source.record(format!("confirm {}", reservation.timeslot));
        if !self.source.confirm_delay.is_zero() {
            tokio::time::sleep(self.source.confirm_delay).await;
        }
        (self.source.confirm)(n, &reservation.timeslot)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.source.closes.fetch_add(1, Ordering::SeqCst);
            self.source.active.fetch_sub(1, Ordering::SeqCst);
            self.source.record("close".to_string());
        }
    }
}

/// Routes each source id to its scripted [`FakeSource`].
#[derive(Default)]
pub struct FakeFactory {
    sources: HashMap<SourceId, Arc<FakeSource>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &str, fake: FakeSource) -> Self {
        self.sources.insert(SourceId::from_string(source), Arc::new(fake));
        self
    }

    pub fn source(&self, source: &str) -> Arc<FakeSource> {
        Arc::clone(&self.sources[&SourceId::from_string(source)])
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, source: &SourceId) -> Result<Box<dyn SlotSession>, SlotError> {
        let fake = self
            .sources
            .get(source)
            .cloned()
            .ok_or_else(|| SlotError::SessionBroken(format!("unknown source {}", source)))?;

        let n = fake.opens.fetch_add(1, Ordering::SeqCst);
        fake.record("open".to_string());
        (fake.open)(n)?;

        let active = fake.active.fetch_add(1, Ordering::SeqCst) + 1;
        fake.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(FakeSession {
            source: fake,
            closed: false,
        }))
    }
}
