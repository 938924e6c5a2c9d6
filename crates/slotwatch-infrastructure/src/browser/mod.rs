//! Browser-backed session resource.
//!
//! One chromiumoxide browser per worker, each with its own throwaway
//! profile. Document-level work (navigation, login, element lookup) is
//! delegated to a [`PageDriver`].

mod cleanup;
mod setup;

pub use setup::{find_browser, LaunchOptions, BROWSER_PATH_ENV};

use async_trait::async_trait;
use chromiumoxide::Page;
use chrono::NaiveDate;
use log::{info, warn};
use std::sync::Arc;

use slotwatch_domain::session::{
    AcquireResult, ProbeOutcome, Reservation, SessionFactory, SlotError, SlotSession,
};
use slotwatch_domain::{SourceId, Timeslot};

use crate::config::{Credentials, TimeoutConfig};
use cleanup::cleanup_browser;
use setup::{launch_browser, LaunchedBrowser};

/// Page-level operations for a specific booking site.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to the source and sign in.
    async fn prepare(
        &self,
        page: &Page,
        source: &SourceId,
        credentials: &Credentials,
    ) -> Result<(), SlotError>;

    async fn probe(
        &self,
        page: &Page,
        date: NaiveDate,
        timeslot: &Timeslot,
    ) -> Result<ProbeOutcome, SlotError>;

    async fn acquire(
        &self,
        page: &Page,
        date: NaiveDate,
        timeslot: &Timeslot,
    ) -> Result<AcquireResult, SlotError>;

    async fn confirm(&self, page: &Page, reservation: &Reservation) -> Result<bool, SlotError>;
}

pub struct BrowserSessionFactory<D: PageDriver> {
    driver: Arc<D>,
    credentials: Credentials,
    options: LaunchOptions,
    timeouts: TimeoutConfig,
}

impl<D: PageDriver> BrowserSessionFactory<D> {
    pub fn new(driver: Arc<D>, credentials: Credentials) -> Self {
        Self {
            driver,
            credentials,
            options: LaunchOptions::default(),
            timeouts: TimeoutConfig::default(),
        }
    }

    pub fn with_options(mut self, options: LaunchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

#[async_trait]
impl<D: PageDriver + 'static> SessionFactory for BrowserSessionFactory<D> {
    async fn open(&self, source: &SourceId) -> Result<Box<dyn SlotSession>, SlotError> {
        let label = source.to_string();
        let launched = launch_browser(&label, &self.options, &self.timeouts).await?;

        let opened = launched.browser.new_page("about:blank").await;
        let page = match opened {
            Ok(page) => page,
            Err(e) => {
                cleanup_browser(launched, &label, &self.timeouts).await;
                return Err(SlotError::SessionBroken(format!("Failed to open page: {}", e)));
            }
        };

        if let Err(e) = self.driver.prepare(&page, source, &self.credentials).await {
            warn!("[{}] Page preparation failed: {}", label, e);
            cleanup_browser(launched, &label, &self.timeouts).await;
            return Err(e);
        }

        info!("[{}] Session ready", label);
        Ok(Box::new(BrowserSession {
            label,
            driver: Arc::clone(&self.driver),
            page,
            launched: Some(launched),
            timeouts: self.timeouts.clone(),
        }))
    }
}

pub struct BrowserSession<D: PageDriver> {
    label: String,
    driver: Arc<D>,
    page: Page,
    launched: Option<LaunchedBrowser>,
    timeouts: TimeoutConfig,
}

fn closed_error() -> SlotError {
    SlotError::SessionBroken("session already closed".to_string())
}

#[async_trait]
impl<D: PageDriver + 'static> SlotSession for BrowserSession<D> {
    async fn healthcheck(&mut self) -> bool {
        let Some(launched) = self.launched.as_ref() else {
            return false;
        };
        if launched.handler_task.is_finished() {
            return false;
        }
        matches!(
            tokio::time::timeout(self.timeouts.healthcheck, launched.browser.version()).await,
            Ok(Ok(_))
        )
    }

    async fn probe(&mut self, date: NaiveDate, timeslot: &Timeslot) -> Result<ProbeOutcome, SlotError> {
        if self.launched.is_none() {
            return Err(closed_error());
        }
        self.driver.probe(&self.page, date, timeslot).await
    }

    async fn acquire(
        &mut self,
        date: NaiveDate,
        timeslot: &Timeslot,
    ) -> Result<AcquireResult, SlotError> {
        if self.launched.is_none() {
            return Err(closed_error());
        }
        self.driver.acquire(&self.page, date, timeslot).await
    }

    async fn confirm(&mut self, reservation: &Reservation) -> Result<bool, SlotError> {
        if self.launched.is_none() {
            return Err(closed_error());
        }
        self.driver.confirm(&self.page, reservation).await
    }

    async fn close(&mut self) {
        if let Some(launched) = self.launched.take() {
            cleanup_browser(launched, &self.label, &self.timeouts).await;
        }
    }
}
