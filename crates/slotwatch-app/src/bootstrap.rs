//! Process wiring: logging, configuration, persistence and the scheduler.

use anyhow::Context;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use slotwatch_domain::{
    Clock, OutcomeStore, RunResult, SchedulerConfig, SessionFactory, SystemClock, Target,
};
use slotwatch_infrastructure::browser::{BrowserSessionFactory, LaunchOptions, PageDriver};
use slotwatch_infrastructure::config::{AppConfig, Credentials};
use slotwatch_infrastructure::logging;
use slotwatch_infrastructure::persistence::JsonOutcomeStore;

use crate::application::events::{LoggingListener, RecordingListener};
use crate::application::services::SlotScheduler;

/// Everything a run needs, resolved from one data directory.
pub struct RunPlan {
    pub data_dir: PathBuf,
    pub config: SchedulerConfig,
    pub targets: Vec<Target>,
    pub credentials: Credentials,
    pub launch: LaunchOptions,
    pub store: Arc<JsonOutcomeStore>,
}

/// Initialise logging and load the configuration found in `data_dir`.
///
/// Configuration problems surface here, before any browser is launched.
pub fn prepare(data_dir: &Path, clock: &dyn Clock) -> anyhow::Result<RunPlan> {
    let started_at = Instant::now();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    logging::init_logger(data_dir.join("logs")).context("Failed to initialize logger")?;
    info!(
        "✓ Logger ready at {} ({}ms)",
        data_dir.display(),
        started_at.elapsed().as_millis()
    );

    let started_at = Instant::now();
    let app_config = AppConfig::load_or_default(data_dir)?;
    let credentials = app_config.credentials()?;
    let launch = LaunchOptions {
        headed: app_config.browser.headed,
        proxy_url: app_config.browser.proxy_url.clone(),
    };
    let today = app_config.today(clock.now())?;
    let (config, targets) = app_config.into_plan(today)?;
    info!(
        "✓ Configuration loaded: {} target(s) from {} ({}ms)",
        targets.len(),
        AppConfig::path_in(data_dir).display(),
        started_at.elapsed().as_millis()
    );

    let store = Arc::new(JsonOutcomeStore::in_dir(data_dir));
    info!("✓ Outcome store at {}", store.path().display());

    Ok(RunPlan {
        data_dir: data_dir.to_path_buf(),
        config,
        targets,
        credentials,
        launch,
        store,
    })
}

/// Run the scheduler until every target settles or `shutdown` resolves.
///
/// Wins are persisted to `store` and logged. Workers still running when the
/// grace period after `shutdown` runs out are reported as an error.
pub async fn run_until_settled(
    config: SchedulerConfig,
    targets: Vec<Target>,
    factory: Arc<dyn SessionFactory>,
    store: Arc<dyn OutcomeStore>,
    clock: Arc<dyn Clock>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<Vec<RunResult>> {
    let handle = SlotScheduler::new(config, factory)
        .with_clock(Arc::clone(&clock))
        .with_store(Arc::clone(&store))
        .with_listener(Arc::new(RecordingListener::new(store, Arc::clone(&clock))))
        .with_listener(Arc::new(LoggingListener))
        .start(targets)
        .await?;

    let token = handle.cancellation_token();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = shutdown => {
                info!("🛑 Shutdown requested");
                token.cancel();
            }
        }
    });

    let report = handle.await_report().await;
    watcher.abort();
    let results = report.into_result()?;

    let won = results.iter().filter(|r| r.succeeded).count();
    info!(won, total = results.len(), "Run finished");
    Ok(results)
}

/// Drive real browsers through `driver` until done or Ctrl-C.
pub async fn run_with_driver<D: PageDriver + 'static>(
    plan: RunPlan,
    driver: Arc<D>,
) -> anyhow::Result<Vec<RunResult>> {
    info!("Starting run from {}", plan.data_dir.display());
    let factory = BrowserSessionFactory::new(driver, plan.credentials).with_options(plan.launch);

    let interrupted = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    run_until_settled(
        plan.config,
        plan.targets,
        Arc::new(factory),
        plan.store,
        Arc::new(SystemClock),
        interrupted,
    )
    .await
}
