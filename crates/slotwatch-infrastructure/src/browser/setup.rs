use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::task::JoinHandle;

use slotwatch_domain::SlotError;

use crate::config::TimeoutConfig;

/// Environment variable that overrides browser discovery.
pub const BROWSER_PATH_ENV: &str = "SLOTWATCH_CHROME";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headed: bool,
    pub proxy_url: Option<String>,
}

/// A running browser and everything needed to tear it down.
pub(super) struct LaunchedBrowser {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub profile_dir: PathBuf,
}

impl Drop for LaunchedBrowser {
    fn drop(&mut self) {
        // Best effort when dropped without cleanup_browser, e.g. an open()
        // cut short by a timeout. The browser kills its own child process.
        self.handler_task.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove profile directory {:?}: {}", self.profile_dir, e);
            }
        }
    }
}

/// Find an installed Chromium-based browser
pub fn find_browser() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(BROWSER_PATH_ENV).map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
    }

    #[cfg_attr(not(target_os = "windows"), allow(unused_mut))]
    let mut candidates: Vec<PathBuf> = [
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/brave-browser",
        "/usr/bin/microsoft-edge",
        "/snap/bin/chromium",
        "/opt/google/chrome/chrome",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    #[cfg(target_os = "windows")]
    {
        candidates.push(PathBuf::from(
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        ));
        candidates.push(PathBuf::from(
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ));
        candidates.push(PathBuf::from(
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ));
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            candidates.push(PathBuf::from(local).join(r"Google\Chrome\Application\chrome.exe"));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Unique profile directory so concurrent workers never share a lock file.
pub(super) fn profile_dir() -> PathBuf {
    std::env::temp_dir().join(format!("slotwatch-profile-{}", uuid::Uuid::new_v4()))
}

/// Launch a browser with its own profile under the launch timeout.
pub(super) async fn launch_browser(
    label: &str,
    options: &LaunchOptions,
    timeouts: &TimeoutConfig,
) -> Result<LaunchedBrowser, SlotError> {
    let browser_path = find_browser().ok_or_else(|| {
        let msg = "No Chromium-based browser found. Install Google Chrome, Chromium, Brave or Microsoft Edge";
        error!("[{}] {}", label, msg);
        SlotError::SessionBroken(msg.to_string())
    })?;

    let profile_dir = profile_dir();
    std::fs::create_dir_all(&profile_dir).map_err(|e| {
        SlotError::SessionBroken(format!("Failed to create profile directory: {}", e))
    })?;

    info!(
        "[{}] Launching {:?} with profile {:?}",
        label, browser_path, profile_dir
    );

    let mut builder = BrowserConfig::builder()
        .window_size(1280, 900)
        .no_sandbox()
        .user_data_dir(&profile_dir)
        .chrome_executable(&browser_path);

    if let Some(proxy_url) = options.proxy_url.as_deref() {
        info!("[{}] Launching browser with proxy: {}", label, proxy_url);
        builder = builder.arg(format!("--proxy-server={}", proxy_url));
    }

    if options.headed {
        builder = builder.with_head();
    }

    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            let _ = std::fs::remove_dir_all(&profile_dir);
            return Err(SlotError::SessionBroken(format!(
                "Failed to build browser config: {}",
                e
            )));
        }
    };

    let (browser, mut handler) =
        match tokio::time::timeout(timeouts.browser_launch, Browser::launch(config)).await {
            Ok(Ok(launched)) => launched,
            Ok(Err(e)) => {
                let _ = std::fs::remove_dir_all(&profile_dir);
                error!("[{}] Failed to launch browser: {}", label, e);
                return Err(SlotError::SessionBroken(format!(
                    "Failed to launch browser: {}",
                    e
                )));
            }
            Err(_) => {
                let _ = std::fs::remove_dir_all(&profile_dir);
                error!(
                    "[{}] Browser launch timed out after {:?}",
                    label, timeouts.browser_launch
                );
                return Err(SlotError::Timeout {
                    operation: "browser launch",
                    after: timeouts.browser_launch,
                });
            }
        };

    info!("[{}] Browser launched", label);

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    Ok(LaunchedBrowser {
        browser,
        handler_task,
        profile_dir,
    })
}
