use log::{info, warn};

use super::setup::LaunchedBrowser;
use crate::config::TimeoutConfig;

/// Tear down a browser: close under timeout, kill on failure, stop the
/// event handler and remove the profile directory.
pub(super) async fn cleanup_browser(mut launched: LaunchedBrowser, label: &str, timeouts: &TimeoutConfig) {
    let browser = &mut launched.browser;
    let closed = match tokio::time::timeout(timeouts.browser_close, browser.close()).await {
        Ok(Ok(_)) => {
            info!("[{}] Browser closed", label);
            true
        }
        Ok(Err(e)) => {
            warn!("[{}] Failed to close browser: {}, killing", label, e);
            false
        }
        Err(_) => {
            warn!("[{}] Browser close timed out, killing", label);
            false
        }
    };

    if !closed {
        if let Some(Err(e)) = browser.kill().await {
            warn!("[{}] Failed to kill browser process: {}", label, e);
        }
    }

    launched.handler_task.abort();
    let profile_dir = launched.profile_dir.clone();

    // Chrome keeps the profile locked for a moment after exit
    tokio::time::sleep(timeouts.profile_settle).await;

    if let Err(first) = std::fs::remove_dir_all(&profile_dir) {
        tokio::time::sleep(timeouts.profile_settle).await;
        match std::fs::remove_dir_all(&profile_dir) {
            Ok(()) => info!("[{}] Cleaned up profile directory on retry", label),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[{}] Failed to remove profile directory {:?}: {} (first attempt: {})",
                label, profile_dir, e, first
            ),
        }
    } else {
        info!("[{}] Cleaned up profile directory", label);
    }
}
