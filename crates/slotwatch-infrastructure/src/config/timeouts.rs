use std::time::Duration;

/// Timeouts for browser lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Browser launch timeout (default: 30 seconds)
    pub browser_launch: Duration,

    /// Browser close timeout (default: 5 seconds)
    pub browser_close: Duration,

    /// Healthcheck round-trip timeout (default: 5 seconds)
    pub healthcheck: Duration,

    /// Wait after close before removing the profile directory (default: 1 second)
    pub profile_settle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            browser_launch: Duration::from_secs(30),
            browser_close: Duration::from_secs(5),
            healthcheck: Duration::from_secs(5),
            profile_settle: Duration::from_secs(1),
        }
    }
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set browser launch timeout
    pub fn with_browser_launch(mut self, duration: Duration) -> Self {
        self.browser_launch = duration;
        self
    }

    /// Builder pattern: set browser close timeout
    pub fn with_browser_close(mut self, duration: Duration) -> Self {
        self.browser_close = duration;
        self
    }

    /// Builder pattern: set healthcheck timeout
    pub fn with_healthcheck(mut self, duration: Duration) -> Self {
        self.healthcheck = duration;
        self
    }

    /// Builder pattern: set profile settle delay
    pub fn with_profile_settle(mut self, duration: Duration) -> Self {
        self.profile_settle = duration;
        self
    }
}
