//! Session configuration.
//!
//! Timing knobs for the renewal scheduler and the inactivity monitor, plus
//! the API base URL. Defaults suit the hosted Taskdeck service; embedders
//! override per instance.

use chrono::Duration;

/// Base URL of the hosted Taskdeck API
const DEFAULT_BASE_URL: &str = "https://api.taskdeck.io";

/// Seconds subtracted from the credential expiry when scheduling proactive
/// renewal. 5 minutes leaves room for the renewal round-trip to complete
/// before the old token actually lapses, even on a slow network.
const DEFAULT_SAFETY_MARGIN_SECS: i64 = 300;

/// Minutes of no user activity before the session is force-ended.
/// Credentials may still be valid at that point; the timeout fires anyway.
const DEFAULT_INACTIVITY_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    pub safety_margin: Duration,
    pub inactivity_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            safety_margin: Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
            inactivity_window: Duration::minutes(DEFAULT_INACTIVITY_WINDOW_MINUTES),
        }
    }
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn with_inactivity_window(mut self, window: Duration) -> Self {
        self.inactivity_window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.safety_margin, Duration::seconds(300));
        assert_eq!(config.inactivity_window, Duration::minutes(30));
    }

    #[test]
    fn test_builder_overrides() {
        let config = SessionConfig::new("http://localhost:8080")
            .with_safety_margin(Duration::seconds(60))
            .with_inactivity_window(Duration::minutes(5));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.safety_margin, Duration::seconds(60));
    }
}
