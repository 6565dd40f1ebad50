//! Client configuration.

use std::time::Duration;

/// Default API base URL when none is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_READY_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`BingoApp`](crate::app::BingoApp) and its components.
///
/// Construct with [`BingoConfig::new`] or [`BingoConfig::from_env`], then
/// adjust timers with the `with_*` builders. The defaults match the
/// production server behavior; tests shorten them.
#[derive(Debug, Clone)]
pub struct BingoConfig {
    /// Base URL of the bingo API server, without a trailing slash.
    pub api_base_url: String,
    /// Interval between liveness probes.
    pub probe_interval: Duration,
    /// Per-probe request timeout. Must be shorter than `probe_interval`.
    pub probe_timeout: Duration,
    /// Fixed delay between push channel reconnect attempts.
    pub reconnect_delay: Duration,
    /// Reconnect attempts after the initial connect before giving up.
    pub max_reconnect_attempts: u32,
    /// Upper bound on how long a navigation decision waits for the session
    /// to become ready.
    pub ready_wait_timeout: Duration,
}

impl BingoConfig {
    /// Creates a configuration pointing at the given API base URL.
    ///
    /// A trailing slash on the URL is stripped so endpoint paths can be
    /// appended verbatim.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let mut api_base_url = api_base_url.into();
        while api_base_url.ends_with('/') {
            api_base_url.pop();
        }
        Self {
            api_base_url,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ready_wait_timeout: DEFAULT_READY_WAIT_TIMEOUT,
        }
    }

    /// Reads the base URL from the `API_BASE_URL` environment variable,
    /// falling back to [`DEFAULT_API_BASE_URL`].
    pub fn from_env() -> Self {
        match std::env::var("API_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    /// Sets the liveness probe interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the per-probe request timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the delay between push channel reconnect attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the number of reconnect attempts before the push channel stays
    /// closed.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the bound on the navigation gate's readiness wait.
    pub fn with_ready_wait_timeout(mut self, timeout: Duration) -> Self {
        self.ready_wait_timeout = timeout;
        self
    }

    /// Derives the push channel URL: `http` becomes `ws`, `https` becomes
    /// `wss`, and the `/ws` path is appended.
    pub fn ws_url(&self) -> String {
        let base = &self.api_base_url;
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}/ws")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}/ws")
        } else {
            format!("{base}/ws")
        }
    }
}

impl Default for BingoConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BingoConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.probe_interval, Duration::from_secs(5));
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.ready_wait_timeout, Duration::from_secs(5));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = BingoConfig::new("https://bingo.example.com/");
        assert_eq!(config.api_base_url, "https://bingo.example.com");
        let config = BingoConfig::new("https://bingo.example.com///");
        assert_eq!(config.api_base_url, "https://bingo.example.com");
    }

    #[test]
    fn ws_url_scheme_derivation() {
        assert_eq!(
            BingoConfig::new("https://bingo.example.com").ws_url(),
            "wss://bingo.example.com/ws"
        );
        assert_eq!(
            BingoConfig::new("http://localhost:8080").ws_url(),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn builders() {
        let config = BingoConfig::default()
            .with_probe_interval(Duration::from_millis(50))
            .with_probe_timeout(Duration::from_millis(20))
            .with_reconnect_delay(Duration::from_millis(10))
            .with_max_reconnect_attempts(3)
            .with_ready_wait_timeout(Duration::from_millis(100));
        assert_eq!(config.probe_interval, Duration::from_millis(50));
        assert_eq!(config.probe_timeout, Duration::from_millis(20));
        assert_eq!(config.reconnect_delay, Duration::from_millis(10));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.ready_wait_timeout, Duration::from_millis(100));
    }
}
