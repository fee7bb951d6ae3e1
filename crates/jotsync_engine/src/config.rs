//! Configuration for the sync engine and change watcher.

use jotsync_remote::normalize_path;
use std::time::Duration;

/// Configuration shared by the engine and the watcher.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Canonical document path, normalized.
    pub path: String,
    /// Prefix the watcher lists to discover changes.
    pub list_prefix: String,
    /// Protocol-level timeout for one long-poll call.
    pub poll_timeout: Duration,
    /// Retry behavior for transport failures.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration for the given canonical document path.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            list_prefix: String::new(),
            poll_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the listing prefix watched for changes.
    pub fn with_list_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.list_prefix = prefix.into();
        self
    }

    /// Sets the long-poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for retry behavior on transport failures.
///
/// Retries are unbounded; no transport failure is fatal. After
/// `degraded_after` consecutive failures the engine reports degraded
/// connectivity to its listener and keeps retrying at the capped delay.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
    /// Consecutive failures before signalling degraded connectivity.
    pub degraded_after: u32,
}

impl RetryConfig {
    /// Creates the default exponential backoff configuration.
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
            degraded_after: 5,
        }
    }

    /// Retries immediately with no delay and no degraded signal.
    ///
    /// This restores the original unbounded-immediate behavior; useful for
    /// tests and loopback stores.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
            degraded_after: u32::MAX,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the degraded-connectivity threshold.
    pub fn with_degraded_after(mut self, failures: u32) -> Self {
        self.degraded_after = failures;
        self
    }

    /// Calculates the delay before the given attempt (1-indexed; attempt 0
    /// means no failure has occurred and gets no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * time_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple deterministic "jitter" (no external RNG dependency).
fn time_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_normalizes_path() {
        let config = SyncConfig::new("Notes.TXT")
            .with_list_prefix("/")
            .with_poll_timeout(Duration::from_secs(60));

        assert_eq!(config.path, "/notes.txt");
        assert_eq!(config.list_prefix, "/");
        assert_eq!(config.poll_timeout, Duration::from_secs(60));
    }

    #[test]
    fn immediate_retry_has_no_delay() {
        let config = RetryConfig::immediate();
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(50), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Jitter makes exact values unpredictable; check bounds
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(150));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(6);
        assert!(delay <= Duration::from_millis(6250)); // 5s + 25% jitter
    }
}
