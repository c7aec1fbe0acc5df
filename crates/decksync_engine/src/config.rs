//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Default rows per chunk page.
pub const DEFAULT_CHUNK_SIZE: usize = 250;

/// Default tolerated clock difference between the peers.
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Configuration for collection sync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Client identification sent with `meta`.
    pub client_version: String,
    /// Maximum rows per chunk page.
    pub chunk_size: usize,
    /// Maximum tolerated clock difference.
    pub max_clock_skew: Duration,
    /// Whether to run `ANALYZE` after each session.
    pub maintenance: bool,
    /// Whether maintenance also runs `VACUUM`.
    pub vacuum: bool,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(client_version: impl Into<String>) -> Self {
        Self {
            client_version: client_version.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
            maintenance: true,
            vacuum: false,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sets the tolerated clock difference.
    pub fn with_max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    /// Enables or disables post-session maintenance.
    pub fn with_maintenance(mut self, maintenance: bool) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// Enables or disables `VACUUM` during maintenance.
    pub fn with_vacuum(mut self, vacuum: bool) -> Self {
        self.vacuum = vacuum;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(concat!("decksync,", env!("CARGO_PKG_VERSION")))
    }
}

/// Configuration for media sync.
#[derive(Debug, Clone)]
pub struct MediaSyncConfig {
    /// Maximum change entries fetched per page.
    pub changes_page: u32,
    /// Maximum files fetched per download request.
    pub download_batch: usize,
    /// Maximum entries sent per upload request.
    pub upload_batch: usize,
    /// Attempts before giving up on a session whose usn keeps moving.
    pub max_attempts: u32,
}

impl MediaSyncConfig {
    /// Creates a configuration with default batch sizes.
    pub fn new() -> Self {
        Self {
            changes_page: 250,
            download_batch: 25,
            upload_batch: 25,
            max_attempts: 3,
        }
    }

    /// Sets the download batch size.
    pub fn with_download_batch(mut self, size: usize) -> Self {
        self.download_batch = size.max(1);
        self
    }

    /// Sets the upload batch size.
    pub fn with_upload_batch(mut self, size: usize) -> Self {
        self.upload_batch = size.max(1);
        self
    }

    /// Sets the maximum number of session attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

impl Default for MediaSyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
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

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // up to 25%
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("test,1")
            .with_chunk_size(10)
            .with_max_clock_skew(Duration::from_secs(60))
            .with_vacuum(true);

        assert_eq!(config.client_version, "test,1");
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.max_clock_skew, Duration::from_secs(60));
        assert!(config.maintenance);
        assert!(config.vacuum);
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.max_clock_skew, Duration::from_secs(300));
        assert!(config.client_version.starts_with("decksync,"));
        assert_eq!(SyncConfig::new("x").with_chunk_size(0).chunk_size, 1);
    }

    #[test]
    fn media_config_builder() {
        let config = MediaSyncConfig::new()
            .with_download_batch(5)
            .with_upload_batch(2)
            .with_max_attempts(0);
        assert_eq!(config.download_batch, 5);
        assert_eq!(config.upload_batch, 2);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
