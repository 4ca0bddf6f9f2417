//! Configuration for the session store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;

/// Default snapshot location.
pub const DEFAULT_PATH: &str = "./session-store.db";

/// Default TTL in seconds (two weeks). Zero disables expiry.
pub const DEFAULT_TTL_SECS: u64 = 1_209_600;

/// Default interval between autosave flushes.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_millis(5000);

/// Callback invoked when a load or flush failure is handled internally.
pub type ErrorHook = Arc<dyn Fn(&StoreError) + Send + Sync>;

/// Configuration for the session store.
#[derive(Clone)]
pub struct StoreConfig {
    /// Where the snapshot is read from and flushed to.
    pub path: PathBuf,

    /// Time-to-live for session records. `None` disables expiry.
    pub ttl: Option<Duration>,

    /// Whether the periodic flush task runs.
    pub autosave: bool,

    /// Interval between autosave flushes (if enabled).
    pub autosave_interval: Duration,

    /// Interval between TTL sweeps. Defaults to the TTL itself.
    pub sweep_interval: Option<Duration>,

    /// Optional timeout for the initial snapshot load. If exceeded, the
    /// store transitions to its failed state.
    pub load_timeout: Option<Duration>,

    /// Optional failure-reporting callback. Errors are always logged via
    /// `tracing` regardless.
    pub error_hook: Option<ErrorHook>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            ttl: Some(Duration::from_secs(DEFAULT_TTL_SECS)),
            autosave: true,
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            sweep_interval: None,
            load_timeout: None,
            error_hook: None,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the snapshot location.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the TTL in seconds. Zero disables expiry entirely.
    pub fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.ttl = (secs != 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Set the TTL as a duration. A zero duration disables expiry,
    /// matching `with_ttl_secs(0)`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    /// Disable TTL expiry (records never expire).
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Enable or disable the periodic flush task.
    pub fn with_autosave(mut self, enabled: bool) -> Self {
        self.autosave = enabled;
        self
    }

    /// Set the autosave flush interval.
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    /// Override the TTL sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set a timeout for the initial snapshot load.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Set a failure-reporting callback.
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }

    /// Effective interval between TTL sweeps. `None` when expiry is off.
    pub fn effective_sweep_interval(&self) -> Option<Duration> {
        self.ttl?;
        self.sweep_interval.or(self.ttl)
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .field("autosave", &self.autosave)
            .field("autosave_interval", &self.autosave_interval)
            .field("sweep_interval", &self.sweep_interval)
            .field("load_timeout", &self.load_timeout)
            .field("has_error_hook", &self.error_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.path, PathBuf::from("./session-store.db"));
        assert_eq!(config.ttl, Some(Duration::from_secs(1_209_600)));
        assert!(config.autosave);
        assert_eq!(config.autosave_interval, Duration::from_millis(5000));
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let config = StoreConfig::new().with_ttl_secs(0);
        assert_eq!(config.ttl, None);
        assert_eq!(config.effective_sweep_interval(), None);

        // The duration setter agrees with the seconds setter.
        let config = StoreConfig::new().with_ttl(Duration::ZERO);
        assert_eq!(config.ttl, None);
        assert_eq!(config.effective_sweep_interval(), None);
    }

    #[test]
    fn test_sweep_interval_defaults_to_ttl() {
        let config = StoreConfig::new().with_ttl(Duration::from_secs(60));
        assert_eq!(
            config.effective_sweep_interval(),
            Some(Duration::from_secs(60))
        );

        let config = config.with_sweep_interval(Duration::from_secs(5));
        assert_eq!(
            config.effective_sweep_interval(),
            Some(Duration::from_secs(5))
        );
    }
}
