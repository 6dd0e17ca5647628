//! Configuration management for Threadline
//!
//! Configuration is loaded from environment variables. All knobs have
//! conservative defaults so an empty environment yields a working dev setup.

use std::env;
use std::sync::{OnceLock, RwLock};

/// Read a configuration value from the environment.
///
/// Tests can install overrides via [`set_test_env_override`] without touching
/// the real process environment (which is global and racy under `cargo test`).
#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    if let Some(v) = test_env_override_value(key) {
        return Some(v);
    }
    env::var(key).ok()
}

static TEST_ENV_OVERRIDES: OnceLock<RwLock<Vec<(String, String)>>> = OnceLock::new();

fn test_env_override_value(key: &str) -> Option<String> {
    let overrides = TEST_ENV_OVERRIDES.get()?;
    let guard = overrides.read().unwrap_or_else(std::sync::PoisonError::into_inner);
    guard
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

/// Install a test-only environment override (last write wins).
pub fn set_test_env_override(key: &str, value: &str) {
    let overrides = TEST_ENV_OVERRIDES.get_or_init(|| RwLock::new(Vec::new()));
    let mut guard = overrides
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.push((key.to_string(), value.to_string()));
}

/// Clear all test-only environment overrides.
pub fn clear_test_env_overrides() {
    if let Some(overrides) = TEST_ENV_OVERRIDES.get() {
        let mut guard = overrides
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.clear();
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
    Test,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Threadline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment (`APP_ENVIRONMENT`).
    pub environment: AppEnvironment,

    /// Database URL (`DATABASE_URL`, `sqlite:///path/to/db.sqlite3`).
    pub database_url: String,

    /// Whether query instrumentation (slow-query log, per-table counters)
    /// is enabled (`QUERY_INSTRUMENTATION`).
    pub instrumentation_enabled: bool,

    /// Threshold above which a query is recorded in the slow-query log
    /// (`SLOW_QUERY_THRESHOLD_MS`).
    pub slow_query_threshold_ms: u64,

    /// Threads with fewer non-deleted messages than this are returned whole
    /// by the initial-window loader.
    pub initial_window_small_thread: usize,

    /// Upper bound on the unread tail fetched by the initial-window loader
    /// when anchoring at the viewer's last-seen timestamp.
    pub initial_window_max_unread: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: AppEnvironment::Development,
            database_url: "sqlite:///./threadline.sqlite3".to_string(),
            instrumentation_enabled: false,
            slow_query_threshold_ms: 100,
            initial_window_small_thread: 4,
            initial_window_max_unread: 50,
        }
    }
}

impl Config {
    /// Build a configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let environment = env_value("APP_ENVIRONMENT")
            .map_or(defaults.environment, |v| AppEnvironment::parse(&v));

        let database_url = env_value("DATABASE_URL").unwrap_or(defaults.database_url);

        let instrumentation_enabled = env_value("QUERY_INSTRUMENTATION")
            .map(|v| parse_bool(&v))
            .unwrap_or(defaults.instrumentation_enabled);

        let slow_query_threshold_ms = env_value("SLOW_QUERY_THRESHOLD_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.slow_query_threshold_ms);

        let initial_window_max_unread = env_value("INITIAL_WINDOW_MAX_UNREAD")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.initial_window_max_unread);

        Self {
            environment,
            database_url,
            instrumentation_enabled,
            slow_query_threshold_ms,
            initial_window_small_thread: defaults.initial_window_small_thread,
            initial_window_max_unread,
        }
    }

    /// Get the cached process-wide configuration, building it on first use.
    #[must_use]
    pub fn get() -> Self {
        {
            let guard = cached_config()
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(config) = guard.as_ref() {
                return config.clone();
            }
        }
        let mut guard = cached_config()
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get_or_insert_with(Self::from_env).clone()
    }

    /// Drop the cached configuration so the next [`Config::get`] re-reads the
    /// environment. Intended for tests.
    pub fn reset_cached() {
        let mut guard = cached_config()
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == AppEnvironment::Production
    }
}

fn cached_config() -> &'static RwLock<Option<Config>> {
    static CACHE: OnceLock<RwLock<Option<Config>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(None))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.initial_window_small_thread, 4);
        assert_eq!(config.initial_window_max_unread, 50);
        assert!(!config.instrumentation_enabled);
        assert!(config.database_url.starts_with("sqlite:"));
    }

    #[test]
    fn env_overrides_apply() {
        set_test_env_override("SLOW_QUERY_THRESHOLD_MS", "250");
        set_test_env_override("QUERY_INSTRUMENTATION", "true");
        set_test_env_override("INITIAL_WINDOW_MAX_UNREAD", "10");
        let config = Config::from_env();
        clear_test_env_overrides();

        assert_eq!(config.slow_query_threshold_ms, 250);
        assert!(config.instrumentation_enabled);
        assert_eq!(config.initial_window_max_unread, 10);
    }

    #[test]
    fn bad_numeric_values_fall_back_to_defaults() {
        set_test_env_override("SLOW_QUERY_THRESHOLD_MS", "not-a-number");
        let config = Config::from_env();
        clear_test_env_overrides();
        assert_eq!(config.slow_query_threshold_ms, 100);
    }

    #[test]
    fn environment_parse() {
        assert_eq!(
            AppEnvironment::parse("production"),
            AppEnvironment::Production
        );
        assert_eq!(AppEnvironment::parse("PROD"), AppEnvironment::Production);
        assert_eq!(AppEnvironment::parse("test"), AppEnvironment::Test);
        assert_eq!(
            AppEnvironment::parse("anything-else"),
            AppEnvironment::Development
        );
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
    }
}
