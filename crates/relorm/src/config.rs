use std::time::Duration;

/// Connection settings, applied by [`Database::with_config`](crate::Database::with_config).
///
/// The defaults keep monitors silent, enforce foreign keys and cache 32 statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Gate for completion events: monitors, `after_query` hooks and slow-statement reports.
    pub monitoring_enabled: bool,
    /// Statements running longer than this also reach `on_slow_query`.
    pub slow_query_threshold: Option<Duration>,
    /// Size of rusqlite's prepared-statement cache; 0 turns it off.
    pub statement_cache_capacity: usize,
    /// Value of `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            monitoring_enabled: false,
            slow_query_threshold: None,
            statement_cache_capacity: 32,
            foreign_keys: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_monitoring(self) -> Self {
        Self {
            monitoring_enabled: true,
            ..self
        }
    }

    pub fn disable_monitoring(self) -> Self {
        Self {
            monitoring_enabled: false,
            ..self
        }
    }

    /// Report statements slower than `threshold`. Only effective with monitoring enabled.
    pub fn with_slow_query_threshold(self, threshold: Duration) -> Self {
        Self {
            slow_query_threshold: Some(threshold),
            ..self
        }
    }

    pub fn with_statement_cache_capacity(self, statement_cache_capacity: usize) -> Self {
        Self {
            statement_cache_capacity,
            ..self
        }
    }

    pub fn with_foreign_keys(self, foreign_keys: bool) -> Self {
        Self { foreign_keys, ..self }
    }
}
