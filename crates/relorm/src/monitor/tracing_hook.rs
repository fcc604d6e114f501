use super::clip_sql;
use super::types::{HookAction, QueryContext, QueryHook, QueryResult};
use std::time::Duration;
use tracing::Level;

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// Emits a `relorm.sql` event before every statement and, optionally, one with its outcome.
///
/// The first event fires regardless of [`DatabaseConfig`](crate::DatabaseConfig); the outcome
/// event needs monitoring enabled. Failures are reported at `WARN` whatever the level.
#[derive(Debug, Clone)]
pub struct TracingSqlHook {
    pub level: Level,
    pub log_outcome: bool,
    /// Clip SQL to this many bytes; `None` prints it whole.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingSqlHook {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            log_outcome: true,
            max_sql_length: Some(200),
        }
    }
}

impl TracingSqlHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(self, level: Level) -> Self {
        Self { level, ..self }
    }

    pub fn log_outcome(self, log_outcome: bool) -> Self {
        Self { log_outcome, ..self }
    }

    pub fn max_sql_length(self, max_sql_length: usize) -> Self {
        Self {
            max_sql_length: Some(max_sql_length),
            ..self
        }
    }

    pub fn no_truncate(self) -> Self {
        Self {
            max_sql_length: None,
            ..self
        }
    }
}

impl QueryHook for TracingSqlHook {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        emit_at_level!(
            self.level,
            target: "relorm.sql",
            kind = ?ctx.query_type,
            mode = ?ctx.mode,
            params = ctx.param_count,
            sql = %clip_sql(&ctx.exec_sql, self.max_sql_length),
        );
        HookAction::Continue
    }

    fn after_query(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        if !self.log_outcome {
            return;
        }
        let level = if result.is_error() { Level::WARN } else { self.level };
        emit_at_level!(
            level,
            target: "relorm.sql",
            kind = ?ctx.query_type,
            elapsed = ?duration,
            outcome = %result,
            sql = %clip_sql(&ctx.canonical_sql, self.max_sql_length),
        );
    }
}
