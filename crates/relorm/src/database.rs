//! Connection ownership and the statement lifecycle seen by hooks and monitors.

use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::monitor::{
    CompositeHook, ExecMode, HookAction, NoopMonitor, QueryContext, QueryHook, QueryMonitor, QueryResult,
};
use crate::schema::SchemaCache;
use crate::value::Value;
use rusqlite::Connection;
use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An SQLite connection with hooks, monitoring and a schema cache.
///
/// Access is single-threaded: the connection is owned, not shared, and nothing here locks.
pub struct Database {
    conn: Connection,
    config: DatabaseConfig,
    monitor: Arc<dyn QueryMonitor>,
    hook: Option<Arc<dyn QueryHook>>,
    pub(crate) schema: RefCell<SchemaCache>,
}

impl Database {
    /// Wrap an open connection, applying the default configuration.
    pub fn new(conn: Connection) -> OrmResult<Self> {
        let db = Self {
            conn,
            config: DatabaseConfig::default(),
            monitor: Arc::new(NoopMonitor),
            hook: None,
            schema: RefCell::new(SchemaCache::default()),
        };
        db.apply_config()?;
        Ok(db)
    }

    /// Open a database file.
    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        Self::new(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> OrmResult<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: DatabaseConfig) -> OrmResult<Self> {
        self.config = config;
        self.apply_config()?;
        Ok(self)
    }

    fn apply_config(&self) -> OrmResult<()> {
        self.conn
            .set_prepared_statement_cache_capacity(self.config.statement_cache_capacity);
        self.conn
            .pragma_update(None, "foreign_keys", self.config.foreign_keys)?;
        Ok(())
    }

    /// Set the query monitor.
    pub fn with_monitor<M: QueryMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    /// Set the query monitor from an Arc.
    pub fn with_monitor_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Set a query hook, replacing any previous one.
    pub fn with_hook<H: QueryHook + 'static>(mut self, hook: H) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Add a query hook.
    ///
    /// If a hook is already set, this composes it with the new hook (existing first).
    pub fn add_hook<H: QueryHook + 'static>(self, hook: H) -> Self {
        self.add_hook_arc(Arc::new(hook))
    }

    /// Add a query hook from an `Arc`.
    pub fn add_hook_arc(mut self, hook: Arc<dyn QueryHook>) -> Self {
        self.hook = Some(match self.hook.take() {
            None => hook,
            Some(existing) => Arc::new(CompositeHook::new().add_arc(existing).add_arc(hook)),
        });
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn is_monitoring_enabled(&self) -> bool {
        self.config.monitoring_enabled
    }

    /// Run several statements without hooks or monitoring (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> OrmResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| OrmError::engine(e, sql, &[]))
    }

    /// Run one statement through hooks and monitors, returning the number of changed rows.
    pub fn execute(&self, sql: &str, arguments: &[Value]) -> OrmResult<u64> {
        let mut ctx = QueryContext::new(sql, arguments.len(), ExecMode::OneShot);
        self.will_execute(&mut ctx)?;

        let started = Instant::now();
        let outcome = self
            .conn
            .prepare_cached(&ctx.exec_sql)
            .and_then(|mut stmt| stmt.execute(rusqlite::params_from_iter(arguments.iter())));
        match outcome {
            Ok(_) => {
                let changes = self.changes();
                self.did_execute(&ctx, started.elapsed(), QueryResult::Affected(changes));
                Ok(changes)
            }
            Err(e) => {
                let err = OrmError::engine(e, ctx.exec_sql.clone(), arguments);
                self.did_fail(&ctx, started.elapsed(), &err);
                Err(err)
            }
        }
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> u64 {
        self.conn.changes() as u64
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Run hooks before a statement starts.
    ///
    /// What a hook may do depends on `ctx.mode`: a cursor cannot be rewritten or vetoed.
    pub(crate) fn will_execute(&self, ctx: &mut QueryContext) -> OrmResult<()> {
        let action = match &self.hook {
            Some(hook) => hook.before_query(ctx),
            None => HookAction::Continue,
        };
        match (action, ctx.mode) {
            (HookAction::Continue, _) => {}
            (HookAction::ModifySql { exec_sql, .. }, ExecMode::Cursor) => {
                return Err(OrmError::usage(format!(
                    "hook rewrote an already prepared statement to `{exec_sql}`"
                )));
            }
            (HookAction::ModifySql { exec_sql, canonical_sql }, ExecMode::OneShot) => {
                ctx.rewrite(exec_sql, canonical_sql);
            }
            (HookAction::Abort(reason), ExecMode::Cursor) => {
                return Err(OrmError::usage(format!("cursor vetoed by hook: {reason}")));
            }
            (HookAction::Abort(reason), ExecMode::OneShot) => {
                return Err(OrmError::validation(format!("Query aborted by hook: {reason}")));
            }
        }
        if self.config.monitoring_enabled {
            self.monitor.on_query_start(ctx);
        }
        Ok(())
    }

    pub(crate) fn did_execute(&self, ctx: &QueryContext, duration: Duration, result: QueryResult) {
        self.report_result(ctx, duration, &result);
    }

    pub(crate) fn did_fail(&self, ctx: &QueryContext, duration: Duration, error: &OrmError) {
        self.report_result(ctx, duration, &QueryResult::error(error.to_string()));
    }

    pub(crate) fn did_abandon(&self, ctx: &QueryContext, duration: Duration, rows: usize) {
        self.report_result(ctx, duration, &QueryResult::Abandoned(rows));
    }

    fn report_result(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        if !self.config.monitoring_enabled {
            return;
        }

        if let Some(hook) = &self.hook {
            hook.after_query(ctx, duration, result);
        }

        self.monitor.on_query_complete(ctx, duration, result);

        if self
            .config
            .slow_query_threshold
            .is_some_and(|threshold| duration > threshold)
        {
            self.monitor.on_slow_query(ctx, duration);
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .field("config", &self.config)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::StatsMonitor;
    use std::sync::Mutex;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, x INTEGER)")
            .unwrap();
        db
    }

    #[test]
    fn execute_reports_changes_to_monitor() {
        let stats = Arc::new(StatsMonitor::new());
        let db = db()
            .with_config(DatabaseConfig::new().enable_monitoring())
            .unwrap()
            .with_monitor_arc(stats.clone());

        let changed = db
            .execute("INSERT INTO t (x) VALUES (?), (?)", &[1.into(), 2.into()])
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(db.changes(), 2);

        let snapshot = stats.stats();
        assert_eq!(snapshot.insert_count, 1);
        assert_eq!(snapshot.total_queries, 1);
    }

    #[test]
    fn monitoring_disabled_skips_monitor() {
        struct FailMonitor;
        impl QueryMonitor for FailMonitor {
            fn on_query_complete(&self, _: &QueryContext, _: Duration, _: &QueryResult) {
                panic!("should not be called when monitoring is disabled");
            }
        }

        let db = db().with_monitor(FailMonitor);
        db.execute("INSERT INTO t (x) VALUES (1)", &[]).unwrap();
    }

    #[test]
    fn one_shot_honours_modified_sql() {
        struct Redirect;
        impl QueryHook for Redirect {
            fn before_query(&self, _ctx: &QueryContext) -> HookAction {
                HookAction::ModifySql {
                    exec_sql: "INSERT INTO t (x) VALUES (42)".to_string(),
                    canonical_sql: None,
                }
            }
        }

        let db = db().with_hook(Redirect);
        db.execute("INSERT INTO t (x) VALUES (1)", &[]).unwrap();
        let x: i64 = db
            .connection()
            .query_row("SELECT x FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(x, 42);
    }

    #[test]
    fn one_shot_abort_is_validation_error() {
        struct Block;
        impl QueryHook for Block {
            fn before_query(&self, _ctx: &QueryContext) -> HookAction {
                HookAction::Abort("read only".to_string())
            }
        }

        let err = db()
            .with_hook(Block)
            .execute("DELETE FROM t", &[])
            .unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }

    #[test]
    fn engine_failures_carry_sql_and_reach_hooks() {
        #[derive(Default)]
        struct Capture(Mutex<Vec<QueryResult>>);
        impl QueryHook for Capture {
            fn after_query(&self, _ctx: &QueryContext, _d: Duration, result: &QueryResult) {
                self.0.lock().unwrap().push(result.clone());
            }
        }

        let capture = Arc::new(Capture::default());
        let db = db()
            .with_config(DatabaseConfig::new().enable_monitoring())
            .unwrap()
            .add_hook_arc(capture.clone());

        let err = db
            .execute("INSERT INTO missing (x) VALUES (?)", &[Value::Integer(1)])
            .unwrap_err();
        assert_eq!(err.sql(), Some("INSERT INTO missing (x) VALUES (?)"));
        assert!(capture.0.lock().unwrap()[0].is_error());
    }

    #[test]
    fn constraint_violations_are_classified() {
        let db = db();
        db.execute("INSERT INTO t (id, x) VALUES (1, 1)", &[]).unwrap();
        let err = db
            .execute("INSERT INTO t (id, x) VALUES (1, 2)", &[])
            .unwrap_err();
        assert!(err.is_unique_violation());
    }
}
