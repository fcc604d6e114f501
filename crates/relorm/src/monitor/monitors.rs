use super::clip_sql;
use super::types::{HookAction, QueryContext, QueryHook, QueryMonitor, QueryResult, QueryType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Ignores everything. The default monitor of a [`Database`](crate::Database).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl QueryMonitor for NoopMonitor {
    fn on_query_complete(&self, _: &QueryContext, _: Duration, _: &QueryResult) {}
}

/// Writes one line per statement to stderr.
#[derive(Debug, Clone)]
pub struct LoggingMonitor {
    /// Statements faster than this are not printed.
    pub min_duration: Option<Duration>,
    /// SQL longer than this many bytes is clipped.
    pub max_sql_length: Option<usize>,
    pub prefix: String,
}

impl Default for LoggingMonitor {
    fn default() -> Self {
        Self {
            min_duration: None,
            max_sql_length: Some(200),
            prefix: String::from("[relorm]"),
        }
    }
}

impl LoggingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_duration(self, min_duration: Duration) -> Self {
        Self {
            min_duration: Some(min_duration),
            ..self
        }
    }

    pub fn max_sql_length(self, max_sql_length: usize) -> Self {
        Self {
            max_sql_length: Some(max_sql_length),
            ..self
        }
    }

    pub fn prefix(self, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..self
        }
    }

    /// The SQL as printed: the canonical text, followed by the executed text after a rewrite.
    pub(crate) fn line_sql(&self, ctx: &QueryContext) -> String {
        let canonical = clip_sql(&ctx.canonical_sql, self.max_sql_length);
        if ctx.is_rewritten() {
            let exec = clip_sql(&ctx.exec_sql, self.max_sql_length);
            format!("{canonical} (ran as {exec})")
        } else {
            canonical.into_owned()
        }
    }
}

impl QueryMonitor for LoggingMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        if matches!(self.min_duration, Some(min) if duration < min) {
            return;
        }
        eprintln!(
            "{} {:?}/{:?} {:?} {} :: {}",
            self.prefix,
            ctx.query_type,
            ctx.mode,
            duration,
            result,
            self.line_sql(ctx)
        );
    }

    fn on_slow_query(&self, ctx: &QueryContext, duration: Duration) {
        eprintln!("{} slow statement ({duration:?}) :: {}", self.prefix, self.line_sql(ctx));
    }
}

/// Aggregates counters across statements. Share it through an `Arc` to read [`StatsMonitor::stats`].
#[derive(Debug, Default)]
pub struct StatsMonitor {
    per_type: [AtomicU64; QueryType::COUNT],
    failed: AtomicU64,
    abandoned: AtomicU64,
    rows: AtomicU64,
    elapsed_nanos: AtomicU64,
    slowest: Mutex<Option<(Duration, String)>>,
}

/// A snapshot of [`StatsMonitor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Statements reported, whatever their outcome.
    pub total_queries: u64,
    pub failed_queries: u64,
    /// Cursors dropped before their last row.
    pub abandoned_queries: u64,
    /// Rows handed out by finished and abandoned reads.
    pub rows_fetched: u64,
    /// Sum of durations, saturating.
    pub total_duration: Duration,
    pub select_count: u64,
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    pub max_duration: Duration,
    /// Canonical SQL of the statement behind `max_duration`.
    pub slowest_query: Option<String>,
}

impl StatsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn count_of(&self, query_type: QueryType) -> u64 {
        self.per_type[query_type.index()].load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueryStats {
        let slowest = self.slowest.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let (max_duration, slowest_query) = match slowest {
            Some((duration, sql)) => (duration, Some(sql)),
            None => (Duration::ZERO, None),
        };
        QueryStats {
            total_queries: self.per_type.iter().map(|c| c.load(Ordering::Relaxed)).sum(),
            failed_queries: self.failed.load(Ordering::Relaxed),
            abandoned_queries: self.abandoned.load(Ordering::Relaxed),
            rows_fetched: self.rows.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed)),
            select_count: self.count_of(QueryType::Select),
            insert_count: self.count_of(QueryType::Insert),
            update_count: self.count_of(QueryType::Update),
            delete_count: self.count_of(QueryType::Delete),
            max_duration,
            slowest_query,
        }
    }

    pub fn reset(&self) {
        let counters = self
            .per_type
            .iter()
            .chain([&self.failed, &self.abandoned, &self.rows, &self.elapsed_nanos]);
        for counter in counters {
            counter.store(0, Ordering::Relaxed);
        }
        *self.slowest.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl QueryMonitor for StatsMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        self.per_type[ctx.query_type.index()].fetch_add(1, Ordering::Relaxed);

        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let before = self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
        if before.checked_add(nanos).is_none() {
            self.elapsed_nanos.store(u64::MAX, Ordering::Relaxed);
        }

        if result.is_error() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if matches!(result, QueryResult::Abandoned(_)) {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(rows) = result.rows() {
            self.rows.fetch_add(rows as u64, Ordering::Relaxed);
        }

        let mut slowest = self.slowest.lock().unwrap_or_else(PoisonError::into_inner);
        if slowest.as_ref().is_none_or(|(max, _)| duration > *max) {
            *slowest = Some((duration, ctx.canonical_sql.clone()));
        }
    }
}

/// Fans every event out to several monitors, in insertion order.
#[derive(Default)]
pub struct CompositeMonitor {
    monitors: Vec<Arc<dyn QueryMonitor>>,
}

impl CompositeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add<M: QueryMonitor + 'static>(self, monitor: M) -> Self {
        self.add_arc(Arc::new(monitor))
    }

    pub fn add_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }
}

impl QueryMonitor for CompositeMonitor {
    fn on_query_start(&self, ctx: &QueryContext) {
        self.monitors.iter().for_each(|m| m.on_query_start(ctx));
    }

    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        self.monitors
            .iter()
            .for_each(|m| m.on_query_complete(ctx, duration, result));
    }

    fn on_slow_query(&self, ctx: &QueryContext, duration: Duration) {
        self.monitors.iter().for_each(|m| m.on_slow_query(ctx, duration));
    }
}

/// Runs hooks in insertion order.
///
/// Each hook sees the SQL as rewritten by the ones before it. The first `Abort` wins.
#[derive(Default)]
pub struct CompositeHook {
    hooks: Vec<Arc<dyn QueryHook>>,
}

impl CompositeHook {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add<H: QueryHook + 'static>(self, hook: H) -> Self {
        self.add_arc(Arc::new(hook))
    }

    pub fn add_arc(mut self, hook: Arc<dyn QueryHook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl QueryHook for CompositeHook {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        let mut seen = ctx.clone();
        let mut rekeyed = false;
        for hook in &self.hooks {
            match hook.before_query(&seen) {
                HookAction::Continue => {}
                HookAction::ModifySql {
                    exec_sql,
                    canonical_sql,
                } => {
                    rekeyed |= canonical_sql.is_some();
                    seen.rewrite(exec_sql, canonical_sql);
                }
                abort @ HookAction::Abort(_) => return abort,
            }
        }
        if seen.exec_sql == ctx.exec_sql && !rekeyed {
            return HookAction::Continue;
        }
        HookAction::ModifySql {
            exec_sql: seen.exec_sql,
            canonical_sql: rekeyed.then_some(seen.canonical_sql),
        }
    }

    fn after_query(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        self.hooks
            .iter()
            .for_each(|h| h.after_query(ctx, duration, result));
    }
}
