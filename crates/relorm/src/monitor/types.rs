use std::fmt;
use std::time::Duration;

/// Statement kind, read from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Select,
    /// `INSERT` or `REPLACE`.
    Insert,
    Update,
    Delete,
    Pragma,
    /// DDL and anything else.
    Other,
}

impl QueryType {
    pub(crate) const COUNT: usize = 6;

    /// Classify a statement by its first keyword.
    ///
    /// Leading whitespace, `--` and `/* */` comments are skipped. `WITH` prefixes are reported
    /// as [`QueryType::Select`]: the generator never emits data-modifying CTEs.
    pub fn from_sql(sql: &str) -> Self {
        let keyword = leading_keyword(sql);
        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" | "VALUES" => QueryType::Select,
            "INSERT" | "REPLACE" => QueryType::Insert,
            "UPDATE" => QueryType::Update,
            "DELETE" => QueryType::Delete,
            "PRAGMA" => QueryType::Pragma,
            _ => QueryType::Other,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    &rest[..end]
}

/// How the statement is driven once hooks have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Prepared after the hooks ran: `ModifySql` is honoured and `Abort` is a validation error.
    OneShot,
    /// Already prepared and bound by a cursor: any rewrite or veto is a usage error.
    Cursor,
}

/// What hooks and monitors see of a statement.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// SQL as built by the relation, used as the aggregation key.
    pub canonical_sql: String,
    /// SQL handed to SQLite; differs from `canonical_sql` only after a hook rewrite.
    pub exec_sql: String,
    pub param_count: usize,
    pub query_type: QueryType,
    pub mode: ExecMode,
}

impl QueryContext {
    pub fn new(sql: &str, param_count: usize, mode: ExecMode) -> Self {
        Self {
            canonical_sql: sql.to_owned(),
            exec_sql: sql.to_owned(),
            param_count,
            query_type: QueryType::from_sql(sql),
            mode,
        }
    }

    /// Apply a hook rewrite. The query type follows the canonical SQL.
    pub(crate) fn rewrite(&mut self, exec_sql: String, canonical_sql: Option<String>) {
        self.exec_sql = exec_sql;
        if let Some(canonical_sql) = canonical_sql {
            self.query_type = QueryType::from_sql(&canonical_sql);
            self.canonical_sql = canonical_sql;
        }
    }

    /// Whether `exec_sql` no longer matches `canonical_sql`.
    pub fn is_rewritten(&self) -> bool {
        self.exec_sql != self.canonical_sql
    }
}

const ERROR_MESSAGE_LIMIT: usize = 512;

/// How a statement ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Stepped to the end, producing this many rows.
    Rows(usize),
    /// A mutation changed this many rows.
    Affected(u64),
    /// The cursor was dropped after this many rows.
    Abandoned(usize),
    /// Failed; the message is clipped to 512 bytes.
    Error(String),
}

impl QueryResult {
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        match super::clip_sql(&message, Some(ERROR_MESSAGE_LIMIT)) {
            std::borrow::Cow::Borrowed(_) => Self::Error(message),
            std::borrow::Cow::Owned(clipped) => Self::Error(clipped),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }

    /// Rows handed to the consumer, if the statement was a read.
    pub fn rows(&self) -> Option<usize> {
        match self {
            QueryResult::Rows(n) | QueryResult::Abandoned(n) => Some(*n),
            QueryResult::Affected(_) | QueryResult::Error(_) => None,
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows(n) => write!(f, "{n} rows"),
            QueryResult::Affected(n) => write!(f, "{n} affected"),
            QueryResult::Abandoned(n) => write!(f, "abandoned after {n} rows"),
            QueryResult::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Receives timing and outcome of every statement while monitoring is enabled.
pub trait QueryMonitor: Send + Sync {
    fn on_query_start(&self, _ctx: &QueryContext) {}

    /// Called exactly once per started statement.
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult);

    /// Called after `on_query_complete` when the configured threshold is exceeded.
    fn on_slow_query(&self, _ctx: &QueryContext, _duration: Duration) {}
}

/// A hook's decision about a statement that has not started yet.
#[derive(Debug, Clone)]
pub enum HookAction {
    Continue,
    /// Run different SQL. Only one-shot execution can honour this.
    ModifySql {
        exec_sql: String,
        /// New aggregation key; `None` keeps the original.
        canonical_sql: Option<String>,
    },
    /// Refuse the statement with this reason.
    Abort(String),
}

/// Inspects statements before they run and observes them afterwards.
///
/// `before_query` runs whether or not monitoring is enabled. `after_query` is reported
/// together with monitors, before them.
pub trait QueryHook: Send + Sync {
    fn before_query(&self, _ctx: &QueryContext) -> HookAction {
        HookAction::Continue
    }

    fn after_query(&self, _ctx: &QueryContext, _duration: Duration, _result: &QueryResult) {}
}
