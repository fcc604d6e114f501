//! Statement monitoring and hooks.
//!
//! Every statement run through a [`Database`](crate::Database) (cursor steps, one-shot
//! mutations, prefetch levels) is reported here:
//!
//! - [`QueryHook::before_query`] runs before the first step and may veto the statement;
//! - [`QueryHook::after_query`] and [`QueryMonitor::on_query_complete`] run once the
//!   statement finishes, fails, or is abandoned by its consumer.
//!
//! # Example
//!
//! ```rust,ignore
//! use relorm::monitor::{LoggingMonitor, StatsMonitor, CompositeMonitor};
//! use relorm::{Database, DatabaseConfig};
//! use std::time::Duration;
//!
//! let stats = std::sync::Arc::new(StatsMonitor::new());
//! let db = Database::open_in_memory()?
//!     .with_config(
//!         DatabaseConfig::new()
//!             .enable_monitoring()
//!             .with_slow_query_threshold(Duration::from_millis(50)),
//!     )
//!     .with_monitor(CompositeMonitor::new().add(LoggingMonitor::new()).add_arc(stats.clone()));
//! ```

mod monitors;
mod types;

#[cfg(feature = "tracing")]
mod tracing_hook;


pub use monitors::{
    CompositeHook, CompositeMonitor, LoggingMonitor, NoopMonitor, QueryStats, StatsMonitor,
};
pub use types::{ExecMode, HookAction, QueryContext, QueryHook, QueryMonitor, QueryResult, QueryType};

#[cfg(feature = "tracing")]
pub use tracing_hook::TracingSqlHook;

use std::borrow::Cow;

/// Clip `sql` to at most `max_bytes` (on a char boundary), appending `...` when cut.
pub(crate) fn clip_sql(sql: &str, max_bytes: Option<usize>) -> Cow<'_, str> {
    match max_bytes {
        Some(max) if sql.len() > max => {
            let end = (0..=max).rev().find(|&i| sql.is_char_boundary(i)).unwrap_or(0);
            Cow::Owned(format!("{}...", &sql[..end]))
        }
        _ => Cow::Borrowed(sql),
    }
}
