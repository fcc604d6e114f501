//! # relorm
//!
//! An immutable relation builder for SQLite, with joined scopes and batched eager loading.
//!
//! ## Features
//!
//! - **Immutable relations**: every derivation (`filter`, `order`, `limit`, `including_*`, ...)
//!   returns a new [`Relation`]; a base relation can be specialized freely
//! - **Joined scopes**: `including_required` / `including_optional` select a to-one
//!   association into a named scope of each row
//! - **Batched eager loading**: `including_all` loads a to-many association with one query per
//!   association level, whatever the number of parent rows
//! - **Cursors**: forward-only [`RecordCursor`]s that report early termination to monitors
//! - **Query monitoring**: hooks and monitors around every statement
//! - **Type-safe mapping**: `#[derive(FromRow, Model)]`
//!
//! ## Example
//!
//! ```ignore
//! use relorm::prelude::*;
//!
//! #[derive(FromRow)]
//! struct Author {
//!     id: i64,
//!     name: String,
//!     #[orm(prefetched = "books")]
//!     books: Vec<Book>,
//! }
//!
//! #[derive(FromRow)]
//! struct Book {
//!     title: String,
//! }
//!
//! let db = Database::open("library.db")?;
//! let authors: Vec<Author> = Relation::table("author")
//!     .filter(col("name").like("A%"))
//!     .including_all(Association::has_many("books", "author", Relation::table("book")))
//!     .as_request::<Author>()
//!     .fetch_all(&db)?;
//! ```

extern crate self as relorm;

mod trace;

mod adapter;
pub mod config;
pub mod cursor;
pub mod database;
pub mod error;
pub mod fetch;
pub mod generator;
pub mod monitor;
pub mod mutation;
mod prefetch;
pub mod region;
pub mod relation;
pub mod row;
mod schema;
pub mod value;

pub mod prelude;

pub use config::DatabaseConfig;
pub use cursor::RecordCursor;
pub use database::Database;
pub use error::{OrmError, OrmResult};
pub use fetch::{FetchRequest, PreparedRequest};
pub use monitor::{
    CompositeHook, CompositeMonitor, ExecMode, HookAction, LoggingMonitor, NoopMonitor, QueryContext,
    QueryHook, QueryMonitor, QueryResult, QueryStats, QueryType, StatsMonitor,
};
pub use mutation::{ColumnAssignment, ConflictResolution};
pub use prefetch::PIVOT_COLUMN_PREFIX;
pub use region::DatabaseRegion;
pub use relation::association::{Association, AssociationKind};
pub use relation::expr::{Column, Expr, ExprOps, IntoExpr, col};
pub use relation::ordering::{NullsOrder, OrderTerm, SortDirection};
pub use relation::{DerivableRelation, JoinKind, Limit, QueryRequest, Relation, Selection, Source, TableRecord};
pub use row::{Columns, FromRow, Row, RowExt};
pub use schema::{ColumnInfo, ForeignKey};
pub use value::{FromValue, Value};

#[cfg(feature = "tracing")]
pub use monitor::TracingSqlHook;

#[cfg(feature = "derive")]
pub use relorm_derive::{FromRow, Model};
