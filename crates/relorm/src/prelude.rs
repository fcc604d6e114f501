//! Convenient imports for typical `relorm` usage.
//!
//! ```ignore
//! use relorm::prelude::*;
//! ```

pub use crate::{
    Association, ColumnAssignment, ConflictResolution, Database, DerivableRelation, Expr, ExprOps,
    FetchRequest, FromRow, OrmError, OrmResult, QueryRequest, Relation, Row, RowExt, TableRecord,
    Value, col,
};

#[cfg(feature = "derive")]
pub use crate::Model;
