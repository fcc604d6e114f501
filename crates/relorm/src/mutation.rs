//! Batch DELETE and UPDATE derived from a relation.
//!
//! The relation's filters select the rows to change. Relations the engine cannot express as a
//! plain `WHERE` (joins, grouping, DISTINCT, LIMIT, or an alias other parts of the query refer
//! to) are mutated through `rowid IN (SELECT ...)`.

use crate::database::Database;
use crate::error::OrmResult;
use crate::generator;
use crate::relation::expr::{Column, Expr, IntoExpr};
use crate::relation::{QueryRequest, Relation};

/// `UPDATE OR <resolution>` conflict clause.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConflictResolution {
    Rollback,
    /// SQLite's default; renders a plain `UPDATE`.
    #[default]
    Abort,
    Fail,
    Ignore,
    Replace,
}

impl ConflictResolution {
    pub(crate) fn update_keyword(self) -> &'static str {
        match self {
            ConflictResolution::Rollback => "UPDATE OR ROLLBACK ",
            ConflictResolution::Abort => "UPDATE ",
            ConflictResolution::Fail => "UPDATE OR FAIL ",
            ConflictResolution::Ignore => "UPDATE OR IGNORE ",
            ConflictResolution::Replace => "UPDATE OR REPLACE ",
        }
    }
}

/// One `column = expression` item of an UPDATE.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnAssignment {
    pub(crate) column: String,
    pub(crate) value: Expr,
}

impl ColumnAssignment {
    /// `column = value`
    pub fn set(column: impl Into<String>, value: impl IntoExpr) -> Self {
        Self {
            column: column.into(),
            value: value.into_expr(),
        }
    }

    /// `column = column + value`
    pub fn add(column: impl Into<String>, value: impl IntoExpr) -> Self {
        Self::compound(column.into(), "+", value)
    }

    /// `column = column - value`
    pub fn sub(column: impl Into<String>, value: impl IntoExpr) -> Self {
        Self::compound(column.into(), "-", value)
    }

    /// `column = column * value`
    pub fn mul(column: impl Into<String>, value: impl IntoExpr) -> Self {
        Self::compound(column.into(), "*", value)
    }

    /// `column = column / value`
    pub fn div(column: impl Into<String>, value: impl IntoExpr) -> Self {
        Self::compound(column.into(), "/", value)
    }

    fn compound(column: String, op: &'static str, value: impl IntoExpr) -> Self {
        let value = Expr::Arith {
            left: Box::new(Expr::Column(Column::new(column.clone()))),
            op,
            right: Box::new(value.into_expr()),
        };
        Self { column, value }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn value(&self) -> &Expr {
        &self.value
    }
}

impl Relation {
    /// Delete every row the relation selects; returns the number of deleted rows.
    pub fn delete_all(&self, db: &Database) -> OrmResult<u64> {
        let (sql, arguments) = generator::compile_delete(self, db)?;
        db.execute(&sql, &arguments)
    }

    /// Update every row the relation selects; returns the number of changed rows.
    ///
    /// Without assignments nothing is executed and the result is 0.
    pub fn update_all(
        &self,
        db: &Database,
        conflict: ConflictResolution,
        assignments: impl IntoIterator<Item = ColumnAssignment>,
    ) -> OrmResult<u64> {
        let assignments: Vec<ColumnAssignment> = assignments.into_iter().collect();
        if assignments.is_empty() {
            return Ok(0);
        }
        let (sql, arguments) = generator::compile_update(self, conflict, &assignments, db)?;
        db.execute(&sql, &arguments)
    }
}

impl<R> QueryRequest<R> {
    /// See [`Relation::delete_all`].
    pub fn delete_all(&self, db: &Database) -> OrmResult<u64> {
        self.relation.delete_all(db)
    }

    /// See [`Relation::update_all`].
    pub fn update_all(
        &self,
        db: &Database,
        conflict: ConflictResolution,
        assignments: impl IntoIterator<Item = ColumnAssignment>,
    ) -> OrmResult<u64> {
        self.relation.update_all(db, conflict, assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{HookAction, QueryContext, QueryHook};
    use crate::relation::expr::{ExprOps, col};
    use crate::relation::DerivableRelation;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE player (id INTEGER PRIMARY KEY, name TEXT UNIQUE, score INTEGER);
             INSERT INTO player (name, score) VALUES ('a', 10), ('b', 20), ('c', 30);",
        )
        .unwrap();
        db
    }

    fn scores(db: &Database) -> Vec<i64> {
        let mut stmt = db.connection().prepare("SELECT score FROM player ORDER BY id").unwrap();
        let scores = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        scores
    }

    #[test]
    fn compound_assignments_desugar() {
        let db = db();
        let changed = Relation::table("player")
            .filter(col("score").gte(20))
            .update_all(
                &db,
                ConflictResolution::Abort,
                [ColumnAssignment::add("score", 1), ColumnAssignment::mul("score", 2)],
            )
            .unwrap();
        assert_eq!(changed, 2);
        // the rightmost assignment of a column wins
        assert_eq!(scores(&db), [10, 40, 60]);
    }

    #[test]
    fn empty_update_touches_nothing() {
        #[derive(Default)]
        struct Count(AtomicUsize);
        impl QueryHook for Count {
            fn before_query(&self, _ctx: &QueryContext) -> HookAction {
                self.0.fetch_add(1, Ordering::SeqCst);
                HookAction::Continue
            }
        }

        let count = Arc::new(Count::default());
        let db = db().add_hook_arc(count.clone());
        let changed = Relation::table("nonexistent")
            .update_all(&db, ConflictResolution::Replace, Vec::new())
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(count.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn limited_delete_goes_through_rowid() {
        let db = db();
        let deleted = Relation::table("player")
            .order([col("score").desc()])
            .limit(2)
            .delete_all(&db)
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(scores(&db), [10]);
    }

    #[test]
    fn ignore_conflicts_skip_rows() {
        let db = db();
        let changed = Relation::table("player")
            .filter(col("name").eq("a"))
            .update_all(&db, ConflictResolution::Ignore, [ColumnAssignment::set("name", "b")])
            .unwrap();
        assert_eq!(changed, 0);

        let err = Relation::table("player")
            .filter(col("name").eq("a"))
            .update_all(&db, ConflictResolution::Abort, [ColumnAssignment::set("name", "b")])
            .unwrap_err();
        assert!(err.is_unique_violation());
    }
}
