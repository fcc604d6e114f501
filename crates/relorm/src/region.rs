//! The tables and columns a request reads.

use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::generator;
use crate::prefetch;
use crate::relation::Relation;
use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A set of table columns, as observed by SQLite while compiling statements.
///
/// A table read without any specific column (`COUNT(*)`) appears with no columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseRegion {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl DatabaseRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, and one of its columns when `column` is not empty.
    pub fn insert(&mut self, table: impl Into<String>, column: &str) {
        let columns = self.tables.entry(table.into()).or_default();
        if !column.is_empty() {
            columns.insert(column.to_string());
        }
    }

    /// Merge another region into this one.
    pub fn union(&mut self, other: DatabaseRegion) {
        for (table, columns) in other.tables {
            self.tables.entry(table).or_default().extend(columns);
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Columns read from `table`, or `None` when the table is outside the region.
    pub fn columns(&self, table: &str) -> Option<impl Iterator<Item = &str>> {
        self.tables.get(table).map(|columns| columns.iter().map(String::as_str))
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Display for DatabaseRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tables.is_empty() {
            return f.write_str("empty");
        }
        for (i, (table, columns)) in self.tables.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(table)?;
            if !columns.is_empty() {
                f.write_str("(")?;
                for (j, column) in columns.iter().enumerate() {
                    if j > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(column)?;
                }
                f.write_str(")")?;
            }
        }
        Ok(())
    }
}

/// Compile `sql` with an authorizer recording every column read. Nothing is executed.
fn observe_sql(db: &Database, sql: &str) -> OrmResult<DatabaseRegion> {
    let region = Arc::new(Mutex::new(DatabaseRegion::new()));
    let sink = Arc::clone(&region);
    let conn = db.connection();
    conn.authorizer(Some(move |ctx: AuthContext<'_>| {
        if let AuthAction::Read {
            table_name,
            column_name,
        } = ctx.action
        {
            if !table_name.starts_with("sqlite_") {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(table_name, column_name);
            }
        }
        Authorization::Allow
    }));
    let prepared = conn.prepare(sql).map(drop);
    conn.authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
    prepared.map_err(|source| OrmError::engine(source, sql, &[]))?;

    let region = region.lock().unwrap_or_else(PoisonError::into_inner).clone();
    Ok(region)
}

/// Region of the main select unioned with the region of every eager loading level.
pub(crate) fn observe_relation(db: &Database, relation: &Relation) -> OrmResult<DatabaseRegion> {
    let select = generator::compile_select(relation, db)?;
    let mut region = observe_sql(db, &select.sql)?;
    for level in prefetch::level_relations(db, relation)? {
        let select = generator::compile_select(&level, db)?;
        region.union(observe_sql(db, &select.sql)?);
    }
    Ok(region)
}
