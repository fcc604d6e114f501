//! Schema introspection through SQLite's pragma table functions.
//!
//! Lookups are cached per [`Database`]; call [`Database::clear_schema_cache`] after altering
//! the schema on the same connection.

use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::generator::sql::quote_ident;
use crate::relation::Source;
use std::collections::HashMap;
use std::sync::Arc;

/// One column as reported by `PRAGMA table_info`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it.
    pub primary_key_index: usize,
}

/// One foreign key as reported by `PRAGMA foreign_key_list`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub destination_table: String,
    pub origin_columns: Vec<String>,
    /// `None` when the key references the destination's primary key implicitly.
    pub destination_columns: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub(crate) struct SchemaCache {
    columns: HashMap<String, Arc<Vec<ColumnInfo>>>,
    foreign_keys: HashMap<String, Arc<Vec<ForeignKey>>>,
    unique_keys: HashMap<String, Arc<Vec<Vec<String>>>>,
}

impl Database {
    /// Whether a table or view with this name exists.
    pub fn table_exists(&self, table: &str) -> OrmResult<bool> {
        let sql = "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE \
                   UNION ALL SELECT 1 FROM sqlite_temp_master WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE)";
        self.connection()
            .query_row(sql, [table], |row| row.get(0))
            .map_err(|e| OrmError::engine(e, sql, &[table.into()]))
    }

    /// Columns of a table or view, in declaration order.
    pub fn columns(&self, table: &str) -> OrmResult<Arc<Vec<ColumnInfo>>> {
        let cache_key = table.to_ascii_lowercase();
        if let Some(columns) = self.schema.borrow().columns.get(&cache_key) {
            return Ok(Arc::clone(columns));
        }

        let sql = "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)";
        let columns = self
            .connection()
            .prepare(sql)
            .and_then(|mut stmt| {
                let columns = stmt
                    .query_map([table], |row| {
                        Ok(ColumnInfo {
                            name: row.get(0)?,
                            declared_type: row.get(1)?,
                            not_null: row.get(2)?,
                            default_value: row.get(3)?,
                            primary_key_index: usize::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>();
                columns
            })
            .map_err(|e| OrmError::engine(e, sql, &[table.into()]))?;
        if columns.is_empty() {
            return Err(OrmError::not_found(format!("no such table: {table}")));
        }

        let columns = Arc::new(columns);
        self.schema
            .borrow_mut()
            .columns
            .insert(cache_key, Arc::clone(&columns));
        Ok(columns)
    }

    /// Primary key columns, in key order. Tables without an explicit key report `rowid`.
    pub fn primary_key(&self, table: &str) -> OrmResult<Vec<String>> {
        let columns = self.columns(table)?;
        let mut key: Vec<&ColumnInfo> = columns.iter().filter(|c| c.primary_key_index > 0).collect();
        if key.is_empty() {
            return Ok(vec!["rowid".to_string()]);
        }
        key.sort_by_key(|c| c.primary_key_index);
        Ok(key.into_iter().map(|c| c.name.clone()).collect())
    }

    /// Foreign keys declared on a table.
    pub fn foreign_keys(&self, table: &str) -> OrmResult<Arc<Vec<ForeignKey>>> {
        let cache_key = table.to_ascii_lowercase();
        if let Some(keys) = self.schema.borrow().foreign_keys.get(&cache_key) {
            return Ok(Arc::clone(keys));
        }

        let sql = "SELECT id, \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq";
        let rows: Vec<(i64, String, String, Option<String>)> = self
            .connection()
            .prepare(sql)
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([table], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
                    .collect();
                rows
            })
            .map_err(|e| OrmError::engine(e, sql, &[table.into()]))?;

        let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
        for (id, destination_table, from, to) in rows {
            if keys.last().is_none_or(|(last, _)| *last != id) {
                keys.push((
                    id,
                    ForeignKey {
                        destination_table,
                        origin_columns: Vec::new(),
                        destination_columns: Some(Vec::new()),
                    },
                ));
            }
            let Some((_, fk)) = keys.last_mut() else {
                continue;
            };
            fk.origin_columns.push(from);
            fk.destination_columns = match (fk.destination_columns.take(), to) {
                (Some(mut columns), Some(to)) => {
                    columns.push(to);
                    Some(columns)
                }
                _ => None,
            };
        }

        let keys = Arc::new(keys.into_iter().map(|(_, fk)| fk).collect::<Vec<_>>());
        self.schema
            .borrow_mut()
            .foreign_keys
            .insert(cache_key, Arc::clone(&keys));
        Ok(keys)
    }

    /// Column sets guaranteed unique: the primary key, then every full unique index.
    ///
    /// Partial indexes and indexes over expressions are left out.
    pub fn unique_keys(&self, table: &str) -> OrmResult<Arc<Vec<Vec<String>>>> {
        let cache_key = table.to_ascii_lowercase();
        if let Some(keys) = self.schema.borrow().unique_keys.get(&cache_key) {
            return Ok(Arc::clone(keys));
        }

        let mut keys = vec![self.primary_key(table)?];
        let sql = "SELECT il.name, ii.name FROM pragma_index_list(?1) AS il \
                   JOIN pragma_index_info(il.name) AS ii \
                   WHERE il.\"unique\" = 1 AND il.partial = 0 ORDER BY il.seq, ii.seqno";
        let rows: Vec<(String, Option<String>)> = self
            .connection()
            .prepare(sql)
            .and_then(|mut stmt| {
                let rows = stmt.query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?.collect();
                rows
            })
            .map_err(|e| OrmError::engine(e, sql, &[table.into()]))?;

        let mut index: Option<(String, Option<Vec<String>>)> = None;
        for (name, column) in rows {
            if index.as_ref().is_none_or(|(current, _)| *current != name) {
                keys.extend(index.take().and_then(|(_, columns)| columns));
                index = Some((name, Some(Vec::new())));
            }
            if let Some((_, columns)) = index.as_mut() {
                *columns = columns.take().zip(column).map(|(mut columns, column)| {
                    columns.push(column);
                    columns
                });
            }
        }
        keys.extend(index.and_then(|(_, columns)| columns));

        let keys = Arc::new(keys);
        self.schema
            .borrow_mut()
            .unique_keys
            .insert(cache_key, Arc::clone(&keys));
        Ok(keys)
    }

    /// Whether filtering on all of `columns` selects at most one row of `table`.
    pub(crate) fn covers_unique_key(&self, table: &str, columns: &[String]) -> OrmResult<bool> {
        let keys = self.unique_keys(table)?;
        Ok(keys.iter().any(|key| {
            key.iter()
                .all(|k| columns.iter().any(|c| c.eq_ignore_ascii_case(k)))
        }))
    }

    /// Forget cached schema information.
    pub fn clear_schema_cache(&self) {
        let mut cache = self.schema.borrow_mut();
        cache.columns.clear();
        cache.foreign_keys.clear();
        cache.unique_keys.clear();
    }

    /// Number of columns `*` expands to for a relation source.
    ///
    /// Measured on a prepared `SELECT *`: `pragma_table_info` omits generated columns.
    pub(crate) fn source_width(&self, source: &Source) -> OrmResult<usize> {
        let (sql, arguments) = match source {
            Source::Table(name) => (format!("SELECT * FROM {}", quote_ident(name)), &[][..]),
            Source::Subquery { sql, arguments } => (format!("SELECT * FROM ({sql})"), arguments.as_slice()),
        };
        self.connection()
            .prepare(&sql)
            .map(|stmt| stmt.column_count())
            .map_err(|e| OrmError::engine(e, sql, arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE book (
                 id INTEGER PRIMARY KEY,
                 author_id INTEGER REFERENCES author,
                 translator_id INTEGER REFERENCES author(id),
                 title TEXT DEFAULT 'untitled'
             );
             CREATE TABLE edition (book_id INTEGER, number INTEGER, PRIMARY KEY (number, book_id));
             CREATE TABLE note (body TEXT);",
        )
        .unwrap();
        db
    }

    #[test]
    fn columns_and_primary_keys() {
        let db = db();
        let columns = db.columns("BOOK").unwrap();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[3].default_value.as_deref(), Some("'untitled'"));
        assert_eq!(db.primary_key("author").unwrap(), ["id"]);
        assert_eq!(db.primary_key("edition").unwrap(), ["number", "book_id"]);
        assert_eq!(db.primary_key("note").unwrap(), ["rowid"]);
    }

    #[test]
    fn missing_table_is_not_found() {
        let db = db();
        assert!(db.columns("nope").unwrap_err().is_not_found());
        assert!(!db.table_exists("nope").unwrap());
        assert!(db.table_exists("Author").unwrap());
    }

    #[test]
    fn foreign_keys_keep_implicit_destination() {
        let db = db();
        let keys = db.foreign_keys("book").unwrap();
        assert_eq!(keys.len(), 2);
        let implicit = keys.iter().find(|k| k.origin_columns == ["author_id"]).unwrap();
        assert_eq!(implicit.destination_table, "author");
        assert!(implicit.destination_columns.is_none());
        let explicit = keys.iter().find(|k| k.origin_columns == ["translator_id"]).unwrap();
        assert_eq!(explicit.destination_columns.as_deref(), Some(&["id".to_string()][..]));
    }

    #[test]
    fn subquery_width_is_probed() {
        let db = db();
        let width = db
            .source_width(&Source::Subquery {
                sql: "SELECT id, name, 1 AS one FROM author".into(),
                arguments: Vec::new(),
            })
            .unwrap();
        assert_eq!(width, 3);
    }

    #[test]
    fn unique_keys_come_from_primary_key_and_full_unique_indexes() {
        let db = db();
        db.execute_batch(
            "CREATE TABLE copy (
                 id INTEGER PRIMARY KEY,
                 shelf TEXT,
                 slot INTEGER,
                 barcode TEXT UNIQUE,
                 note TEXT,
                 UNIQUE (shelf, slot)
             );
             CREATE UNIQUE INDEX copy_note ON copy (note) WHERE note IS NOT NULL;
             CREATE UNIQUE INDEX copy_lower ON copy (lower(shelf));
             CREATE INDEX copy_slot ON copy (slot);",
        )
        .unwrap();

        let mut keys = db.unique_keys("copy").unwrap().to_vec();
        assert_eq!(keys.remove(0), ["id"]);
        keys.sort();
        assert_eq!(keys, [vec!["barcode".to_string()], vec!["shelf".to_string(), "slot".to_string()]]);

        let cols = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        assert!(db.covers_unique_key("copy", &cols(&["SLOT", "shelf"])).unwrap());
        assert!(db.covers_unique_key("copy", &cols(&["barcode", "note"])).unwrap());
        assert!(!db.covers_unique_key("copy", &cols(&["slot"])).unwrap());
        assert!(!db.covers_unique_key("copy", &cols(&["note"])).unwrap());
        assert!(db.covers_unique_key("note", &cols(&["rowid"])).unwrap());
    }

    #[test]
    fn table_width_counts_generated_columns() {
        let db = db();
        db.execute_batch(
            "CREATE TABLE label (id INTEGER PRIMARY KEY, name TEXT, shout TEXT GENERATED ALWAYS AS (upper(name)))",
        )
        .unwrap();
        assert_eq!(db.columns("label").unwrap().len(), 2);
        assert_eq!(db.source_width(&Source::Table("label".into())).unwrap(), 3);
        assert_eq!(db.source_width(&Source::Table("book".into())).unwrap(), 4);
    }
}
