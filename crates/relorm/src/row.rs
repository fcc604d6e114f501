//! Fetched rows and row mapping traits

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Column name table shared by every row of one statement shape.
///
/// Lookup is ASCII case-insensitive, like SQLite identifiers. When a name appears twice the
/// leftmost column wins.
#[derive(Debug, Clone, Default)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    /// Build the lookup table for an ordered list of column names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.to_ascii_lowercase()).or_insert(i);
        }
        Self { names, index }
    }

    /// Position of `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index
            .get(name)
            .or_else(|| self.index.get(&name.to_ascii_lowercase()))
            .copied()
    }

    /// Column names in statement order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl PartialEq for Columns {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for Columns {}

/// A fetched tuple.
///
/// Besides its own columns a row owns the sub-rows of single-row joins (its *scopes*) and
/// the child groups attached by eager loading (its *prefetched* rows).
#[derive(Clone, Default)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<Value>,
    scopes: Vec<(String, Row)>,
    prefetched: BTreeMap<String, Vec<Row>>,
}

impl Row {
    /// Create a row over a shared column table.
    ///
    /// `values` is padded with NULL or truncated to the number of columns.
    pub fn new(columns: Arc<Columns>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self {
            columns,
            values,
            scopes: Vec::new(),
            prefetched: BTreeMap::new(),
        }
    }

    /// Build a standalone row from name/value pairs.
    pub fn from_pairs<I, S, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .unzip();
        Self::new(Arc::new(Columns::new(names)), values)
    }

    /// Number of columns (scopes excluded).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Raw value of the named column.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns.index_of(column).map(|i| &self.values[i])
    }

    /// Whether the row (scopes excluded) has a column with this name.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.index_of(column).is_some()
    }

    /// Decode the named column.
    pub fn get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| OrmError::decode(column, "no such column in row"))?;
        T::from_value(value).map_err(|message| OrmError::decode(column, message))
    }

    /// Decode the column at `index`.
    pub fn get_at<T: FromValue>(&self, index: usize) -> OrmResult<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| OrmError::decode(format!("#{index}"), "column index out of range"))?;
        T::from_value(value).map_err(|message| {
            let column = self
                .columns
                .names()
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("#{index}"));
            OrmError::decode(column, message)
        })
    }

    /// Keys of the joined sub-rows, in join order.
    pub fn scope_keys(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(|(key, _)| key.as_str())
    }

    /// The sub-row of the single-row join registered under `key`.
    ///
    /// Asking for a key that was never joined is a usage error.
    pub fn scope(&self, key: &str) -> OrmResult<&Row> {
        self.scopes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, row)| row)
            .ok_or_else(|| OrmError::usage(format!("no joined association named `{key}` in row")))
    }

    /// Like [`scope`](Self::scope), but an optional join that matched nothing yields `None`.
    ///
    /// A left join that found no destination produces a sub-row where every column is NULL.
    pub fn scope_opt(&self, key: &str) -> OrmResult<Option<&Row>> {
        let row = self.scope(key)?;
        Ok((!row.values.iter().all(Value::is_null)).then_some(row))
    }

    /// Keys of the attached child groups.
    pub fn prefetched_keys(&self) -> impl Iterator<Item = &str> {
        self.prefetched.keys().map(String::as_str)
    }

    /// The child group attached under `key` by eager loading.
    ///
    /// An association that matched no children yields an empty slice. A key that was never
    /// requested is a usage error.
    pub fn prefetched_rows(&self, key: &str) -> OrmResult<&[Row]> {
        self.prefetched
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| OrmError::usage(format!("no prefetched association named `{key}` in row")))
    }

    /// Decode every row of a child group.
    pub fn prefetched<T: FromRow>(&self, key: &str) -> OrmResult<Vec<T>> {
        self.prefetched_rows(key)?.iter().map(T::from_row).collect()
    }

    pub(crate) fn push_scope(&mut self, key: impl Into<String>, row: Row) {
        self.scopes.push((key.into(), row));
    }

    pub(crate) fn scope_mut(&mut self, key: &str) -> Option<&mut Row> {
        self.scopes
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, row)| row)
    }

    pub(crate) fn scopes_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.scopes.iter_mut().map(|(_, row)| row)
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub(crate) fn prefetched_mut(&mut self, key: &str) -> Option<&mut Vec<Row>> {
        self.prefetched.get_mut(key)
    }

    pub(crate) fn set_prefetched(&mut self, key: impl Into<String>, rows: Vec<Row>) {
        self.prefetched.insert(key.into(), rows);
    }

    /// Remove the last `count` columns and return their values, re-pointing the row at
    /// `columns` (which must describe the remaining columns).
    pub(crate) fn split_off_trailing(&mut self, count: usize, columns: Arc<Columns>) -> Vec<Value> {
        let at = self.values.len().saturating_sub(count);
        let tail = self.values.split_off(at);
        debug_assert_eq!(columns.len(), self.values.len());
        self.columns = columns;
        tail
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
            && self.values == other.values
            && self.scopes == other.scopes
            && self.prefetched == other.prefetched
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.columns.names.hash(state);
        self.values.hash(state);
        self.scopes.hash(state);
        self.prefetched.hash(state);
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.columns.names().iter().zip(&self.values) {
            map.entry(name, value);
        }
        for (key, row) in &self.scopes {
            map.entry(&format!("{key}:"), row);
        }
        for (key, rows) in &self.prefetched {
            map.entry(&format!("{key}[]"), rows);
        }
        map.finish()
    }
}

/// Trait for converting a fetched row into a Rust value.
///
/// The row is lent only for the duration of the call: cursors refill the same buffer for
/// every step, so implementations copy out whatever they keep.
///
/// This trait should typically be derived using `#[derive(FromRow)]`.
///
/// # Example
///
/// ```ignore
/// use relorm::FromRow;
///
/// #[derive(FromRow)]
/// struct Author {
///     id: i64,
///     name: String,
///     #[orm(prefetched = "books")]
///     books: Vec<Book>,
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a row into Self
    fn from_row(row: &Row) -> OrmResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(row.clone())
    }
}

/// Extension trait kept for derive output: typed access by column name.
pub trait RowExt {
    /// Try to get a column value, returning OrmError::Decode on failure
    fn try_get_column<T: FromValue>(&self, column: &str) -> OrmResult<T>;
}

impl RowExt for Row {
    fn try_get_column<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        self.get(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_leftmost() {
        let row = Row::from_pairs([("id", 1i64), ("Name", 2), ("name", 3)]);
        assert_eq!(row.get::<i64>("ID").unwrap(), 1);
        assert_eq!(row.get::<i64>("name").unwrap(), 2);
        assert_eq!(row.get_at::<i64>(2).unwrap(), 3);
    }

    #[test]
    fn missing_column_is_decode_error() {
        let row = Row::from_pairs([("id", 1i64)]);
        let err = row.get::<i64>("title").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn optional_scope_all_null_is_none() {
        let mut row = Row::from_pairs([("id", 1i64)]);
        row.push_scope("author", Row::from_pairs([("id", Value::Null), ("name", Value::Null)]));
        row.push_scope("editor", Row::from_pairs([("id", 5i64)]));

        assert!(row.scope_opt("author").unwrap().is_none());
        assert_eq!(row.scope_opt("editor").unwrap().unwrap().get::<i64>("id").unwrap(), 5);
        assert!(row.scope("publisher").unwrap_err().is_usage());
    }

    #[test]
    fn prefetched_empty_group_differs_from_unrequested() {
        let mut row = Row::from_pairs([("id", 1i64)]);
        row.set_prefetched("books", Vec::new());

        assert!(row.prefetched_rows("books").unwrap().is_empty());
        assert!(row.prefetched_rows("reviews").unwrap_err().is_usage());
    }

    #[test]
    fn split_off_trailing_strips_columns() {
        let mut row = Row::from_pairs([("id", 1i64), ("__relorm_pivot_author_id", 9)]);
        let remaining = Arc::new(Columns::new(["id"]));
        let tail = row.split_off_trailing(1, remaining);

        assert_eq!(tail, vec![Value::Integer(9)]);
        assert_eq!(row.column_names(), ["id".to_string()]);
        assert!(!row.has_column("__relorm_pivot_author_id"));
    }
}
