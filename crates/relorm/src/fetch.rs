//! Fetch facade: prepare a request once, then stream or materialize its records.

use crate::adapter::RowAdapter;
use crate::cursor::RecordCursor;
use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::generator;
use crate::prefetch;
use crate::region::{self, DatabaseRegion};
use crate::relation::{Limit, QueryRequest, Relation};
use crate::row::{FromRow, Row};
use crate::value::Value;
use rusqlite::CachedStatement;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Loads eager associations into rows that were just fetched.
type SupplementaryFetch = Box<dyn Fn(&Database, &mut [Row]) -> OrmResult<()>>;

/// A compiled and prepared request.
///
/// Holds the cached statement, the row adapter and, when the relation eagerly loads
/// associations, the supplementary fetch that runs after the main rows are read. A prepared
/// request can be fetched any number of times.
pub struct PreparedRequest<'db, R> {
    db: &'db Database,
    statement: CachedStatement<'db>,
    sql: String,
    arguments: Vec<Value>,
    adapter: RowAdapter,
    supplementary: Option<SupplementaryFetch>,
    _marker: PhantomData<fn() -> R>,
}

impl<'db, R> PreparedRequest<'db, R> {
    pub(crate) fn new(relation: &Relation, db: &'db Database) -> OrmResult<Self> {
        let compiled = generator::compile_select(relation, db)?;
        let statement = db
            .connection()
            .prepare_cached(&compiled.sql)
            .map_err(|e| OrmError::engine(e, compiled.sql.as_str(), &compiled.arguments))?;
        if statement.parameter_count() != compiled.arguments.len() {
            return Err(OrmError::usage(format!(
                "statement expects {} arguments, got {}: {}",
                statement.parameter_count(),
                compiled.arguments.len(),
                compiled.sql
            )));
        }

        let names: Vec<String> = statement.column_names().into_iter().map(String::from).collect();
        let adapter = RowAdapter::new(&compiled.layout, &names)?;
        let supplementary = relation.has_prefetches().then(|| {
            let relation = relation.clone();
            Box::new(move |db: &Database, rows: &mut [Row]| prefetch::load(db, &relation, rows)) as SupplementaryFetch
        });

        Ok(Self {
            db,
            statement,
            sql: compiled.sql,
            arguments: compiled.arguments,
            adapter,
            supplementary,
            _marker: PhantomData,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Whether fetching also loads eager associations.
    pub fn has_supplementary_fetch(&self) -> bool {
        self.supplementary.is_some()
    }

    fn open<T>(&mut self) -> RecordCursor<'_, 'db, T> {
        RecordCursor::new(self.db, &mut self.statement, &self.sql, &self.arguments, &self.adapter)
    }

    /// Stream the records one by one.
    ///
    /// Relations that eagerly load associations need every row before the associations can
    /// be attached; use [`fetch_all`](Self::fetch_all) for them.
    pub fn fetch_cursor(&mut self) -> OrmResult<RecordCursor<'_, 'db, R>> {
        if self.supplementary.is_some() {
            return Err(OrmError::usage(
                "cannot open a cursor on a request that eagerly loads associations; use fetch_all",
            ));
        }
        Ok(self.open())
    }

    /// All rows, with eager associations attached.
    pub fn fetch_rows(&mut self) -> OrmResult<Vec<Row>> {
        let mut rows = Vec::new();
        {
            let mut cursor = self.open::<Row>();
            while cursor.advance()? {
                rows.push(cursor.current().clone());
            }
        }
        if let Some(supplementary) = &self.supplementary {
            supplementary(self.db, &mut rows)?;
        }
        Ok(rows)
    }
}

impl<R: FromRow> PreparedRequest<'_, R> {
    pub fn fetch_all(&mut self) -> OrmResult<Vec<R>> {
        self.fetch_rows()?.iter().map(R::from_row).collect()
    }

    /// The first record. Does not add a LIMIT; see [`FetchRequest::fetch_one`].
    pub fn fetch_one(&mut self) -> OrmResult<Option<R>> {
        if self.supplementary.is_some() {
            return self.fetch_rows()?.first().map(R::from_row).transpose();
        }
        let mut cursor = self.open::<R>();
        let record = cursor.try_next()?;
        cursor.finish();
        Ok(record)
    }

    pub fn fetch_set(&mut self) -> OrmResult<HashSet<R>>
    where
        R: Eq + Hash,
    {
        self.fetch_rows()?.iter().map(R::from_row).collect()
    }
}

impl<R> fmt::Debug for PreparedRequest<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("sql", &self.sql)
            .field("arguments", &self.arguments)
            .field("supplementary", &self.supplementary.is_some())
            .finish()
    }
}

/// Fetch operations shared by [`Relation`] (decoding into [`Row`]) and [`QueryRequest`].
pub trait FetchRequest {
    type Record;

    fn relation(&self) -> &Relation;

    /// Compile and prepare the request.
    fn prepare<'db>(&self, db: &'db Database) -> OrmResult<PreparedRequest<'db, Self::Record>> {
        PreparedRequest::new(self.relation(), db)
    }

    fn fetch_all(&self, db: &Database) -> OrmResult<Vec<Self::Record>>
    where
        Self::Record: FromRow,
    {
        self.prepare(db)?.fetch_all()
    }

    /// The first record, adding `LIMIT 1` unless the relation already expects one row.
    fn fetch_one(&self, db: &Database) -> OrmResult<Option<Self::Record>>
    where
        Self::Record: FromRow,
    {
        let relation = self.relation();
        if relation.expects_single_row(db)? {
            return PreparedRequest::<Self::Record>::new(relation, db)?.fetch_one();
        }
        let mut limited = relation.clone();
        limited.limit = Some(Limit {
            count: 1,
            offset: relation.limit.and_then(|limit| limit.offset),
        });
        PreparedRequest::<Self::Record>::new(&limited, db)?.fetch_one()
    }

    fn fetch_set(&self, db: &Database) -> OrmResult<HashSet<Self::Record>>
    where
        Self::Record: FromRow + Eq + Hash,
    {
        self.prepare(db)?.fetch_set()
    }

    /// Number of rows the relation selects.
    fn fetch_count(&self, db: &Database) -> OrmResult<u64> {
        let (sql, arguments) = generator::compile_count(self.relation(), db)?;
        let mut prepared = PreparedRequest::<Row>::raw(db, sql, arguments)?;
        let mut cursor = prepared.open::<Row>();
        if !cursor.advance()? {
            return Err(OrmError::decode("COUNT(*)", "count query returned no row"));
        }
        let count: i64 = cursor.current().get_at(0)?;
        cursor.finish();
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Tables and columns the request reads, eager associations included.
    fn database_region(&self, db: &Database) -> OrmResult<DatabaseRegion> {
        region::observe_relation(db, self.relation())
    }
}

impl<'db> PreparedRequest<'db, Row> {
    /// A single-column statement outside the relation model.
    fn raw(db: &'db Database, sql: String, arguments: Vec<Value>) -> OrmResult<Self> {
        let statement = db
            .connection()
            .prepare_cached(&sql)
            .map_err(|e| OrmError::engine(e, sql.as_str(), &arguments))?;
        let names: Vec<String> = statement.column_names().into_iter().map(String::from).collect();
        let layout = generator::ScopeLayout {
            key: String::new(),
            selected: true,
            width: None,
            children: Vec::new(),
        };
        let adapter = RowAdapter::new(&layout, &names)?;
        Ok(Self {
            db,
            statement,
            sql,
            arguments,
            adapter,
            supplementary: None,
            _marker: PhantomData,
        })
    }
}

impl FetchRequest for Relation {
    type Record = Row;

    fn relation(&self) -> &Relation {
        self
    }
}

impl<R> FetchRequest for QueryRequest<R> {
    type Record = R;

    fn relation(&self) -> &Relation {
        &self.relation
    }
}
