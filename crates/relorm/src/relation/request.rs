use crate::relation::association::Association;
use crate::relation::{DerivableRelation, Relation};
use crate::value::Value;
use std::fmt;
use std::marker::PhantomData;

/// A relation paired with the record type its rows decode into.
pub struct QueryRequest<R> {
    pub(crate) relation: Relation,
    _marker: PhantomData<fn() -> R>,
}

impl<R> QueryRequest<R> {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            _marker: PhantomData,
        }
    }

    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    pub fn into_relation(self) -> Relation {
        self.relation
    }

    /// Decode the same relation into another record type.
    pub fn as_request<T>(self) -> QueryRequest<T> {
        QueryRequest::new(self.relation)
    }
}

impl<R> Clone for QueryRequest<R> {
    fn clone(&self) -> Self {
        Self::new(self.relation.clone())
    }
}

impl<R> fmt::Debug for QueryRequest<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("record", &std::any::type_name::<R>())
            .field("relation", &self.relation)
            .finish()
    }
}

impl<R> DerivableRelation for QueryRequest<R> {
    fn map_relation(self, f: impl FnOnce(Relation) -> Relation) -> Self {
        Self::new(f(self.relation))
    }
}

impl Relation {
    /// Pair the relation with a record type.
    pub fn as_request<T>(self) -> QueryRequest<T> {
        QueryRequest::new(self)
    }
}

/// A record stored in a database table.
///
/// Usually derived with `#[derive(Model)]`.
pub trait TableRecord: Sized {
    const TABLE_NAME: &'static str;

    /// Request for all rows of the table.
    fn all() -> QueryRequest<Self> {
        QueryRequest::new(Relation::table(Self::TABLE_NAME))
    }

    /// Request for the row with this primary key.
    fn find(key: impl Into<Value>) -> QueryRequest<Self> {
        Self::all().filter_key(key)
    }

    /// This table holds a foreign key to `D`'s table.
    fn belongs_to<D: TableRecord>(key: impl Into<String>) -> Association {
        Association::belongs_to(key, Self::TABLE_NAME, Relation::table(D::TABLE_NAME))
    }

    /// `D`'s table holds a foreign key to this table; at most one row matches.
    fn has_one<D: TableRecord>(key: impl Into<String>) -> Association {
        Association::has_one(key, Self::TABLE_NAME, Relation::table(D::TABLE_NAME))
    }

    /// `D`'s table holds a foreign key to this table.
    fn has_many<D: TableRecord>(key: impl Into<String>) -> Association {
        Association::has_many(key, Self::TABLE_NAME, Relation::table(D::TABLE_NAME))
    }

    /// Reach `target`'s destination through `pivot`.
    fn has_many_through(key: impl Into<String>, pivot: Association, target: Association) -> Association {
        Association::has_many_through(key, pivot, target)
    }

    /// Reach a single destination through `pivot`.
    fn has_one_through(key: impl Into<String>, pivot: Association, target: Association) -> Association {
        Association::has_one_through(key, pivot, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::expr::{ExprOps, col};

    struct Book;
    impl TableRecord for Book {
        const TABLE_NAME: &'static str = "book";
    }

    struct Author;
    impl TableRecord for Author {
        const TABLE_NAME: &'static str = "author";
    }

    #[test]
    fn as_request_changes_only_the_record_type() {
        let request = Book::all().filter(col("year").gt(1990)).limit(10);
        let retyped: QueryRequest<Author> = request.clone().as_request();
        assert_eq!(retyped.relation().table_name(), Some("book"));
        assert_eq!(retyped.relation().limit_value(), request.relation().limit_value());
        assert_eq!(retyped.relation().filters.len(), 1);
    }

    #[test]
    fn find_expects_one_row() {
        let db = crate::Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE book (id INTEGER PRIMARY KEY)").unwrap();
        assert!(Book::find(3).relation().expects_single_row(&db).unwrap());
        assert!(!Book::all().relation().expects_single_row(&db).unwrap());
    }

    #[test]
    fn association_constructors_use_table_names() {
        let author = Book::belongs_to::<Author>("author");
        assert_eq!(author.destination().table_name(), Some("author"));
        let books = Author::has_many::<Book>("books");
        assert!(books.kind().is_to_many());
    }
}
