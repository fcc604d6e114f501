//! Immutable relation model.
//!
//! A [`Relation`] describes one SELECT: where rows come from, what is selected, how they are
//! filtered, grouped, ordered and limited, and which associations are joined into each row
//! or eagerly loaded alongside it. Relations never touch the database; the query generator
//! turns them into SQL when a request is prepared.
//!
//! Every derivation consumes the relation and returns a new one with exactly one change, so a
//! base relation can be cloned and specialized freely.

pub mod association;
pub mod expr;
pub mod ordering;
pub mod request;

use crate::database::Database;
use crate::error::OrmResult;
use crate::value::Value;
use association::Association;
use expr::{Column, Expr, IntoExpr};
use ordering::OrderTerm;
use std::fmt;
use std::sync::Arc;

pub use request::{QueryRequest, TableRecord};

/// Where a relation's rows come from.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    /// A table or view.
    Table(String),
    /// An arbitrary SELECT statement, used as `(sql) AS alias`.
    Subquery { sql: String, arguments: Vec<Value> },
}

/// One item of a relation's selection.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// Every column of the relation (`alias.*`).
    AllColumns,
    /// An expression, optionally renamed.
    Expr { expr: Expr, alias: Option<String> },
}

impl From<Column> for Selection {
    fn from(column: Column) -> Self {
        Selection::Expr {
            expr: Expr::Column(column),
            alias: None,
        }
    }
}

impl From<Expr> for Selection {
    fn from(expr: Expr) -> Self {
        Selection::Expr { expr, alias: None }
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Selection::from(Column::new(name))
    }
}

/// A filter evaluated when the request is prepared, against the live connection.
pub type DeferredFilter = Arc<dyn Fn(&Database) -> OrmResult<Expr> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Filter {
    Expr(Expr),
    Deferred(DeferredFilter),
    /// Key lookup; `columns: None` means the primary key, resolved at preparation.
    Keys {
        columns: Option<Vec<String>>,
        keys: Vec<Vec<Value>>,
    },
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            Filter::Deferred(_) => f.write_str("Deferred(..)"),
            Filter::Keys { columns, keys } => f
                .debug_struct("Keys")
                .field("columns", columns)
                .field("keys", keys)
                .finish(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limit {
    pub count: u64,
    pub offset: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    /// INNER JOIN: rows without a destination are dropped.
    Required,
    /// LEFT JOIN: rows without a destination get an all-NULL scope.
    Optional,
}

#[derive(Clone, Debug)]
pub(crate) struct JoinedAssociation {
    pub(crate) association: Association,
    pub(crate) kind: JoinKind,
    /// `including_*` selects the destination columns into a scope; `joining_*` does not.
    pub(crate) selected: bool,
}

/// Immutable description of one relational query.
#[derive(Clone, Debug)]
pub struct Relation {
    pub(crate) source: Source,
    pub(crate) selection: Vec<Selection>,
    pub(crate) is_distinct: bool,
    pub(crate) filters: Vec<Filter>,
    pub(crate) group_by: Vec<Expr>,
    pub(crate) having: Vec<Expr>,
    pub(crate) ordering: Vec<OrderTerm>,
    pub(crate) limit: Option<Limit>,
    pub(crate) joins: Vec<(String, JoinedAssociation)>,
    pub(crate) prefetches: Vec<Association>,
    pub(crate) alias: Option<String>,
}

impl Relation {
    /// All rows of a table.
    pub fn table(name: impl Into<String>) -> Self {
        Self::from_source(Source::Table(name.into()))
    }

    /// All rows of a SELECT statement with `?` placeholders.
    pub fn from_sql<V: Into<Value>>(sql: impl Into<String>, arguments: impl IntoIterator<Item = V>) -> Self {
        Self::from_source(Source::Subquery {
            sql: sql.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        })
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            selection: Vec::new(),
            is_distinct: false,
            filters: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            ordering: Vec::new(),
            limit: None,
            joins: Vec::new(),
            prefetches: Vec::new(),
            alias: None,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// The table name, when the source is a table.
    pub fn table_name(&self) -> Option<&str> {
        match &self.source {
            Source::Table(name) => Some(name),
            Source::Subquery { .. } => None,
        }
    }

    /// The explicit selection; empty means all columns.
    pub fn selection(&self) -> &[Selection] {
        &self.selection
    }

    pub fn is_distinct(&self) -> bool {
        self.is_distinct
    }

    pub fn group_by(&self) -> &[Expr] {
        &self.group_by
    }

    pub fn ordering(&self) -> &[OrderTerm] {
        &self.ordering
    }

    pub fn limit_value(&self) -> Option<Limit> {
        self.limit
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Keys of the single-row joins, in join order.
    pub fn join_keys(&self) -> impl Iterator<Item = &str> {
        self.joins.iter().map(|(key, _)| key.as_str())
    }

    /// Keys of the eagerly loaded associations.
    pub fn prefetch_keys(&self) -> impl Iterator<Item = &str> {
        self.prefetches.iter().map(Association::key)
    }

    /// Whether this relation or any joined destination eagerly loads an association.
    pub fn has_prefetches(&self) -> bool {
        !self.prefetches.is_empty()
            || self
                .joins
                .iter()
                .any(|(_, join)| join.association.destination().has_prefetches())
    }

    /// Whether the relation can be the origin side of a join.
    ///
    /// Joining multiplies or filters rows, which would change the meaning of DISTINCT,
    /// GROUP BY, HAVING and LIMIT.
    pub fn can_be_join_origin(&self) -> bool {
        !self.is_distinct && self.group_by.is_empty() && self.having.is_empty() && self.limit.is_none()
    }

    /// Whether the relation is known to produce at most one row.
    ///
    /// A column key filter only counts when the schema backs it with a primary key or a full
    /// unique index on a subset of its columns.
    pub(crate) fn expects_single_row(&self, db: &Database) -> OrmResult<bool> {
        if self.limit.is_some_and(|limit| limit.count <= 1) {
            return Ok(true);
        }
        if !self.group_by.is_empty() {
            return Ok(false);
        }
        for filter in &self.filters {
            let Filter::Keys { columns, keys } = filter else {
                continue;
            };
            if keys.len() > 1 {
                continue;
            }
            match (columns, &self.source) {
                (None, _) => return Ok(true),
                (Some(columns), Source::Table(table)) if db.covers_unique_key(table, columns)? => {
                    return Ok(true);
                }
                _ => {}
            }
        }
        Ok(false)
    }

    /// The same relation with no eager loading anywhere in its join tree.
    pub(crate) fn without_prefetches(mut self) -> Self {
        self.prefetches.clear();
        for (_, join) in &mut self.joins {
            join.association = join
                .association
                .clone()
                .map_destination(Relation::without_prefetches);
        }
        self
    }

    fn join(mut self, association: Association, kind: JoinKind, selected: bool) -> Self {
        assert!(
            self.can_be_join_origin(),
            "cannot join `{}` onto a relation that is distinct, grouped or limited",
            association.key()
        );
        let (key, joined) = association.into_join(kind, selected);
        match self.joins.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = joined,
            None => self.joins.push((key, joined)),
        }
        self
    }

    fn prefetch(mut self, association: Association) -> Self {
        match self.prefetches.iter_mut().find(|a| a.key() == association.key()) {
            Some(slot) => *slot = association,
            None => self.prefetches.push(association),
        }
        self
    }
}

/// Derivation operators shared by [`Relation`], [`QueryRequest`] and [`Association`].
///
/// Each operator returns a new value with exactly one change. On an association the operators
/// shape its destination relation.
pub trait DerivableRelation: Sized {
    /// Apply a transformation to the underlying relation.
    fn map_relation(self, f: impl FnOnce(Relation) -> Relation) -> Self;

    /// Replace the selection.
    fn select<S: Into<Selection>>(self, selection: impl IntoIterator<Item = S>) -> Self {
        let selection: Vec<Selection> = selection.into_iter().map(Into::into).collect();
        self.map_relation(|mut r| {
            r.selection = selection;
            r
        })
    }

    /// Append to the selection (an empty selection is first expanded to all columns).
    fn annotated<S: Into<Selection>>(self, selection: impl IntoIterator<Item = S>) -> Self {
        let extra: Vec<Selection> = selection.into_iter().map(Into::into).collect();
        self.map_relation(|mut r| {
            if r.selection.is_empty() {
                r.selection.push(Selection::AllColumns);
            }
            r.selection.extend(extra);
            r
        })
    }

    /// Conjoin a predicate.
    fn filter(self, predicate: impl IntoExpr) -> Self {
        let predicate = predicate.into_expr();
        self.map_relation(|mut r| {
            r.filters.push(Filter::Expr(predicate));
            r
        })
    }

    /// Conjoin a predicate computed from the connection when the request is prepared.
    fn filter_with(self, predicate: impl Fn(&Database) -> OrmResult<Expr> + Send + Sync + 'static) -> Self {
        let predicate: DeferredFilter = Arc::new(predicate);
        self.map_relation(|mut r| {
            r.filters.push(Filter::Deferred(predicate));
            r
        })
    }

    /// Filter on a single-column primary key.
    fn filter_key(self, key: impl Into<Value>) -> Self {
        let key = vec![key.into()];
        self.map_relation(|mut r| {
            r.filters.push(Filter::Keys {
                columns: None,
                keys: vec![key],
            });
            r
        })
    }

    /// Filter on a list of single-column primary keys.
    fn filter_keys<V: Into<Value>>(self, keys: impl IntoIterator<Item = V>) -> Self {
        let keys: Vec<Vec<Value>> = keys.into_iter().map(|k| vec![k.into()]).collect();
        self.map_relation(|mut r| {
            r.filters.push(Filter::Keys { columns: None, keys });
            r
        })
    }

    /// Filter on a (possibly composite) unique key given as column/value pairs.
    fn filter_unique_key<S: Into<String>, V: Into<Value>>(self, key: impl IntoIterator<Item = (S, V)>) -> Self {
        let (columns, values): (Vec<String>, Vec<Value>) =
            key.into_iter().map(|(c, v)| (c.into(), v.into())).unzip();
        self.map_relation(|mut r| {
            r.filters.push(Filter::Keys {
                columns: Some(columns),
                keys: vec![values],
            });
            r
        })
    }

    /// Replace the ordering.
    fn order<T: Into<OrderTerm>>(self, terms: impl IntoIterator<Item = T>) -> Self {
        let terms: Vec<OrderTerm> = terms.into_iter().map(Into::into).collect();
        self.map_relation(|mut r| {
            r.ordering = terms;
            r
        })
    }

    /// Reverse every ordering term. No-op without ordering.
    fn reversed(self) -> Self {
        self.map_relation(|mut r| {
            r.ordering = r.ordering.iter().map(OrderTerm::reversed).collect();
            r
        })
    }

    /// Remove the ordering.
    fn unordered(self) -> Self {
        self.map_relation(|mut r| {
            r.ordering.clear();
            r
        })
    }

    /// Replace the GROUP BY expressions.
    fn group<E: IntoExpr>(self, exprs: impl IntoIterator<Item = E>) -> Self {
        let exprs: Vec<Expr> = exprs.into_iter().map(IntoExpr::into_expr).collect();
        self.map_relation(|mut r| {
            r.group_by = exprs;
            r
        })
    }

    /// Conjoin a HAVING predicate.
    fn having(self, predicate: impl IntoExpr) -> Self {
        let predicate = predicate.into_expr();
        self.map_relation(|mut r| {
            r.having.push(predicate);
            r
        })
    }

    fn distinct(self) -> Self {
        self.map_relation(|mut r| {
            r.is_distinct = true;
            r
        })
    }

    fn limit(self, count: u64) -> Self {
        self.map_relation(|mut r| {
            r.limit = Some(Limit { count, offset: None });
            r
        })
    }

    fn limit_offset(self, count: u64, offset: u64) -> Self {
        self.map_relation(|mut r| {
            r.limit = Some(Limit {
                count,
                offset: Some(offset),
            });
            r
        })
    }

    /// Name the relation so other parts of the query can reference its columns with
    /// [`Column::of`].
    fn aliased(self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.map_relation(|mut r| {
            r.alias = Some(alias);
            r
        })
    }

    /// Join the association; rows without a destination are dropped. The destination
    /// columns are available as a scope under the association key.
    ///
    /// # Panics
    ///
    /// If the origin is distinct, grouped or limited.
    fn including_required(self, association: Association) -> Self {
        self.map_relation(|r| r.join(association, JoinKind::Required, true))
    }

    /// Left-join the association into a scope under the association key.
    ///
    /// # Panics
    ///
    /// If the origin is distinct, grouped or limited.
    fn including_optional(self, association: Association) -> Self {
        self.map_relation(|r| r.join(association, JoinKind::Optional, true))
    }

    /// Join the association for filtering or ordering only.
    ///
    /// # Panics
    ///
    /// If the origin is distinct, grouped or limited.
    fn joining_required(self, association: Association) -> Self {
        self.map_relation(|r| r.join(association, JoinKind::Required, false))
    }

    /// Left-join the association for filtering or ordering only.
    ///
    /// # Panics
    ///
    /// If the origin is distinct, grouped or limited.
    fn joining_optional(self, association: Association) -> Self {
        self.map_relation(|r| r.join(association, JoinKind::Optional, false))
    }

    /// Eagerly load all destination rows of the association, with one extra query per
    /// association when the request is fetched.
    fn including_all(self, association: Association) -> Self {
        self.map_relation(|r| r.prefetch(association))
    }
}

impl DerivableRelation for Relation {
    fn map_relation(self, f: impl FnOnce(Relation) -> Relation) -> Self {
        f(self)
    }
}
