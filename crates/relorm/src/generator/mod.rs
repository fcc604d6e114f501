//! Query generator.
//!
//! Compiles a [`Relation`] into SQLite SQL with `?` placeholders. The relation and its joined
//! destinations form a tree; every node gets a unique alias, joined nodes are attached with
//! `JOIN ... ON` (or `LEFT JOIN` for optional joins and anything nested under one), and the
//! selected columns are laid out in pre-order so the row adapter can split each fetched row
//! into its scopes.

pub mod sql;

use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::mutation::{ColumnAssignment, ConflictResolution};
use crate::relation::association::ResolvedPivot;
use crate::relation::expr::{Column, Expr};
use crate::relation::{Filter, JoinKind, Relation, Selection, Source};
use crate::value::Value;
use sql::SqlBuilder;
use std::collections::HashSet;

/// Column layout of one node of a compiled join tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ScopeLayout {
    pub(crate) key: String,
    /// Whether the node's columns form a scope of their own.
    pub(crate) selected: bool,
    /// `None` for the root, which owns whatever the joined scopes leave.
    pub(crate) width: Option<usize>,
    pub(crate) children: Vec<ScopeLayout>,
}

impl ScopeLayout {
    /// Columns taken by the joined descendants.
    pub(crate) fn descendant_width(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.width.unwrap_or(0) + child.descendant_width())
            .sum()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SelectStatement {
    pub(crate) sql: String,
    pub(crate) arguments: Vec<Value>,
    pub(crate) layout: ScopeLayout,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Projection {
    Relation,
    Count,
    Rowid,
}

struct Node<'r> {
    relation: &'r Relation,
    key: String,
    alias: String,
    kind: JoinKind,
    selected: bool,
    pivot: Option<ResolvedPivot>,
    children: Vec<Node<'r>>,
}

impl<'r> Node<'r> {
    fn tree(relation: &'r Relation, db: &Database) -> OrmResult<Self> {
        let mut root = Node {
            relation,
            key: String::new(),
            alias: String::new(),
            kind: JoinKind::Required,
            selected: true,
            pivot: None,
            children: joined_nodes(relation, JoinKind::Required, db)?,
        };
        let mut taken = HashSet::new();
        root.reserve_user_aliases(&mut taken)?;
        root.assign_aliases(&mut taken);
        Ok(root)
    }

    fn reserve_user_aliases(&self, taken: &mut HashSet<String>) -> OrmResult<()> {
        if let Some(alias) = self.relation.alias() {
            if !taken.insert(alias.to_ascii_lowercase()) {
                return Err(OrmError::usage(format!(
                    "alias `{alias}` names more than one relation of the query"
                )));
            }
        }
        self.children
            .iter()
            .try_for_each(|child| child.reserve_user_aliases(taken))
    }

    fn assign_aliases(&mut self, taken: &mut HashSet<String>) {
        self.alias = match self.relation.alias() {
            Some(alias) => alias.to_string(),
            None => {
                let base = self.relation.table_name().unwrap_or("subquery");
                let mut candidate = base.to_string();
                let mut suffix = 1;
                while !taken.insert(candidate.to_ascii_lowercase()) {
                    suffix += 1;
                    candidate = format!("{base}{suffix}");
                }
                candidate
            }
        };
        for child in &mut self.children {
            child.assign_aliases(taken);
        }
    }
}

fn joined_nodes<'r>(relation: &'r Relation, parent_kind: JoinKind, db: &Database) -> OrmResult<Vec<Node<'r>>> {
    relation
        .joins
        .iter()
        .map(|(key, joined)| {
            let destination = joined.association.destination();
            if !destination.can_be_join_origin() {
                return Err(OrmError::usage(format!(
                    "joined association `{key}` cannot be distinct, grouped or limited"
                )));
            }
            let kind = match parent_kind {
                JoinKind::Optional => JoinKind::Optional,
                JoinKind::Required => joined.kind,
            };
            Ok(Node {
                relation: destination,
                key: key.clone(),
                alias: String::new(),
                kind,
                selected: joined.selected,
                pivot: Some(joined.association.resolve_pivot(db)?),
                children: joined_nodes(destination, kind, db)?,
            })
        })
        .collect()
}

/// The relation's filters, with deferred predicates and key lookups resolved.
pub(crate) fn resolve_filters(relation: &Relation, db: &Database) -> OrmResult<Vec<Expr>> {
    relation
        .filters
        .iter()
        .map(|filter| match filter {
            Filter::Expr(expr) => Ok(expr.clone()),
            Filter::Deferred(predicate) => predicate(db),
            Filter::Keys { columns, keys } => key_filter(relation, columns.as_deref(), keys, db),
        })
        .collect()
}

fn key_filter(relation: &Relation, columns: Option<&[String]>, keys: &[Vec<Value>], db: &Database) -> OrmResult<Expr> {
    let columns = match columns {
        Some(columns) => columns.to_vec(),
        None => {
            let table = relation
                .table_name()
                .ok_or_else(|| OrmError::usage("key lookups need a table, not a subquery"))?;
            db.primary_key(table)?
        }
    };
    if let Some(key) = keys.iter().find(|key| key.len() != columns.len()) {
        return Err(OrmError::usage(format!(
            "key {key:?} does not match the key columns {columns:?}"
        )));
    }

    let mut exprs: Vec<Expr> = columns.into_iter().map(|c| Expr::Column(Column::new(c))).collect();
    match keys {
        [key] if exprs.len() == 1 => Ok(Expr::Compare {
            left: Box::new(exprs.remove(0)),
            op: "=",
            right: Box::new(Expr::Value(key[0].clone())),
        }),
        _ => Ok(Expr::row_in(exprs, keys.to_vec())),
    }
}

/// Compile the SELECT statement of a relation.
pub(crate) fn compile_select(relation: &Relation, db: &Database) -> OrmResult<SelectStatement> {
    let mut out = SqlBuilder::new();
    let layout = compile(relation, Projection::Relation, db, &mut out)?;
    let (sql, arguments) = out.finish();
    Ok(SelectStatement { sql, arguments, layout })
}

/// `SELECT COUNT(*)` over the relation's rows.
pub(crate) fn compile_count(relation: &Relation, db: &Database) -> OrmResult<(String, Vec<Value>)> {
    let mut out = SqlBuilder::new();
    let wraps = relation.is_distinct
        || !relation.group_by.is_empty()
        || !relation.having.is_empty()
        || relation.limit.is_some();
    if wraps {
        out.push("SELECT COUNT(*) FROM (");
        compile(relation, Projection::Relation, db, &mut out)?;
        out.push(")");
    } else {
        compile(relation, Projection::Count, db, &mut out)?;
    }
    Ok(out.finish())
}

pub(crate) fn compile_delete(relation: &Relation, db: &Database) -> OrmResult<(String, Vec<Value>)> {
    let table = mutated_table(relation)?;
    let mut out = SqlBuilder::new();
    out.push("DELETE FROM ").push_ident(table);
    push_mutation_filter(relation, db, &mut out)?;
    Ok(out.finish())
}

pub(crate) fn compile_update(
    relation: &Relation,
    conflict: ConflictResolution,
    assignments: &[ColumnAssignment],
    db: &Database,
) -> OrmResult<(String, Vec<Value>)> {
    let table = mutated_table(relation)?;
    let mut out = SqlBuilder::new();
    out.push(conflict.update_keyword()).push_ident(table).push(" SET ");
    for (i, assignment) in assignments.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.push_ident(&assignment.column).push(" = ");
        assignment.value.render(&mut out, None);
    }
    push_mutation_filter(relation, db, &mut out)?;
    Ok(out.finish())
}

fn mutated_table(relation: &Relation) -> OrmResult<&str> {
    relation
        .table_name()
        .ok_or_else(|| OrmError::usage("cannot delete or update the rows of a subquery"))
}

fn push_mutation_filter(relation: &Relation, db: &Database, out: &mut SqlBuilder) -> OrmResult<()> {
    let needs_rowid = !relation.joins.is_empty()
        || !relation.can_be_join_origin()
        || relation.alias.is_some();
    if needs_rowid {
        out.push(" WHERE rowid IN (");
        compile(relation, Projection::Rowid, db, out)?;
        out.push(")");
        return Ok(());
    }

    let filters = resolve_filters(relation, db)?;
    if !filters.is_empty() {
        out.push(" WHERE ");
        Expr::and(filters).render(out, None);
    }
    Ok(())
}

fn compile(relation: &Relation, projection: Projection, db: &Database, out: &mut SqlBuilder) -> OrmResult<ScopeLayout> {
    let root = Node::tree(relation, db)?;
    let qualify = !root.children.is_empty() || relation.alias.is_some();
    let alias = qualify.then_some(root.alias.as_str());

    out.push("SELECT ");
    let layout = match projection {
        Projection::Relation => {
            if relation.is_distinct {
                out.push("DISTINCT ");
            }
            push_selection(&root, true, qualify, db, out, &mut true)?
        }
        Projection::Count => {
            out.push("COUNT(*)");
            empty_layout()
        }
        Projection::Rowid => {
            out.push_column(alias, "rowid");
            empty_layout()
        }
    };

    out.push(" FROM ");
    push_source(&root, qualify, out);
    push_joins(&root, db, out)?;

    let filters = resolve_filters(relation, db)?;
    if !filters.is_empty() {
        out.push(" WHERE ");
        Expr::and(filters).render(out, alias);
    }

    if !relation.group_by.is_empty() {
        out.push(" GROUP BY ");
        for (i, expr) in relation.group_by.iter().enumerate() {
            if i > 0 {
                out.push(", ");
            }
            expr.render(out, alias);
        }
    }

    if !relation.having.is_empty() {
        out.push(" HAVING ");
        Expr::and(relation.having.clone()).render(out, alias);
    }

    if projection != Projection::Count {
        let mut first = true;
        push_ordering(&root, qualify, out, &mut first);
        if let Some(limit) = relation.limit {
            out.push(" LIMIT ").push_int(to_sql_int(limit.count));
            if let Some(offset) = limit.offset {
                out.push(" OFFSET ").push_int(to_sql_int(offset));
            }
        }
    }

    Ok(layout)
}

fn empty_layout() -> ScopeLayout {
    ScopeLayout {
        key: String::new(),
        selected: true,
        width: None,
        children: Vec::new(),
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_selection(
    node: &Node<'_>,
    is_root: bool,
    qualify: bool,
    db: &Database,
    out: &mut SqlBuilder,
    first: &mut bool,
) -> OrmResult<ScopeLayout> {
    let alias = qualify.then_some(node.alias.as_str());
    let mut width = 0;
    if node.selected {
        let all_columns = [Selection::AllColumns];
        let items = match node.relation.selection.as_slice() {
            [] => &all_columns[..],
            items => items,
        };
        for item in items {
            if !std::mem::replace(first, false) {
                out.push(", ");
            }
            match item {
                Selection::AllColumns => {
                    match alias {
                        Some(alias) => out.push_ident(alias).push(".*"),
                        None => out.push("*"),
                    };
                    if !is_root {
                        width += db.source_width(&node.relation.source)?;
                    }
                }
                Selection::Expr { expr, alias: name } => {
                    expr.render(out, alias);
                    if let Some(name) = name {
                        out.push(" AS ").push_ident(name);
                    }
                    width += 1;
                }
            }
        }
    }

    let mut children = Vec::with_capacity(node.children.len());
    for child in &node.children {
        children.push(push_selection(child, false, true, db, out, first)?);
    }
    Ok(ScopeLayout {
        key: node.key.clone(),
        selected: node.selected,
        width: (!is_root).then_some(width),
        children,
    })
}

fn push_source(node: &Node<'_>, qualify: bool, out: &mut SqlBuilder) {
    match &node.relation.source {
        Source::Table(name) => {
            out.push_ident(name);
            if qualify && node.alias != *name {
                out.push(" AS ").push_ident(&node.alias);
            }
        }
        Source::Subquery { sql, arguments } => {
            out.push("(").push_template(sql, arguments).push(")");
            if qualify {
                out.push(" AS ").push_ident(&node.alias);
            }
        }
    }
}

fn push_joins(parent: &Node<'_>, db: &Database, out: &mut SqlBuilder) -> OrmResult<()> {
    for child in &parent.children {
        out.push(match child.kind {
            JoinKind::Required => " JOIN ",
            JoinKind::Optional => " LEFT JOIN ",
        });
        push_source(child, true, out);

        let mut conditions = Vec::new();
        if let Some(pivot) = &child.pivot {
            for (left, right) in pivot.left.iter().zip(&pivot.right) {
                conditions.push(Expr::Compare {
                    left: Box::new(Expr::Column(Column::of(child.alias.clone(), right.clone()))),
                    op: "=",
                    right: Box::new(Expr::Column(Column::of(parent.alias.clone(), left.clone()))),
                });
            }
        }
        conditions.extend(resolve_filters(child.relation, db)?);
        out.push(" ON ");
        Expr::and(conditions).render(out, Some(&child.alias));

        push_joins(child, db, out)?;
    }
    Ok(())
}

fn push_ordering(node: &Node<'_>, qualify: bool, out: &mut SqlBuilder, first: &mut bool) {
    let alias = qualify.then_some(node.alias.as_str());
    for term in &node.relation.ordering {
        out.push(if std::mem::replace(first, false) { " ORDER BY " } else { ", " });
        term.render(out, alias);
    }
    for child in &node.children {
        push_ordering(child, true, out, first);
    }
}

impl Relation {
    /// The SELECT statement and arguments this relation compiles to.
    pub fn to_sql(&self, db: &Database) -> OrmResult<(String, Vec<Value>)> {
        let statement = compile_select(self, db)?;
        Ok((statement.sql, statement.arguments))
    }
}
