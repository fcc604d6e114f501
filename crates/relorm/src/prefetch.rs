//! Eager loading of associations, one query per association level.
//!
//! Associations wait in a breadth-first worklist, each addressed by the path leading from the
//! fetched rows to the rows it attaches to. For each one the destination is fetched once,
//! filtered on the key tuples of every parent at that path, and annotated with the pivot
//! columns renamed `__relorm_pivot_<column>`. Child rows are grouped by those columns, the
//! columns are stripped, and every parent receives its group (empty when nothing matched).

use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::fetch::PreparedRequest;
use crate::relation::association::{Association, ResolvedPivot};
use crate::relation::expr::{Column, Expr, ExprOps};
use crate::relation::{DerivableRelation, Relation};
use crate::row::{Columns, Row};
use crate::trace::debug_event;
use crate::value::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Prefix of the synthetic columns used to group child rows by parent key.
pub const PIVOT_COLUMN_PREFIX: &str = "__relorm_pivot_";

const THROUGH_ALIAS: &str = "__relorm_through";

#[derive(Clone, Debug)]
enum Segment {
    Scope(String),
    Prefetched(String),
}

struct Pending {
    path: Vec<Segment>,
    association: Association,
}

/// Queue the prefetches of `relation` and of its joined destinations.
///
/// Joins that are not selected have no row of their own; their prefetches are skipped, but
/// their selected joins still surface on the current row.
fn seed(relation: &Relation, path: &[Segment], attach: bool, worklist: &mut VecDeque<Pending>) {
    if attach {
        for association in &relation.prefetches {
            worklist.push_back(Pending {
                path: path.to_vec(),
                association: association.clone(),
            });
        }
    }
    for (key, joined) in &relation.joins {
        let destination = joined.association.destination();
        if joined.selected {
            let mut nested = path.to_vec();
            nested.push(Segment::Scope(key.clone()));
            seed(destination, &nested, true, worklist);
        } else {
            seed(destination, path, false, worklist);
        }
    }
}

fn collect_mut<'a>(rows: &'a mut [Row], path: &[Segment]) -> Vec<&'a mut Row> {
    let mut current: Vec<&'a mut Row> = rows.iter_mut().collect();
    for segment in path {
        current = current
            .into_iter()
            .flat_map(|row| -> Vec<&'a mut Row> {
                match segment {
                    Segment::Scope(key) => row.scope_mut(key).into_iter().collect(),
                    Segment::Prefetched(key) => row
                        .prefetched_mut(key)
                        .map(|rows| rows.iter_mut().collect())
                        .unwrap_or_default(),
                }
            })
            .collect();
    }
    current
}

fn pivot_alias(column: &str) -> String {
    format!("{PIVOT_COLUMN_PREFIX}{column}")
}

/// The destination query of one association level, before parent keys are known.
pub(crate) struct LevelQuery {
    relation: Relation,
    /// Parent columns holding the key.
    left: Vec<String>,
    /// Destination expressions matched against the parent keys.
    right: Vec<Expr>,
}

impl LevelQuery {
    pub(crate) fn new(db: &Database, association: &Association) -> OrmResult<Self> {
        let key = association.key();
        let Some((pivot, target)) = association.through_edges() else {
            let resolved = association.resolve_pivot(db)?;
            let destination = association.destination();
            if destination.limit.is_some() {
                return Err(OrmError::usage(format!(
                    "eagerly loaded association `{key}` cannot be limited"
                )));
            }
            let relation = destination.clone().without_prefetches().annotated(
                resolved
                    .right
                    .iter()
                    .map(|column| Column::new(column.clone()).aliased(pivot_alias(column))),
            );
            let right = resolved
                .right
                .iter()
                .map(|column| Expr::Column(Column::new(column.clone())))
                .collect();
            return Ok(Self {
                relation,
                left: resolved.left,
                right,
            });
        };

        if pivot.through_edges().is_some() || target.through_edges().is_some() {
            return Err(OrmError::usage(format!(
                "association `{key}` nests through associations, which cannot be eagerly loaded"
            )));
        }
        let destination = target.destination();
        if !destination.can_be_join_origin() {
            return Err(OrmError::usage(format!(
                "eagerly loaded association `{key}` cannot be distinct, grouped or limited"
            )));
        }

        // origin ⇄ pivot, then pivot ⇄ destination
        let origin = pivot.resolve_pivot(db)?;
        let hop = target.resolve_pivot(db)?;

        let mut pivot_relation = pivot.destination().clone().without_prefetches();
        let pivot_name = match pivot_relation.alias() {
            Some(alias) => alias.to_string(),
            None => {
                pivot_relation = pivot_relation.aliased(THROUGH_ALIAS);
                THROUGH_ALIAS.to_string()
            }
        };
        let bridge = Association::belongs_to(
            format!("{key}#pivot"),
            destination.table_name().unwrap_or_default(),
            pivot_relation,
        )
        .with_resolved_pivot(ResolvedPivot {
            left: hop.right,
            right: hop.left,
        });

        let relation = destination
            .clone()
            .without_prefetches()
            .joining_required(bridge)
            .annotated(
                origin
                    .right
                    .iter()
                    .map(|column| Column::of(pivot_name.clone(), column.clone()).aliased(pivot_alias(column))),
            );
        let right = origin
            .right
            .iter()
            .map(|column| Expr::Column(Column::of(pivot_name.clone(), column.clone())))
            .collect();
        Ok(Self {
            relation,
            left: origin.left,
            right,
        })
    }

    /// The destination rows of the given parent keys.
    pub(crate) fn for_keys(&self, keys: Vec<Vec<Value>>) -> Relation {
        self.relation.clone().filter(Expr::row_in(self.right.clone(), keys))
    }

    fn pivot_width(&self) -> usize {
        self.right.len()
    }
}

fn parent_key(row: &Row, columns: &[String], association: &str) -> OrmResult<Vec<Value>> {
    columns
        .iter()
        .map(|column| {
            row.value(column).cloned().ok_or_else(|| {
                OrmError::usage(format!(
                    "cannot load `{association}`: column `{column}` is not selected"
                ))
            })
        })
        .collect()
}

/// Attach the eager associations of `relation` to its fetched `rows`.
pub(crate) fn load(db: &Database, relation: &Relation, rows: &mut [Row]) -> OrmResult<()> {
    let mut worklist = VecDeque::new();
    seed(relation, &[], true, &mut worklist);

    while let Some(Pending { path, association }) = worklist.pop_front() {
        let mut parents = collect_mut(rows, &path);
        if parents.is_empty() {
            continue;
        }

        let key = association.key();
        let level = LevelQuery::new(db, &association)?;
        let parent_keys = parents
            .iter()
            .map(|parent| parent_key(parent, &level.left, key))
            .collect::<OrmResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        let keys: Vec<Vec<Value>> = parent_keys
            .iter()
            .filter(|tuple| !tuple.iter().any(Value::is_null))
            .filter(|tuple| seen.insert(*tuple))
            .cloned()
            .collect();

        let mut groups: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();
        if !keys.is_empty() {
            debug_event!(association = key, parents = parents.len(), keys = keys.len(), "prefetching");
            let children = PreparedRequest::<Row>::new(&level.for_keys(keys), db)?.fetch_rows()?;
            let width = level.pivot_width();
            let mut stripped: Option<Arc<Columns>> = None;
            for mut child in children {
                let columns = stripped.get_or_insert_with(|| {
                    let names = child.column_names();
                    Arc::new(Columns::new(names[..names.len().saturating_sub(width)].iter().cloned()))
                });
                let pivot = child.split_off_trailing(width, Arc::clone(columns));
                groups.entry(pivot).or_default().push(child);
            }
        }

        for (parent, tuple) in parents.iter_mut().zip(&parent_keys) {
            parent.set_prefetched(key, groups.get(tuple).cloned().unwrap_or_default());
        }

        let mut nested = path;
        nested.push(Segment::Prefetched(key.to_string()));
        seed(association.destination(), &nested, true, &mut worklist);
    }
    Ok(())
}

/// Every destination query eager loading would run, filtered on an empty key set.
pub(crate) fn level_relations(db: &Database, relation: &Relation) -> OrmResult<Vec<Relation>> {
    let mut worklist = VecDeque::new();
    seed(relation, &[], true, &mut worklist);

    let mut relations = Vec::new();
    while let Some(Pending { path, association }) = worklist.pop_front() {
        relations.push(LevelQuery::new(db, &association)?.for_keys(Vec::new()));
        let mut nested = path;
        nested.push(Segment::Prefetched(association.key().to_string()));
        seed(association.destination(), &nested, true, &mut worklist);
    }
    Ok(relations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchRequest;
    use crate::monitor::{HookAction, QueryContext, QueryHook};
    use crate::relation::expr::col;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);
    impl QueryHook for Counter {
        fn before_query(&self, _ctx: &QueryContext) -> HookAction {
            self.0.fetch_add(1, Ordering::SeqCst);
            HookAction::Continue
        }
    }

    fn db() -> (Database, Arc<Counter>) {
        let counter = Arc::new(Counter::default());
        let db = Database::open_in_memory().unwrap().add_hook_arc(counter.clone());
        db.execute_batch(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id), label TEXT);
             INSERT INTO parent (id, name) VALUES (1, 'one'), (2, 'two'), (3, 'three');
             INSERT INTO child (parent_id, label) VALUES (1, 'a'), (1, 'b'), (2, 'c');",
        )
        .unwrap();
        (db, counter)
    }

    fn children() -> Association {
        Association::has_many("children", "parent", Relation::table("child")).order([col("label")])
    }

    #[test]
    fn groups_children_by_parent_key() {
        let (db, counter) = db();
        let rows = Relation::table("parent")
            .order([col("id")])
            .including_all(children())
            .fetch_all(&db)
            .unwrap();

        let sizes: Vec<usize> = rows.iter().map(|r| r.prefetched_rows("children").unwrap().len()).collect();
        assert_eq!(sizes, [2, 1, 0]);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        let first = &rows[0].prefetched_rows("children").unwrap()[0];
        assert_eq!(first.get::<String>("label").unwrap(), "a");
        assert!(!first.column_names().iter().any(|c| c.starts_with(PIVOT_COLUMN_PREFIX)));
    }

    #[test]
    fn empty_parents_skip_the_level() {
        let (db, counter) = db();
        let rows = Relation::table("parent")
            .filter(col("id").gt(100))
            .including_all(children())
            .fetch_all(&db)
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unselected_key_column_is_usage_error() {
        let (db, _) = db();
        let err = Relation::table("parent")
            .select(["name"])
            .including_all(children())
            .fetch_all(&db)
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn cursor_refuses_prefetching_relation() {
        let (db, _) = db();
        let mut prepared = Relation::table("parent").including_all(children()).prepare(&db).unwrap();
        assert!(prepared.fetch_cursor().unwrap_err().is_usage());
    }

    #[test]
    fn level_relations_follow_nesting() {
        let (db, _) = db();
        let nested = children().including_all(Association::has_many("siblings", "child", Relation::table("child")).with_foreign_key(["id"], None));
        let relations = level_relations(&db, &Relation::table("parent").including_all(nested)).unwrap();
        assert_eq!(relations.len(), 2);
        let (sql, _) = relations[0].to_sql(&db).unwrap();
        assert!(sql.ends_with("WHERE 0 ORDER BY \"label\" ASC"), "{sql}");
    }
}
