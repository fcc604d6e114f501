//! Association edges between relations.
//!
//! An association knows its key (the scope or prefetch name rows are attached under), its
//! destination relation, and how origin columns pair with destination columns. The pairing
//! is either given explicitly or inferred from the schema's foreign keys when the request is
//! prepared.

use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::relation::{DerivableRelation, JoinKind, JoinedAssociation, Relation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationKind {
    /// The origin holds a foreign key to the destination.
    BelongsTo,
    /// The destination holds a foreign key to the origin; at most one row.
    HasOne,
    /// The destination holds a foreign key to the origin.
    HasMany,
    /// Reaches the destination through an intermediate association.
    HasManyThrough,
    /// Reaches a single destination through an intermediate association.
    HasOneThrough,
}

impl AssociationKind {
    pub fn is_to_many(self) -> bool {
        matches!(self, AssociationKind::HasMany | AssociationKind::HasManyThrough)
    }
}

/// Column pairing of a direct association: `origin.left[i] = destination.right[i]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPivot {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

#[derive(Clone, Debug)]
pub(crate) enum PivotSource {
    /// Find the single foreign key between the two tables.
    Inferred,
    /// Foreign key columns on the child table, referencing `to` (or the parent's primary key).
    ForeignKey {
        columns: Vec<String>,
        to: Option<Vec<String>>,
    },
    Resolved(ResolvedPivot),
}

#[derive(Clone, Debug)]
pub(crate) enum Link {
    Direct {
        origin: String,
        destination: Relation,
        pivot: PivotSource,
    },
    Through {
        pivot: Box<Association>,
        target: Box<Association>,
    },
}

/// An association edge from an origin table to a destination relation.
#[derive(Clone, Debug)]
pub struct Association {
    pub(crate) key: String,
    pub(crate) kind: AssociationKind,
    pub(crate) link: Link,
}

impl Association {
    fn direct(key: impl Into<String>, kind: AssociationKind, origin: impl Into<String>, destination: Relation) -> Self {
        Self {
            key: key.into(),
            kind,
            link: Link::Direct {
                origin: origin.into(),
                destination,
                pivot: PivotSource::Inferred,
            },
        }
    }

    /// `origin` holds a foreign key to `destination`.
    pub fn belongs_to(key: impl Into<String>, origin: impl Into<String>, destination: Relation) -> Self {
        Self::direct(key, AssociationKind::BelongsTo, origin, destination)
    }

    /// `destination` holds a foreign key to `origin`, and at most one row matches.
    pub fn has_one(key: impl Into<String>, origin: impl Into<String>, destination: Relation) -> Self {
        Self::direct(key, AssociationKind::HasOne, origin, destination)
    }

    /// `destination` holds a foreign key to `origin`.
    pub fn has_many(key: impl Into<String>, origin: impl Into<String>, destination: Relation) -> Self {
        Self::direct(key, AssociationKind::HasMany, origin, destination)
    }

    /// Reach `target`'s destination through `pivot`. `target` must start where `pivot` ends.
    pub fn has_many_through(key: impl Into<String>, pivot: Association, target: Association) -> Self {
        Self {
            key: key.into(),
            kind: AssociationKind::HasManyThrough,
            link: Link::Through {
                pivot: Box::new(pivot),
                target: Box::new(target),
            },
        }
    }

    /// Like [`has_many_through`](Self::has_many_through), for a single destination row.
    pub fn has_one_through(key: impl Into<String>, pivot: Association, target: Association) -> Self {
        Self {
            key: key.into(),
            kind: AssociationKind::HasOneThrough,
            link: Link::Through {
                pivot: Box::new(pivot),
                target: Box::new(target),
            },
        }
    }

    /// Pin the foreign key: `columns` on the child table reference `to` on the parent table
    /// (its primary key when `to` is `None`). On a through association this applies to the
    /// target edge.
    pub fn with_foreign_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>, to: Option<Vec<String>>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        match &mut self.link {
            Link::Direct { pivot, .. } => *pivot = PivotSource::ForeignKey { columns, to },
            Link::Through { target, .. } => {
                **target = target.as_ref().clone().with_foreign_key(columns, to);
            }
        }
        self
    }

    /// Pin the column pairing directly: `origin.left[i] = destination.right[i]`.
    pub(crate) fn with_resolved_pivot(mut self, resolved: ResolvedPivot) -> Self {
        if let Link::Direct { pivot, .. } = &mut self.link {
            *pivot = PivotSource::Resolved(resolved);
        }
        self
    }

    /// Rename the association key.
    pub fn for_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// The relation rows are fetched from.
    pub fn destination(&self) -> &Relation {
        match &self.link {
            Link::Direct { destination, .. } => destination,
            Link::Through { target, .. } => target.destination(),
        }
    }

    pub(crate) fn map_destination(mut self, f: impl FnOnce(Relation) -> Relation) -> Self {
        self.link = match self.link {
            Link::Direct {
                origin,
                destination,
                pivot,
            } => Link::Direct {
                origin,
                destination: f(destination),
                pivot,
            },
            Link::Through { pivot, target } => Link::Through {
                pivot,
                target: Box::new((*target).map_destination(f)),
            },
        };
        self
    }

    /// Turn the association into a join entry.
    ///
    /// A through association becomes a join on its pivot (never selected) whose destination
    /// joins the target under this association's key; the target scope then surfaces on the
    /// origin row.
    pub(crate) fn into_join(self, kind: JoinKind, selected: bool) -> (String, JoinedAssociation) {
        match self.link {
            Link::Direct { .. } => (
                self.key.clone(),
                JoinedAssociation {
                    association: self,
                    kind,
                    selected,
                },
            ),
            Link::Through { pivot, target } => {
                let key = format!("{}#through", self.key);
                let target = (*target).for_key(self.key);
                let pivot = (*pivot).map_destination(|destination| match (kind, selected) {
                    (JoinKind::Required, true) => destination.including_required(target),
                    (JoinKind::Required, false) => destination.joining_required(target),
                    (JoinKind::Optional, true) => destination.including_optional(target),
                    (JoinKind::Optional, false) => destination.joining_optional(target),
                });
                (
                    key,
                    JoinedAssociation {
                        association: pivot,
                        kind,
                        selected: false,
                    },
                )
            }
        }
    }

    /// Resolve the column pairing of a direct association against the schema.
    pub(crate) fn resolve_pivot(&self, db: &Database) -> OrmResult<ResolvedPivot> {
        let Link::Direct {
            origin,
            destination,
            pivot,
        } = &self.link
        else {
            return Err(OrmError::usage(format!(
                "association `{}` goes through another association and has no direct pivot",
                self.key
            )));
        };
        if let PivotSource::Resolved(resolved) = pivot {
            return Ok(resolved.clone());
        }

        let destination_table = destination.table_name().ok_or_else(|| {
            OrmError::usage(format!(
                "association `{}` targets a subquery and needs an explicit pivot",
                self.key
            ))
        })?;

        // child holds the foreign key, parent is referenced by it
        let (child, parent) = match self.kind {
            AssociationKind::BelongsTo => (origin.as_str(), destination_table),
            _ => (destination_table, origin.as_str()),
        };

        let (child_columns, parent_columns) = match pivot {
            PivotSource::ForeignKey { columns, to } => {
                let to = match to {
                    Some(to) => to.clone(),
                    None => db.primary_key(parent)?,
                };
                (columns.clone(), to)
            }
            PivotSource::Inferred => {
                let candidates: Vec<_> = db
                    .foreign_keys(child)?
                    .iter()
                    .filter(|fk| fk.destination_table.eq_ignore_ascii_case(parent))
                    .cloned()
                    .collect();
                let fk = match candidates.as_slice() {
                    [fk] => fk.clone(),
                    [] => {
                        return Err(OrmError::usage(format!(
                            "association `{}`: no foreign key from `{child}` to `{parent}`",
                            self.key
                        )));
                    }
                    _ => {
                        return Err(OrmError::usage(format!(
                            "association `{}`: several foreign keys from `{child}` to `{parent}`; \
                             pick one with `with_foreign_key`",
                            self.key
                        )));
                    }
                };
                let to = match fk.destination_columns {
                    Some(to) => to,
                    None => db.primary_key(parent)?,
                };
                (fk.origin_columns, to)
            }
            PivotSource::Resolved(resolved) => return Ok(resolved.clone()),
        };

        if child_columns.len() != parent_columns.len() || child_columns.is_empty() {
            return Err(OrmError::usage(format!(
                "association `{}`: foreign key columns {child_columns:?} do not match {parent_columns:?}",
                self.key
            )));
        }

        Ok(match self.kind {
            AssociationKind::BelongsTo => ResolvedPivot {
                left: child_columns,
                right: parent_columns,
            },
            _ => ResolvedPivot {
                left: parent_columns,
                right: child_columns,
            },
        })
    }

    /// The (pivot, target) edges of a through association.
    pub(crate) fn through_edges(&self) -> Option<(&Association, &Association)> {
        match &self.link {
            Link::Through { pivot, target } => Some((pivot, target)),
            Link::Direct { .. } => None,
        }
    }
}

impl DerivableRelation for Association {
    fn map_relation(self, f: impl FnOnce(Relation) -> Relation) -> Self {
        self.map_destination(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::expr::{ExprOps, col};

    #[test]
    fn derivations_shape_the_destination() {
        let books = Association::has_many("books", "author", Relation::table("book"))
            .filter(col("year").gt(2000))
            .order([col("title")]);
        assert_eq!(books.destination().filters.len(), 1);
        assert_eq!(books.destination().ordering().len(), 1);
        assert!(books.kind().is_to_many());
    }

    #[test]
    fn through_derivations_reach_the_target() {
        let passports = Association::has_many("passports", "country", Relation::table("passport"));
        let citizen = Association::belongs_to("citizen", "passport", Relation::table("citizen"));
        let citizens = Association::has_many_through("citizens", passports, citizen).filter(col("age").gte(18));

        assert_eq!(citizens.destination().table_name(), Some("citizen"));
        assert_eq!(citizens.destination().filters.len(), 1);
    }

    #[test]
    fn through_join_surfaces_target_under_through_key() {
        let passports = Association::has_many("passports", "country", Relation::table("passport"));
        let citizen = Association::belongs_to("citizen", "passport", Relation::table("citizen"));
        let (key, joined) = Association::has_one_through("leader", passports, citizen)
            .into_join(JoinKind::Optional, true);

        assert_eq!(key, "leader#through");
        assert!(!joined.selected);
        let inner = joined.association.destination();
        assert_eq!(inner.join_keys().collect::<Vec<_>>(), ["leader"]);
        assert!(inner.joins[0].1.selected);
        assert_eq!(inner.joins[0].1.kind, JoinKind::Optional);
    }
}
