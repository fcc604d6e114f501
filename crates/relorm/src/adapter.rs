//! Splits a flat statement row into the root row and the scopes of its joins.

use crate::error::{OrmError, OrmResult};
use crate::generator::ScopeLayout;
use crate::row::{Columns, Row};
use crate::value::Value;
use std::sync::Arc;

/// One contiguous column range copied into one row of the buffer.
#[derive(Debug)]
struct Slot {
    /// Scope indices leading from the root row to the target row.
    path: Vec<usize>,
    start: usize,
    len: usize,
}

/// Maps the columns of a statement onto a nested [`Row`] buffer.
///
/// Built once per prepared statement; [`fill`](Self::fill) then refills the same buffer for
/// every step without reallocating its column tables.
#[derive(Debug)]
pub(crate) struct RowAdapter {
    template: Row,
    slots: Vec<Slot>,
}

impl RowAdapter {
    pub(crate) fn new(layout: &ScopeLayout, names: &[String]) -> OrmResult<Self> {
        let joined = layout.descendant_width();
        let root_width = names.len().checked_sub(joined).ok_or_else(|| {
            OrmError::usage(format!(
                "statement returns {} columns but its joined scopes need {joined}",
                names.len()
            ))
        })?;

        let mut template = Row::new(Arc::new(Columns::new(names[..root_width].iter().cloned())), Vec::new());
        let mut slots = vec![Slot {
            path: Vec::new(),
            start: 0,
            len: root_width,
        }];
        let mut start = root_width;
        attach(&layout.children, &mut template, &[], names, &mut start, &mut slots);
        Ok(Self { template, slots })
    }

    /// A buffer shaped for this statement, every value NULL.
    pub(crate) fn empty_row(&self) -> Row {
        self.template.clone()
    }

    /// Copy the values of `source` into `row`, which must come from [`empty_row`](Self::empty_row).
    pub(crate) fn fill(&self, source: &rusqlite::Row<'_>, row: &mut Row) -> OrmResult<()> {
        for slot in &self.slots {
            let mut target = &mut *row;
            for &index in &slot.path {
                target = target
                    .scopes_mut()
                    .nth(index)
                    .ok_or_else(|| OrmError::usage("row buffer does not match the statement layout"))?;
            }
            for (offset, value) in target.values_mut().iter_mut().take(slot.len).enumerate() {
                *value = Value::from(source.get_ref(slot.start + offset)?);
            }
        }
        Ok(())
    }
}

fn attach(
    layouts: &[ScopeLayout],
    parent: &mut Row,
    parent_path: &[usize],
    names: &[String],
    start: &mut usize,
    slots: &mut Vec<Slot>,
) {
    for layout in layouts {
        let width = layout.width.unwrap_or(0);
        if !layout.selected {
            // scopes below a join that is not selected surface on the nearest selected row
            *start += width;
            attach(&layout.children, parent, parent_path, names, start, slots);
            continue;
        }

        let columns = Columns::new(names[*start..*start + width].iter().cloned());
        let mut path = parent_path.to_vec();
        path.push(parent.scope_keys().count());
        slots.push(Slot {
            path: path.clone(),
            start: *start,
            len: width,
        });
        *start += width;

        let mut scope = Row::new(Arc::new(columns), Vec::new());
        attach(&layout.children, &mut scope, &path, names, start, slots);
        parent.push_scope(layout.key.clone(), scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(key: &str, selected: bool, width: usize, children: Vec<ScopeLayout>) -> ScopeLayout {
        ScopeLayout {
            key: key.to_string(),
            selected,
            width: Some(width),
            children,
        }
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn splits_columns_into_nested_scopes() {
        let root = ScopeLayout {
            key: String::new(),
            selected: true,
            width: None,
            children: vec![layout("author", true, 2, vec![layout("country", true, 1, vec![])])],
        };
        let adapter = RowAdapter::new(&root, &names(&["id", "title", "id", "name", "code"])).unwrap();
        let row = adapter.empty_row();
        assert_eq!(row.column_names(), ["id", "title"]);
        let author = row.scope("author").unwrap();
        assert_eq!(author.column_names(), ["id", "name"]);
        assert_eq!(author.scope("country").unwrap().column_names(), ["code"]);
    }

    #[test]
    fn unselected_joins_lift_their_scopes() {
        let root = ScopeLayout {
            key: String::new(),
            selected: true,
            width: None,
            children: vec![layout("leader#through", false, 0, vec![layout("leader", true, 2, vec![])])],
        };
        let adapter = RowAdapter::new(&root, &names(&["id", "id", "name"])).unwrap();
        let row = adapter.empty_row();
        assert_eq!(row.scope_keys().collect::<Vec<_>>(), ["leader"]);
        assert_eq!(row.scope("leader").unwrap().len(), 2);
    }

    #[test]
    fn fill_copies_every_slot() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let root = ScopeLayout {
            key: String::new(),
            selected: true,
            width: None,
            children: vec![layout("author", true, 1, vec![])],
        };
        let adapter = RowAdapter::new(&root, &names(&["title", "name"])).unwrap();
        let mut buffer = adapter.empty_row();
        conn.query_row("SELECT 'Dune', 'Herbert'", [], |row| {
            adapter.fill(row, &mut buffer).unwrap();
            Ok(())
        })
        .unwrap();
        assert_eq!(buffer.get::<String>("title").unwrap(), "Dune");
        assert_eq!(buffer.scope("author").unwrap().get::<String>("name").unwrap(), "Herbert");
    }

    #[test]
    fn too_few_columns_is_usage_error() {
        let root = ScopeLayout {
            key: String::new(),
            selected: true,
            width: None,
            children: vec![layout("author", true, 3, vec![])],
        };
        assert!(RowAdapter::new(&root, &names(&["id"])).unwrap_err().is_usage());
    }
}
