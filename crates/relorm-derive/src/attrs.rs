//! `#[orm(...)]` attribute parsing shared by the derives.

use syn::{Attribute, Field, LitStr, Result};

/// Where a `FromRow` field takes its value from.
pub(crate) enum FieldSource {
    /// A column of the row itself.
    Column(String),
    /// The record joined under this scope key.
    Scope(String),
    /// The child group loaded under this prefetch key.
    Prefetched(String),
}

impl FieldSource {
    pub(crate) fn column(&self) -> Option<&str> {
        match self {
            FieldSource::Column(column) => Some(column),
            _ => None,
        }
    }
}

pub(crate) fn field_source(field: &Field) -> Result<FieldSource> {
    let mut source = None;
    for attr in orm_attrs(&field.attrs) {
        attr.parse_nested_meta(|meta| {
            let kind: fn(String) -> FieldSource = if meta.path.is_ident("column") {
                FieldSource::Column
            } else if meta.path.is_ident("scope") {
                FieldSource::Scope
            } else if meta.path.is_ident("prefetched") {
                FieldSource::Prefetched
            } else {
                return Err(meta.error("expected `column`, `scope` or `prefetched`"));
            };
            if source.is_some() {
                return Err(meta.error("a field takes its value from a single source"));
            }
            let value: LitStr = meta.value()?.parse()?;
            source = Some(kind(value.value()));
            Ok(())
        })?;
    }
    Ok(source.unwrap_or_else(|| {
        let ident = field.ident.as_ref().map(ToString::to_string).unwrap_or_default();
        FieldSource::Column(ident.trim_start_matches("r#").to_string())
    }))
}

/// The value of the struct-level `#[orm(table = "...")]`.
pub(crate) fn table_name(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table = None;
    for attr in orm_attrs(attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `table`"))
            }
        })?;
    }
    Ok(table)
}

fn orm_attrs(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|attr| attr.path().is_ident("orm"))
}
