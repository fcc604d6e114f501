//! Statement text accumulator.
//!
//! Pieces of SQL and their arguments are collected side by side; every bound value is
//! rendered as an anonymous `?` placeholder so fragments compose without tracking indices.

use crate::value::Value;
use std::fmt::Write;

/// Accumulates SQL text and the arguments for its `?` placeholders.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    sql: String,
    arguments: Vec<Value>,
}

impl SqlBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw SQL (no arguments).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.sql.push('?');
        self.arguments.push(value.into());
        self
    }

    /// Append a comma-separated list of placeholders and bind all values.
    ///
    /// If `values` is empty, this appends `NULL` (so `IN (NULL)` is valid SQL).
    pub fn push_bind_list<V: Into<Value>>(&mut self, values: impl IntoIterator<Item = V>) -> &mut Self {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return self.push("NULL");
        };
        self.push_bind(first);
        for value in iter {
            self.push(", ");
            self.push_bind(value);
        }
        self
    }

    /// Append a SQL fragment that carries its own `?` placeholders.
    pub fn push_template(&mut self, sql: &str, arguments: &[Value]) -> &mut Self {
        self.sql.push_str(sql);
        self.arguments.extend_from_slice(arguments);
        self
    }

    /// Append a double-quoted identifier.
    pub fn push_ident(&mut self, ident: &str) -> &mut Self {
        push_quoted(&mut self.sql, ident);
        self
    }

    /// Append `"qualifier"."name"`, or just `"name"` without a qualifier.
    pub fn push_column(&mut self, qualifier: Option<&str>, name: &str) -> &mut Self {
        if let Some(qualifier) = qualifier {
            self.push_ident(qualifier);
            self.sql.push('.');
        }
        if name == "rowid" || name == "*" {
            // rowid is not a real column and cannot be quoted as one when shadowed
            self.sql.push_str(name);
        } else {
            self.push_ident(name);
        }
        self
    }

    /// Append a formatted integer (LIMIT/OFFSET values are inlined, never bound).
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        let _ = write!(self.sql, "{value}");
        self
    }

    /// Append another builder, consuming it.
    pub fn push_sql(&mut self, other: SqlBuilder) -> &mut Self {
        self.sql.push_str(&other.sql);
        self.arguments.extend(other.arguments);
        self
    }

    /// The SQL written so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Consume the builder.
    pub fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.arguments)
    }
}

/// Quote an identifier the way SQLite expects: wrapped in `"`, inner quotes doubled.
pub fn quote_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    push_quoted(&mut out, ident);
    out
}

fn push_quoted(out: &mut String, ident: &str) {
    out.push('"');
    for ch in ident.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
}
