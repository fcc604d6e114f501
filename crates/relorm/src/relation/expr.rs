//! Expression layer for selections, filters, grouping and ordering.
//!
//! Expressions are plain trees: nothing is rendered until the query generator walks them
//! with the alias of the relation they belong to. An unqualified [`Column`] therefore
//! always means "this column of the relation I was attached to", and only becomes
//! `"alias"."column"` once the generator decides the statement needs qualification.

use crate::generator::sql::SqlBuilder;
use crate::relation::ordering::{OrderTerm, SortDirection};
use crate::relation::Selection;
use crate::value::Value;

/// A column reference, optionally pinned to a named relation (see `aliased`).
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub(crate) qualifier: Option<String>,
    pub(crate) name: String,
}

impl Column {
    /// A column of the relation the expression is attached to.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// A column of the relation aliased `qualifier`, wherever it sits in the join tree.
    pub fn of(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// The implicit `rowid` column.
    pub fn rowid() -> Self {
        Self::new("rowid")
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Shorthand for [`Column::new`].
pub fn col(name: impl Into<String>) -> Column {
    Column::new(name)
}

/// Expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Column reference.
    Column(Column),
    /// Bound value.
    Value(Value),
    /// Binary comparison: left op right
    Compare {
        left: Box<Expr>,
        op: &'static str,
        right: Box<Expr>,
    },
    /// Binary arithmetic or concatenation: left op right
    Arith {
        left: Box<Expr>,
        op: &'static str,
        right: Box<Expr>,
    },
    /// AND group: all conditions must be true.
    And(Vec<Expr>),
    /// OR group: at least one condition must be true.
    Or(Vec<Expr>),
    /// NOT: negate the inner expression.
    Not(Box<Expr>),
    /// NULL check: expr IS [NOT] NULL
    NullCheck { expr: Box<Expr>, is_null: bool },
    /// IN list: expr [NOT] IN (...)
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
    /// Row-value IN: (a, b) IN (VALUES (?, ?), ...)
    RowIn {
        exprs: Vec<Expr>,
        tuples: Vec<Vec<Value>>,
    },
    /// BETWEEN: expr [NOT] BETWEEN low AND high
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// Function call: name(args...)
    Function { name: String, args: Vec<Expr> },
    /// COUNT(*)
    CountAll,
    /// SQL with `?` placeholders and their arguments. Columns inside are not qualified.
    Template { sql: String, arguments: Vec<Value> },
    /// Raw SQL fragment without arguments.
    Raw(String),
    /// Always true (used for empty NOT IN lists).
    True,
    /// Always false (used for empty IN lists).
    False,
}

impl Expr {
    /// Create an AND expression from a list of expressions.
    pub fn and(exprs: Vec<Expr>) -> Self {
        Expr::And(exprs)
    }

    /// Create an OR expression from a list of expressions.
    pub fn or(exprs: Vec<Expr>) -> Self {
        Expr::Or(exprs)
    }

    /// Create a NOT expression.
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// A bound value.
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    /// A SQL template with `?` placeholders.
    ///
    /// ```ignore
    /// Expr::template("length(title) > ?", [10])
    /// ```
    pub fn template<V: Into<Value>>(sql: impl Into<String>, arguments: impl IntoIterator<Item = V>) -> Self {
        Expr::Template {
            sql: sql.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// A function call.
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// COUNT(*)
    pub fn count_all() -> Self {
        Expr::CountAll
    }

    /// Row-value membership: `(exprs...) IN (VALUES tuples...)`.
    ///
    /// A single expression renders as a plain IN list. No tuples is always false.
    pub fn row_in(exprs: Vec<Expr>, tuples: Vec<Vec<Value>>) -> Self {
        if tuples.is_empty() {
            return Expr::False;
        }
        Expr::RowIn { exprs, tuples }
    }

    /// Check if this expression is empty (contains no conditions).
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().all(Expr::is_empty),
            Expr::Not(inner) => inner.is_empty(),
            _ => false,
        }
    }

    fn binary(left: Expr, op: &'static str, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::Compare { .. }
                | Expr::Arith { .. }
                | Expr::And(_)
                | Expr::Or(_)
                | Expr::Not(_)
                | Expr::NullCheck { .. }
                | Expr::InList { .. }
                | Expr::RowIn { .. }
                | Expr::Between { .. }
                | Expr::Template { .. }
                | Expr::Raw(_)
        )
    }

    /// Render into `out`. Unqualified columns take `alias` when one is given.
    pub(crate) fn render(&self, out: &mut SqlBuilder, alias: Option<&str>) {
        match self {
            Expr::Column(column) => {
                out.push_column(column.qualifier.as_deref().or(alias), &column.name);
            }
            Expr::Value(value) => {
                out.push_bind(value.clone());
            }
            Expr::Compare { left, op, right } | Expr::Arith { left, op, right } => {
                left.render_operand(out, alias);
                out.push(" ").push(op).push(" ");
                right.render_operand(out, alias);
            }
            Expr::And(exprs) => render_group(exprs, " AND ", "1", out, alias),
            Expr::Or(exprs) => render_group(exprs, " OR ", "0", out, alias),
            Expr::Not(inner) => {
                out.push("NOT ");
                inner.render_operand(out, alias);
            }
            Expr::NullCheck { expr, is_null } => {
                expr.render_operand(out, alias);
                out.push(if *is_null { " IS NULL" } else { " IS NOT NULL" });
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                expr.render_operand(out, alias);
                out.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(", ");
                    }
                    value.render(out, alias);
                }
                out.push(")");
            }
            Expr::RowIn { exprs, tuples } => {
                if let [single] = exprs.as_slice() {
                    single.render_operand(out, alias);
                    out.push(" IN (");
                    out.push_bind_list(tuples.iter().map(|t| t.first().cloned().unwrap_or_default()));
                    out.push(")");
                    return;
                }
                out.push("(");
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        out.push(", ");
                    }
                    expr.render(out, alias);
                }
                out.push(") IN (VALUES ");
                for (i, tuple) in tuples.iter().enumerate() {
                    if i > 0 {
                        out.push(", ");
                    }
                    out.push("(").push_bind_list(tuple.iter().cloned()).push(")");
                }
                out.push(")");
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                expr.render_operand(out, alias);
                out.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                low.render_operand(out, alias);
                out.push(" AND ");
                high.render_operand(out, alias);
            }
            Expr::Function { name, args } => {
                out.push(name).push("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(", ");
                    }
                    arg.render(out, alias);
                }
                out.push(")");
            }
            Expr::CountAll => {
                out.push("COUNT(*)");
            }
            Expr::Template { sql, arguments } => {
                out.push_template(sql, arguments);
            }
            Expr::Raw(sql) => {
                out.push(sql);
            }
            Expr::True => {
                out.push("1");
            }
            Expr::False => {
                out.push("0");
            }
        }
    }

    fn render_operand(&self, out: &mut SqlBuilder, alias: Option<&str>) {
        if self.is_compound() {
            out.push("(");
            self.render(out, alias);
            out.push(")");
        } else {
            self.render(out, alias);
        }
    }
}

fn render_group(exprs: &[Expr], separator: &str, empty: &str, out: &mut SqlBuilder, alias: Option<&str>) {
    let parts: Vec<&Expr> = exprs.iter().filter(|e| !e.is_empty()).collect();
    match parts.as_slice() {
        [] => {
            out.push(empty);
        }
        [single] => single.render(out, alias),
        _ => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(separator);
                }
                part.render_operand(out, alias);
            }
        }
    }
}

/// Conversion into an expression operand.
///
/// Columns and expressions convert as themselves; every bindable Rust value becomes a bound
/// [`Expr::Value`].
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for Column {
    fn into_expr(self) -> Expr {
        Expr::Column(self)
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::Value(self)
    }
}

impl<T: Into<Value>> IntoExpr for Option<T> {
    fn into_expr(self) -> Expr {
        Expr::Value(self.into())
    }
}

macro_rules! impl_into_expr_for_values {
    ($($ty:ty),*) => { $(
        impl IntoExpr for $ty {
            fn into_expr(self) -> Expr {
                Expr::Value(Value::from(self))
            }
        }
    )* }
}

impl_into_expr_for_values!(i8, i16, i32, i64, u8, u16, u32, bool, f32, f64, &str, String, Vec<u8>, &[u8]);

#[cfg(feature = "chrono")]
impl_into_expr_for_values!(chrono::NaiveDate, chrono::NaiveDateTime, chrono::DateTime<chrono::Utc>);

#[cfg(feature = "uuid")]
impl_into_expr_for_values!(uuid::Uuid);

impl From<Column> for Expr {
    fn from(column: Column) -> Self {
        Expr::Column(column)
    }
}

/// Operators shared by [`Column`] and [`Expr`].
///
/// ```ignore
/// use relorm::prelude::*;
///
/// let adults = col("age").gte(18).and(col("name").like("A%"));
/// let by_score = col("score").mul(2).desc();
/// ```
pub trait ExprOps: IntoExpr + Sized {
    /// `self = rhs`; comparing with NULL renders `IS NULL`.
    fn eq(self, rhs: impl IntoExpr) -> Expr {
        match rhs.into_expr() {
            Expr::Value(Value::Null) => self.is_null(),
            rhs => Expr::binary(self.into_expr(), "=", rhs),
        }
    }

    /// `self <> rhs`; comparing with NULL renders `IS NOT NULL`.
    fn ne(self, rhs: impl IntoExpr) -> Expr {
        match rhs.into_expr() {
            Expr::Value(Value::Null) => self.is_not_null(),
            rhs => Expr::binary(self.into_expr(), "<>", rhs),
        }
    }

    fn gt(self, rhs: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), ">", rhs.into_expr())
    }

    fn gte(self, rhs: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), ">=", rhs.into_expr())
    }

    fn lt(self, rhs: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), "<", rhs.into_expr())
    }

    fn lte(self, rhs: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), "<=", rhs.into_expr())
    }

    /// SQLite's NULL-safe equality.
    fn is(self, rhs: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), "IS", rhs.into_expr())
    }

    fn is_not(self, rhs: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), "IS NOT", rhs.into_expr())
    }

    fn like(self, pattern: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), "LIKE", pattern.into_expr())
    }

    fn not_like(self, pattern: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), "NOT LIKE", pattern.into_expr())
    }

    fn glob(self, pattern: impl IntoExpr) -> Expr {
        Expr::binary(self.into_expr(), "GLOB", pattern.into_expr())
    }

    fn is_null(self) -> Expr {
        Expr::NullCheck {
            expr: Box::new(self.into_expr()),
            is_null: true,
        }
    }

    fn is_not_null(self) -> Expr {
        Expr::NullCheck {
            expr: Box::new(self.into_expr()),
            is_null: false,
        }
    }

    /// `self IN (values...)`; an empty list is always false.
    fn in_list<V: IntoExpr>(self, values: impl IntoIterator<Item = V>) -> Expr {
        let values: Vec<Expr> = values.into_iter().map(IntoExpr::into_expr).collect();
        if values.is_empty() {
            return Expr::False;
        }
        Expr::InList {
            expr: Box::new(self.into_expr()),
            values,
            negated: false,
        }
    }

    /// `self NOT IN (values...)`; an empty list is always true.
    fn not_in<V: IntoExpr>(self, values: impl IntoIterator<Item = V>) -> Expr {
        let values: Vec<Expr> = values.into_iter().map(IntoExpr::into_expr).collect();
        if values.is_empty() {
            return Expr::True;
        }
        Expr::InList {
            expr: Box::new(self.into_expr()),
            values,
            negated: true,
        }
    }

    fn between(self, low: impl IntoExpr, high: impl IntoExpr) -> Expr {
        Expr::Between {
            expr: Box::new(self.into_expr()),
            low: Box::new(low.into_expr()),
            high: Box::new(high.into_expr()),
            negated: false,
        }
    }

    fn not_between(self, low: impl IntoExpr, high: impl IntoExpr) -> Expr {
        Expr::Between {
            expr: Box::new(self.into_expr()),
            low: Box::new(low.into_expr()),
            high: Box::new(high.into_expr()),
            negated: true,
        }
    }

    fn add(self, rhs: impl IntoExpr) -> Expr {
        arith(self, "+", rhs)
    }

    fn sub(self, rhs: impl IntoExpr) -> Expr {
        arith(self, "-", rhs)
    }

    fn mul(self, rhs: impl IntoExpr) -> Expr {
        arith(self, "*", rhs)
    }

    fn div(self, rhs: impl IntoExpr) -> Expr {
        arith(self, "/", rhs)
    }

    /// String concatenation (`||`).
    fn concat(self, rhs: impl IntoExpr) -> Expr {
        arith(self, "||", rhs)
    }

    fn and(self, rhs: impl IntoExpr) -> Expr {
        Expr::And(vec![self.into_expr(), rhs.into_expr()])
    }

    fn or(self, rhs: impl IntoExpr) -> Expr {
        Expr::Or(vec![self.into_expr(), rhs.into_expr()])
    }

    fn count(self) -> Expr {
        Expr::function("COUNT", vec![self.into_expr()])
    }

    fn asc(self) -> OrderTerm {
        OrderTerm::new(self.into_expr(), SortDirection::Asc)
    }

    fn desc(self) -> OrderTerm {
        OrderTerm::new(self.into_expr(), SortDirection::Desc)
    }

    /// Select this expression under a result column name.
    fn aliased(self, name: impl Into<String>) -> Selection {
        Selection::Expr {
            expr: self.into_expr(),
            alias: Some(name.into()),
        }
    }
}

fn arith(left: impl IntoExpr, op: &'static str, right: impl IntoExpr) -> Expr {
    Expr::Arith {
        left: Box::new(left.into_expr()),
        op,
        right: Box::new(right.into_expr()),
    }
}

impl ExprOps for Column {}
impl ExprOps for Expr {}
