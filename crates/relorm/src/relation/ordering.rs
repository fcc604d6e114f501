use crate::generator::sql::SqlBuilder;
use crate::relation::expr::Expr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One `ORDER BY` term.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderTerm {
    pub(crate) expr: Expr,
    pub(crate) direction: SortDirection,
    pub(crate) nulls: Option<NullsOrder>,
}

impl OrderTerm {
    pub fn new(expr: Expr, direction: SortDirection) -> Self {
        Self {
            expr,
            direction,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn nulls(&self) -> Option<NullsOrder> {
        self.nulls
    }

    /// The same term sorting the other way; explicit NULLS placement is swapped too.
    pub fn reversed(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            direction: match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            },
            nulls: self.nulls.map(|nulls| match nulls {
                NullsOrder::First => NullsOrder::Last,
                NullsOrder::Last => NullsOrder::First,
            }),
        }
    }

    pub(crate) fn render(&self, out: &mut SqlBuilder, alias: Option<&str>) {
        self.expr.render(out, alias);
        out.push(match self.direction {
            SortDirection::Asc => " ASC",
            SortDirection::Desc => " DESC",
        });
        match self.nulls {
            Some(NullsOrder::First) => {
                out.push(" NULLS FIRST");
            }
            Some(NullsOrder::Last) => {
                out.push(" NULLS LAST");
            }
            None => {}
        }
    }
}

impl From<Expr> for OrderTerm {
    fn from(expr: Expr) -> Self {
        OrderTerm::new(expr, SortDirection::Asc)
    }
}

impl From<crate::relation::expr::Column> for OrderTerm {
    fn from(column: crate::relation::expr::Column) -> Self {
        OrderTerm::new(Expr::Column(column), SortDirection::Asc)
    }
}
