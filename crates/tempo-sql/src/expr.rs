//! CHECK constraint expressions.
//!
//! An [`Expr`] renders to Postgres SQL through `Display` and can be evaluated
//! against a row. Evaluation follows SQL three-valued logic: comparisons with
//! NULL yield NULL, and a CHECK constraint only rejects a row when its
//! expression is definitely false.

use crate::{Ident, Value};
use std::fmt;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => ord == Equal,
            CmpOp::Ne => ord != Equal,
            CmpOp::Lt => ord == Less,
            CmpOp::Le => ord != Greater,
            CmpOp::Gt => ord == Greater,
            CmpOp::Ge => ord != Less,
        }
    }
}

/// A boolean-valued SQL expression over the columns of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column of the row being checked
    Column(String),
    /// A literal
    Value(Value),
    /// `left op right`
    Cmp {
        left: Box<Expr>,
        op: CmpOp,
        right: Box<Expr>,
    },
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// `expr [NOT] IN (...)`
    InList {
        expr: Box<Expr>,
        list: Vec<Value>,
        negated: bool,
    },
    /// `expr BETWEEN low AND high`
    Between {
        expr: Box<Expr>,
        low: Value,
        high: Value,
    },
    /// Conjunction; empty is TRUE
    And(Vec<Expr>),
    /// Disjunction; empty is FALSE
    Or(Vec<Expr>),
    /// NOT (...)
    Not(Box<Expr>),
}

// Convenience constructors
impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Expr::Value(Value::Text(s.into()))
    }

    pub fn int(n: i64) -> Self {
        Expr::Value(Value::Int(n))
    }

    pub fn all(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::And(items.into_iter().collect())
    }

    pub fn any(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Or(items.into_iter().collect())
    }

    fn cmp(self, op: CmpOp, other: Expr) -> Self {
        Expr::Cmp {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        self.cmp(CmpOp::Eq, other)
    }

    pub fn ne(self, other: Expr) -> Self {
        self.cmp(CmpOp::Ne, other)
    }

    pub fn ge(self, other: Expr) -> Self {
        self.cmp(CmpOp::Ge, other)
    }

    pub fn le(self, other: Expr) -> Self {
        self.cmp(CmpOp::Le, other)
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list<V: Into<Value>>(self, list: impl IntoIterator<Item = V>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list: list.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

impl Expr {
    /// Columns referenced by this expression, in order of first appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Value(_) => {}
            Expr::Cmp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::IsNull { expr, .. } | Expr::InList { expr, .. } | Expr::Between { expr, .. } => {
                expr.collect_columns(out)
            }
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
            Expr::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Evaluate against a row. `row` returns the value of a column
    /// (`Value::Null` for columns it does not know).
    pub fn eval(&self, row: &dyn Fn(&str) -> Value) -> Value {
        match self {
            Expr::Column(name) => row(name),
            Expr::Value(v) => v.clone(),
            Expr::Cmp { left, op, right } => {
                let l = left.eval(row);
                let r = right.eval(row);
                match l.sql_cmp(&r) {
                    Some(ord) => Value::Bool(op.holds(ord)),
                    None => Value::Null,
                }
            }
            Expr::IsNull { expr, negated } => Value::Bool(expr.eval(row).is_null() != *negated),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let v = expr.eval(row);
                if v.is_null() {
                    return Value::Null;
                }
                let found = list
                    .iter()
                    .any(|item| v.sql_cmp(item) == Some(std::cmp::Ordering::Equal));
                Value::Bool(found != *negated)
            }
            Expr::Between { expr, low, high } => {
                let v = expr.eval(row);
                match (v.sql_cmp(low), v.sql_cmp(high)) {
                    (Some(lo), Some(hi)) => Value::Bool(
                        lo != std::cmp::Ordering::Less && hi != std::cmp::Ordering::Greater,
                    ),
                    _ => Value::Null,
                }
            }
            Expr::And(items) => {
                let mut unknown = false;
                for item in items {
                    match item.truth(row) {
                        Some(false) => return Value::Bool(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { Value::Null } else { Value::Bool(true) }
            }
            Expr::Or(items) => {
                let mut unknown = false;
                for item in items {
                    match item.truth(row) {
                        Some(true) => return Value::Bool(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { Value::Null } else { Value::Bool(false) }
            }
            Expr::Not(inner) => match inner.truth(row) {
                Some(b) => Value::Bool(!b),
                None => Value::Null,
            },
        }
    }

    /// Truth value: `Some(b)` for a boolean result, `None` for NULL.
    pub fn truth(&self, row: &dyn Fn(&str) -> Value) -> Option<bool> {
        match self.eval(row) {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Whether a CHECK constraint with this expression accepts the row.
    pub fn accepts(&self, row: &dyn Fn(&str) -> Value) -> bool {
        self.truth(row) != Some(false)
    }

    fn needs_parens_in(&self, parent_is_and: bool) -> bool {
        match self {
            Expr::Or(items) => parent_is_and || items.len() > 1,
            Expr::And(items) => !parent_is_and && items.len() > 1,
            _ => false,
        }
    }
}

struct Joined<'a> {
    items: &'a [Expr],
    is_and: bool,
}

impl fmt::Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.is_and { " AND " } else { " OR " };
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            if item.needs_parens_in(self.is_and) {
                write!(f, "({})", item)?;
            } else {
                write!(f, "{}", item)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", Ident(name)),
            Expr::Value(v) => write!(f, "{}", v),
            Expr::Cmp { left, op, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Expr::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{} IS{} NULL", expr, not)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                let items: Vec<String> = list.iter().map(|v| v.to_string()).collect();
                write!(f, "{}{} IN ({})", expr, not, items.join(", "))
            }
            Expr::Between { expr, low, high } => {
                write!(f, "{} BETWEEN {} AND {}", expr, low, high)
            }
            Expr::And(items) if items.is_empty() => write!(f, "TRUE"),
            Expr::Or(items) if items.is_empty() => write!(f, "FALSE"),
            Expr::And(items) => write!(
                f,
                "{}",
                Joined {
                    items,
                    is_and: true
                }
            ),
            Expr::Or(items) => write!(
                f,
                "{}",
                Joined {
                    items,
                    is_and: false
                }
            ),
            Expr::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}
