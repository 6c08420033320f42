//! Predicate trees.
//!
//! A predicate is evaluated per object against a transaction's pinned
//! version. Comparison semantics follow the value model: different value
//! types never compare equal and never order against each other, and a
//! null cell matches nothing except `Ne` against a non-null operand.
//! Link traversal follows a forward link and evaluates the inner
//! predicate against the target object; a null link fails the traversal.

use mica_core::{ObjKey, Result, Value};
use mica_engine::Transaction;
use std::cmp::Ordering;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

/// String match mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Whole-string equality
    Equal,
    /// Prefix match
    BeginsWith,
    /// Suffix match
    EndsWith,
    /// Substring match
    Contains,
}

/// A predicate tree node
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Matches everything
    True,
    /// Compare a column against a constant
    Cmp {
        /// Column name
        column: String,
        /// Operator
        op: CmpOp,
        /// Right-hand operand
        value: Value,
    },
    /// Match a string column against a needle
    StringMatch {
        /// Column name
        column: String,
        /// Match mode
        mode: MatchMode,
        /// Needle
        needle: String,
    },
    /// Follow a link column and evaluate against the target
    Traverse {
        /// Link column name
        column: String,
        /// Predicate over the target object
        inner: Box<Predicate>,
    },
    /// Negation
    Not(Box<Predicate>),
    /// Conjunction (empty = true)
    And(Vec<Predicate>),
    /// Disjunction (empty = false)
    Or(Vec<Predicate>),
}

impl Predicate {
    /// `column == value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp {
            column: column.into(),
            op: CmpOp::Eq,
            value: value.into(),
        }
    }

    /// `column != value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp {
            column: column.into(),
            op: CmpOp::Ne,
            value: value.into(),
        }
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp {
            column: column.into(),
            op: CmpOp::Lt,
            value: value.into(),
        }
    }

    /// `column <= value`
    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp {
            column: column.into(),
            op: CmpOp::Le,
            value: value.into(),
        }
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp {
            column: column.into(),
            op: CmpOp::Gt,
            value: value.into(),
        }
    }

    /// `column >= value`
    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Cmp {
            column: column.into(),
            op: CmpOp::Ge,
            value: value.into(),
        }
    }

    /// String match on a column
    pub fn matches(
        column: impl Into<String>,
        mode: MatchMode,
        needle: impl Into<String>,
    ) -> Predicate {
        Predicate::StringMatch {
            column: column.into(),
            mode,
            needle: needle.into(),
        }
    }

    /// Follow a link column
    pub fn traverse(column: impl Into<String>, inner: Predicate) -> Predicate {
        Predicate::Traverse {
            column: column.into(),
            inner: Box::new(inner),
        }
    }

    /// Evaluate against one object
    pub fn eval(&self, txn: &Transaction, table: &str, key: ObjKey) -> Result<bool> {
        match self {
            Predicate::True => Ok(true),
            Predicate::Cmp { column, op, value } => {
                let cell = txn.get(table, key, column)?;
                Ok(cmp_matches(&cell, *op, value))
            }
            Predicate::StringMatch {
                column,
                mode,
                needle,
            } => {
                let cell = txn.get(table, key, column)?;
                Ok(match cell.as_str() {
                    Some(s) => match mode {
                        MatchMode::Equal => s == needle,
                        MatchMode::BeginsWith => s.starts_with(needle.as_str()),
                        MatchMode::EndsWith => s.ends_with(needle.as_str()),
                        MatchMode::Contains => s.contains(needle.as_str()),
                    },
                    None => false,
                })
            }
            Predicate::Traverse { column, inner } => {
                let Some(target_key) = txn.get(table, key, column)?.as_link() else {
                    return Ok(false);
                };
                let schema = txn.schema();
                let col = schema.table(table)?.column(column)?;
                let link = col.link.ok_or_else(|| {
                    mica_core::Error::TypeMismatch {
                        expected: "Link",
                        actual: col.ty.name(),
                    }
                })?;
                let target_table = schema.tables[schema.table_pos_by_key(link.target)?]
                    .name
                    .clone();
                inner.eval(txn, &target_table, target_key)
            }
            Predicate::Not(inner) => Ok(!inner.eval(txn, table, key)?),
            Predicate::And(parts) => {
                for p in parts {
                    if !p.eval(txn, table, key)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(parts) => {
                for p in parts {
                    if p.eval(txn, table, key)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Order two values of the same type; different types do not order
pub fn cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Binary(x), Value::Binary(y)) => Some(x.cmp(y)),
        (Value::Link(x), Value::Link(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn cmp_matches(cell: &Value, op: CmpOp, value: &Value) -> bool {
    match op {
        CmpOp::Eq => cell == value,
        CmpOp::Ne => cell != value,
        CmpOp::Lt => matches!(cmp_values(cell, value), Some(Ordering::Less)),
        CmpOp::Le => matches!(
            cmp_values(cell, value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CmpOp::Gt => matches!(cmp_values(cell, value), Some(Ordering::Greater)),
        CmpOp::Ge => matches!(
            cmp_values(cell, value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}
