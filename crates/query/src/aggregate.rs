//! Aggregations over a materialized view.
//!
//! All aggregates skip null cells. `sum` accumulates integers in i128
//! so intermediate totals cannot wrap, and rejects a total outside the
//! i64 range. Float and double columns aggregate in f64.

use crate::predicate::cmp_values;
use crate::view::TableView;
use mica_core::{Error, Result, Value};
use mica_engine::Transaction;
use std::cmp::Ordering;

impl TableView {
    /// Non-null cell count for `column`
    pub fn count(&self, txn: &Transaction, column: &str) -> Result<usize> {
        let mut n = 0;
        for &key in &self.keys {
            if !txn.get(&self.table, key, column)?.is_null() {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Sum of a numeric column. Integer columns yield `Value::Int`,
    /// float and double columns yield `Value::Double`.
    pub fn sum(&self, txn: &Transaction, column: &str) -> Result<Value> {
        let mut int_total: i128 = 0;
        let mut float_total: f64 = 0.0;
        let mut saw_float = false;
        for &key in &self.keys {
            match txn.get(&self.table, key, column)? {
                Value::Null => {}
                Value::Int(v) => int_total += i128::from(v),
                Value::Float(v) => {
                    saw_float = true;
                    float_total += f64::from(v);
                }
                Value::Double(v) => {
                    saw_float = true;
                    float_total += v;
                }
                other => {
                    return Err(Error::TypeMismatch {
                        expected: "numeric",
                        actual: other.type_name(),
                    })
                }
            }
        }
        if saw_float {
            Ok(Value::Double(float_total))
        } else {
            let total = i64::try_from(int_total).map_err(|_| {
                Error::InvalidOperation("integer sum overflows i64".into())
            })?;
            Ok(Value::Int(total))
        }
    }

    /// Mean of a numeric column, `None` when every cell is null
    pub fn average(&self, txn: &Transaction, column: &str) -> Result<Option<f64>> {
        let n = self.count(txn, column)?;
        if n == 0 {
            return Ok(None);
        }
        let total = match self.sum(txn, column)? {
            Value::Int(v) => v as f64,
            Value::Double(v) => v,
            _ => unreachable!("sum yields Int or Double"),
        };
        Ok(Some(total / n as f64))
    }

    /// Smallest non-null value, `None` when every cell is null
    pub fn min(&self, txn: &Transaction, column: &str) -> Result<Option<Value>> {
        self.extreme(txn, column, Ordering::Less)
    }

    /// Largest non-null value, `None` when every cell is null
    pub fn max(&self, txn: &Transaction, column: &str) -> Result<Option<Value>> {
        self.extreme(txn, column, Ordering::Greater)
    }

    fn extreme(
        &self,
        txn: &Transaction,
        column: &str,
        want: Ordering,
    ) -> Result<Option<Value>> {
        let mut best: Option<Value> = None;
        for &key in &self.keys {
            let cell = txn.get(&self.table, key, column)?;
            if cell.is_null() {
                continue;
            }
            match &best {
                None => best = Some(cell),
                // NaN cells never order, so they never displace a candidate
                Some(b) => {
                    if cmp_values(&cell, b) == Some(want) {
                        best = Some(cell);
                    }
                }
            }
        }
        Ok(best)
    }
}
