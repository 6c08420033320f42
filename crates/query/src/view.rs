//! Queries and materialized views.
//!
//! `Query::run` scans (or index-probes) a table and materializes the
//! matching keys into a `TableView`. The view is a plain ordered key
//! list tied to the version it was built against; it never refreshes
//! behind the caller's back. `is_in_sync` reports whether the owning
//! transaction has moved past the view's version, and `sync_if_needed`
//! re-runs the query explicitly. Staleness is a state, not an error.

use crate::predicate::{cmp_values, CmpOp, Predicate};
use mica_core::{ObjKey, Result, Value};
use mica_engine::Transaction;
use std::cmp::Ordering;
use tracing::trace;

/// Sort specification: column and direction
#[derive(Debug, Clone)]
struct SortSpec {
    column: String,
    ascending: bool,
}

/// A query over one table
#[derive(Debug, Clone)]
pub struct Query {
    table: String,
    predicate: Predicate,
    sort: Option<SortSpec>,
    distinct: Option<String>,
    limit: Option<usize>,
}

impl Query {
    /// Query matching every object of `table`
    pub fn table(table: impl Into<String>) -> Query {
        Query {
            table: table.into(),
            predicate: Predicate::True,
            sort: None,
            distinct: None,
            limit: None,
        }
    }

    /// Set the predicate
    pub fn filter(mut self, predicate: Predicate) -> Query {
        self.predicate = predicate;
        self
    }

    /// Sort the result by a column. Null sorts below every value, so it
    /// comes first ascending and last descending; ties keep key order.
    pub fn sorted_by(mut self, column: impl Into<String>, ascending: bool) -> Query {
        self.sort = Some(SortSpec {
            column: column.into(),
            ascending,
        });
        self
    }

    /// Keep only the first object for each distinct value of `column`
    pub fn distinct_on(mut self, column: impl Into<String>) -> Query {
        self.distinct = Some(column.into());
        self
    }

    /// Cap the result length
    pub fn limit(mut self, n: usize) -> Query {
        self.limit = Some(n);
        self
    }

    /// Name of the queried table
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Run against the transaction's pinned version
    pub fn run(&self, txn: &Transaction) -> Result<TableView> {
        let candidates = self.candidates(txn)?;
        let mut keys = Vec::new();
        for key in candidates {
            if self.predicate.eval(txn, &self.table, key)? {
                keys.push(key);
            }
        }
        if let Some(sort) = &self.sort {
            let mut decorated: Vec<(ObjKey, Value)> = Vec::with_capacity(keys.len());
            for key in keys {
                decorated.push((key, txn.get(&self.table, key, &sort.column)?));
            }
            decorated.sort_by(|(_, a), (_, b)| {
                let ord = match (a.is_null(), b.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => cmp_values(a, b).unwrap_or(Ordering::Equal),
                };
                if sort.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
            keys = decorated.into_iter().map(|(k, _)| k).collect();
        }
        if let Some(distinct) = &self.distinct {
            let mut seen: Vec<Value> = Vec::new();
            let mut kept = Vec::with_capacity(keys.len());
            for key in keys {
                let v = txn.get(&self.table, key, distinct)?;
                if !seen.contains(&v) {
                    seen.push(v);
                    kept.push(key);
                }
            }
            keys = kept;
        }
        if let Some(limit) = self.limit {
            keys.truncate(limit);
        }
        trace!(table = %self.table, matches = keys.len(), "query ran");
        Ok(TableView {
            query: self.clone(),
            keys,
            table: self.table.clone(),
            version: txn.version().number,
        })
    }

    /// Candidate keys: an index probe for a top-level equality on an
    /// indexed column, the whole table otherwise
    fn candidates(&self, txn: &Transaction) -> Result<Vec<ObjKey>> {
        if let Predicate::Cmp {
            column,
            op: CmpOp::Eq,
            value,
        } = &self.predicate
        {
            let col = txn.schema().table(&self.table)?.column(column)?;
            if col.attrs.needs_index() && !value.is_null() {
                return txn.indexed_keys(&self.table, column, value);
            }
        }
        txn.object_keys(&self.table)
    }
}

/// Materialized, ordered result of one query run
#[derive(Debug, Clone)]
pub struct TableView {
    query: Query,
    pub(crate) keys: Vec<ObjKey>,
    pub(crate) table: String,
    version: u64,
}

impl TableView {
    /// Matching keys, in result order
    pub fn keys(&self) -> &[ObjKey] {
        &self.keys
    }

    /// Result length
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at result position `ndx`
    pub fn get(&self, ndx: usize) -> Option<ObjKey> {
        self.keys.get(ndx).copied()
    }

    /// Commit number the view was built against
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the view still matches the transaction's read position
    pub fn is_in_sync(&self, txn: &Transaction) -> bool {
        self.version == txn.version().number
    }

    /// Re-run the query if the transaction moved on. Returns whether a
    /// refresh happened.
    pub fn sync_if_needed(&mut self, txn: &Transaction) -> Result<bool> {
        if self.is_in_sync(txn) {
            return Ok(false);
        }
        *self = self.query.run(txn)?;
        Ok(true)
    }
}
