//! Changeset application.
//!
//! Ops replay through the normal transaction API, so every derived
//! effect (cascade deletes, weak-link nullification, index upkeep)
//! happens exactly as it did on the producing side. An op that
//! references a table, column or object the receiving store does not
//! have fails the whole apply with `BadTransactionLog`; the caller's
//! transaction is left uncommitted and can be rolled back.

use crate::Changeset;
use mica_core::{Error, Result};
use mica_engine::{ChangeOp, Transaction};
use tracing::{debug, warn};

/// Replay a parsed changeset into an open write transaction.
///
/// Stops at the first failing op. The transaction is not rolled back
/// here; partial state stays staged and is discarded by the caller.
pub fn apply_changeset(txn: &mut Transaction, changeset: &Changeset) -> Result<()> {
    for (n, op) in changeset.ops.iter().enumerate() {
        apply_op(txn, op).map_err(|e| {
            warn!(peer = %changeset.peer, op = n, error = %e, "changeset apply failed");
            rewrap(e, n)
        })?;
    }
    debug!(peer = %changeset.peer, ops = changeset.ops.len(), "changeset applied");
    Ok(())
}

fn apply_op(txn: &mut Transaction, op: &ChangeOp) -> Result<()> {
    match op {
        ChangeOp::CreateTable { table } => {
            txn.create_table(table)?;
        }
        ChangeOp::AddColumn {
            table,
            column,
            ty,
            nullable,
            attrs,
            link_target,
            link_type,
        } => match (link_target, link_type) {
            (Some(target), Some(lt)) => {
                txn.add_link_column(table, column, target, *lt)?;
            }
            _ => {
                txn.add_column(table, column, *ty, *nullable, *attrs)?;
            }
        },
        ChangeOp::CreateObject { table, key } => {
            txn.create_object_with_key(table, *key)?;
        }
        ChangeOp::EraseObject { table, key } => {
            txn.erase_object(table, *key)?;
        }
        ChangeOp::Set {
            table,
            key,
            column,
            value,
        } => {
            txn.set(table, *key, column, value.clone())?;
        }
        ChangeOp::ListInsert {
            table,
            key,
            column,
            ndx,
            value,
        } => {
            txn.list_insert(table, *key, column, *ndx, *value)?;
        }
        ChangeOp::ListSet {
            table,
            key,
            column,
            ndx,
            value,
        } => {
            txn.list_set(table, *key, column, *ndx, *value)?;
        }
        ChangeOp::ListErase {
            table,
            key,
            column,
            ndx,
        } => {
            txn.list_erase(table, *key, column, *ndx)?;
        }
    }
    Ok(())
}

/// Resolution failures become log errors; everything else (I/O,
/// allocation) passes through unchanged
fn rewrap(e: Error, op_ndx: usize) -> Error {
    match e {
        Error::TableNotFound(_)
        | Error::ColumnNotFound(_)
        | Error::ObjectNotFound(_)
        | Error::TypeMismatch { .. }
        | Error::ConstraintViolation { .. }
        | Error::InvalidOperation(_) => {
            Error::BadTransactionLog(format!("op {op_ndx}: {e}"))
        }
        other => other,
    }
}
