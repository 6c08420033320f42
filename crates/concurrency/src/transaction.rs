//! Transaction stage machine.
//!
//! State transitions:
//! - `Reading` → `Writing` (`promote_to_write`; waits on the writer gate)
//! - `Writing` → `Reading` (`commit` publishes V+1, `rollback` discards it)
//! - any → `Detached` (transaction closed; terminal)
//!
//! `advance_read` keeps the stage at `Reading` while re-pinning a newer
//! version; it is always legal in `Reading` and never blocks. Readers never
//! observe a partially-written version because the stage machine only
//! rebinds the root ref to slots the registry has already published.

use mica_core::{Error, Result};

/// Lifecycle stage of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    /// Attached to a pinned, immutable version
    Reading,
    /// Building the next version under the writer gate
    Writing,
    /// Closed; no further operations allowed (terminal)
    Detached,
}

impl TransactionStage {
    /// Guard for operations requiring an attached reader
    pub fn ensure_reading(self) -> Result<()> {
        match self {
            TransactionStage::Reading => Ok(()),
            TransactionStage::Writing => Err(Error::InvalidOperation(
                "operation requires a read transaction; a write is open".to_string(),
            )),
            TransactionStage::Detached => Err(Error::InvalidOperation(
                "transaction is detached".to_string(),
            )),
        }
    }

    /// Guard for mutations, which require an open write transaction
    pub fn ensure_writing(self) -> Result<()> {
        match self {
            TransactionStage::Writing => Ok(()),
            TransactionStage::Reading => Err(Error::InvalidOperation(
                "mutation outside a write transaction; call promote_to_write first".to_string(),
            )),
            TransactionStage::Detached => Err(Error::InvalidOperation(
                "transaction is detached".to_string(),
            )),
        }
    }

    /// Guard for any live transaction
    pub fn ensure_attached(self) -> Result<()> {
        if self == TransactionStage::Detached {
            return Err(Error::InvalidOperation(
                "transaction is detached".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_guards() {
        assert!(TransactionStage::Reading.ensure_reading().is_ok());
        assert!(TransactionStage::Reading.ensure_writing().is_err());
        assert!(TransactionStage::Writing.ensure_writing().is_ok());
        assert!(TransactionStage::Writing.ensure_reading().is_err());
        assert!(TransactionStage::Detached.ensure_attached().is_err());
        assert!(TransactionStage::Reading.ensure_attached().is_ok());
    }
}
