//! Error types for the Mica object store
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Severity conventions:
//! - `AllocationFailed` / `FileAccess`: storage-layer, fatal to the current
//!   transaction, surfaced to the caller.
//! - `DecryptionFailed`: fatal, the affected page is unreadable.
//! - `ConstraintViolation`: local, the caller's single call fails and the
//!   transaction remains usable.
//! - `BadChangesetFormat` / `BadTransactionLog`: sync-layer, the current
//!   apply is aborted and the transaction is left uncommitted.
//!
//! View staleness is deliberately NOT an error: a `TableView` reports it
//! through `is_in_sync()` and callers refresh explicitly.

use crate::types::{ObjKey, Ref};
use std::io;
use thiserror::Error;

/// Result type alias for Mica operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Mica object store
#[derive(Debug, Error)]
pub enum Error {
    /// The arena hit its configured resource ceiling
    #[error("Allocation failed: requested {requested} bytes, file size limit {limit}")]
    AllocationFailed {
        /// Bytes requested by the failing allocation
        requested: usize,
        /// Configured maximum file size
        limit: u64,
    },

    /// I/O failure in the file layer
    #[error("File access error: {0}")]
    FileAccess(#[from] io::Error),

    /// A page failed authentication during decrypt; the page is unreadable
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// A unique-column insert or set collided with an existing value
    #[error("Constraint violation on column '{column}': {reason}")]
    ConstraintViolation {
        /// Name of the violated column
        column: String,
        /// Human-readable description of the collision
        reason: String,
    },

    /// A changeset buffer was truncated or contained an unknown opcode
    #[error("Bad changeset format: {0}")]
    BadChangesetFormat(String),

    /// A changeset instruction referenced something the store does not have
    #[error("Bad transaction log: {0}")]
    BadTransactionLog(String),

    /// A ref did not resolve to a live node
    #[error("Invalid ref: {0:?}")]
    InvalidRef(Ref),

    /// Object key not present in the table
    #[error("Object not found: {0:?}")]
    ObjectNotFound(ObjKey),

    /// Named table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Named column does not exist on the selected table
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Value type does not match the column type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Column type name
        expected: &'static str,
        /// Provided value type name
        actual: &'static str,
    },

    /// Data corruption detected (bad magic, CRC mismatch, malformed node)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Operation not legal in the current transaction stage
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Serialization/deserialization error for store metadata
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_allocation_failed() {
        let err = Error::AllocationFailed {
            requested: 4096,
            limit: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("Allocation failed"));
        assert!(msg.contains("4096"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn test_error_display_file_access() {
        let err = Error::FileAccess(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        assert!(err.to_string().contains("File access error"));
    }

    #[test]
    fn test_error_display_decryption_failed() {
        let err = Error::DecryptionFailed("tag mismatch at page 7".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Decryption failed"));
        assert!(msg.contains("page 7"));
    }

    #[test]
    fn test_error_display_constraint_violation() {
        let err = Error::ConstraintViolation {
            column: "email".to_string(),
            reason: "duplicate value".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("email"));
        assert!(msg.contains("duplicate value"));
    }

    #[test]
    fn test_error_display_bad_changeset() {
        let err = Error::BadChangesetFormat("truncated at byte 12".to_string());
        assert!(err.to_string().contains("Bad changeset format"));
    }

    #[test]
    fn test_error_display_bad_transaction_log() {
        let err = Error::BadTransactionLog("unknown table 'ghost'".to_string());
        assert!(err.to_string().contains("Bad transaction log"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::FileAccess(_)));
    }

    #[test]
    fn test_error_pattern_matching() {
        let err = Error::TypeMismatch {
            expected: "Int",
            actual: "String",
        };
        match err {
            Error::TypeMismatch { expected, actual } => {
                assert_eq!(expected, "Int");
                assert_eq!(actual, "String");
            }
            _ => panic!("Wrong error variant"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
