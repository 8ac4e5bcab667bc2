//! Lock manager error types.
//!
//! Structured with `thiserror`, in the host's `transaction::error` style:
//! one variant per distinct failure kind, each carrying enough context
//! (transaction, resource, mode) that a caller can log or report the
//! failure without a second lookup.

use thiserror::Error;

use crate::common::TransactionId;
use crate::transaction::lock_mode::LockMode;
use crate::transaction::resource::ResourceName;

/// Result type alias for lock manager operations.
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Distinct, reportable lock manager failures (spec §7).
///
/// All errors are raised before any state mutation — a failed call leaves
/// the lock table exactly as it was.
#[derive(Debug, Error)]
pub enum LockError {
    /// An identical lock is already held; no state change.
    #[error(
        "transaction {txn_id} already holds a {mode} lock on '{resource}'"
    )]
    DuplicateLockRequest {
        txn_id: TransactionId,
        resource: ResourceName,
        mode: LockMode,
    },

    /// Release or promote attempted without a prior hold; no state change.
    #[error("transaction {txn_id} holds no lock on '{resource}'")]
    NoLockHeld {
        txn_id: TransactionId,
        resource: ResourceName,
    },

    /// A promotion target is not substitutable for the current mode, a
    /// hierarchical acquire would violate the parent-intention rule, or a
    /// release would orphan descendant locks.
    #[error("invalid lock operation for transaction {txn_id} on '{resource}': {reason}")]
    InvalidLock {
        txn_id: TransactionId,
        resource: ResourceName,
        reason: &'static str,
    },

    /// A mutating call was made on a readonly context.
    #[error("'{resource}' is readonly; mutating lock operations are unsupported")]
    Unsupported { resource: ResourceName },
}
