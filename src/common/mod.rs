//! Small shared types used across the lock manager.

/// Stable integer identity of a transaction.
///
/// Mirrors the host engine's `common::TransactionId` alias: the lock manager
/// never constructs or interprets one, it only uses it as a map key and as
/// the argument to `LockingTransaction::block`/`unblock`.
pub type TransactionId = u64;
