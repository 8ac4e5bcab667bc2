//! Crate-level result alias.
//!
//! The lock manager's own error type lives at
//! [`crate::transaction::error::LockError`]; this alias exists so callers
//! outside the `transaction` module (and this crate's own test helpers) have
//! a single `Result` to import, matching the host's `crate::error::Result`
//! re-export convention.

pub use crate::transaction::error::LockError;

/// Result type alias for lock manager operations.
pub type Result<T> = std::result::Result<T, LockError>;
