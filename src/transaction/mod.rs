//! Multigranularity lock manager.
//!
//! This module provides a three-layer concurrent lock manager for a tree of
//! named resources (database -> table -> page -> record):
//!
//! | Module         | Responsibility                                        |
//! |----------------|--------------------------------------------------------|
//! | [`lock_mode`]    | Pure lock-type algebra: compatibility, substitutability, parent mode |
//! | [`resource`]     | `ResourceName` path type                              |
//! | [`error`]        | `LockError` and its variants                          |
//! | [`lock_manager`] | Flat, per-resource grant lists and FIFO wait queues   |
//! | [`lock_context`] | Hierarchical tree wrapping the flat manager           |
//! | [`lock_util`]    | `ensure_sufficient`: declarative, minimal-acquisition helper |
//!
//! # Quick start
//!
//! ```
//! use mglock::transaction::{LockManager, LockContext, LockMode, LockingTransaction, ResourceName};
//! use mglock::transaction::testing::TestTransaction;
//! use std::sync::Arc;
//!
//! let manager = Arc::new(LockManager::new());
//! let db = LockContext::root(manager, ResourceName::root());
//! let t1: Arc<dyn LockingTransaction + Send + Sync> = Arc::new(TestTransaction::new(1));
//! db.acquire(&t1, LockMode::IS).unwrap();
//! assert_eq!(db.get_explicit_lock_type(1), LockMode::IS);
//! ```
//!
//! Deadlock detection, persistence, and the enclosing engine's transaction
//! lifecycle are out of scope; see `SPEC_FULL.md` §1.

pub mod error;
pub mod lock_context;
pub mod lock_manager;
pub mod lock_mode;
pub mod lock_util;
pub mod resource;

pub use crate::common::TransactionId;
pub use error::{LockError, LockResult};
pub use lock_context::LockContext;
pub use lock_manager::LockManager;
pub use lock_mode::LockMode;
pub use lock_util::ensure_sufficient;
pub use resource::ResourceName;

/// The two capabilities the lock manager consumes from a transaction object
/// (spec §6.4): stable identity, and the ability to suspend/resume the
/// calling thread. The enclosing engine's full transaction lifecycle
/// (begin/commit/abort, isolation level, ...) is out of scope.
pub trait LockingTransaction {
    /// A stable integer identifying this transaction.
    fn id(&self) -> TransactionId;

    /// Suspend the calling thread until another thread calls [`unblock`].
    ///
    /// [`unblock`]: LockingTransaction::unblock
    fn block(&self);

    /// Wake the thread suspended in [`block`].
    ///
    /// [`block`]: LockingTransaction::block
    fn unblock(&self);

    /// Whether this transaction currently has a request enqueued on some
    /// resource's wait queue (spec invariant I6).
    fn is_blocked(&self) -> bool;
}

/// A minimal [`LockingTransaction`] for tests, built on a `parking_lot`
/// condition variable. Not used by production callers, which supply their
/// own transaction object; kept here so every submodule's tests share one
/// implementation instead of redefining it.
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::{Condvar, Mutex};

    use super::{LockingTransaction, TransactionId};

    pub struct TestTransaction {
        id: TransactionId,
        blocked: AtomicBool,
        mutex: Mutex<()>,
        condvar: Condvar,
    }

    impl TestTransaction {
        pub fn new(id: TransactionId) -> Self {
            Self {
                id,
                blocked: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }
        }
    }

    impl LockingTransaction for TestTransaction {
        fn id(&self) -> TransactionId {
            self.id
        }

        fn block(&self) {
            self.blocked.store(true, Ordering::SeqCst);
            let mut guard = self.mutex.lock();
            while self.blocked.load(Ordering::SeqCst) {
                self.condvar.wait(&mut guard);
            }
        }

        fn unblock(&self) {
            let _guard = self.mutex.lock();
            self.blocked.store(false, Ordering::SeqCst);
            self.condvar.notify_all();
        }

        fn is_blocked(&self) -> bool {
            self.blocked.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::TestTransaction;
    use super::*;

    #[test]
    fn quick_start_example_acquires_intent_lock() {
        let manager = Arc::new(LockManager::new());
        let db = LockContext::root(manager, ResourceName::root());
        let t1: Arc<dyn LockingTransaction + Send + Sync> = Arc::new(TestTransaction::new(1));
        db.acquire(&t1, LockMode::IS).unwrap();
        assert_eq!(db.get_explicit_lock_type(1), LockMode::IS);
    }
}
