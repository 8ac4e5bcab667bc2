//! Flat lock manager (C2).
//!
//! Treats every [`ResourceName`] independently: a grant list in acquisition
//! order plus a FIFO wait queue. A single mutex guards the whole table;
//! transactions never block while it is held — a call decides whether to
//! grant or queue under the lock, releases the lock, and only then calls
//! [`LockingTransaction::block`] or [`LockingTransaction::unblock`].
//!
//! # State machine per (transaction, resource)
//!
//! `Not-held -> Waiting -> Held(m) -> Waiting-for-promotion -> Held(m') ->
//! Not-held`, transitioned by `acquire`/`promote`/`release` and by queue-
//! drain completions. Waiting states imply the transaction is globally
//! blocked.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::LockError;
use super::lock_mode::LockMode;
use super::resource::ResourceName;
use super::{LockingTransaction, TransactionId};
use crate::error::Result;

/// A handle callers pass in: shared ownership of a transaction object, so
/// that a request sitting in some other resource's wait queue can later be
/// unblocked by whichever thread runs the drain.
pub type TxnHandle = Arc<dyn LockingTransaction + Send + Sync>;

/// A granted lock: `(resource, mode, transaction)`. Immutable except that
/// `mode` may be overwritten in place by a promotion that preserves
/// acquisition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub resource: ResourceName,
    pub mode: LockMode,
    pub txn_id: TransactionId,
}

/// A pending request sitting in some resource's wait queue.
struct PendingRequest {
    txn: TxnHandle,
    lock: Lock,
    /// Resources (possibly including `lock.resource` itself) to release
    /// atomically once this request is granted.
    release_set: Vec<ResourceName>,
}

/// Per-resource state: current holders plus the FIFO wait queue.
#[derive(Default)]
struct ResourceEntry {
    grants: Vec<Lock>,
    waiters: VecDeque<PendingRequest>,
}

impl ResourceEntry {
    fn conflicts(&self, txn_id: TransactionId, mode: LockMode) -> bool {
        self.grants
            .iter()
            .any(|g| g.txn_id != txn_id && !mode.compatible(g.mode))
    }
}

/// Whether a request for `mode` must block right now.
///
/// `barge_if_waiters_empty == false` implements promote's rule (§4.2): only
/// a real conflict blocks a promotion, not the mere presence of other
/// waiters (a promotion is not a fresh admission and does not barge ahead
/// of *compatible* work, but it also is not subject to the no-barging rule
/// a brand new acquire is). `true` implements acquire's and
/// acquire-and-release's rule: conflict, or any waiter already queued.
fn would_block(entry: &ResourceEntry, txn_id: TransactionId, mode: LockMode, barge_if_waiters_empty: bool) -> bool {
    let conflict = entry.conflicts(txn_id, mode);
    if barge_if_waiters_empty {
        conflict || !entry.waiters.is_empty()
    } else {
        conflict
    }
}

/// Process-wide lock table: the two indices of spec §3, maintained in
/// lockstep.
struct LockTable {
    by_resource: HashMap<ResourceName, ResourceEntry>,
    by_transaction: HashMap<TransactionId, Vec<Lock>>,
}

impl LockTable {
    fn new() -> Self {
        Self {
            by_resource: HashMap::new(),
            by_transaction: HashMap::new(),
        }
    }

    fn find_grant(&self, resource: &ResourceName, txn_id: TransactionId) -> Option<&Lock> {
        self.by_resource
            .get(resource)?
            .grants
            .iter()
            .find(|g| g.txn_id == txn_id)
    }

    fn remove_grant(&mut self, txn_id: TransactionId, resource: &ResourceName) -> Option<Lock> {
        let entry = self.by_resource.get_mut(resource)?;
        let idx = entry.grants.iter().position(|g| g.txn_id == txn_id)?;
        let lock = entry.grants.remove(idx);

        if let Some(locks) = self.by_transaction.get_mut(&txn_id) {
            if let Some(pos) = locks.iter().position(|l| l.resource == *resource) {
                locks.remove(pos);
            }
            if locks.is_empty() {
                self.by_transaction.remove(&txn_id);
            }
        }
        Some(lock)
    }

    /// Overwrite the mode of a lock already held by `txn_id` on `resource`,
    /// in both indices, without moving its position — the acquisition-order
    /// preservation a plain remove-then-insert would break.
    fn replace_in_place(&mut self, txn_id: TransactionId, resource: &ResourceName, mode: LockMode) -> bool {
        let in_by_resource = self
            .by_resource
            .get_mut(resource)
            .and_then(|entry| entry.grants.iter_mut().find(|g| g.txn_id == txn_id))
            .map(|g| g.mode = mode)
            .is_some();
        if in_by_resource {
            if let Some(locks) = self.by_transaction.get_mut(&txn_id) {
                if let Some(l) = locks.iter_mut().find(|l| l.resource == *resource) {
                    l.mode = mode;
                }
            }
        }
        in_by_resource
    }

    /// Install a granted lock for `txn_id` on `resource`, then cascade the
    /// releases named in `release_set` (each of which may trigger its own
    /// drain). If `resource` itself is in `release_set`, the existing lock
    /// there is overwritten in place rather than removed and re-appended.
    fn install_grant(
        &mut self,
        txn_id: TransactionId,
        resource: &ResourceName,
        mode: LockMode,
        release_set: &[ResourceName],
        to_unblock: &mut Vec<TxnHandle>,
    ) {
        let replaces_self = release_set.iter().any(|r| r == resource);
        let in_place = replaces_self && self.replace_in_place(txn_id, resource, mode);
        if !in_place {
            let lock = Lock {
                resource: resource.clone(),
                mode,
                txn_id,
            };
            self.by_resource.entry(resource.clone()).or_default().grants.push(lock.clone());
            self.by_transaction.entry(txn_id).or_default().push(lock);
        }

        for other in release_set.iter().filter(|r| *r != resource) {
            // Pre-checked by the caller; every entry is held.
            self.remove_grant(txn_id, other);
            self.drain(other, to_unblock);
        }
        self.drain(resource, to_unblock);
    }

    /// §4.2.1 queue draining, as an iterative worklist rather than
    /// recursion (spec §9), so a cascade of releases across many resources
    /// cannot overflow the stack.
    fn drain(&mut self, start: &ResourceName, to_unblock: &mut Vec<TxnHandle>) {
        let mut worklist = VecDeque::new();
        worklist.push_back(start.clone());

        while let Some(r) = worklist.pop_front() {
            loop {
                let can_grant = match self.by_resource.get(&r) {
                    Some(entry) => match entry.waiters.front() {
                        Some(head) => !entry.conflicts(head.lock.txn_id, head.lock.mode),
                        None => break,
                    },
                    None => break,
                };
                if !can_grant {
                    break;
                }

                let entry = self.by_resource.get_mut(&r).expect("checked above");
                let head = entry.waiters.pop_front().expect("checked above");
                let PendingRequest { txn, lock, release_set } = head;

                let replaces_self = release_set.iter().any(|x| x == &r);
                let in_place = replaces_self && self.replace_in_place(lock.txn_id, &r, lock.mode);
                if !in_place {
                    self.by_resource.entry(r.clone()).or_default().grants.push(lock.clone());
                    self.by_transaction.entry(lock.txn_id).or_default().push(lock.clone());
                }

                for other in release_set.iter().filter(|x| *x != &r) {
                    if self.remove_grant(lock.txn_id, other).is_some() {
                        worklist.push_back(other.clone());
                    }
                }
                to_unblock.push(txn);
            }
        }
    }
}

/// Flat, per-resource lock manager (C2). See the module docs for the state
/// machine; see spec §4.2 for the four operations below.
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::new()),
        }
    }

    /// Acquire `mode` on `resource` for `txn`.
    ///
    /// Fails with `DuplicateLockRequest` if `txn` already holds *any* lock
    /// on `resource`, regardless of mode (I3: at most one lock per
    /// transaction per resource; promotion is a separate operation).
    ///
    /// Blocks (queues at the back) if there is a conflicting grant by
    /// another transaction, or if the wait queue is already non-empty (no
    /// barging).
    pub fn acquire(&self, txn: &TxnHandle, resource: &ResourceName, mode: LockMode) -> Result<()> {
        let should_block;
        {
            let mut table = self.table.lock();
            if let Some(existing) = table.find_grant(resource, txn.id()) {
                return Err(LockError::DuplicateLockRequest {
                    txn_id: txn.id(),
                    resource: resource.clone(),
                    mode: existing.mode,
                });
            }

            let blocked = would_block(table.by_resource.entry(resource.clone()).or_default(), txn.id(), mode, true);
            if blocked {
                table.by_resource.get_mut(resource).expect("just inserted").waiters.push_back(PendingRequest {
                    txn: txn.clone(),
                    lock: Lock { resource: resource.clone(), mode, txn_id: txn.id() },
                    release_set: Vec::new(),
                });
                should_block = true;
            } else {
                let lock = Lock { resource: resource.clone(), mode, txn_id: txn.id() };
                table.by_resource.get_mut(resource).expect("just inserted").grants.push(lock.clone());
                table.by_transaction.entry(txn.id()).or_default().push(lock);
                should_block = false;
            }
        }

        if should_block {
            tracing::debug!(txn_id = txn.id(), resource = %resource, %mode, "lock request queued");
            txn.block();
            tracing::debug!(txn_id = txn.id(), resource = %resource, %mode, "lock granted after waiting");
        } else {
            tracing::trace!(txn_id = txn.id(), resource = %resource, %mode, "lock granted immediately");
        }
        Ok(())
    }

    /// Release `txn`'s lock on `resource`, then drain its wait queue.
    pub fn release(&self, txn: &TxnHandle, resource: &ResourceName) -> Result<()> {
        let mut to_unblock = Vec::new();
        {
            let mut table = self.table.lock();
            table.remove_grant(txn.id(), resource).ok_or_else(|| LockError::NoLockHeld {
                txn_id: txn.id(),
                resource: resource.clone(),
            })?;
            table.drain(resource, &mut to_unblock);
        }
        tracing::trace!(txn_id = txn.id(), resource = %resource, "lock released");
        for t in to_unblock {
            t.unblock();
        }
        Ok(())
    }

    /// Promote `txn`'s lock on `resource` to `new_mode`, preserving
    /// acquisition order. Only an actual conflict with another
    /// transaction's grant blocks a promotion — it does not wait behind a
    /// non-empty queue the way a fresh acquire does, but when it does
    /// block it queues at the front (spec §4.2, §5).
    pub fn promote(&self, txn: &TxnHandle, resource: &ResourceName, new_mode: LockMode) -> Result<()> {
        let mut to_unblock = Vec::new();
        let should_block;
        {
            let mut table = self.table.lock();
            let current = table
                .find_grant(resource, txn.id())
                .ok_or_else(|| LockError::NoLockHeld { txn_id: txn.id(), resource: resource.clone() })?
                .mode;

            if current == new_mode {
                return Err(LockError::DuplicateLockRequest {
                    txn_id: txn.id(),
                    resource: resource.clone(),
                    mode: new_mode,
                });
            }
            if !new_mode.substitutable(current) {
                return Err(LockError::InvalidLock {
                    txn_id: txn.id(),
                    resource: resource.clone(),
                    reason: "promotion target is not substitutable for the currently held mode",
                });
            }

            let blocked = would_block(table.by_resource.entry(resource.clone()).or_default(), txn.id(), new_mode, false);
            if blocked {
                table.by_resource.get_mut(resource).expect("just inserted").waiters.push_front(PendingRequest {
                    txn: txn.clone(),
                    lock: Lock { resource: resource.clone(), mode: new_mode, txn_id: txn.id() },
                    release_set: vec![resource.clone()],
                });
                should_block = true;
            } else {
                table.install_grant(txn.id(), resource, new_mode, &[resource.clone()], &mut to_unblock);
                should_block = false;
            }
        }

        for t in to_unblock {
            t.unblock();
        }
        if should_block {
            tracing::debug!(txn_id = txn.id(), resource = %resource, to = %new_mode, "promotion queued at front");
            txn.block();
            tracing::debug!(txn_id = txn.id(), resource = %resource, to = %new_mode, "promotion granted after waiting");
        } else {
            tracing::trace!(txn_id = txn.id(), resource = %resource, to = %new_mode, "promotion granted in place");
        }
        Ok(())
    }

    /// Atomically acquire `mode` on `resource` and release every resource
    /// in `release_set` (each of which must currently be held by `txn`).
    /// Used by escalation (which asks for a coarser lock while releasing
    /// the finer-grained ones it replaces) and can also target `resource`
    /// itself, in which case the existing lock there is overwritten in
    /// place rather than removed and re-appended (acquisition-order
    /// preservation, spec §4.2).
    ///
    /// Blocks under the same rule as a fresh `acquire` (conflict, or a
    /// non-empty queue), but queues at the front when it does — it is an
    /// upgrade, not a fresh admission (spec §5).
    pub fn acquire_and_release(
        &self,
        txn: &TxnHandle,
        resource: &ResourceName,
        mode: LockMode,
        release_set: Vec<ResourceName>,
    ) -> Result<()> {
        let mut to_unblock = Vec::new();
        let should_block;
        {
            let mut table = self.table.lock();

            let replaces_self = release_set.iter().any(|r| r == resource);
            if !replaces_self {
                if let Some(existing) = table.find_grant(resource, txn.id()) {
                    return Err(LockError::DuplicateLockRequest {
                        txn_id: txn.id(),
                        resource: resource.clone(),
                        mode: existing.mode,
                    });
                }
            }
            for r in &release_set {
                if table.find_grant(r, txn.id()).is_none() {
                    return Err(LockError::NoLockHeld { txn_id: txn.id(), resource: r.clone() });
                }
            }

            let blocked = would_block(table.by_resource.entry(resource.clone()).or_default(), txn.id(), mode, true);
            if blocked {
                table.by_resource.get_mut(resource).expect("just inserted").waiters.push_front(PendingRequest {
                    txn: txn.clone(),
                    lock: Lock { resource: resource.clone(), mode, txn_id: txn.id() },
                    release_set: release_set.clone(),
                });
                should_block = true;
            } else {
                table.install_grant(txn.id(), resource, mode, &release_set, &mut to_unblock);
                should_block = false;
            }
        }

        for t in to_unblock {
            t.unblock();
        }
        if should_block {
            tracing::debug!(txn_id = txn.id(), resource = %resource, %mode, "acquire-and-release queued at front");
            txn.block();
            tracing::debug!(txn_id = txn.id(), resource = %resource, %mode, "acquire-and-release granted after waiting");
        } else {
            tracing::trace!(txn_id = txn.id(), resource = %resource, %mode, "acquire-and-release granted immediately");
        }
        Ok(())
    }

    /// The mode `txn_id` holds on `resource`, or `NL` if none.
    pub fn get_lock_type(&self, txn_id: TransactionId, resource: &ResourceName) -> LockMode {
        self.table
            .lock()
            .find_grant(resource, txn_id)
            .map(|l| l.mode)
            .unwrap_or(LockMode::NL)
    }

    /// Every lock currently granted on `resource`, in acquisition order.
    pub fn get_locks_on_resource(&self, resource: &ResourceName) -> Vec<Lock> {
        self.table
            .lock()
            .by_resource
            .get(resource)
            .map(|e| e.grants.clone())
            .unwrap_or_default()
    }

    /// Every lock currently held by `txn_id`, in acquisition order.
    pub fn get_locks_for_transaction(&self, txn_id: TransactionId) -> Vec<Lock> {
        self.table.lock().by_transaction.get(&txn_id).cloned().unwrap_or_default()
    }
}
