//! Hierarchical lock context (C3).
//!
//! A tree of [`LockContext`] nodes wraps the flat [`LockManager`](super::
//! lock_manager::LockManager): every acquire/release routes through it,
//! enforcing the parent-intention rule (I4) and maintaining each node's
//! per-transaction descendant-lock count (I5) so escalation and the
//! saturation heuristic have something to work from.
//!
//! Nodes are created lazily via [`LockContext::child_context`] and form a
//! tree the manager collectively owns: children are owned `Arc`s, the
//! parent link is a non-owning [`Weak`] back-pointer, so the tree tears
//! down normally when the owning `Arc<LockContext>` root is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::error::LockError;
use super::lock_manager::{LockManager, TxnHandle};
use super::lock_mode::LockMode;
use super::resource::ResourceName;
use super::TransactionId;
use crate::error::Result;

/// A node in the resource hierarchy (database -> table -> page -> record).
pub struct LockContext {
    resource: ResourceName,
    parent: Option<Weak<LockContext>>,
    manager: Arc<LockManager>,
    children: Mutex<HashMap<Arc<str>, Arc<LockContext>>>,
    readonly: AtomicBool,
    child_locks_disabled: AtomicBool,
    capacity_override: Mutex<Option<usize>>,
    /// Per-transaction count of locks held anywhere in this node's
    /// subtree (not counting a lock on this node itself) — I5.
    num_child_locks: Mutex<HashMap<TransactionId, usize>>,
}

impl LockContext {
    /// A fresh root node (no parent) over `manager`.
    pub fn root(manager: Arc<LockManager>, resource: ResourceName) -> Arc<LockContext> {
        Arc::new(LockContext {
            resource,
            parent: None,
            manager,
            children: Mutex::new(HashMap::new()),
            readonly: AtomicBool::new(false),
            child_locks_disabled: AtomicBool::new(false),
            capacity_override: Mutex::new(None),
            num_child_locks: Mutex::new(HashMap::new()),
        })
    }

    /// The child node named `name`, creating it (and registering it with
    /// `parent`) if it doesn't exist yet.
    ///
    /// A child created while `parent` is readonly, or while its
    /// `childLocksDisabled` flag is set, is itself readonly (spec §4.3).
    pub fn child_context(parent: &Arc<LockContext>, name: impl Into<Arc<str>>) -> Arc<LockContext> {
        let name: Arc<str> = name.into();
        let mut children = parent.children.lock();
        if let Some(existing) = children.get(&name) {
            return existing.clone();
        }
        let readonly = parent.readonly.load(Ordering::SeqCst) || parent.child_locks_disabled.load(Ordering::SeqCst);
        let child = Arc::new(LockContext {
            resource: parent.resource.child(name.clone()),
            parent: Some(Arc::downgrade(parent)),
            manager: parent.manager.clone(),
            children: Mutex::new(HashMap::new()),
            readonly: AtomicBool::new(readonly),
            child_locks_disabled: AtomicBool::new(false),
            capacity_override: Mutex::new(None),
            num_child_locks: Mutex::new(HashMap::new()),
        });
        children.insert(name, child.clone());
        child
    }

    /// This node's parent, or `None` at the root.
    pub fn parent_context(&self) -> Option<Arc<LockContext>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly.load(Ordering::SeqCst)
    }

    pub fn set_readonly(&self, readonly: bool) {
        self.readonly.store(readonly, Ordering::SeqCst);
    }

    /// Any child created after this call (until cleared) is readonly.
    pub fn disable_child_locks(&self) {
        self.child_locks_disabled.store(true, Ordering::SeqCst);
    }

    /// Whether `txn_id` holds any lock in this node's subtree (not
    /// counting a lock on this node itself).
    pub fn has_child_locks(&self, txn_id: TransactionId) -> bool {
        self.child_lock_count(txn_id) > 0
    }

    /// `numChildLocks[t] / capacity` (spec §4.3), 0 if capacity is 0.
    pub fn saturation(&self, txn_id: TransactionId) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        let count = self.num_child_locks.lock().get(&txn_id).copied().unwrap_or(0);
        count as f64 / capacity as f64
    }

    /// The overridden capacity if one was set via [`LockContext::
    /// set_capacity`], else the current number of child contexts.
    pub fn capacity(&self) -> usize {
        self.capacity_override
            .lock()
            .unwrap_or_else(|| self.children.lock().len())
    }

    /// Override the capacity used by [`LockContext::saturation`] (e.g. a
    /// table declaring its page count up front, spec §3).
    pub fn set_capacity(&self, capacity: usize) {
        *self.capacity_override.lock() = Some(capacity);
    }

    /// The mode `txn_id` holds at exactly this node, or `NL`.
    pub fn get_explicit_lock_type(&self, txn_id: TransactionId) -> LockMode {
        self.manager.get_lock_type(txn_id, &self.resource)
    }

    /// The mode `txn_id` is permitted to exercise at this node: the
    /// explicit mode if non-`NL`, else inherited from the nearest ancestor
    /// holding a non-intention mode (`SIX` confers `S`).
    pub fn get_effective_lock_type(&self, txn_id: TransactionId) -> LockMode {
        let explicit = self.get_explicit_lock_type(txn_id);
        if explicit != LockMode::NL {
            return explicit;
        }
        let mut ctx = self.parent_context();
        while let Some(c) = ctx {
            let mode = c.get_explicit_lock_type(txn_id);
            match mode {
                LockMode::S | LockMode::X => return mode,
                LockMode::SIX => return LockMode::S,
                _ => {}
            }
            ctx = c.parent_context();
        }
        LockMode::NL
    }

    /// Acquire `mode` at this node for `txn`, after checking the parent
    /// already holds at least `mode.parent_mode()` (I4).
    pub fn acquire(&self, txn: &TxnHandle, mode: LockMode) -> Result<()> {
        self.ensure_mutable()?;
        let parent = self.parent_context();
        let parent_ok = match &parent {
            None => true,
            Some(p) => {
                let held = p.manager.get_lock_type(txn.id(), &p.resource);
                held.substitutable(mode.parent_mode())
            }
        };
        if !parent_ok {
            return Err(LockError::InvalidLock {
                txn_id: txn.id(),
                resource: self.resource.clone(),
                reason: "parent does not hold a sufficient intention lock",
            });
        }
        self.manager.acquire(txn, &self.resource, mode)?;
        for ancestor in self.ancestors() {
            ancestor.increment_child_locks(txn.id());
        }
        Ok(())
    }

    /// Release `txn`'s lock at this node. Fails if `txn` still holds any
    /// descendant lock (that would orphan it, I4/I5).
    pub fn release(&self, txn: &TxnHandle) -> Result<()> {
        self.ensure_mutable()?;
        if self.child_lock_count(txn.id()) > 0 {
            return Err(LockError::InvalidLock {
                txn_id: txn.id(),
                resource: self.resource.clone(),
                reason: "releasing would orphan descendant locks",
            });
        }
        self.manager.release(txn, &self.resource)?;
        for ancestor in self.ancestors() {
            ancestor.decrement_child_locks(txn.id());
        }
        Ok(())
    }

    /// Promote `txn`'s lock at this node. The parent-intention invariant
    /// is the caller's responsibility (spec §4.3) — see [`super::
    /// lock_util::ensure_sufficient`] for the helper that maintains it.
    pub fn promote(&self, txn: &TxnHandle, new_mode: LockMode) -> Result<()> {
        self.ensure_mutable()?;
        self.manager.promote(txn, &self.resource, new_mode)
    }

    /// Replace every lock `txn` holds in this node's subtree with a single
    /// lock at this node (`X` if any collected lock was `IX`/`SIX`/`X`,
    /// else `S`).
    pub fn escalate(&self, txn: &TxnHandle) -> Result<()> {
        self.ensure_mutable()?;
        let explicit = self.get_explicit_lock_type(txn.id());
        if explicit == LockMode::NL {
            return Err(LockError::NoLockHeld { txn_id: txn.id(), resource: self.resource.clone() });
        }

        let held = self.manager.get_locks_for_transaction(txn.id());
        let collected: Vec<_> = held
            .into_iter()
            .filter(|l| l.resource == self.resource || self.is_strict_descendant(&l.resource))
            .collect();
        let has_descendants = collected.iter().any(|l| l.resource != self.resource);

        if matches!(explicit, LockMode::S | LockMode::X) && !has_descendants {
            return Ok(());
        }

        let target = if collected
            .iter()
            .any(|l| matches!(l.mode, LockMode::IX | LockMode::SIX | LockMode::X))
        {
            LockMode::X
        } else {
            LockMode::S
        };

        let collected_resources: Vec<ResourceName> = collected.iter().map(|l| l.resource.clone()).collect();
        self.manager.acquire_and_release(txn, &self.resource, target, collected_resources)?;

        let ancestors = self.ancestors();
        for l in &collected {
            if l.resource != self.resource {
                self.decrement_child_locks(txn.id());
                for ancestor in &ancestors {
                    ancestor.decrement_child_locks(txn.id());
                }
            }
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_readonly() {
            return Err(LockError::Unsupported { resource: self.resource.clone() });
        }
        Ok(())
    }

    fn child_lock_count(&self, txn_id: TransactionId) -> usize {
        self.num_child_locks.lock().get(&txn_id).copied().unwrap_or(0)
    }

    fn increment_child_locks(&self, txn_id: TransactionId) {
        *self.num_child_locks.lock().entry(txn_id).or_insert(0) += 1;
    }

    fn decrement_child_locks(&self, txn_id: TransactionId) {
        let mut map = self.num_child_locks.lock();
        if let Some(count) = map.get_mut(&txn_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                map.remove(&txn_id);
            }
        }
    }

    fn is_strict_descendant(&self, candidate: &ResourceName) -> bool {
        let mut cur = candidate.parent();
        while let Some(c) = cur {
            if c == self.resource {
                return true;
            }
            cur = c.parent();
        }
        false
    }

    fn ancestors(&self) -> Vec<Arc<LockContext>> {
        let mut result = Vec::new();
        let mut cur = self.parent_context();
        while let Some(c) = cur {
            let next = c.parent_context();
            result.push(c);
            cur = next;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::transaction::testing::TestTransaction;

    fn tree() -> (Arc<LockContext>, Arc<LockContext>, Arc<LockContext>) {
        let manager = Arc::new(LockManager::new());
        let db = LockContext::root(manager, ResourceName::root());
        let table = LockContext::child_context(&db, "orders");
        let page = LockContext::child_context(&table, "page3");
        (db, table, page)
    }

    fn txn(id: TransactionId) -> TxnHandle {
        Arc::new(TestTransaction::new(id))
    }

    #[test]
    fn acquire_without_parent_intent_is_invalid() {
        let (_db, table, _page) = tree();
        let t1 = txn(1);
        let err = table.acquire(&t1, LockMode::IS).unwrap_err();
        assert!(matches!(err, LockError::InvalidLock { .. }));
    }

    #[test]
    fn acquire_chain_updates_saturation() {
        let (db, table, page) = tree();
        let t1 = txn(1);
        db.acquire(&t1, LockMode::IX).unwrap();
        table.acquire(&t1, LockMode::IX).unwrap();
        page.acquire(&t1, LockMode::X).unwrap();

        // db has one child context (table), and t1 holds 2 descendant
        // locks (table, page) under it.
        assert_eq!(db.capacity(), 1);
        assert_eq!(db.saturation(1), 2.0);
    }

    #[test]
    fn child_lock_counts_reach_every_ancestor() {
        let (db, table, page) = tree();
        let t1 = txn(1);
        db.acquire(&t1, LockMode::IX).unwrap();
        table.acquire(&t1, LockMode::IX).unwrap();
        page.acquire(&t1, LockMode::X).unwrap();

        assert_eq!(db.child_lock_count(1), 2);
        assert_eq!(table.child_lock_count(1), 1);
        assert_eq!(page.child_lock_count(1), 0);
    }

    #[test]
    fn release_with_descendant_locks_is_invalid() {
        let (db, table, page) = tree();
        let t1 = txn(1);
        db.acquire(&t1, LockMode::IX).unwrap();
        table.acquire(&t1, LockMode::IX).unwrap();
        page.acquire(&t1, LockMode::X).unwrap();

        let err = table.release(&t1).unwrap_err();
        assert!(matches!(err, LockError::InvalidLock { .. }));
    }

    #[test]
    fn effective_lock_type_inherits_through_six() {
        let (db, table, page) = tree();
        let t1 = txn(1);
        db.acquire(&t1, LockMode::IX).unwrap();
        table.acquire(&t1, LockMode::SIX).unwrap();

        assert_eq!(page.get_effective_lock_type(1), LockMode::S);
        assert_eq!(page.get_explicit_lock_type(1), LockMode::NL);
    }

    /// S4: escalating a table with descendant page locks replaces them
    /// with a single lock at the table, decrementing the ancestor's
    /// child-lock count by the number of descendants removed.
    #[test]
    fn scenario_s4_escalate_replaces_descendants() {
        let manager = Arc::new(LockManager::new());
        let db = LockContext::root(manager, ResourceName::root());
        let table1 = LockContext::child_context(&db, "table1");
        let table2 = LockContext::child_context(&db, "table2");
        let p3 = LockContext::child_context(&table1, "p3");
        let p5 = LockContext::child_context(&table1, "p5");

        let t1 = txn(1);
        db.acquire(&t1, LockMode::IX).unwrap();
        table1.acquire(&t1, LockMode::IX).unwrap();
        table2.acquire(&t1, LockMode::S).unwrap();
        p3.acquire(&t1, LockMode::S).unwrap();
        p5.acquire(&t1, LockMode::X).unwrap();

        assert_eq!(db.child_lock_count(1), 4);

        table1.escalate(&t1).unwrap();

        assert_eq!(table1.get_explicit_lock_type(1), LockMode::X);
        assert_eq!(p3.get_explicit_lock_type(1), LockMode::NL);
        assert_eq!(p5.get_explicit_lock_type(1), LockMode::NL);
        assert_eq!(table2.get_explicit_lock_type(1), LockMode::S);
        assert_eq!(db.get_explicit_lock_type(1), LockMode::IX);
        assert_eq!(db.child_lock_count(1), 2);
        assert_eq!(table1.child_lock_count(1), 0);
    }

    #[test]
    fn escalate_twice_is_a_no_op_second_time() {
        let manager = Arc::new(LockManager::new());
        let db = LockContext::root(manager, ResourceName::root());
        let table = LockContext::child_context(&db, "t");
        let page = LockContext::child_context(&table, "p");

        let t1 = txn(1);
        db.acquire(&t1, LockMode::IX).unwrap();
        table.acquire(&t1, LockMode::IX).unwrap();
        page.acquire(&t1, LockMode::X).unwrap();

        table.escalate(&t1).unwrap();
        assert_eq!(table.get_explicit_lock_type(1), LockMode::X);

        // Second call: explicit is already X and no descendant locks remain.
        table.escalate(&t1).unwrap();
        assert_eq!(table.get_explicit_lock_type(1), LockMode::X);
    }

    #[test]
    fn readonly_context_rejects_mutation() {
        let (db, table, _page) = tree();
        table.set_readonly(true);
        let t1 = txn(1);
        db.acquire(&t1, LockMode::IS).unwrap();
        let err = table.acquire(&t1, LockMode::IS).unwrap_err();
        assert!(matches!(err, LockError::Unsupported { .. }));
    }

    #[test]
    fn child_created_under_disabled_parent_is_readonly() {
        let (db, _table, _page) = tree();
        db.disable_child_locks();
        let new_table = LockContext::child_context(&db, "new_table");
        assert!(new_table.is_readonly());
    }
}
