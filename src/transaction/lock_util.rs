//! Declarative acquisition helper (C4).
//!
//! `ensure_sufficient` is the surface most callers outside this crate are
//! expected to use: "make sure I can read/write this row" instead of
//! manually walking the tree and deciding between acquire, promote, and
//! escalate. It is the only public operation in this module; everything
//! else is a private recursion over the ancestor chain.

use std::sync::Arc;

use super::lock_context::LockContext;
use super::lock_manager::TxnHandle;
use super::lock_mode::LockMode;
use crate::error::Result;

/// Ensure `txn` holds at least `required` (`S` or `X`) at `ctx`, acquiring,
/// promoting, or escalating ancestors and `ctx` itself as needed.
///
/// Policy (spec §4.4), evaluated in order:
/// 1. Already sufficient (`effective == required`): done.
/// 2. No explicit lock here: bring the ancestor chain up to
///    `required.parent_mode()`, then acquire `required`.
/// 3. Already hold something stronger (`substitutable(effective, required)`):
///    done.
/// 4. A legal upgrade (`substitutable(required, effective)`): bring the
///    ancestor chain up to `required.parent_mode()`, then promote.
/// 5. Heuristic: holding `IS` and `required == S` with existing child
///    locks is cheaper to escalate than to promote and re-acquire below.
/// 6. Otherwise: escalate this node; if that alone isn't enough, promote
///    the ancestor chain and this node to `required`.
pub fn ensure_sufficient(txn: &TxnHandle, ctx: &Arc<LockContext>, required: LockMode) -> Result<()> {
    // An intention mode (or NL) is not a meaningful request here; spec §7
    // treats this as caller error that must not manufacture a new error
    // kind or mutate any state — a silent no-op.
    if !matches!(required, LockMode::S | LockMode::X) {
        return Ok(());
    }

    let explicit = ctx.get_explicit_lock_type(txn.id());
    let effective = ctx.get_effective_lock_type(txn.id());

    if effective == required {
        return Ok(());
    }

    if explicit == LockMode::NL {
        ensure_ancestor_mode(txn, ctx.parent_context().as_ref(), required.parent_mode())?;
        ctx.acquire(txn, required)?;
        return Ok(());
    }

    if effective.substitutable(required) {
        return Ok(());
    }

    if required.substitutable(effective) {
        ensure_ancestor_mode(txn, ctx.parent_context().as_ref(), required.parent_mode())?;
        ctx.promote(txn, required)?;
        return Ok(());
    }

    if explicit == LockMode::IS && required == LockMode::S && ctx.has_child_locks(txn.id()) {
        ctx.escalate(txn)?;
        return Ok(());
    }

    ctx.escalate(txn)?;
    if ctx.get_effective_lock_type(txn.id()) != required {
        ensure_ancestor_mode(txn, ctx.parent_context().as_ref(), required.parent_mode())?;
        if ctx.get_explicit_lock_type(txn.id()) != required {
            ctx.promote(txn, required)?;
        }
    }
    Ok(())
}

/// Fused `acquireParent`/`promoteParent` (spec §4.4.1): recurse to the
/// root first, then on the way back bring each ancestor up to at least
/// `mode` — acquiring it where the ancestor holds `NL`, promoting it
/// where it holds something real but insufficient, leaving it alone where
/// it already suffices.
fn ensure_ancestor_mode(txn: &TxnHandle, ctx: Option<&Arc<LockContext>>, mode: LockMode) -> Result<()> {
    let ctx = match ctx {
        Some(ctx) => ctx,
        None => return Ok(()),
    };

    ensure_ancestor_mode(txn, ctx.parent_context().as_ref(), mode.parent_mode())?;

    let current = ctx.get_explicit_lock_type(txn.id());
    if current == LockMode::NL {
        ctx.acquire(txn, mode)?;
    } else if !current.substitutable(mode) {
        ctx.promote(txn, mode)?;
    }
    Ok(())
}
