//! Concrete [`ResourceName`] path type.
//!
//! Spec-wise this belongs to the surrounding engine's catalog, not the lock
//! manager; this crate has no catalog, so it supplies a minimal, immutable
//! path implementation good enough to key the lock table and build a
//! [`LockContext`](super::lock_context::LockContext) tree from.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An immutable path from the tree root to some node, e.g.
/// `database/orders/page3`.
///
/// Cheap to clone (each component is a shared `Arc<str>`); equal by full
/// path, so two `ResourceName`s built independently with the same
/// components compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceName {
    components: Vec<Arc<str>>,
}

impl ResourceName {
    /// The conventional tree root, `"database"`.
    pub fn root() -> Self {
        Self::orphan("database")
    }

    /// A new top-level name disjoint from the main tree (spec §6.2's
    /// "orphan entry point"). Nothing stops a caller from also using this
    /// for the root; only convention distinguishes them.
    pub fn orphan(name: impl Into<Arc<str>>) -> Self {
        Self {
            components: vec![name.into()],
        }
    }

    /// This name extended with one more path component.
    pub fn child(&self, name: impl Into<Arc<str>>) -> Self {
        let mut components = self.components.clone();
        components.push(name.into());
        Self { components }
    }

    /// The parent path, or `None` at the root.
    pub fn parent(&self) -> Option<ResourceName> {
        if self.components.len() <= 1 {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// The final path component, e.g. `"page3"` for `database/orders/page3`.
    pub fn leaf(&self) -> &str {
        self.components.last().expect("components is non-empty")
    }

    /// Depth from the root; the root itself is depth 0.
    pub fn depth(&self) -> usize {
        self.components.len() - 1
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        assert_eq!(ResourceName::root().parent(), None);
    }

    #[test]
    fn child_extends_path_and_display() {
        let db = ResourceName::root();
        let table = db.child("orders");
        let page = table.child("page3");
        assert_eq!(page.to_string(), "database/orders/page3");
        assert_eq!(page.parent(), Some(table.clone()));
        assert_eq!(table.parent(), Some(db.clone()));
        assert_eq!(page.depth(), 2);
    }

    #[test]
    fn equality_is_by_full_path() {
        let a = ResourceName::root().child("orders");
        let b = ResourceName::root().child("orders");
        assert_eq!(a, b);
        let c = ResourceName::root().child("other");
        assert_ne!(a, c);
    }

    #[test]
    fn orphan_is_disjoint_from_main_tree() {
        let o = ResourceName::orphan("scratch");
        assert_ne!(o, ResourceName::root());
        assert_eq!(o.parent(), None);
    }
}
