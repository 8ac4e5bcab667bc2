//! Lock-type algebra (C1).
//!
//! Three pure, total functions over [`LockMode`]: [`LockMode::compatible`],
//! [`LockMode::substitutable`], and [`LockMode::parent_mode`]. None of them
//! touch the lock table — they are the compatibility matrix the flat and
//! hierarchical layers consult.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lock mode in the standard multigranularity hierarchy.
///
/// `NL` means "no lock held"; `IS`/`IX`/`SIX` are intention modes meaningful
/// only on non-leaf resources.
///
/// # Compatibility matrix
///
/// |      | NL | IS | IX | S  | SIX | X  |
/// |------|----|----|----|----|----- |----|
/// | NL   | ✓  | ✓  | ✓  | ✓  | ✓   | ✓  |
/// | IS   | ✓  | ✓  | ✓  | ✓  | ✓   | ✗  |
/// | IX   | ✓  | ✓  | ✓  | ✗  | ✗   | ✗  |
/// | S    | ✓  | ✓  | ✗  | ✓  | ✗   | ✗  |
/// | SIX  | ✓  | ✓  | ✗  | ✗  | ✗   | ✗  |
/// | X    | ✓  | ✗  | ✗  | ✗  | ✗   | ✗  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// No lock.
    NL,
    /// Intent Shared.
    IS,
    /// Intent Exclusive.
    IX,
    /// Shared.
    S,
    /// Shared with Intent Exclusive.
    SIX,
    /// Exclusive.
    X,
}

impl LockMode {
    /// True if a lock of `self` may be held at the same time, on the same
    /// resource, by a different transaction than one holding `other`.
    ///
    /// Symmetric. `NL` is compatible with everything.
    pub fn compatible(self, other: LockMode) -> bool {
        use LockMode::*;
        if self == NL || other == NL {
            return true;
        }
        matches!(
            (self, other),
            (IS, IS) | (IS, IX) | (IS, S) | (IS, SIX)
                | (IX, IS) | (IX, IX)
                | (S, IS) | (S, S)
                | (SIX, IS)
        )
    }

    /// True iff holding `self` already grants every permission `required`
    /// would grant — i.e. `self` may substitute for `required`.
    ///
    /// Always true when `self == required` or `required == NL`. `X` and
    /// `SIX` substitute for `S`; `IX` and `SIX` substitute for `IS`; `SIX`
    /// and `X` substitute for `IX`.
    pub fn substitutable(self, required: LockMode) -> bool {
        use LockMode::*;
        if self == required || required == NL {
            return true;
        }
        matches!(
            (self, required),
            (X, S) | (SIX, S) | (IX, IS) | (SIX, IS) | (SIX, IX) | (X, IX)
        )
    }

    /// The weakest mode required on the parent resource to legally hold
    /// `self` on a child.
    pub fn parent_mode(self) -> LockMode {
        use LockMode::*;
        match self {
            X | IX | SIX => IX,
            S | IS => IS,
            NL => NL,
        }
    }

    /// True for `IS`/`IX`/`SIX` — modes meaningful only as ancestor intent,
    /// never as the mode a caller ultimately wants on a leaf resource.
    pub fn is_intention_only(self) -> bool {
        matches!(self, LockMode::IS | LockMode::IX | LockMode::SIX)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockMode::NL => "NL",
            LockMode::IS => "IS",
            LockMode::IX => "IX",
            LockMode::S => "S",
            LockMode::SIX => "SIX",
            LockMode::X => "X",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::LockMode::*;

    #[test]
    fn nl_compatible_with_everything() {
        for m in [NL, IS, IX, S, SIX, X] {
            assert!(NL.compatible(m));
            assert!(m.compatible(NL));
        }
    }

    #[test]
    fn x_compatible_with_nothing_but_nl() {
        for m in [IS, IX, S, SIX, X] {
            assert!(!X.compatible(m));
        }
    }

    #[test]
    fn is_compatible_matrix() {
        assert!(IS.compatible(IS));
        assert!(IS.compatible(IX));
        assert!(IS.compatible(S));
        assert!(IS.compatible(SIX));
        assert!(!IS.compatible(X));
    }

    #[test]
    fn ix_compatible_matrix() {
        assert!(IX.compatible(IS));
        assert!(IX.compatible(IX));
        assert!(!IX.compatible(S));
        assert!(!IX.compatible(SIX));
        assert!(!IX.compatible(X));
    }

    #[test]
    fn six_only_compatible_with_is() {
        assert!(SIX.compatible(IS));
        assert!(!SIX.compatible(IX));
        assert!(!SIX.compatible(S));
        assert!(!SIX.compatible(SIX));
        assert!(!SIX.compatible(X));
    }

    #[test]
    fn compatible_is_symmetric() {
        let all = [NL, IS, IX, S, SIX, X];
        for a in all {
            for b in all {
                assert_eq!(a.compatible(b), b.compatible(a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn substitutable_reflexive_and_nl() {
        for m in [NL, IS, IX, S, SIX, X] {
            assert!(m.substitutable(m));
            assert!(m.substitutable(NL));
        }
    }

    #[test]
    fn substitutable_upgrades() {
        assert!(X.substitutable(S));
        assert!(SIX.substitutable(S));
        assert!(IX.substitutable(IS));
        assert!(SIX.substitutable(IS));
        assert!(SIX.substitutable(IX));
        assert!(X.substitutable(IX));

        assert!(!S.substitutable(X));
        assert!(!IS.substitutable(IX));
        assert!(!IS.substitutable(S));
        assert!(!S.substitutable(SIX));
    }

    #[test]
    fn parent_mode_table() {
        assert_eq!(X.parent_mode(), IX);
        assert_eq!(IX.parent_mode(), IX);
        assert_eq!(SIX.parent_mode(), IX);
        assert_eq!(S.parent_mode(), IS);
        assert_eq!(IS.parent_mode(), IS);
        assert_eq!(NL.parent_mode(), NL);
    }
}
