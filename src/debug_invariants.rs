//! Structural self-checks for the tables and windows built while streaming.
//!
//! `validate_invariants` is always available and returns the first violation;
//! `debug_assert_invariants` panics on it in debug builds, or in release
//! builds with the `check-invariants` feature.

use crate::mesh_error::MeshStreamError;

pub trait DebugInvariants {
    /// Panic on the first violated invariant when checks are compiled in.
    fn debug_assert_invariants(&self);

    fn validate_invariants(&self) -> Result<(), MeshStreamError>;
}

/// `debug_invariants!(result, "what")` panics with `what` and the error when
/// `result` is an `Err` and checks are compiled in; otherwise expands to
/// nothing.
#[macro_export]
macro_rules! debug_invariants {
    ($check:expr, $what:literal) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        {
            if let Err(err) = $check {
                panic!("{} violates its invariants: {}", $what, err);
            }
        }
    };
}
