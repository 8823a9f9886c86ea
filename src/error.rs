//! Error taxonomy.
//!
//! Configuration faults are raised immediately to the caller as
//! [`ConfigError`]. Numerical faults encountered mid-solve are not
//! exceptions: they are recovered locally (regularization) where possible
//! and otherwise reported as an [`ExitStatus`](crate::ilqr::ExitStatus)
//! value alongside the best trajectory found so far.

use thiserror::Error;

/// Configuration/setup faults, all recoverable by the caller (fix the
/// argument and retry).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("knot index {index} out of range [0, {max}]")]
    InvalidKnotIndex { index: usize, max: usize },

    #[error("dynamics cannot be set at the terminal knot (k = N = {n})")]
    TerminalDynamicsNotAllowed { n: usize },

    #[error("a null handle was supplied where a cost/dynamics/constraint object was required")]
    NullHandle,

    #[error("control bound at index {index} has lb > ub ({lb} > {ub})")]
    InvalidBounds { index: usize, lb: f64, ub: f64 },

    #[error("problem is not fully defined: {reason}")]
    IncompleteProblem { reason: String },

    #[error("knot {index} has a negative step h = {h} (steps must be non-negative)")]
    NegativeStep { index: usize, h: f64 },
}
