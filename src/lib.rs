//! Discrete-time constrained trajectory optimization: iterative LQR wrapped
//! in an augmented Lagrangian outer loop.
//!
//! A [`Problem`] pins down dynamics, cost, and constraints at every knot of
//! a fixed-horizon trajectory. An unconstrained [`Problem`] is solved
//! directly with [`Ilqr`]; a constrained one is solved with [`AlSolver`],
//! which wraps the problem's costs with penalty/multiplier terms and drives
//! dual ascent and penalty growth around repeated inner `Ilqr` solves.

pub mod al;
pub mod cones;
pub mod constraint;
pub mod cost;
pub mod dynamics;
pub mod error;
pub mod function;
pub mod ilqr;
pub mod options;
pub mod problem;
pub mod trajectory;

pub use al::AlSolver;
pub use cones::Cone;
pub use constraint::{Constraint, ConstraintFn, ControlBound, GoalConstraint, UNBOUNDED};
pub use cost::{CostFunction, LqrCost};
pub use dynamics::{DiscretizedModel, DynamicsModel, Integrator, Rk4};
pub use error::ConfigError;
pub use function::FunctionBase;
pub use ilqr::{ExitStatus, Ilqr};
pub use options::{RegularizationMode, SolverOptions};
pub use problem::Problem;
pub use trajectory::{KnotPoint, Trajectory};
