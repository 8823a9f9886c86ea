//! `g(x, u) in K` constraints.
//!
//! Constraints expose a fixed capability set (evaluate, Jacobian, output
//! dimension, label); the cone tag travels with the value rather than the
//! type, so a single [`Constraint`] wrapper can hold any concrete
//! constraint behind a trait object and still be stored in a homogeneous
//! `Vec` per knot.

use std::rc::Rc;

use nalgebra::{DMatrix, DVector};

use crate::cones::Cone;
use crate::error::ConfigError;

/// The pure-function part of a constraint: `(x, u) -> c in R^p`.
pub trait ConstraintFn {
    fn output_dim(&self) -> usize;
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;
    fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64>;
    fn label(&self) -> &str;
}

/// A constraint paired with the cone its output must land in.
#[derive(Clone)]
pub struct Constraint {
    cone: Cone,
    inner: Rc<dyn ConstraintFn>,
}

impl Constraint {
    pub fn new(inner: Rc<dyn ConstraintFn>, cone: Cone) -> Self {
        Self { inner, cone }
    }

    pub fn cone(&self) -> Cone {
        self.cone
    }

    pub fn output_dim(&self) -> usize {
        self.inner.output_dim()
    }

    pub fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        self.inner.evaluate(x, u)
    }

    pub fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64> {
        self.inner.jacobian(x, u)
    }

    pub fn label(&self) -> &str {
        self.inner.label()
    }

    /// Constraint violation at `(x, u)`: `max(0, c)` componentwise for an
    /// inequality (`NegativeOrthant`), `|c|` componentwise for an equality
    /// (`Zero`). Returns the Linf norm.
    pub fn violation(&self, x: &DVector<f64>, u: &DVector<f64>) -> f64 {
        let c = self.evaluate(x, u);
        match self.cone {
            Cone::NegativeOrthant => c.iter().fold(0.0_f64, |acc, ci| acc.max(ci.max(0.0))),
            Cone::Zero => c.iter().fold(0.0_f64, |acc, ci| acc.max(ci.abs())),
            Cone::Identity => 0.0,
        }
    }
}

/// A threshold a bound is considered infinite (and therefore omitted) past.
pub const UNBOUNDED: f64 = f64::MAX;

/// Per-dimension control bounds `lb <= u <= ub`. Emits one output row per
/// finite bound; a bound with `|bound| >= UNBOUNDED` is omitted entirely.
///
/// The Jacobian is reported over the full `[x; u]` stack (state columns
/// always zero) so every [`ConstraintFn`] shares one convention regardless
/// of which block of the knot it actually depends on.
pub struct ControlBound {
    label: String,
    state_dim: usize,
    control_dim: usize,
    /// `(dimension index, bound value, is_upper)` for every finite bound.
    rows: Vec<(usize, f64, bool)>,
}

impl ControlBound {
    /// `state_dim` only sizes the (always-zero) state columns of the
    /// Jacobian; the bound itself never depends on `x`.
    pub fn new(state_dim: usize, control_dim: usize, lb: &[f64], ub: &[f64]) -> Result<Self, ConfigError> {
        if lb.len() != control_dim || ub.len() != control_dim {
            return Err(ConfigError::DimensionMismatch {
                expected: control_dim,
                actual: lb.len().max(ub.len()),
            });
        }
        let mut rows = Vec::new();
        for i in 0..control_dim {
            if lb[i] > ub[i] {
                return Err(ConfigError::InvalidBounds {
                    index: i,
                    lb: lb[i],
                    ub: ub[i],
                });
            }
            if lb[i] > -UNBOUNDED {
                rows.push((i, lb[i], false));
            }
            if ub[i] < UNBOUNDED {
                rows.push((i, ub[i], true));
            }
        }
        Ok(Self {
            label: "control_bound".to_string(),
            state_dim,
            control_dim,
            rows,
        })
    }
}

impl ConstraintFn for ControlBound {
    fn output_dim(&self) -> usize {
        self.rows.len()
    }

    fn evaluate(&self, _x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.rows.len(),
            self.rows.iter().map(|&(i, bound, is_upper)| {
                if is_upper {
                    u[i] - bound
                } else {
                    bound - u[i]
                }
            }),
        )
    }

    fn jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
        let n = self.state_dim;
        let m = self.control_dim;
        let mut j = DMatrix::zeros(self.rows.len(), n + m);
        for (row, &(i, _, is_upper)) in self.rows.iter().enumerate() {
            j[(row, n + i)] = if is_upper { 1.0 } else { -1.0 };
        }
        j
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// `x - x_f`, cone [`Cone::Zero`], output dimension `n`.
pub struct GoalConstraint {
    label: String,
    target: DVector<f64>,
}

impl GoalConstraint {
    pub fn new(target: DVector<f64>) -> Self {
        Self {
            label: "goal".to_string(),
            target,
        }
    }
}

impl ConstraintFn for GoalConstraint {
    fn output_dim(&self) -> usize {
        self.target.len()
    }

    fn evaluate(&self, x: &DVector<f64>, _u: &DVector<f64>) -> DVector<f64> {
        x - &self.target
    }

    fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64> {
        let n = self.target.len();
        let m = u.len();
        let _ = x;
        let mut j = DMatrix::zeros(n, n + m);
        for i in 0..n {
            j[(i, i)] = 1.0;
        }
        j
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{check_jacobian_eps, FunctionBase};

    /// Adapts a [`ConstraintFn`] (whose `evaluate`/`jacobian` already share
    /// [`FunctionBase`]'s `(x, u) -> R^p` shape) to the trait so its analytic
    /// Jacobian can be checked through the same `check_jacobian_eps` utility
    /// every other module's analytic Jacobian is checked with.
    struct ConstraintAsFunction<'a> {
        inner: &'a dyn ConstraintFn,
        n: usize,
        m: usize,
    }

    impl FunctionBase for ConstraintAsFunction<'_> {
        fn output_dim(&self) -> usize {
            self.inner.output_dim()
        }
        fn state_dim(&self) -> usize {
            self.n
        }
        fn control_dim(&self) -> usize {
            self.m
        }
        fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
            self.inner.evaluate(x, u)
        }
        fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64> {
            self.inner.jacobian(x, u)
        }
    }

    #[test]
    fn control_bound_jacobian_matches_finite_difference() {
        let b = ControlBound::new(2, 2, &[-1.0, -1.0], &[1.0, 1.0]).unwrap();
        let f = ConstraintAsFunction { inner: &b, n: 2, m: 2 };
        let x = DVector::from_vec(vec![0.3, -0.2]);
        let u = DVector::from_vec(vec![0.1, -0.4]);
        let err = check_jacobian_eps(&f, &x, &u, 1e-6);
        assert!(err < 1e-6, "error = {err}");
    }

    #[test]
    fn goal_constraint_jacobian_matches_finite_difference() {
        let g = GoalConstraint::new(DVector::from_vec(vec![1.0, -2.0]));
        let f = ConstraintAsFunction { inner: &g, n: 2, m: 1 };
        let x = DVector::from_vec(vec![0.4, 0.9]);
        let u = DVector::from_vec(vec![0.2]);
        let err = check_jacobian_eps(&f, &x, &u, 1e-6);
        assert!(err < 1e-6, "error = {err}");
    }

    #[test]
    fn control_bound_omits_infinite_rows() {
        let lb = [-UNBOUNDED, -5.0];
        let ub = [10.0, UNBOUNDED];
        let b = ControlBound::new(0, 2, &lb, &ub).unwrap();
        // dim 0: only ub finite -> 1 row; dim 1: only lb finite -> 1 row.
        assert_eq!(b.output_dim(), 2);
    }

    #[test]
    fn control_bound_rejects_lb_greater_than_ub() {
        let err = ControlBound::new(0, 1, &[1.0], &[0.0]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBounds { .. }));
    }

    #[test]
    fn control_bound_violation_is_active_outside_band() {
        let b = ControlBound::new(0, 1, &[-1.0], &[1.0]).unwrap();
        let c = Constraint::new(Rc::new(b), Cone::NegativeOrthant);
        let x = DVector::zeros(0);
        let inside = c.violation(&x, &DVector::from_vec(vec![0.5]));
        let outside = c.violation(&x, &DVector::from_vec(vec![2.0]));
        assert_eq!(inside, 0.0);
        assert!(outside > 0.0);
    }

    #[test]
    fn control_bound_jacobian_has_state_width_zero_columns() {
        let b = ControlBound::new(3, 1, &[-1.0], &[1.0]).unwrap();
        let x = DVector::zeros(3);
        let u = DVector::from_vec(vec![2.0]);
        let j = b.jacobian(&x, &u);
        assert_eq!(j.ncols(), 4);
        assert!(j.view((0, 0), (j.nrows(), 3)).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn goal_constraint_output_dim_is_n() {
        let g = GoalConstraint::new(DVector::from_vec(vec![1.0, 2.0, 3.0]));
        assert_eq!(g.output_dim(), 3);
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let u = DVector::zeros(0);
        assert_eq!(g.evaluate(&x, &u).norm(), 0.0);
    }
}
