//! Contract for any `(x, u) -> R^p` map with an analytic Jacobian, plus a
//! finite-difference sanity check shared by dynamics, cost, and constraint
//! implementations.

use nalgebra::{DMatrix, DVector};

use crate::error::ConfigError;

const FD_EPSILON: f64 = 1e-6;

/// A differentiable map `(x, u) -> R^p`. Dynamics, costs, and constraints
/// all specialize this shape; the solver only ever calls through here.
pub trait FunctionBase {
    fn output_dim(&self) -> usize;
    fn state_dim(&self) -> usize;
    fn control_dim(&self) -> usize;

    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;

    /// Jacobian with respect to the stacked `[x; u]` argument, shape
    /// `p x (n+m)`.
    fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64>;

    fn has_hessian(&self) -> bool {
        false
    }

    /// Directional second derivative `sum_i b_i * d2(f_i)/d[x,u]^2`,
    /// shape `(n+m) x (n+m)`. Only required when [`has_hessian`] is true.
    fn hessian(&self, _x: &DVector<f64>, _u: &DVector<f64>, _b: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::zeros(self.state_dim() + self.control_dim(), self.state_dim() + self.control_dim())
    }
}

/// Validates that `x` and `u` match the function's declared dimensions.
pub fn check_dims(
    f: &dyn FunctionBase,
    x: &DVector<f64>,
    u: &DVector<f64>,
) -> Result<(), ConfigError> {
    if x.len() != f.state_dim() {
        return Err(ConfigError::DimensionMismatch {
            expected: f.state_dim(),
            actual: x.len(),
        });
    }
    if u.len() != f.control_dim() {
        return Err(ConfigError::DimensionMismatch {
            expected: f.control_dim(),
            actual: u.len(),
        });
    }
    Ok(())
}

/// Compares the analytic Jacobian to a central finite-difference estimate
/// at `(x, u)` and returns the max-norm (`||.||_inf`) error between them.
pub fn check_jacobian(f: &dyn FunctionBase, x: &DVector<f64>, u: &DVector<f64>) -> f64 {
    check_jacobian_eps(f, x, u, FD_EPSILON)
}

pub fn check_jacobian_eps(f: &dyn FunctionBase, x: &DVector<f64>, u: &DVector<f64>, eps: f64) -> f64 {
    let n = f.state_dim();
    let m = f.control_dim();
    let p = f.output_dim();

    let analytic = f.jacobian(x, u);
    let mut numeric = DMatrix::zeros(p, n + m);

    for i in 0..n {
        let mut xp = x.clone();
        xp[i] += eps;
        let mut xm = x.clone();
        xm[i] -= eps;
        let dfi = (f.evaluate(&xp, u) - f.evaluate(&xm, u)) / (2.0 * eps);
        numeric.set_column(i, &dfi);
    }
    for i in 0..m {
        let mut up = u.clone();
        up[i] += eps;
        let mut um = u.clone();
        um[i] -= eps;
        let dfi = (f.evaluate(x, &up) - f.evaluate(x, &um)) / (2.0 * eps);
        numeric.set_column(n + i, &dfi);
    }

    (analytic - numeric).abs().max()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl FunctionBase for Quadratic {
        fn output_dim(&self) -> usize {
            1
        }
        fn state_dim(&self) -> usize {
            2
        }
        fn control_dim(&self) -> usize {
            1
        }
        fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
            DVector::from_element(1, x[0] * x[0] + 2.0 * x[1] + u[0] * x[0])
        }
        fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(1, 3, &[2.0 * x[0] + u[0], 2.0, x[0]])
        }
    }

    #[test]
    fn jacobian_matches_finite_difference() {
        let f = Quadratic;
        let x = DVector::from_vec(vec![0.7, -1.3]);
        let u = DVector::from_vec(vec![0.2]);
        let err = check_jacobian(&f, &x, &u);
        assert!(err < 1e-6, "error = {err}");
    }

    #[test]
    fn check_dims_rejects_mismatch() {
        let f = Quadratic;
        let x = DVector::zeros(3);
        let u = DVector::zeros(1);
        assert!(check_dims(&f, &x, &u).is_err());
    }
}
