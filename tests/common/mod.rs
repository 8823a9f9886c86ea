//! Example problem definitions used only by integration tests: a
//! multi-dof triple integrator, a unicycle, and a circular obstacle
//! constraint. None of these are part of the library's public surface.

#![allow(dead_code)]

use ilqr_core::{ConstraintFn, DynamicsModel};
use nalgebra::{DMatrix, DVector};

/// `dof` independent triple integrators: state `[p; v; a]` per axis,
/// control is jerk per axis. `xdot = [v; a; u]`.
pub struct TripleIntegrator {
    dof: usize,
}

impl TripleIntegrator {
    pub fn new(dof: usize) -> Self {
        Self { dof }
    }
}

impl DynamicsModel for TripleIntegrator {
    fn state_dim(&self) -> usize {
        3 * self.dof
    }

    fn control_dim(&self) -> usize {
        self.dof
    }

    fn f(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let d = self.dof;
        DVector::from_iterator(
            3 * d,
            (0..d)
                .map(|i| x[d + i])
                .chain((0..d).map(|i| x[2 * d + i]))
                .chain((0..d).map(|i| u[i])),
        )
    }

    fn jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let d = self.dof;
        let n = 3 * d;
        let mut a = DMatrix::zeros(n, n);
        let mut b = DMatrix::zeros(n, d);
        for i in 0..d {
            a[(i, d + i)] = 1.0;
            a[(d + i, 2 * d + i)] = 1.0;
            b[(2 * d + i, i)] = 1.0;
        }
        (a, b)
    }
}

/// Planar unicycle: state `(x, y, theta)`, control `(v, omega)`.
/// `xdot = (v cos(theta), v sin(theta), omega)`.
pub struct Unicycle;

impl DynamicsModel for Unicycle {
    fn state_dim(&self) -> usize {
        3
    }

    fn control_dim(&self) -> usize {
        2
    }

    fn f(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let theta = x[2];
        DVector::from_vec(vec![u[0] * theta.cos(), u[0] * theta.sin(), u[1]])
    }

    fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let theta = x[2];
        let v = u[0];
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[0.0, 0.0, -v * theta.sin(), 0.0, 0.0, v * theta.cos(), 0.0, 0.0, 0.0],
        );
        let b = DMatrix::from_row_slice(3, 2, &[theta.cos(), 0.0, theta.sin(), 0.0, 0.0, 1.0]);
        (a, b)
    }
}

/// Keep-out circle in the plane spanned by the state's first two
/// components: `c(x,u) = r^2 - ||p - center||^2 <= 0` (squared distance
/// to avoid the non-smooth kink of a plain Euclidean distance at the
/// center), cone `NegativeOrthant`.
pub struct CircleObstacle {
    label: String,
    state_dim: usize,
    control_dim: usize,
    center: (f64, f64),
    radius: f64,
}

impl CircleObstacle {
    pub fn new(state_dim: usize, control_dim: usize, center: (f64, f64), radius: f64) -> Self {
        Self {
            label: "circle_obstacle".to_string(),
            state_dim,
            control_dim,
            center,
            radius,
        }
    }
}

impl ConstraintFn for CircleObstacle {
    fn output_dim(&self) -> usize {
        1
    }

    fn evaluate(&self, x: &DVector<f64>, _u: &DVector<f64>) -> DVector<f64> {
        let dx = x[0] - self.center.0;
        let dy = x[1] - self.center.1;
        DVector::from_element(1, self.radius * self.radius - (dx * dx + dy * dy))
    }

    fn jacobian(&self, x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
        let n = self.state_dim;
        let m = self.control_dim;
        let dx = x[0] - self.center.0;
        let dy = x[1] - self.center.1;
        let mut j = DMatrix::zeros(1, n + m);
        j[(0, 0)] = -2.0 * dx;
        j[(0, 1)] = -2.0 * dy;
        j
    }

    fn label(&self) -> &str {
        &self.label
    }
}
