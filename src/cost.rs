//! Stage and terminal cost functions.

use nalgebra::{DMatrix, DVector};

/// A polymorphic stage or terminal cost `l(x, u)`. Terminal costs ignore
/// `u` (callers pass a zero vector) and report `Huu = 0`.
pub trait CostFunction {
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> f64;

    /// `(grad_x, grad_u)`.
    fn gradient(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DVector<f64>, DVector<f64>);

    /// `(Hxx, Huu, Hxu)`.
    fn hessian(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>);

    fn is_quadratic(&self) -> bool {
        false
    }

    /// `Hxu === 0`.
    fn is_block_diagonal(&self) -> bool {
        false
    }

    fn is_terminal(&self) -> bool {
        false
    }
}

/// `1/2 x'Qx + 1/2 u'Ru + x'Hu + q'x + r'u + c`.
///
/// A terminal [`LqrCost`] (built via [`LqrCost::terminal`]) drops the
/// control-dependent terms entirely: `evaluate`/`gradient`/`hessian` ignore
/// `u` and report `Huu = Hxu = 0`, matching spec's terminal-variant
/// convention of `u === 0`.
pub struct LqrCost {
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub h: DMatrix<f64>,
    pub q_vec: DVector<f64>,
    pub r_vec: DVector<f64>,
    pub c: f64,
    terminal: bool,
}

impl LqrCost {
    pub fn stage(
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        h: DMatrix<f64>,
        q_vec: DVector<f64>,
        r_vec: DVector<f64>,
        c: f64,
    ) -> Self {
        Self {
            q,
            r,
            h,
            q_vec,
            r_vec,
            c,
            terminal: false,
        }
    }

    /// `control_dim` fixes the width of the (always-zero) control blocks so
    /// `Quu`/`Qxu` still have a well-defined shape at the terminal knot.
    pub fn terminal(q: DMatrix<f64>, q_vec: DVector<f64>, c: f64, control_dim: usize) -> Self {
        let n = q.nrows();
        Self {
            q,
            r: DMatrix::zeros(control_dim, control_dim),
            h: DMatrix::zeros(n, control_dim),
            q_vec,
            r_vec: DVector::zeros(control_dim),
            c,
            terminal: true,
        }
    }

    pub fn state_dim(&self) -> usize {
        self.q.nrows()
    }

    pub fn control_dim(&self) -> usize {
        self.r.nrows()
    }
}

impl CostFunction for LqrCost {
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> f64 {
        if self.terminal {
            return 0.5 * (x.transpose() * &self.q * x)[(0, 0)] + self.q_vec.dot(x) + self.c;
        }
        let quad_x = 0.5 * (x.transpose() * &self.q * x)[(0, 0)];
        let quad_u = 0.5 * (u.transpose() * &self.r * u)[(0, 0)];
        let cross = (x.transpose() * &self.h * u)[(0, 0)];
        quad_x + quad_u + cross + self.q_vec.dot(x) + self.r_vec.dot(u) + self.c
    }

    fn gradient(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        if self.terminal {
            let gx = &self.q * x + &self.q_vec;
            return (gx, DVector::zeros(self.control_dim()));
        }
        let gx = &self.q * x + &self.h * u + &self.q_vec;
        let gu = &self.r * u + self.h.transpose() * x + &self.r_vec;
        (gx, gu)
    }

    fn hessian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        if self.terminal {
            return (
                self.q.clone(),
                DMatrix::zeros(self.control_dim(), self.control_dim()),
                DMatrix::zeros(self.state_dim(), self.control_dim()),
            );
        }
        (self.q.clone(), self.r.clone(), self.h.clone())
    }

    fn is_quadratic(&self) -> bool {
        true
    }

    fn is_block_diagonal(&self) -> bool {
        self.h.iter().all(|v| *v == 0.0)
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }
}
