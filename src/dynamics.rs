//! Continuous dynamics models and their fixed-step explicit discretization.

use std::rc::Rc;

use nalgebra::{DMatrix, DVector};

/// Continuous-time dynamics `xdot = f(x, u)` with an analytic Jacobian.
/// Concrete dynamics (unicycle, triple integrator, ...) live outside this
/// crate; the solver only ever calls through this trait.
pub trait DynamicsModel {
    fn state_dim(&self) -> usize;
    fn control_dim(&self) -> usize;

    fn f(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;

    /// `(df/dx, df/du)` at `(x, u)`, shapes `n x n` and `n x m`.
    fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>);
}

/// An explicit, fixed-step integrator that both propagates the state and
/// carries the sensitivity (Jacobian) of the propagated state through the
/// integration stages.
pub trait Integrator {
    fn step(&self, model: &dyn DynamicsModel, x: &DVector<f64>, u: &DVector<f64>, h: f64) -> DVector<f64>;

    /// `(dF/dx, dF/du)` of the discrete map `x_{k+1} = F(x_k, u_k, h)`.
    fn step_jacobian(
        &self,
        model: &dyn DynamicsModel,
        x: &DVector<f64>,
        u: &DVector<f64>,
        h: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>);
}

/// Classic 4th-order Runge-Kutta, the reference integrator for this core.
/// The discrete Jacobian is propagated analytically through the four
/// stages by the chain rule rather than recovered by finite differences.
pub struct Rk4;

impl Integrator for Rk4 {
    fn step(&self, model: &dyn DynamicsModel, x: &DVector<f64>, u: &DVector<f64>, h: f64) -> DVector<f64> {
        let k1 = model.f(x, u);
        let k2 = model.f(&(x + &k1 * (h / 2.0)), u);
        let k3 = model.f(&(x + &k2 * (h / 2.0)), u);
        let k4 = model.f(&(x + &k3 * h), u);
        x + (k1 + 2.0 * &k2 + 2.0 * &k3 + k4) * (h / 6.0)
    }

    fn step_jacobian(
        &self,
        model: &dyn DynamicsModel,
        x: &DVector<f64>,
        u: &DVector<f64>,
        h: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = model.state_dim();
        let identity = DMatrix::<f64>::identity(n, n);

        let k1 = model.f(x, u);
        let (a1, b1) = model.jacobian(x, u);

        let x2 = x + &k1 * (h / 2.0);
        let k2 = model.f(&x2, u);
        let (a2, b2) = model.jacobian(&x2, u);
        let dk2_dx = &a2 * (&identity + &a1 * (h / 2.0));
        let dk2_du = &a2 * (&b1 * (h / 2.0)) + &b2;

        let x3 = x + &k2 * (h / 2.0);
        let k3 = model.f(&x3, u);
        let (a3, b3) = model.jacobian(&x3, u);
        let dk3_dx = &a3 * (&identity + &dk2_dx * (h / 2.0));
        let dk3_du = &a3 * (&dk2_du * (h / 2.0)) + &b3;

        let x4 = x + &k3 * h;
        let (a4, b4) = model.jacobian(&x4, u);
        let dk4_dx = &a4 * (&identity + &dk3_dx * h);
        let dk4_du = &a4 * (&dk3_du * h) + &b4;

        let df_dx = &identity + (&a1 + 2.0 * &dk2_dx + 2.0 * &dk3_dx + &dk4_dx) * (h / 6.0);
        let df_du = (&b1 + 2.0 * &dk2_du + 2.0 * &dk3_du + &dk4_du) * (h / 6.0);

        let _ = k2;
        let _ = k3;
        (df_dx, df_du)
    }
}

/// A continuous [`DynamicsModel`] wrapped with a fixed-step [`Integrator`],
/// producing the discrete map `x_{k+1} = F(x_k, u_k, h_k)` the solver
/// actually consumes.
pub struct DiscretizedModel {
    model: Rc<dyn DynamicsModel>,
    integrator: Rc<dyn Integrator>,
}

impl DiscretizedModel {
    pub fn new(model: Rc<dyn DynamicsModel>) -> Self {
        Self {
            model,
            integrator: Rc::new(Rk4),
        }
    }

    pub fn with_integrator(
        model: Rc<dyn DynamicsModel>,
        integrator: Rc<dyn Integrator>,
    ) -> Self {
        Self { model, integrator }
    }

    pub fn state_dim(&self) -> usize {
        self.model.state_dim()
    }

    pub fn control_dim(&self) -> usize {
        self.model.control_dim()
    }

    pub fn step(&self, x: &DVector<f64>, u: &DVector<f64>, h: f64) -> DVector<f64> {
        self.integrator.step(self.model.as_ref(), x, u, h)
    }

    /// `(A, B) = dF/d[x,u]`, shapes `n x n` and `n x m`.
    pub fn jacobian(&self, x: &DVector<f64>, u: &DVector<f64>, h: f64) -> (DMatrix<f64>, DMatrix<f64>) {
        self.integrator.step_jacobian(self.model.as_ref(), x, u, h)
    }
}
