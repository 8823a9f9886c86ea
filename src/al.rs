//! Augmented Lagrangian outer loop: wraps a [`Problem`] whose constraints
//! are transformed into penalty + multiplier cost terms, without mutating
//! the original problem.
//!
//! Multiplier/penalty state lives in an `Rc<RefCell<DualState>>` per
//! constraint, shared between the [`AlSolver`] (which updates it between
//! outer iterations) and the [`AlCost`] the wrapped problem's inner iLQR
//! solve reads from — there is exactly one copy of the state, not two
//! copies kept in sync, matching spec.md §9's "multiplier/penalty state is
//! stored in the AL wrapper, not in the constraints themselves".

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::cones::Cone;
use crate::constraint::Constraint;
use crate::cost::CostFunction;
use crate::error::ConfigError;
use crate::ilqr::{ExitStatus, Ilqr};
use crate::options::SolverOptions;
use crate::problem::Problem;
use crate::trajectory::Trajectory;

/// Multiplier `lambda` and penalty `mu` for one constraint, both sized to
/// the constraint's output dimension (ALTRO-style per-component penalty).
struct DualState {
    lambda: DVector<f64>,
    mu: DVector<f64>,
}

impl DualState {
    fn new(dim: usize, penalty_init: f64) -> Self {
        Self {
            lambda: DVector::zeros(dim),
            mu: DVector::from_element(dim, penalty_init),
        }
    }
}

/// Decorates an inner cost with the AL penalty/multiplier term for every
/// constraint registered at its knot:
///
/// `l(x,u) + sum_i [ lambda_i' Pi_{K_i*}(c_i + lambda_i/mu_i) + mu_i/2 ||Pi_{K_i*}(c_i + lambda_i/mu_i) - lambda_i/mu_i||^2 ]`
///
/// which for the two cones this core supports reduces to the plain
/// quadratic penalty (equality, `K* = Identity`) or the active-set
/// positive-part penalty (inequality, `K* = NegativeOrthant`, self-dual).
struct AlCost {
    inner: Rc<dyn CostFunction>,
    constraints: Vec<Constraint>,
    duals: Vec<Rc<RefCell<DualState>>>,
}

/// `(active weight, active flag)` for each output component of one
/// constraint: the multiplier-weighted active set spec.md §4.5 describes,
/// shared by `evaluate`/`gradient`/`hessian` so the three stay consistent.
fn active_weight(cone: Cone, c: &DVector<f64>, dual: &DualState) -> DVector<f64> {
    match cone {
        Cone::Zero => DVector::from_iterator(
            c.len(),
            c.iter().zip(dual.lambda.iter()).zip(dual.mu.iter()).map(|((ci, li), mi)| li + mi * ci),
        ),
        Cone::NegativeOrthant => DVector::from_iterator(
            c.len(),
            c.iter().zip(dual.lambda.iter()).zip(dual.mu.iter()).map(|((ci, li), mi)| {
                if ci + li / mi > 0.0 {
                    li + mi * ci
                } else {
                    0.0
                }
            }),
        ),
        Cone::Identity => DVector::zeros(c.len()),
    }
}

impl CostFunction for AlCost {
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> f64 {
        let mut total = self.inner.evaluate(x, u);
        for (con, dual) in self.constraints.iter().zip(self.duals.iter()) {
            let dual = dual.borrow();
            let c = con.evaluate(x, u);
            match con.cone() {
                Cone::Zero => {
                    total += dual.lambda.dot(&c) + 0.5 * dual.mu.component_mul(&c).dot(&c);
                }
                Cone::NegativeOrthant => {
                    let active: DVector<f64> = DVector::from_iterator(
                        c.len(),
                        c.iter().zip(dual.lambda.iter()).zip(dual.mu.iter()).map(|((ci, li), mi)| {
                            if ci + li / mi > 0.0 {
                                *ci
                            } else {
                                0.0
                            }
                        }),
                    );
                    total += dual.lambda.dot(&active) + 0.5 * dual.mu.component_mul(&active).dot(&active);
                }
                Cone::Identity => {}
            }
        }
        total
    }

    fn gradient(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let (mut gx, mut gu) = self.inner.gradient(x, u);
        let n = x.len();
        for (con, dual) in self.constraints.iter().zip(self.duals.iter()) {
            let dual = dual.borrow();
            let c = con.evaluate(x, u);
            let jac = con.jacobian(x, u);
            let weight = active_weight(con.cone(), &c, &dual);
            let grad_full = jac.transpose() * &weight;
            gx += grad_full.rows(0, n).into_owned();
            gu += grad_full.rows(n, grad_full.len() - n).into_owned();
        }
        (gx, gu)
    }

    /// Gauss-Newton approximation `J' diag(weight') J`, dropping the
    /// curvature of the constraint map and of the (piecewise-linear,
    /// a.e. zero-curvature) active-set indicator.
    fn hessian(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let (mut hxx, mut huu, mut hxu) = self.inner.hessian(x, u);
        let n = x.len();
        let m = u.len();
        for (con, dual) in self.constraints.iter().zip(self.duals.iter()) {
            let dual = dual.borrow();
            let c = con.evaluate(x, u);
            let jac = con.jacobian(x, u);

            let active_mu: DVector<f64> = match con.cone() {
                Cone::Zero => dual.mu.clone(),
                Cone::NegativeOrthant => DVector::from_iterator(
                    c.len(),
                    c.iter().zip(dual.lambda.iter()).zip(dual.mu.iter()).map(|((ci, li), mi)| {
                        if ci + li / mi > 0.0 {
                            *mi
                        } else {
                            0.0
                        }
                    }),
                ),
                Cone::Identity => DVector::zeros(c.len()),
            };

            let weighted = DMatrix::from_fn(jac.nrows(), jac.ncols(), |r, col| jac[(r, col)] * active_mu[r]);
            let block = jac.transpose() * weighted;
            hxx += block.view((0, 0), (n, n)).into_owned();
            huu += block.view((n, n), (m, m)).into_owned();
            hxu += block.view((0, n), (n, m)).into_owned();
        }
        (hxx, huu, hxu)
    }

    fn is_quadratic(&self) -> bool {
        false
    }

    fn is_terminal(&self) -> bool {
        self.inner.is_terminal()
    }
}

/// Wraps an original [`Problem`] with an equivalent unconstrained problem
/// whose costs carry AL penalty terms, and runs the dual-ascent/
/// penalty-growth outer loop around an inner [`Ilqr`] solve.
pub struct AlSolver {
    original: Rc<Problem>,
    duals: Vec<Vec<Rc<RefCell<DualState>>>>,
    inner: Ilqr,
    opts: SolverOptions,
}

impl AlSolver {
    pub fn new(problem: Rc<Problem>) -> Result<Self, ConfigError> {
        problem.require_fully_defined()?;
        let opts = SolverOptions::default();
        let (wrapped, duals) = Self::build_wrapped(&problem, &opts);
        let inner = Ilqr::new(wrapped)?;
        Ok(Self {
            original: problem,
            duals,
            inner,
            opts,
        })
    }

    fn build_wrapped(problem: &Rc<Problem>, opts: &SolverOptions) -> (Rc<Problem>, Vec<Vec<Rc<RefCell<DualState>>>>) {
        let n = problem.state_dim();
        let m = problem.control_dim();
        let horizon = problem.horizon();
        let mut wrapped = Problem::new(n, m, horizon);
        wrapped.set_initial_state(problem.initial_state().clone()).unwrap();

        let mut all_duals = Vec::with_capacity(horizon + 1);
        for k in 0..=horizon {
            if k < horizon {
                wrapped.set_dynamics(problem.dynamics(k).unwrap().clone(), k).unwrap();
            }
            let constraints = problem.constraints(k).to_vec();
            let duals: Vec<Rc<RefCell<DualState>>> = constraints
                .iter()
                .map(|c| Rc::new(RefCell::new(DualState::new(c.output_dim(), opts.penalty_init))))
                .collect();
            let al_cost = AlCost {
                inner: problem.cost(k).unwrap().clone(),
                constraints,
                duals: duals.clone(),
            };
            wrapped.set_cost_function(Rc::new(al_cost), k).unwrap();
            all_duals.push(duals);
        }
        (Rc::new(wrapped), all_duals)
    }

    pub fn set_trajectory(&mut self, z: Trajectory) {
        self.inner.set_trajectory(z);
    }

    pub fn set_options(&mut self, opts: SolverOptions) {
        self.opts = opts.clone();
        self.inner.set_options(opts);
    }

    pub fn trajectory(&self) -> &Trajectory {
        self.inner.trajectory()
    }

    pub fn set_abort_check(&mut self, f: impl FnMut() -> bool + 'static) {
        self.inner.set_abort_check(f);
    }

    /// Max over all knots and constraints of the componentwise violation
    /// (`max(0, c_i)` for inequalities, `|c_i|` for equalities).
    pub fn constraint_violation(&self) -> f64 {
        let horizon = self.original.horizon();
        let mut max_violation = 0.0_f64;
        for k in 0..=horizon {
            let x = self.inner.trajectory().state(k);
            let u = self.inner.trajectory().control(k);
            for con in self.original.constraints(k) {
                max_violation = max_violation.max(con.violation(x, u));
            }
        }
        max_violation
    }

    /// Dual ascent `lambda <- Pi(lambda + mu*c)`, and penalty growth
    /// `mu <- min(mu*phi_mu, mu_max)` gated on violation not having
    /// shrunk by at least `gamma`.
    ///
    /// The projection `Pi` is *not* `cone().dual().project()`: that would
    /// project a `NegativeOrthant` multiplier back through `NegativeOrthant`
    /// itself (self-dual, `cones.rs`), driving every violated-inequality
    /// multiplier to `min(0, ...)` and leaving it stuck at zero. The sign
    /// convention this engine uses (spec.md §4.5/§9, `DESIGN.md`'s Open
    /// Question #3) is `c <= 0` feasible with `lambda >= 0`, so inequality
    /// multipliers are projected onto the *non-negative* orthant. Equality
    /// multipliers are unconstrained.
    fn dual_ascent_and_penalty_update(&mut self, prev_violation: f64, new_violation: f64) {
        let horizon = self.original.horizon();
        let decreased_enough = new_violation <= prev_violation * (1.0 - self.opts.violation_decrease_ratio);
        for k in 0..=horizon {
            let x = self.inner.trajectory().state(k).clone();
            let u = self.inner.trajectory().control(k).clone();
            let constraints = self.original.constraints(k);
            for (con, dual) in constraints.iter().zip(self.duals[k].iter()) {
                let mut dual = dual.borrow_mut();
                let c = con.evaluate(&x, &u);
                let raw = &dual.lambda + dual.mu.component_mul(&c);
                dual.lambda = match con.cone() {
                    Cone::NegativeOrthant => raw.map(|v| v.max(0.0)),
                    Cone::Zero | Cone::Identity => raw,
                };
                if !decreased_enough {
                    dual.mu = dual.mu.map(|mu_i| (mu_i * self.opts.penalty_scale).min(self.opts.penalty_max));
                }
            }
        }
    }

    /// Solves the inner iLQR problem to a looser tolerance each outer
    /// iteration (`tol_inner`, shrunk 10x per iteration down to a floor of
    /// `1e-8`), updating duals/penalties until the violation drops below
    /// `tol_viol` or the outer iteration cap is reached.
    pub fn solve(&mut self) -> ExitStatus {
        let _span = tracing::info_span!("al_solve").entered();
        let mut tol_inner = self.opts.tol_inner;
        let mut prev_violation = self.constraint_violation();

        for outer in 0..self.opts.max_iterations_outer {
            let mut inner_opts = self.opts.clone();
            inner_opts.tol_cost = tol_inner;
            inner_opts.tol_grad = tol_inner;
            self.inner.set_options(inner_opts);

            let inner_status = self.inner.solve();
            let violation = self.constraint_violation();
            info!(outer, ?inner_status, violation, tol_inner, "al outer iteration");

            if !matches!(inner_status, ExitStatus::Converged | ExitStatus::MaxIterations) {
                return inner_status;
            }

            if violation < self.opts.tol_viol && inner_status == ExitStatus::Converged {
                return ExitStatus::Converged;
            }

            self.dual_ascent_and_penalty_update(prev_violation, violation);
            prev_violation = violation;
            tol_inner = (tol_inner * 0.1).max(1e-8);
            debug!(outer, tol_inner, "al tolerance shrunk");
        }
        ExitStatus::MaxIterations
    }
}
