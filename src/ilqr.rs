//! Iterative LQR: forward rollout, backward Riccati sweep with
//! regularization, line search, convergence detection.

use std::rc::Rc;
use std::time::Instant;

use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::options::{RegularizationMode, SolverOptions};
use crate::problem::Problem;
use crate::trajectory::{KnotPoint, Trajectory};

/// Why `solve()` returned. `Converged` and `MaxIterations` both leave the
/// best trajectory seen in place; the numerical failure variants do too,
/// since the solver never partially mutates external state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Converged,
    MaxIterations,
    BackwardPassRegFailure,
    LineSearchFailure,
    CostIncrease,
    StateNotFinite,
    UserAborted,
}

struct Gains {
    k: DMatrix<f64>,
    d: DVector<f64>,
}

enum Rollout {
    Ok { knots: Vec<KnotPoint>, cost: f64 },
    Diverged,
}

/// Owns the nominal trajectory being optimized and the per-knot workspace
/// (cost/dynamics expansions, backward-pass gains) needed to produce the
/// next candidate.
pub struct Ilqr {
    problem: Rc<Problem>,
    z: Trajectory,
    gains: Vec<Gains>,
    rho: f64,
    opts: SolverOptions,
    abort: Option<Box<dyn FnMut() -> bool>>,
    start_time: Option<Instant>,
}

impl Ilqr {
    pub fn new(problem: Rc<Problem>) -> Result<Self, ConfigError> {
        problem.require_fully_defined()?;
        let n = problem.state_dim();
        let m = problem.control_dim();
        let horizon = problem.horizon();
        let z = Trajectory::new(n, m, horizon);
        let gains = (0..horizon)
            .map(|_| Gains {
                k: DMatrix::zeros(m, n),
                d: DVector::zeros(m),
            })
            .collect();
        Ok(Self {
            problem,
            z,
            gains,
            rho: 0.0,
            opts: SolverOptions::default(),
            abort: None,
            start_time: None,
        })
    }

    pub fn set_trajectory(&mut self, z: Trajectory) {
        self.z = z;
    }

    pub fn set_options(&mut self, opts: SolverOptions) {
        self.opts = opts;
    }

    pub fn options(&self) -> &SolverOptions {
        &self.opts
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.z
    }

    /// Registers a cooperative cancellation check, invoked at each inner
    /// iteration boundary; when it returns `true` the next `solve()` call
    /// returns `UserAborted` with the best trajectory seen so far intact.
    pub fn set_abort_check(&mut self, f: impl FnMut() -> bool + 'static) {
        self.abort = Some(Box::new(f));
    }

    fn should_abort(&mut self) -> bool {
        if let Some(check) = self.abort.as_mut() {
            if check() {
                return true;
            }
        }
        if let (Some(start), Some(limit)) = (self.start_time, self.opts.time_limit) {
            if start.elapsed() >= limit {
                return true;
            }
        }
        false
    }

    fn terminal_control(&self) -> DVector<f64> {
        DVector::zeros(self.problem.control_dim())
    }

    fn trajectory_cost(&self, knots: &[KnotPoint]) -> f64 {
        let horizon = self.problem.horizon();
        let mut cost = 0.0;
        for k in 0..horizon {
            cost += self.problem.cost(k).unwrap().evaluate(&knots[k].x, &knots[k].u);
        }
        let terminal = self.terminal_control();
        cost += self
            .problem
            .cost(horizon)
            .unwrap()
            .evaluate(&knots[horizon].x, &terminal);
        cost
    }

    /// Propagates `x0` through the stored nominal controls (ignoring
    /// whatever states the caller's initial guess carried), producing a
    /// dynamically consistent trajectory before the first backward pass.
    fn make_consistent(&mut self) -> Rollout {
        let horizon = self.problem.horizon();
        let mut knots = Vec::with_capacity(horizon + 1);
        let mut x = self.problem.initial_state().clone();
        for k in 0..horizon {
            let h = self.z.knot(k).h;
            let u = self.z.control(k).clone();
            knots.push(KnotPoint::new(x.clone(), u.clone(), h));
            let dynamics = self.problem.dynamics(k).unwrap();
            x = dynamics.step(&x, &u, h);
            if !x.iter().all(|v| v.is_finite()) {
                return Rollout::Diverged;
            }
        }
        knots.push(KnotPoint::new(x, self.terminal_control(), 0.0));
        let cost = self.trajectory_cost(&knots);
        Rollout::Ok { knots, cost }
    }

    /// Rolls out `u_k = ubar_k + alpha*d_k + K_k*(x_k - xbar_k)` against the
    /// nominal trajectory stored in `self.z`, using the gains computed by
    /// the most recent backward pass.
    fn rollout(&self, alpha: f64) -> Rollout {
        let horizon = self.problem.horizon();
        let mut knots = Vec::with_capacity(horizon + 1);
        let mut x = self.problem.initial_state().clone();
        for k in 0..horizon {
            let xbar = self.z.state(k);
            let ubar = self.z.control(k);
            let h = self.z.knot(k).h;
            let gain = &self.gains[k];
            let u = ubar + alpha * &gain.d + &gain.k * (&x - xbar);
            if !u.iter().all(|v| v.is_finite()) {
                return Rollout::Diverged;
            }
            knots.push(KnotPoint::new(x.clone(), u.clone(), h));
            let dynamics = self.problem.dynamics(k).unwrap();
            x = dynamics.step(&x, &u, h);
            if !x.iter().all(|v| v.is_finite()) {
                return Rollout::Diverged;
            }
        }
        knots.push(KnotPoint::new(x, self.terminal_control(), 0.0));
        let cost = self.trajectory_cost(&knots);
        Rollout::Ok { knots, cost }
    }

    /// One backward Riccati sweep at the current regularization `rho`.
    /// Returns `(dV1, dV2)` on success, `None` if `Quu` (or `Qxx`, under
    /// state/both regularization) failed to factor as positive definite.
    fn backward_pass_once(&mut self) -> Option<(f64, f64)> {
        let horizon = self.problem.horizon();
        let n = self.problem.state_dim();
        let m = self.problem.control_dim();

        let terminal_cost = self.problem.cost(horizon).unwrap();
        let x_n = self.z.state(horizon);
        let u_zero = self.terminal_control();
        let (mut p_vec, _) = terminal_cost.gradient(x_n, &u_zero);
        let (mut p_mat, _, _) = terminal_cost.hessian(x_n, &u_zero);

        let mut dv1 = 0.0;
        let mut dv2 = 0.0;
        let identity_n = DMatrix::<f64>::identity(n, n);
        let identity_m = DMatrix::<f64>::identity(m, m);

        for k in (0..horizon).rev() {
            let x = self.z.state(k);
            let u = self.z.control(k);
            let h = self.z.knot(k).h;

            let cost = self.problem.cost(k).unwrap();
            let (qx, qu) = cost.gradient(x, u);
            let (qxx, quu, qxu) = cost.hessian(x, u);

            let dynamics = self.problem.dynamics(k).unwrap();
            let (a, b) = dynamics.jacobian(x, u, h);

            let q_x = qx + a.transpose() * &p_vec;
            let q_u = qu + b.transpose() * &p_vec;
            let mut q_xx = qxx + a.transpose() * &p_mat * &a;
            let mut q_uu = quu + b.transpose() * &p_mat * &b;
            let q_ux = qxu.transpose() + b.transpose() * &p_mat * &a;

            match self.opts.regularization_mode {
                RegularizationMode::Control => q_uu += &identity_m * self.rho,
                RegularizationMode::State => q_xx += &identity_n * self.rho,
                RegularizationMode::Both => {
                    q_uu += &identity_m * self.rho;
                    q_xx += &identity_n * self.rho;
                }
            }

            let chol = Cholesky::new(q_uu.clone())?;
            let q_uu_inv = chol.inverse();

            let d = -&q_uu_inv * &q_u;
            let k_gain = -&q_uu_inv * &q_ux;

            let p_vec_next = &q_x + k_gain.transpose() * &q_uu * &d + k_gain.transpose() * &q_u + q_ux.transpose() * &d;
            let p_mat_next = &q_xx
                + k_gain.transpose() * &q_uu * &k_gain
                + k_gain.transpose() * &q_ux
                + q_ux.transpose() * &k_gain;

            dv1 += d.dot(&q_u);
            dv2 += 0.5 * (d.transpose() * &q_uu * &d)[(0, 0)];

            self.gains[k].k = k_gain;
            self.gains[k].d = d;
            p_vec = p_vec_next;
            p_mat = p_mat_next;
        }

        Some((dv1, dv2))
    }

    /// Retries [`Self::backward_pass_once`] with `rho` raised on failure,
    /// per spec's "increase rho by factor phi, restart from terminal"
    /// policy, until it succeeds or `rho` saturates at `rho_max`.
    fn backward_pass(&mut self) -> Result<(f64, f64), ExitStatus> {
        loop {
            if let Some(result) = self.backward_pass_once() {
                self.rho = (self.rho / self.opts.rho_scale).max(self.opts.rho_min);
                if self.rho < self.opts.rho_min {
                    self.rho = 0.0;
                }
                return Ok(result);
            }
            if self.rho >= self.opts.rho_max {
                warn!(rho = self.rho, "backward pass regularization saturated");
                return Err(ExitStatus::BackwardPassRegFailure);
            }
            self.rho = if self.rho <= 0.0 {
                self.opts.rho_min.max(1e-6)
            } else {
                (self.rho * self.opts.rho_scale).min(self.opts.rho_max)
            };
            debug!(rho = self.rho, "Quu not positive definite, raising regularization");
        }
    }

    /// Backtracking line search over `alpha in (0, 1]`. Accepts the first
    /// step whose actual-to-expected improvement ratio lands in
    /// `[c1, c2]` and whose cost strictly decreases.
    fn line_search(&mut self, current_cost: f64, dv1: f64, dv2: f64) -> Result<(Vec<KnotPoint>, f64), ExitStatus> {
        let mut alpha = 1.0;
        loop {
            match self.rollout(alpha) {
                Rollout::Ok { knots, cost } => {
                    let expected = alpha * dv1 + alpha * alpha * dv2;
                    let actual = cost - current_cost;
                    let accept = if expected.abs() < 1e-16 {
                        actual <= 0.0
                    } else {
                        let ratio = actual / expected;
                        cost < current_cost
                            && ratio >= self.opts.linesearch_decrease_low
                            && ratio <= self.opts.linesearch_decrease_high
                    };
                    if accept {
                        return Ok((knots, cost));
                    }
                }
                Rollout::Diverged => {}
            }
            alpha *= self.opts.linesearch_contraction;
            if alpha < self.opts.linesearch_step_min {
                return Err(ExitStatus::LineSearchFailure);
            }
        }
    }

    fn gradient_norm(&self) -> f64 {
        let horizon = self.problem.horizon();
        let mut d_inf = 0.0_f64;
        let mut u_inf = 0.0_f64;
        for k in 0..horizon {
            d_inf = d_inf.max(self.gains[k].d.amax());
            u_inf = u_inf.max(self.z.control(k).amax());
        }
        d_inf / (1.0 + u_inf)
    }

    /// Runs forward/backward/line-search iterations until convergence, an
    /// iteration cap, or a numerical/cancellation failure.
    pub fn solve(&mut self) -> ExitStatus {
        let _span = tracing::info_span!("ilqr_solve").entered();
        self.start_time = Some(Instant::now());
        self.rho = self.opts.rho_init;

        let mut current_cost = match self.make_consistent() {
            Rollout::Ok { knots, cost } => {
                self.z = Trajectory::from_knots(knots).expect("knots share dimensions by construction");
                cost
            }
            Rollout::Diverged => return ExitStatus::StateNotFinite,
        };

        for iter in 0..self.opts.max_iterations_inner {
            if self.should_abort() {
                return ExitStatus::UserAborted;
            }

            let (dv1, dv2) = match self.backward_pass() {
                Ok(v) => v,
                Err(status) => return status,
            };

            let (knots, new_cost) = match self.line_search(current_cost, dv1, dv2) {
                Ok(v) => v,
                Err(status) => return status,
            };

            if new_cost > current_cost + 1e-12 {
                warn!(iter, new_cost, current_cost, "cost increased after line search");
                return ExitStatus::CostIncrease;
            }

            let dcost = current_cost - new_cost;
            self.z = Trajectory::from_knots(knots).expect("knots share dimensions by construction");
            let grad_norm = self.gradient_norm();
            debug!(iter, dcost, grad_norm, rho = self.rho, "ilqr iteration");

            current_cost = new_cost;
            if dcost.abs() < self.opts.tol_cost && grad_norm < self.opts.tol_grad {
                return ExitStatus::Converged;
            }
        }
        ExitStatus::MaxIterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::LqrCost;
    use crate::dynamics::{DiscretizedModel, DynamicsModel};
    use crate::problem::Problem;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    struct LinearSystem {
        a: DMatrix<f64>,
        b: DMatrix<f64>,
    }

    impl DynamicsModel for LinearSystem {
        fn state_dim(&self) -> usize {
            self.a.nrows()
        }
        fn control_dim(&self) -> usize {
            self.b.ncols()
        }
        fn f(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
            &self.a * x + &self.b * u
        }
        fn jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
            (self.a.clone(), self.b.clone())
        }
    }

    fn unconstrained_lqr_problem(n: usize, horizon: usize) -> Problem {
        let a = DMatrix::identity(n, n);
        let b = DMatrix::identity(n, n);
        let model = Rc::new(DiscretizedModel::new(Rc::new(LinearSystem { a, b })));

        let q = DMatrix::identity(n, n) * 2.0;
        let r = DMatrix::identity(n, n) * 0.5;
        let h = DMatrix::zeros(n, n);
        let q_vec = DVector::from_element(n, -1.0);
        let r_vec = DVector::zeros(n);

        let mut problem = Problem::new(n, n, horizon);
        problem.set_initial_state(DVector::zeros(n)).unwrap();
        for k in 0..horizon {
            problem.set_dynamics(model.clone(), k).unwrap();
            problem
                .set_cost_function(
                    Rc::new(LqrCost::stage(q.clone(), r.clone(), h.clone(), q_vec.clone(), r_vec.clone(), 0.0)),
                    k,
                )
                .unwrap();
        }
        problem
            .set_cost_function(Rc::new(LqrCost::terminal(q.clone(), q_vec.clone(), 0.0, n)), horizon)
            .unwrap();
        problem
    }

    #[test]
    fn converges_on_unconstrained_lqr_in_few_iterations() {
        let n = 6;
        let horizon = 10;
        let problem = Rc::new(unconstrained_lqr_problem(n, horizon));
        let mut solver = Ilqr::new(problem).unwrap();
        solver.set_trajectory(Trajectory::new(n, n, horizon));

        let status = solver.solve();
        assert_eq!(status, ExitStatus::Converged);
        assert!(solver.gradient_norm() < 1e-8);
    }

    #[test]
    fn quadratic_step_time_integrator_tracks_goal() {
        // triple integrator in 1 dof: x = (p, v, a), u = jerk, discrete
        // matrices applied directly (an `Identity` integrator) so the test
        // exercises the solver rather than RK4's approximation of a
        // deliberately simple, already-discrete system.
        let h = 0.1;
        let horizon = 10;
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, h, 0.5 * h * h, 0.0, 1.0, h, 0.0, 0.0, 1.0],
        );
        let b = DMatrix::from_row_slice(3, 1, &[h.powi(3) / 6.0, 0.5 * h * h, h]);

        struct DirectStep {
            a: DMatrix<f64>,
            b: DMatrix<f64>,
        }
        impl DynamicsModel for DirectStep {
            fn state_dim(&self) -> usize {
                3
            }
            fn control_dim(&self) -> usize {
                1
            }
            fn f(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
                &self.a * x + &self.b * u
            }
            fn jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
                (self.a.clone(), self.b.clone())
            }
        }

        struct Identity;
        impl crate::dynamics::Integrator for Identity {
            fn step(&self, model: &dyn DynamicsModel, x: &DVector<f64>, u: &DVector<f64>, _h: f64) -> DVector<f64> {
                model.f(x, u)
            }
            fn step_jacobian(
                &self,
                model: &dyn DynamicsModel,
                x: &DVector<f64>,
                u: &DVector<f64>,
                _h: f64,
            ) -> (DMatrix<f64>, DMatrix<f64>) {
                model.jacobian(x, u)
            }
        }

        let model = Rc::new(DiscretizedModel::with_integrator(
            Rc::new(DirectStep { a, b }),
            Rc::new(Identity),
        ));

        let n = 3;
        let xf = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let q = DMatrix::identity(n, n) * 0.0;
        let r = DMatrix::identity(1, 1) * 0.01;
        let hh = DMatrix::zeros(n, 1);
        let q_vec = DVector::zeros(n);
        let r_vec = DVector::zeros(1);
        let qf = DMatrix::identity(n, n) * 100.0;
        let qf_vec = -&qf * &xf;

        let mut problem = Problem::new(n, 1, horizon);
        problem.set_initial_state(DVector::from_vec(vec![-1.0, 0.0, 0.0])).unwrap();
        for k in 0..horizon {
            problem.set_dynamics(model.clone(), k).unwrap();
            problem
                .set_cost_function(
                    Rc::new(LqrCost::stage(q.clone(), r.clone(), hh.clone(), q_vec.clone(), r_vec.clone(), 0.0)),
                    k,
                )
                .unwrap();
        }
        problem
            .set_cost_function(Rc::new(LqrCost::terminal(qf, qf_vec, 0.0, 1)), horizon)
            .unwrap();

        let mut solver = Ilqr::new(Rc::new(problem)).unwrap();
        let mut init = Trajectory::new(n, 1, horizon);
        init.set_uniform_step(1.0);
        solver.set_trajectory(init);

        let status = solver.solve();
        assert!(matches!(status, ExitStatus::Converged | ExitStatus::MaxIterations));
        let final_state = solver.trajectory().state(horizon).clone();
        assert_abs_diff_eq!(final_state[0], 1.0, epsilon = 5e-2);
    }
}
