//! The problem data model: per-knot dynamics, cost, and constraints, plus
//! the initial state. Built once, then consumed by constructing a solver;
//! never mutated by the solver itself.

use std::rc::Rc;

use nalgebra::DVector;

use crate::constraint::Constraint;
use crate::cost::CostFunction;
use crate::dynamics::DiscretizedModel;
use crate::error::ConfigError;

/// `N` dynamics segments, `N+1` knots of cost/constraints, shared
/// reference-counted handles throughout: the same cost or dynamics object
/// may be registered at many knots.
pub struct Problem {
    n: usize,
    m: usize,
    num_segments: usize,
    x0: DVector<f64>,
    dynamics: Vec<Option<Rc<DiscretizedModel>>>,
    cost: Vec<Option<Rc<dyn CostFunction>>>,
    constraints: Vec<Vec<Constraint>>,
}

impl Problem {
    /// `n`/`m` are the state/control dimension shared by every knot;
    /// `num_segments` is `N`.
    pub fn new(n: usize, m: usize, num_segments: usize) -> Self {
        Self {
            n,
            m,
            num_segments,
            x0: DVector::zeros(n),
            dynamics: vec![None; num_segments],
            cost: vec![None; num_segments + 1],
            constraints: (0..=num_segments).map(|_| Vec::new()).collect(),
        }
    }

    pub fn state_dim(&self) -> usize {
        self.n
    }

    pub fn control_dim(&self) -> usize {
        self.m
    }

    /// `N`, the number of dynamics segments (there are `N+1` knots).
    pub fn horizon(&self) -> usize {
        self.num_segments
    }

    pub fn initial_state(&self) -> &DVector<f64> {
        &self.x0
    }

    pub fn set_initial_state(&mut self, x0: DVector<f64>) -> Result<(), ConfigError> {
        if x0.len() != self.n {
            return Err(ConfigError::DimensionMismatch {
                expected: self.n,
                actual: x0.len(),
            });
        }
        self.x0 = x0;
        Ok(())
    }

    /// `k` must be in `[0, N-1]`; `k = N` is rejected (the terminal knot has
    /// no outgoing dynamics).
    pub fn set_dynamics(&mut self, model: Rc<DiscretizedModel>, k: usize) -> Result<(), ConfigError> {
        if k == self.num_segments {
            return Err(ConfigError::TerminalDynamicsNotAllowed { n: self.num_segments });
        }
        if k > self.num_segments {
            return Err(ConfigError::InvalidKnotIndex {
                index: k,
                max: self.num_segments,
            });
        }
        self.dynamics[k] = Some(model);
        Ok(())
    }

    pub fn dynamics(&self, k: usize) -> Option<&Rc<DiscretizedModel>> {
        self.dynamics.get(k).and_then(|d| d.as_ref())
    }

    /// `k` must be in `[0, N]`.
    pub fn set_cost_function(
        &mut self,
        cost: Rc<dyn CostFunction>,
        k: usize,
    ) -> Result<(), ConfigError> {
        if k > self.num_segments {
            return Err(ConfigError::InvalidKnotIndex {
                index: k,
                max: self.num_segments,
            });
        }
        self.cost[k] = Some(cost);
        Ok(())
    }

    pub fn cost(&self, k: usize) -> Option<&Rc<dyn CostFunction>> {
        self.cost.get(k).and_then(|c| c.as_ref())
    }

    /// `k` must be in `[0, N]`. Null handles are rejected by the caller not
    /// being able to construct an `Rc` to nothing; a zero-output
    /// constraint is accepted, an absent one is simply never added.
    pub fn set_constraint(&mut self, con: Constraint, k: usize) -> Result<(), ConfigError> {
        if k > self.num_segments {
            return Err(ConfigError::InvalidKnotIndex {
                index: k,
                max: self.num_segments,
            });
        }
        self.constraints[k].push(con);
        Ok(())
    }

    pub fn constraints(&self, k: usize) -> &[Constraint] {
        &self.constraints[k]
    }

    /// Sum of constraint output dimensions registered at knot `k`.
    pub fn num_constraints(&self, k: usize) -> usize {
        self.constraints[k].iter().map(Constraint::output_dim).sum()
    }

    /// `x0` has dimension `n`, every `k` in `[0, N-1]` has dynamics and
    /// cost, and `k = N` has cost.
    pub fn is_fully_defined(&self) -> bool {
        if self.x0.len() != self.n {
            return false;
        }
        for k in 0..self.num_segments {
            if self.dynamics[k].is_none() || self.cost[k].is_none() {
                return false;
            }
        }
        self.cost[self.num_segments].is_some()
    }

    pub fn require_fully_defined(&self) -> Result<(), ConfigError> {
        if self.is_fully_defined() {
            return Ok(());
        }
        let mut reasons = Vec::new();
        if self.x0.len() != self.n {
            reasons.push(format!("x0 has dimension {} (expected {})", self.x0.len(), self.n));
        }
        for k in 0..self.num_segments {
            if self.dynamics[k].is_none() {
                reasons.push(format!("dynamics[{k}] is unset"));
            }
            if self.cost[k].is_none() {
                reasons.push(format!("cost[{k}] is unset"));
            }
        }
        if self.cost[self.num_segments].is_none() {
            reasons.push(format!("cost[{}] (terminal) is unset", self.num_segments));
        }
        Err(ConfigError::IncompleteProblem {
            reason: reasons.join("; "),
        })
    }
}
