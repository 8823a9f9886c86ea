//! A discrete-time trajectory: a horizon of [`KnotPoint`]s sharing common
//! state/control dimensions.

use nalgebra::DVector;

use crate::error::ConfigError;

/// `(x_k, u_k, h_k)`. At `k = N` the control and step are unused by the
/// solver but are still stored (as zero) to keep every knot uniform.
#[derive(Debug, Clone)]
pub struct KnotPoint {
    pub x: DVector<f64>,
    pub u: DVector<f64>,
    pub h: f64,
}

impl KnotPoint {
    pub fn new(x: DVector<f64>, u: DVector<f64>, h: f64) -> Self {
        Self { x, u, h }
    }
}

/// An ordered sequence of `N+1` knot points. Invariant: every knot shares
/// the same state dimension `n` and control dimension `m`; every `h >= 0`.
#[derive(Debug, Clone)]
pub struct Trajectory {
    knots: Vec<KnotPoint>,
    n: usize,
    m: usize,
}

impl Trajectory {
    /// `num_segments` is `N`; the trajectory holds `N+1` knots, all zero.
    pub fn new(n: usize, m: usize, num_segments: usize) -> Self {
        let knots = (0..=num_segments)
            .map(|_| KnotPoint::new(DVector::zeros(n), DVector::zeros(m), 0.0))
            .collect();
        Self { knots, n, m }
    }

    pub fn from_knots(knots: Vec<KnotPoint>) -> Result<Self, ConfigError> {
        let n = knots.first().map(|k| k.x.len()).unwrap_or(0);
        let m = knots.first().map(|k| k.u.len()).unwrap_or(0);
        for (k, knot) in knots.iter().enumerate() {
            if knot.x.len() != n {
                return Err(ConfigError::DimensionMismatch {
                    expected: n,
                    actual: knot.x.len(),
                });
            }
            if knot.u.len() != m {
                return Err(ConfigError::DimensionMismatch {
                    expected: m,
                    actual: knot.u.len(),
                });
            }
            if knot.h < 0.0 {
                return Err(ConfigError::NegativeStep { index: k, h: knot.h });
            }
        }
        Ok(Self { knots, n, m })
    }

    pub fn state_dim(&self) -> usize {
        self.n
    }

    pub fn control_dim(&self) -> usize {
        self.m
    }

    /// Number of dynamics segments `N` (there are `N+1` knots).
    pub fn horizon(&self) -> usize {
        self.knots.len() - 1
    }

    pub fn num_knots(&self) -> usize {
        self.knots.len()
    }

    pub fn knot(&self, k: usize) -> &KnotPoint {
        &self.knots[k]
    }

    pub fn knot_mut(&mut self, k: usize) -> &mut KnotPoint {
        &mut self.knots[k]
    }

    pub fn knots(&self) -> &[KnotPoint] {
        &self.knots
    }

    pub fn set_uniform_step(&mut self, h: f64) {
        for knot in &mut self.knots {
            knot.h = h;
        }
    }

    pub fn state(&self, k: usize) -> &DVector<f64> {
        &self.knots[k].x
    }

    pub fn control(&self, k: usize) -> &DVector<f64> {
        &self.knots[k].u
    }
}
