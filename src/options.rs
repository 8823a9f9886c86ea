//! Solver configuration. A single flat struct rather than a config file or
//! env-parsed layer: the core has no I/O boundary (spec.md §6), so every
//! tunable is a plain field with a documented default.

use std::time::Duration;

/// Where Levenberg-Marquardt-style regularization is injected in the
/// backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegularizationMode {
    /// Add `rho * I` to `Quu` only. Default.
    Control,
    /// Add `rho * I` to `Qxx` only.
    State,
    /// Add `rho * I` to both `Qxx` and `Quu`.
    Both,
}

impl Default for RegularizationMode {
    fn default() -> Self {
        RegularizationMode::Control
    }
}

/// Every recognized configuration key of spec.md §6, with the defaults
/// documented in `SPEC_FULL.md` §4.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub max_iterations_outer: usize,
    pub max_iterations_inner: usize,

    pub tol_cost: f64,
    pub tol_grad: f64,
    pub tol_viol: f64,
    /// Initial inner-loop tolerance; shrinks by 10x each outer iteration
    /// down to a floor of `1e-8`.
    pub tol_inner: f64,

    pub rho_init: f64,
    pub rho_min: f64,
    pub rho_max: f64,
    /// `phi`: factor the backward pass scales `rho` by on failure/success.
    pub rho_scale: f64,

    pub penalty_init: f64,
    /// `phi_mu`: factor the AL outer loop scales `mu` by.
    pub penalty_scale: f64,
    pub penalty_max: f64,

    /// `gamma`: the penalty only grows if violation did not shrink by at
    /// least this factor.
    pub violation_decrease_ratio: f64,

    /// `c1`.
    pub linesearch_decrease_low: f64,
    /// `c2`.
    pub linesearch_decrease_high: f64,
    pub linesearch_step_min: f64,
    /// `tau`.
    pub linesearch_contraction: f64,

    pub regularization_mode: RegularizationMode,

    /// Optional wall-clock budget, checked at outer/inner iteration
    /// boundaries alongside the iteration caps.
    pub time_limit: Option<Duration>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations_outer: 30,
            max_iterations_inner: 100,

            tol_cost: 1e-8,
            tol_grad: 1e-8,
            tol_viol: 1e-4,
            tol_inner: 1e-2,

            rho_init: 0.0,
            rho_min: 1e-8,
            rho_max: 1e8,
            rho_scale: 1.6,

            penalty_init: 1.0,
            penalty_scale: 10.0,
            penalty_max: 1e8,

            violation_decrease_ratio: 0.25,

            linesearch_decrease_low: 1e-4,
            linesearch_decrease_high: 10.0,
            linesearch_step_min: 1e-8,
            linesearch_contraction: 0.5,

            regularization_mode: RegularizationMode::Control,

            time_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = SolverOptions::default();
        assert_eq!(opts.linesearch_decrease_low, 1e-4);
        assert_eq!(opts.linesearch_decrease_high, 10.0);
        assert_eq!(opts.linesearch_contraction, 0.5);
        assert_eq!(opts.regularization_mode, RegularizationMode::Control);
    }
}
