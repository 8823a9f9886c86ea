//! Tagged-variant cones (Zero / Identity / NegativeOrthant) used to express
//! equality and inequality constraints as `g(x, u) in K`.
//!
//! A compile-time template on cone kind (as in the C++ source this core is
//! descended from) has no Rust equivalent worth the complexity here: the
//! cone tag travels with the constraint *value*, not its type, so a plain
//! enum with a dispatch table is both simpler and matches how `Constraint`
//! needs to be stored in a homogeneous per-knot collection.

use nalgebra::{DMatrix, DVector};

/// One of the three cones the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cone {
    /// `{0}`. Used for equality constraints `c(x,u) = 0`.
    Zero,
    /// All of `R^p`. Dual of [`Cone::Zero`].
    Identity,
    /// `{ v : v <= 0 }`, componentwise. Used for inequalities `c(x,u) <= 0`.
    /// Self-dual.
    NegativeOrthant,
}

impl Cone {
    /// `K*` such that `<x, y> >= 0` for all `x in K, y in K*`.
    pub fn dual(self) -> Cone {
        match self {
            Cone::Zero => Cone::Identity,
            Cone::Identity => Cone::Zero,
            Cone::NegativeOrthant => Cone::NegativeOrthant,
        }
    }

    /// Euclidean projection `Pi_K(v)`.
    pub fn project(self, v: &DVector<f64>) -> DVector<f64> {
        match self {
            Cone::Zero => DVector::zeros(v.len()),
            Cone::Identity => v.clone(),
            Cone::NegativeOrthant => v.map(|vi| vi.min(0.0)),
        }
    }

    /// `d Pi_K(v) / dv`, shape `p x p`. Piecewise-linear on all three
    /// cones, so this is locally exact away from the (measure-zero)
    /// kink set.
    pub fn projection_jacobian(self, v: &DVector<f64>) -> DMatrix<f64> {
        let p = v.len();
        match self {
            Cone::Zero => DMatrix::zeros(p, p),
            Cone::Identity => DMatrix::identity(p, p),
            Cone::NegativeOrthant => {
                DMatrix::from_diagonal(&v.map(|vi| if vi <= 0.0 { 1.0 } else { 0.0 }))
            }
        }
    }

    /// `sum_i b_i * d2 Pi_K(v)_i / dv^2`. Zero for all three cones since
    /// each is piecewise linear.
    pub fn projection_hessian(self, v: &DVector<f64>, _b: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::zeros(v.len(), v.len())
    }
}
