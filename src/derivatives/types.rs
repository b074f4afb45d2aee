//! Type definitions for the D2D-NDT score function.

use std::ops::{Add, AddAssign};

use nalgebra::{Matrix3, SMatrix, Vector3};

use crate::error::RegistrationError;

/// 9×3 matrix type for the second derivative of the transformed mean.
pub type Matrix9x3 = SMatrix<f64, 9, 3>;
/// 3×9 matrix type for the first derivative of the transformed covariance.
pub type Matrix3x9 = SMatrix<f64, 3, 9>;
/// 9×9 matrix type for the second derivative of the transformed covariance.
pub type Matrix9x9 = SMatrix<f64, 9, 9>;

/// Normalisation constants of the Gaussian-plus-uniform mixture likelihood.
///
/// One set per resolution, derived from the outlier ratio and the cell side
/// length (resolution ρ = 1 / cell_size):
///
/// - c1 = 10·(1 − r), c2 = r / ρ², d3 = −ln c2
/// - d1 = −ln(c1 + c2) − d3
/// - d2 = −2·ln([−ln(c1·e^{−1/2} + c2) − d3] / d1)
///
/// d1 comes out negative (it equals ln(c2 / (c1 + c2))), so the per-pair
/// score −d1·exp(·) is positive and the optimiser maximises it.
#[derive(Debug, Clone, Copy)]
pub struct FittingParams {
    pub d1: f64,
    pub d2: f64,
    pub d2_half: f64,
}

impl FittingParams {
    /// Derive the constants for one resolution.
    ///
    /// Fails with `InvalidParameter` when the outlier ratio leaves (0, 1) or
    /// the cell size is not positive.
    pub fn new(outlier_ratio: f64, cell_size: f64) -> Result<Self, RegistrationError> {
        if !(outlier_ratio > 0.0 && outlier_ratio < 1.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "outlier ratio must lie in (0, 1), got {outlier_ratio}"
            )));
        }
        if !(cell_size > 0.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }

        let resolution = 1.0 / cell_size;
        let c1 = 10.0 * (1.0 - outlier_ratio);
        let c2 = outlier_ratio / (resolution * resolution);
        let d3 = -c2.ln();
        let d1 = -(c1 + c2).ln() - d3;
        let d2 = -2.0 * ((-(c1 * (-0.5_f64).exp() + c2).ln() - d3) / d1).ln();

        Ok(Self {
            d1,
            d2,
            d2_half: d2 / 2.0,
        })
    }
}

/// Score value with its first and second derivatives, so all three can be
/// returned and accumulated together.
#[derive(Debug, Clone, Copy)]
pub struct ScoreAndDerivatives {
    pub value: f64,
    pub gradient: Vector3<f64>,
    pub hessian: Matrix3<f64>,
}

impl ScoreAndDerivatives {
    /// The additive identity.
    pub fn zeros() -> Self {
        Self {
            value: 0.0,
            gradient: Vector3::zeros(),
            hessian: Matrix3::zeros(),
        }
    }
}

impl AddAssign for ScoreAndDerivatives {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
        self.gradient += rhs.gradient;
        self.hessian += rhs.hessian;
    }
}

impl Add for ScoreAndDerivatives {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

/// Analytic derivatives of one transformed source cell with respect to the
/// pose (x, y, θ).
///
/// - `jest`: ∂μ/∂p
/// - `hest`: ∂²μ/∂p², stacked as three 3×3 blocks by pose coordinate
/// - `zest`: ∂Σ/∂p, three 3×3 blocks side by side
/// - `zhest`: mixed second-order covariance terms, 3×3 blocks
///
/// Only the θ slice carries non-trivial entries; translations have constant
/// first derivatives and vanishing second derivatives.
#[derive(Debug, Clone)]
pub struct JacobianHessianDerivatives {
    pub jest: Matrix3<f64>,
    pub hest: Matrix9x3,
    pub zest: Matrix3x9,
    pub zhest: Matrix9x9,
}

impl JacobianHessianDerivatives {
    pub fn zeros() -> Self {
        Self {
            jest: Matrix3::zeros(),
            hest: Matrix9x3::zeros(),
            zest: Matrix3x9::zeros(),
            zhest: Matrix9x9::zeros(),
        }
    }
}
