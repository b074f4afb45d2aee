//! The registration capability surface.
//!
//! Every estimator in this crate (the D2D-NDT optimiser, the correlative
//! seeder, the ICP refiner and the robust wrapper) exposes the same small
//! contract: register a source and a target cloud, then align from a guess.
//! Richer result state (probabilities, covariances, iteration counts) stays
//! on the concrete types.

use anyhow::Result;
use nalgebra::Matrix4;

use crate::error::RegistrationError;
use crate::optimization::ConvergenceStatus;

/// Result of one alignment run.
#[derive(Debug, Clone)]
pub struct AlignOutcome {
    /// How the run ended.
    pub status: ConvergenceStatus,

    /// Whether `final_transformation` is usable.
    pub converged: bool,

    /// Estimated source-to-target transform (identity when the run failed).
    pub final_transformation: Matrix4<f64>,

    /// The source cloud transformed by `final_transformation`.
    pub aligned_cloud: Vec<[f32; 3]>,
}

/// A planar cloud-to-cloud registration estimator.
pub trait Registration2d {
    /// Register the moving cloud. Fails on an empty cloud.
    fn set_input_source(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError>;

    /// Register the fixed cloud. Fails on an empty cloud.
    fn set_input_target(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError>;

    /// Estimate the transform aligning source onto target, starting from
    /// `guess`.
    fn align(&mut self, guess: &Matrix4<f64>) -> Result<AlignOutcome>;
}
