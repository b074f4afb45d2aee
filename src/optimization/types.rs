//! Type definitions for the Newton optimisation loop.

use nalgebra::{Matrix3, Vector3};

/// Knobs of the per-resolution Newton loop.
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// Maximum step length accepted by the line search.
    pub step_size: f64,

    /// Iteration cap per resolution.
    pub max_iterations: usize,

    /// Convergence threshold on the accepted step length. Half of it also
    /// serves as the line search's minimum step.
    pub transformation_epsilon: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            max_iterations: 35,
            transformation_epsilon: 0.1,
        }
    }
}

/// How a registration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The optimiser converged (step below threshold or iteration cap).
    Converged,

    /// A Newton step degenerated to zero or NaN: the clouds do not overlap
    /// enough at this resolution. Aborts the multi-resolution schedule.
    InsufficientOverlap,

    /// The robust wrapper exhausted its stages without an acceptable
    /// candidate.
    NoAlignment,
}

impl ConvergenceStatus {
    /// Whether the run produced a usable transformation.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceStatus::Converged)
    }
}

/// Result of running the Newton loop at a single resolution.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// Pose after the last accepted step.
    pub pose: Vector3<f64>,

    /// Converged, or InsufficientOverlap when the step degenerated.
    pub status: ConvergenceStatus,

    /// Score value divided by the source point count.
    pub trans_probability: f64,

    /// Score Hessian at the last evaluation. The field name follows the
    /// reference convention: this is the Hessian itself, not its inverse.
    pub covariance: Matrix3<f64>,

    /// Inverse of `covariance` (identity when singular).
    pub information: Matrix3<f64>,

    /// Iterations spent at this resolution.
    pub iterations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OptimizationConfig::default();
        assert_eq!(config.step_size, 0.1);
        assert_eq!(config.max_iterations, 35);
        assert_eq!(config.transformation_epsilon, 0.1);
    }

    #[test]
    fn test_convergence_status() {
        assert!(ConvergenceStatus::Converged.is_converged());
        assert!(!ConvergenceStatus::InsufficientOverlap.is_converged());
        assert!(!ConvergenceStatus::NoAlignment.is_converged());
    }
}
