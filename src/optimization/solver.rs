//! Newton loop at a single grid resolution.
//!
//! Each iteration evaluates the score with its derivatives, solves the
//! SVD-regularised Newton system for a direction, and picks a step length
//! with the More–Thuente search. A zero or NaN step norm means the clouds do
//! not overlap enough for the Hessian to carry information; the resolution
//! is aborted and the multi-resolution schedule stops.

use nalgebra::{Matrix3, Vector3};
use tracing::warn;

use super::more_thuente::{more_thuente_search, MoreThuenteConfig};
use super::newton::newton_step;
use super::types::{ConvergenceStatus, OptimizationConfig, ResolutionOutcome};
use crate::derivatives::{compute_score, FittingParams};
use crate::voxel_grid::{Voxel, VoxelGrid};

/// Run the Newton loop at one resolution, starting from `guess`.
///
/// `n_source_points` is the raw source cloud size, used to normalise the
/// score into the transformation probability.
pub fn optimize_at_resolution(
    params: &FittingParams,
    source_cells: &[Voxel],
    target_grid: &VoxelGrid,
    guess: Vector3<f64>,
    config: &OptimizationConfig,
    n_source_points: usize,
) -> ResolutionOutcome {
    let mut pose = guess;
    let mut iterations = 0;
    let mut trans_probability;

    let line_search_config = MoreThuenteConfig {
        step_min: config.transformation_epsilon / 2.0,
        step_max: config.step_size,
        ..Default::default()
    };

    let last_score = loop {
        let score = compute_score(params, source_cells, target_grid, &pose, true);

        let delta = newton_step(&score.gradient, &score.hessian);
        let delta_norm = delta.norm();

        if delta_norm == 0.0 || delta_norm.is_nan() {
            trans_probability = score.value / n_source_points as f64;
            warn!(
                probability = trans_probability,
                "not enough overlap between grids"
            );
            return ResolutionOutcome {
                pose,
                status: ConvergenceStatus::InsufficientOverlap,
                trans_probability,
                covariance: Matrix3::identity(),
                information: Matrix3::identity(),
                iterations,
            };
        }

        let mut step_dir = delta / delta_norm;

        // Line search minimises φ(α) = -value(p + α·δ).
        let phi_0 = -score.value;
        let mut d_phi_0 = -score.gradient.dot(&step_dir);

        let step = if d_phi_0 == 0.0 {
            0.0
        } else {
            if d_phi_0 > 0.0 {
                // Not a descent direction: reverse it.
                d_phi_0 = -d_phi_0;
                step_dir = -step_dir;
            }
            let phi = |alpha: f64| {
                let trial = pose + step_dir * alpha;
                let trial_score = compute_score(params, source_cells, target_grid, &trial, false);
                (-trial_score.value, -trial_score.gradient.dot(&step_dir))
            };
            more_thuente_search(phi, phi_0, d_phi_0, delta_norm, &line_search_config)
        };

        pose += step_dir * step;
        iterations += 1;
        trans_probability = score.value / n_source_points as f64;

        if iterations >= config.max_iterations
            || (iterations >= 1 && step.abs() < config.transformation_epsilon)
        {
            break score;
        }
    };

    // The Hessian of the last evaluation doubles as the covariance report;
    // its inverse is the information matrix. The naming follows the
    // reference convention even though the roles read inverted.
    let information = last_score
        .hessian
        .try_inverse()
        .unwrap_or_else(Matrix3::identity);

    ResolutionOutcome {
        pose,
        status: ConvergenceStatus::Converged,
        trans_probability,
        covariance: last_score.hessian,
        information,
        iterations,
    }
}
