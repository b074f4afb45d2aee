//! Correlative pose seeder.
//!
//! Exhaustive two-pass search over a pose window around the guess, scored
//! against a likelihood lookup table of the target. The coarse pass sweeps
//! the full rotation circle and a translation window; the fine pass refines
//! around the coarse winner. The result is only a seed: it is handed to the
//! D2D optimiser for sub-cell refinement, so the fine steps stay well inside
//! the optimiser's basin of attraction.
//!
//! Rotation candidates pivot about the pose origin, so the seeder expects
//! sensor-centric scans.

use anyhow::Result;
use nalgebra::{Matrix4, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::error::RegistrationError;
use crate::lookup::LookUpTable;
use crate::optimization::ConvergenceStatus;
use crate::registration::{AlignOutcome, Registration2d};
use crate::se2;

/// Brute-force correlative scan matcher over (x, y, θ).
pub struct CorrelativeEstimation {
    source: Option<Vec<[f32; 3]>>,
    target: Option<Vec<[f32; 3]>>,

    cell_size: f32,
    sigma: f32,

    translation_range: f64,
    coarse_translation_step: f64,
    coarse_rotation_step: f64,

    fine_translation_range: f64,
    fine_translation_step: f64,
    fine_rotation_range: f64,
    fine_rotation_step: f64,

    /// Minimum best score for the seed to count as converged.
    score_threshold: f64,

    converged: bool,
    final_transformation: Matrix4<f64>,
    best_score: f64,
}

impl CorrelativeEstimation {
    pub fn new() -> Self {
        Self {
            source: None,
            target: None,
            cell_size: 0.25,
            sigma: 0.5,
            translation_range: 2.0,
            coarse_translation_step: 0.5,
            coarse_rotation_step: std::f64::consts::TAU / 64.0,
            fine_translation_range: 0.25,
            fine_translation_step: 0.05,
            fine_rotation_range: 0.12,
            fine_rotation_step: 0.02,
            score_threshold: 0.3,
            converged: false,
            final_transformation: Matrix4::identity(),
            best_score: 0.0,
        }
    }

    /// Half-width of the translation window swept around the guess.
    pub fn set_translation_range(&mut self, range: f64) {
        self.translation_range = range;
    }

    /// Lookup-table cell size.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size = cell_size;
    }

    /// Minimum best score for the seed to be reported as converged.
    pub fn set_score_threshold(&mut self, threshold: f64) {
        self.score_threshold = threshold;
    }

    /// Best lookup-table score of the last run.
    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn has_converged(&self) -> bool {
        self.converged
    }

    pub fn final_transformation(&self) -> Matrix4<f64> {
        self.final_transformation
    }

    /// Score every candidate pose and return the best (pose, score) pair.
    ///
    /// Candidates are scored in parallel but selected serially in candidate
    /// order, so the winner is deterministic.
    fn best_candidate(
        table: &LookUpTable,
        source: &[[f32; 3]],
        candidates: &[Vector3<f64>],
    ) -> (Vector3<f64>, f64) {
        let scores: Vec<f64> = candidates
            .par_iter()
            .map(|pose| {
                let transformed = se2::transform_cloud(source, &se2::vec_to_mat(pose));
                table.score(&transformed)
            })
            .collect();

        let mut best_idx = 0;
        for (idx, score) in scores.iter().enumerate() {
            if *score > scores[best_idx] {
                best_idx = idx;
            }
        }
        (candidates[best_idx], scores[best_idx])
    }

    fn steps(half_range: f64, step: f64) -> Vec<f64> {
        let n = (half_range / step).floor() as i64;
        (-n..=n).map(|i| i as f64 * step).collect()
    }
}

impl Default for CorrelativeEstimation {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration2d for CorrelativeEstimation {
    fn set_input_source(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError> {
        if cloud.is_empty() {
            return Err(RegistrationError::InvalidParameter(
                "input cloud is empty".into(),
            ));
        }
        self.source = Some(cloud.to_vec());
        Ok(())
    }

    fn set_input_target(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError> {
        if cloud.is_empty() {
            return Err(RegistrationError::InvalidParameter(
                "input cloud is empty".into(),
            ));
        }
        self.target = Some(cloud.to_vec());
        Ok(())
    }

    fn align(&mut self, guess: &Matrix4<f64>) -> Result<AlignOutcome> {
        let source = self
            .source
            .clone()
            .ok_or(RegistrationError::MissingInput("source cloud"))?;
        let target = self
            .target
            .clone()
            .ok_or(RegistrationError::MissingInput("target cloud"))?;

        let table = LookUpTable::new(&target, self.cell_size, self.sigma)?;
        let guess_pose = se2::mat_to_vec(guess);

        // Coarse pass: full rotation sweep, wide translation window.
        let offsets = Self::steps(self.translation_range, self.coarse_translation_step);
        let half_turns = (std::f64::consts::PI / self.coarse_rotation_step).floor() as i64;
        let mut candidates =
            Vec::with_capacity(offsets.len() * offsets.len() * (2 * half_turns) as usize);
        for dtheta in (-half_turns..half_turns).map(|i| i as f64 * self.coarse_rotation_step) {
            for dy in &offsets {
                for dx in &offsets {
                    candidates.push(guess_pose + Vector3::new(*dx, *dy, dtheta));
                }
            }
        }
        let (coarse_pose, coarse_score) = Self::best_candidate(&table, &source, &candidates);
        debug!(
            score = coarse_score,
            x = coarse_pose.x,
            y = coarse_pose.y,
            theta = coarse_pose.z,
            "coarse correlative pass"
        );

        // Fine pass around the coarse winner.
        let fine_offsets = Self::steps(self.fine_translation_range, self.fine_translation_step);
        let fine_rotations = Self::steps(self.fine_rotation_range, self.fine_rotation_step);
        let mut fine_candidates =
            Vec::with_capacity(fine_offsets.len() * fine_offsets.len() * fine_rotations.len());
        for dtheta in &fine_rotations {
            for dy in &fine_offsets {
                for dx in &fine_offsets {
                    fine_candidates.push(coarse_pose + Vector3::new(*dx, *dy, *dtheta));
                }
            }
        }
        let (best_pose, best_score) = Self::best_candidate(&table, &source, &fine_candidates);
        debug!(
            score = best_score,
            x = best_pose.x,
            y = best_pose.y,
            theta = best_pose.z,
            "fine correlative pass"
        );

        self.best_score = best_score;
        self.converged = best_score > self.score_threshold;
        self.final_transformation = if self.converged {
            se2::vec_to_mat(&best_pose)
        } else {
            Matrix4::identity()
        };

        let status = if self.converged {
            ConvergenceStatus::Converged
        } else {
            ConvergenceStatus::NoAlignment
        };

        Ok(AlignOutcome {
            status,
            converged: self.converged,
            final_transformation: self.final_transformation,
            aligned_cloud: se2::transform_cloud(&source, &self.final_transformation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_room_scan;

    #[test]
    fn test_recovers_large_rotation() {
        let target = make_room_scan();
        let motion = se2::vec_to_mat(&Vector3::new(0.0, 0.0, 0.9));
        let source = se2::transform_cloud(&target, &motion);

        let mut corr = CorrelativeEstimation::new();
        corr.set_input_source(&source).unwrap();
        corr.set_input_target(&target).unwrap();

        let outcome = corr.align(&Matrix4::identity()).unwrap();
        assert!(outcome.converged, "best score = {}", corr.best_score());

        let pose = se2::mat_to_vec(&outcome.final_transformation);
        assert!((pose.z + 0.9).abs() < 0.05, "theta = {}", pose.z);
        assert!(pose.x.abs() < 0.2, "x = {}", pose.x);
        assert!(pose.y.abs() < 0.2, "y = {}", pose.y);
    }

    #[test]
    fn test_recovers_translation() {
        let target = make_room_scan();
        let source: Vec<[f32; 3]> = target.iter().map(|p| [p[0] + 0.8, p[1] - 0.6, p[2]]).collect();

        let mut corr = CorrelativeEstimation::new();
        corr.set_input_source(&source).unwrap();
        corr.set_input_target(&target).unwrap();

        let outcome = corr.align(&Matrix4::identity()).unwrap();
        assert!(outcome.converged);

        let pose = se2::mat_to_vec(&outcome.final_transformation);
        assert!((pose.x + 0.8).abs() < 0.1, "x = {}", pose.x);
        assert!((pose.y - 0.6).abs() < 0.1, "y = {}", pose.y);
        assert!(pose.z.abs() < 0.05, "theta = {}", pose.z);
    }

    #[test]
    fn test_disjoint_clouds_do_not_converge() {
        let target = make_room_scan();
        let source: Vec<[f32; 3]> = target
            .iter()
            .map(|p| [p[0] + 100.0, p[1] + 100.0, p[2]])
            .collect();

        let mut corr = CorrelativeEstimation::new();
        corr.set_input_source(&source).unwrap();
        corr.set_input_target(&target).unwrap();

        let outcome = corr.align(&Matrix4::identity()).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.final_transformation, Matrix4::identity());
    }
}
