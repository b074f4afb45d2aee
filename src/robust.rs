//! Robust registration wrapper.
//!
//! Stages the D2D-NDT optimiser behind an independent validator:
//!
//! 1. Direct D2D from the guess; accept if it converged and the validator
//!    score clears the high bar.
//! 2. Otherwise seed a fresh pose with the correlative estimator; a failed
//!    seed ends the run with no alignment.
//! 3. Refined D2D from the seed; an optional plugged-in refiner (ICP) may
//!    polish the result. Accept when the validator clears the low bar,
//!    fall back to the direct result when that one scored decently, give
//!    up otherwise.

use anyhow::Result;
use nalgebra::{Matrix3, Matrix4};
use tracing::debug;

use crate::correlative::CorrelativeEstimation;
use crate::d2d::D2dNdt2d;
use crate::error::RegistrationError;
use crate::lookup::LookUpTable;
use crate::optimization::ConvergenceStatus;
use crate::registration::{AlignOutcome, Registration2d};
use crate::se2;

/// Validator score above which the direct D2D result is accepted outright.
const SCORE_GOOD: f64 = 0.7;
/// Validator score above which the direct result is salvaged when the
/// refined one fails.
const SCORE_SALVAGE: f64 = 0.6;
/// Minimum validator score for the refined result.
const SCORE_ACCEPT: f64 = 0.4;

/// D2D-NDT registration with a correlative fallback.
pub struct D2dNdt2dRobust {
    d2d: D2dNdt2d,
    corr_est: CorrelativeEstimation,
    refiner: Option<Box<dyn Registration2d>>,

    cell_size: f32,

    source: Option<Vec<[f32; 3]>>,
    target: Option<Vec<[f32; 3]>>,

    converged: bool,
    final_transformation: Matrix4<f64>,
}

impl D2dNdt2dRobust {
    pub fn new() -> Self {
        let mut d2d = D2dNdt2d::new();
        d2d.set_cell_sizes(&[2.0, 1.0, 0.5, 0.25])
            .expect("fixed cell schedule is valid");
        d2d.set_maximum_iterations(10);

        Self {
            d2d,
            corr_est: CorrelativeEstimation::new(),
            refiner: None,
            cell_size: 0.25,
            source: None,
            target: None,
            converged: false,
            final_transformation: Matrix4::identity(),
        }
    }

    /// Plug a final refinement stage (e.g. ICP) into the fallback path.
    ///
    /// Disabled by default; the stage runs on the refined D2D result and its
    /// output is validated in place of it.
    pub fn set_refiner(
        &mut self,
        mut refiner: Box<dyn Registration2d>,
    ) -> Result<(), RegistrationError> {
        if let Some(source) = &self.source {
            refiner.set_input_source(source)?;
        }
        if let Some(target) = &self.target {
            refiner.set_input_target(target)?;
        }
        self.refiner = Some(refiner);
        Ok(())
    }

    /// Validator cell size (also the finest D2D cell).
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn has_converged(&self) -> bool {
        self.converged
    }

    pub fn final_transformation(&self) -> Matrix4<f64> {
        self.final_transformation
    }

    /// Delegated to the inner D2D estimator.
    pub fn transformation_probability(&self) -> f64 {
        self.d2d.transformation_probability()
    }

    /// Delegated to the inner D2D estimator.
    pub fn final_num_iterations(&self) -> usize {
        self.d2d.final_num_iterations()
    }

    /// Delegated to the inner D2D estimator.
    pub fn covariance(&self) -> Matrix3<f64> {
        self.d2d.covariance()
    }

    /// Delegated to the inner D2D estimator.
    pub fn information_matrix(&self) -> Matrix3<f64> {
        self.d2d.information_matrix()
    }

    /// Score a candidate transform against the target with the lookup-table
    /// validator.
    fn proof_transform(&self, trans: &Matrix4<f64>) -> Result<f64> {
        let source = self
            .source
            .as_ref()
            .ok_or(RegistrationError::MissingInput("source cloud"))?;
        let target = self
            .target
            .as_ref()
            .ok_or(RegistrationError::MissingInput("target cloud"))?;

        let proof_grid = LookUpTable::new(target, self.cell_size, 0.5)?;
        let transformed = se2::transform_cloud(source, trans);
        let score = proof_grid.score(&transformed);
        debug!(score, "validator score");
        Ok(score)
    }

    fn accept(&mut self, trans: Matrix4<f64>) -> AlignOutcome {
        self.converged = true;
        self.final_transformation = trans;
        let aligned_cloud = match &self.source {
            Some(source) => se2::transform_cloud(source, &trans),
            None => Vec::new(),
        };
        AlignOutcome {
            status: ConvergenceStatus::Converged,
            converged: true,
            final_transformation: trans,
            aligned_cloud,
        }
    }

    fn no_alignment(&mut self) -> AlignOutcome {
        self.converged = false;
        self.final_transformation = Matrix4::identity();
        AlignOutcome {
            status: ConvergenceStatus::NoAlignment,
            converged: false,
            final_transformation: Matrix4::identity(),
            aligned_cloud: self.source.clone().unwrap_or_default(),
        }
    }
}

impl Default for D2dNdt2dRobust {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration2d for D2dNdt2dRobust {
    fn set_input_source(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError> {
        self.d2d.set_input_source(cloud)?;
        self.corr_est.set_input_source(cloud)?;
        if let Some(refiner) = &mut self.refiner {
            refiner.set_input_source(cloud)?;
        }
        self.source = Some(cloud.to_vec());
        Ok(())
    }

    fn set_input_target(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError> {
        self.d2d.set_input_target(cloud)?;
        self.corr_est.set_input_target(cloud)?;
        if let Some(refiner) = &mut self.refiner {
            refiner.set_input_target(cloud)?;
        }
        self.target = Some(cloud.to_vec());
        Ok(())
    }

    fn align(&mut self, guess: &Matrix4<f64>) -> Result<AlignOutcome> {
        if self.source.is_none() {
            return Err(RegistrationError::MissingInput("source cloud").into());
        }
        if self.target.is_none() {
            return Err(RegistrationError::MissingInput("target cloud").into());
        }

        // Stage 1: direct D2D for good guesses.
        let first = self.d2d.align(guess)?;
        let score_first = self.proof_transform(&first.final_transformation)?;

        if first.converged && score_first > SCORE_GOOD {
            return Ok(self.accept(first.final_transformation));
        }

        // Stage 2: correlative seed.
        let first_trans = first.final_transformation;
        let seed = self.corr_est.align(guess)?;
        if !seed.converged {
            return Ok(self.no_alignment());
        }

        // Stage 3: refined D2D from the seed.
        let second = self.d2d.align(&seed.final_transformation)?;
        if !second.converged {
            return Ok(self.no_alignment());
        }

        // Optional plugged-in refinement of the seeded result.
        let candidate = match &mut self.refiner {
            Some(refiner) => {
                let refined = refiner.align(&second.final_transformation)?;
                if refined.converged {
                    refined.final_transformation
                } else {
                    second.final_transformation
                }
            }
            None => second.final_transformation,
        };

        let score_second = self.proof_transform(&candidate)?;
        if score_second >= SCORE_ACCEPT {
            Ok(self.accept(candidate))
        } else if score_first > SCORE_SALVAGE {
            // The refined path went nowhere but the direct result was
            // decent.
            Ok(self.accept(first_trans))
        } else {
            Ok(self.no_alignment())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icp::IterativeClosestPoint2d;
    use crate::test_utils::{make_lattice_pcd, make_room_scan};
    use nalgebra::Vector3;

    #[test]
    fn test_good_guess_accepted_directly() {
        let cloud = make_lattice_pcd(20, 20, 0.5);

        let mut robust = D2dNdt2dRobust::new();
        robust.set_input_source(&cloud).unwrap();
        robust.set_input_target(&cloud).unwrap();

        let outcome = robust.align(&Matrix4::identity()).unwrap();
        assert!(outcome.converged);

        let pose = se2::mat_to_vec(&outcome.final_transformation);
        assert!(pose.x.abs() < 0.05, "x = {}", pose.x);
        assert!(pose.y.abs() < 0.05, "y = {}", pose.y);
        assert!(pose.z.abs() < 0.05, "theta = {}", pose.z);
    }

    #[test]
    fn test_salvages_large_rotation_via_correlative_seed() {
        let target = make_room_scan();
        let motion = se2::vec_to_mat(&Vector3::new(0.0, 0.0, 1.2));
        let source = se2::transform_cloud(&target, &motion);

        let mut robust = D2dNdt2dRobust::new();
        robust.set_input_source(&source).unwrap();
        robust.set_input_target(&target).unwrap();

        let outcome = robust.align(&Matrix4::identity()).unwrap();
        assert!(outcome.converged, "robust alignment should salvage");

        let pose = se2::mat_to_vec(&outcome.final_transformation);
        assert!((pose.z + 1.2).abs() < 0.06, "theta = {}", pose.z);
        assert!(pose.x.abs() < 0.2, "x = {}", pose.x);
        assert!(pose.y.abs() < 0.2, "y = {}", pose.y);
    }

    #[test]
    fn test_hopeless_clouds_report_no_alignment() {
        let target = make_room_scan();
        let source: Vec<[f32; 3]> = target
            .iter()
            .map(|p| [p[0] + 100.0, p[1] + 100.0, p[2]])
            .collect();

        let mut robust = D2dNdt2dRobust::new();
        robust.set_input_source(&source).unwrap();
        robust.set_input_target(&target).unwrap();

        let outcome = robust.align(&Matrix4::identity()).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.status, ConvergenceStatus::NoAlignment);
        assert_eq!(outcome.final_transformation, Matrix4::identity());
    }

    #[test]
    fn test_refiner_stage_can_be_plugged() {
        let target = make_room_scan();
        let motion = se2::vec_to_mat(&Vector3::new(0.0, 0.0, 1.2));
        let source = se2::transform_cloud(&target, &motion);

        let mut robust = D2dNdt2dRobust::new();
        robust.set_input_source(&source).unwrap();
        robust.set_input_target(&target).unwrap();
        robust
            .set_refiner(Box::new(IterativeClosestPoint2d::new()))
            .unwrap();

        let outcome = robust.align(&Matrix4::identity()).unwrap();
        assert!(outcome.converged);

        let pose = se2::mat_to_vec(&outcome.final_transformation);
        assert!((pose.z + 1.2).abs() < 0.06, "theta = {}", pose.z);
    }

    #[test]
    fn test_getters_delegate_to_inner_d2d() {
        let cloud = make_lattice_pcd(20, 20, 0.5);

        let mut robust = D2dNdt2dRobust::new();
        robust.set_input_source(&cloud).unwrap();
        robust.set_input_target(&cloud).unwrap();
        robust.align(&Matrix4::identity()).unwrap();

        assert!(robust.transformation_probability() > 0.0);
        assert!(robust.final_num_iterations() >= 1);
    }
}
