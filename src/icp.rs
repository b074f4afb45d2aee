//! Point-to-point ICP refiner.
//!
//! Classic iterative closest point in the plane: nearest-neighbour
//! correspondences gated by a distance threshold, then a closed-form SE(2)
//! update from the centered pairs. Available to the robust wrapper as an
//! optional final refinement stage.

use anyhow::Result;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use nalgebra::{Matrix4, Vector3};

use crate::error::RegistrationError;
use crate::optimization::ConvergenceStatus;
use crate::registration::{AlignOutcome, Registration2d};
use crate::se2;

/// 2-D point-to-point iterative closest point.
pub struct IterativeClosestPoint2d {
    source: Option<Vec<[f32; 3]>>,
    target: Option<Vec<[f32; 3]>>,

    max_iterations: usize,
    transformation_epsilon: f64,
    max_correspondence_distance: f64,

    converged: bool,
    final_transformation: Matrix4<f64>,
}

impl IterativeClosestPoint2d {
    pub fn new() -> Self {
        Self {
            source: None,
            target: None,
            max_iterations: 30,
            transformation_epsilon: 1e-4,
            max_correspondence_distance: 1.0,
            converged: false,
            final_transformation: Matrix4::identity(),
        }
    }

    pub fn set_maximum_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    pub fn set_transformation_epsilon(&mut self, epsilon: f64) {
        self.transformation_epsilon = epsilon;
    }

    /// Correspondences farther than this are rejected.
    pub fn set_max_correspondence_distance(&mut self, distance: f64) {
        self.max_correspondence_distance = distance;
    }

    pub fn has_converged(&self) -> bool {
        self.converged
    }

    pub fn final_transformation(&self) -> Matrix4<f64> {
        self.final_transformation
    }
}

impl Default for IterativeClosestPoint2d {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration2d for IterativeClosestPoint2d {
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

        let kdtree: ImmutableKdTree<f32, u64, 3, 32> = (&*target).into();
        let max_dist_sq = (self.max_correspondence_distance * self.max_correspondence_distance)
            as f32;

        let mut current = *guess;
        self.converged = false;

        for _ in 0..self.max_iterations {
            let transformed = se2::transform_cloud(&source, &current);

            // Centered correspondence sums for the closed-form SE(2) step.
            let mut centroid_s = [0.0_f64; 2];
            let mut centroid_t = [0.0_f64; 2];
            let mut pairs: Vec<([f64; 2], [f64; 2])> = Vec::with_capacity(transformed.len());

            for p in &transformed {
                let nearest =
                    kdtree.nearest_n::<SquaredEuclidean>(p, std::num::NonZero::new(1).unwrap());
                let Some(nn) = nearest.first() else {
                    continue;
                };
                if nn.distance > max_dist_sq {
                    continue;
                }
                let t = target[nn.item as usize];
                let s = [p[0] as f64, p[1] as f64];
                let t = [t[0] as f64, t[1] as f64];
                centroid_s[0] += s[0];
                centroid_s[1] += s[1];
                centroid_t[0] += t[0];
                centroid_t[1] += t[1];
                pairs.push((s, t));
            }

            if pairs.len() < 3 {
                break;
            }

            let n = pairs.len() as f64;
            centroid_s[0] /= n;
            centroid_s[1] /= n;
            centroid_t[0] /= n;
            centroid_t[1] /= n;

            let mut dot = 0.0;
            let mut cross = 0.0;
            for (s, t) in &pairs {
                let sx = s[0] - centroid_s[0];
                let sy = s[1] - centroid_s[1];
                let tx = t[0] - centroid_t[0];
                let ty = t[1] - centroid_t[1];
                dot += sx * tx + sy * ty;
                cross += sx * ty - sy * tx;
            }

            let theta = cross.atan2(dot);
            let (sin, cos) = theta.sin_cos();
            let tx = centroid_t[0] - (cos * centroid_s[0] - sin * centroid_s[1]);
            let ty = centroid_t[1] - (sin * centroid_s[0] + cos * centroid_s[1]);

            let delta = se2::vec_to_mat(&Vector3::new(tx, ty, theta));
            current = delta * current;

            if se2::mat_to_vec(&delta).norm() < self.transformation_epsilon {
                self.converged = true;
                break;
            }
        }

        self.final_transformation = current;

        let status = if self.converged {
            ConvergenceStatus::Converged
        } else {
            ConvergenceStatus::NoAlignment
        };

        Ok(AlignOutcome {
            status,
            converged: self.converged,
            final_transformation: current,
            aligned_cloud: se2::transform_cloud(&source, &current),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_lattice_pcd, make_room_scan};

    #[test]
    fn test_recovers_small_translation() {
        let target = make_lattice_pcd(10, 10, 0.5);
        let source: Vec<[f32; 3]> = target.iter().map(|p| [p[0] + 0.2, p[1] + 0.1, p[2]]).collect();

        let mut icp = IterativeClosestPoint2d::new();
        icp.set_input_source(&source).unwrap();
        icp.set_input_target(&target).unwrap();

        let outcome = icp.align(&Matrix4::identity()).unwrap();
        assert!(outcome.converged);

        let pose = se2::mat_to_vec(&outcome.final_transformation);
        assert!((pose.x + 0.2).abs() < 1e-3, "x = {}", pose.x);
        assert!((pose.y + 0.1).abs() < 1e-3, "y = {}", pose.y);
        assert!(pose.z.abs() < 1e-3, "theta = {}", pose.z);
    }

    #[test]
    fn test_refines_small_combined_motion() {
        let target = make_room_scan();
        let motion = se2::vec_to_mat(&Vector3::new(0.1, -0.05, 0.04));
        let source = se2::transform_cloud(&target, &motion);

        let mut icp = IterativeClosestPoint2d::new();
        icp.set_input_source(&source).unwrap();
        icp.set_input_target(&target).unwrap();

        let outcome = icp.align(&Matrix4::identity()).unwrap();
        assert!(outcome.converged);

        let expected = se2::mat_to_vec(
            &motion
                .try_inverse()
                .expect("rigid transforms are invertible"),
        );
        let pose = se2::mat_to_vec(&outcome.final_transformation);
        assert!((pose.x - expected.x).abs() < 0.02, "x = {}", pose.x);
        assert!((pose.y - expected.y).abs() < 0.02, "y = {}", pose.y);
        assert!((pose.z - expected.z).abs() < 0.01, "theta = {}", pose.z);
    }

    #[test]
    fn test_no_correspondences_fails() {
        let target = make_lattice_pcd(4, 4, 0.5);
        let source: Vec<[f32; 3]> = target
            .iter()
            .map(|p| [p[0] + 50.0, p[1] + 50.0, p[2]])
            .collect();

        let mut icp = IterativeClosestPoint2d::new();
        icp.set_input_source(&source).unwrap();
        icp.set_input_target(&target).unwrap();

        let outcome = icp.align(&Matrix4::identity()).unwrap();
        assert!(!outcome.converged);
    }
}
