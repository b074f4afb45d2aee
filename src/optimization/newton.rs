//! Newton step computation.
//!
//! The step solves H·δ = −g. The Hessian of the D2D score can be indefinite
//! or near-singular away from the optimum, so the solve goes through a full
//! SVD: singular values below the tolerance are treated as zero, which
//! regularises the direction without branching.

use nalgebra::{Matrix3, Vector3};

/// Singular values below this are treated as zero.
pub const SVD_TOLERANCE: f64 = 1e-10;

/// Solve H·δ = −g through the SVD pseudo-inverse.
///
/// Returns the zero vector when the system is degenerate; the caller treats
/// a zero-norm direction as an insufficient-overlap signal.
pub fn newton_step(gradient: &Vector3<f64>, hessian: &Matrix3<f64>) -> Vector3<f64> {
    let svd = hessian.svd(true, true);
    svd.solve(&-gradient, SVD_TOLERANCE)
        .unwrap_or_else(|_| Vector3::zeros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_newton_step_identity_hessian() {
        let gradient = Vector3::new(1.0, 2.0, 3.0);
        let delta = newton_step(&gradient, &Matrix3::identity());
        for i in 0..3 {
            assert_relative_eq!(delta[i], -gradient[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_newton_step_scaled_hessian() {
        let gradient = Vector3::new(2.0, 4.0, 6.0);
        let delta = newton_step(&gradient, &(Matrix3::identity() * 2.0));
        for i in 0..3 {
            assert_relative_eq!(delta[i], -gradient[i] / 2.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_newton_step_zero_hessian_gives_zero() {
        let gradient = Vector3::new(1.0, 2.0, 3.0);
        let delta = newton_step(&gradient, &Matrix3::zeros());
        assert_eq!(delta, Vector3::zeros());
    }

    #[test]
    fn test_newton_step_indefinite_hessian() {
        // SVD handles indefinite systems without special-casing.
        let mut hessian = Matrix3::identity();
        hessian[(0, 0)] = -2.0;
        let gradient = Vector3::new(1.0, 1.0, 1.0);

        let delta = newton_step(&gradient, &hessian);
        let residual = hessian * delta + gradient;
        assert!(residual.norm() < 1e-8, "residual {}", residual.norm());
    }

    #[test]
    fn test_newton_step_rank_deficient() {
        // One zero singular value: the solve projects onto the usable
        // subspace instead of blowing up.
        let hessian = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        let gradient = Vector3::new(1.0, -1.0, 5.0);

        let delta = newton_step(&gradient, &hessian);
        assert_relative_eq!(delta.x, -1.0, epsilon = 1e-10);
        assert_relative_eq!(delta.y, 1.0, epsilon = 1e-10);
        assert_relative_eq!(delta.z, 0.0, epsilon = 1e-10);
    }
}
