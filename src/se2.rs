//! SE(2) pose codec.
//!
//! A planar rigid motion is carried as a 3-vector (x, y, θ) and embedded in
//! a 4×4 homogeneous matrix: rotation about Z by θ, translation (x, y, 0).
//! All optimisation happens on the 3-vector; the matrix form is the exchange
//! format with clouds and collaborators.

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Convert an (x, y, θ) pose vector into a 4×4 homogeneous transform.
pub fn vec_to_mat(pose: &Vector3<f64>) -> Matrix4<f64> {
    let (sin, cos) = pose.z.sin_cos();
    let mut mat = Matrix4::identity();
    mat[(0, 0)] = cos;
    mat[(0, 1)] = -sin;
    mat[(1, 0)] = sin;
    mat[(1, 1)] = cos;
    mat[(0, 3)] = pose.x;
    mat[(1, 3)] = pose.y;
    mat
}

/// Recover the (x, y, θ) pose vector from a homogeneous transform.
///
/// θ is read as `atan2(R[1,0], R[0,0])`, so the round trip with
/// [`vec_to_mat`] is exact for θ ∈ (−π, π].
pub fn mat_to_vec(mat: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(1, 0)].atan2(mat[(0, 0)]))
}

/// Rotational part of a homogeneous transform.
pub fn rotation(mat: &Matrix4<f64>) -> Matrix3<f64> {
    mat.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Apply a homogeneous transform to a 3-vector point.
pub fn transform_point(mat: &Matrix4<f64>, point: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(
        mat[(0, 0)] * point.x + mat[(0, 1)] * point.y + mat[(0, 2)] * point.z + mat[(0, 3)],
        mat[(1, 0)] * point.x + mat[(1, 1)] * point.y + mat[(1, 2)] * point.z + mat[(1, 3)],
        mat[(2, 0)] * point.x + mat[(2, 1)] * point.y + mat[(2, 2)] * point.z + mat[(2, 3)],
    )
}

/// Transform a whole cloud, returning the transformed copy.
pub fn transform_cloud(points: &[[f32; 3]], mat: &Matrix4<f64>) -> Vec<[f32; 3]> {
    points
        .iter()
        .map(|p| {
            let v = transform_point(mat, &Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64));
            [v.x as f32, v.y as f32, v.z as f32]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_vec_mat_roundtrip() {
        let poses = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, -2.0, 0.5),
            Vector3::new(-3.5, 0.25, -FRAC_PI_2),
            Vector3::new(10.0, 10.0, PI - 1e-6),
            Vector3::new(0.1, 0.2, -PI + 1e-6),
        ];

        for pose in &poses {
            let recovered = mat_to_vec(&vec_to_mat(pose));
            assert_relative_eq!(recovered.x, pose.x, epsilon = 1e-9);
            assert_relative_eq!(recovered.y, pose.y, epsilon = 1e-9);
            assert_relative_eq!(recovered.z, pose.z, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_identity_pose() {
        let mat = vec_to_mat(&Vector3::zeros());
        assert_relative_eq!(mat, Matrix4::identity(), epsilon = 1e-15);
    }

    #[test]
    fn test_transform_point_rotation() {
        // Quarter turn maps (1, 0) to (0, 1).
        let mat = vec_to_mat(&Vector3::new(0.0, 0.0, FRAC_PI_2));
        let p = transform_point(&mat, &Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_covariance_stays_symmetric() {
        let rot = rotation(&vec_to_mat(&Vector3::new(0.0, 0.0, 0.7)));
        let cov = Matrix3::new(2.0, 0.3, 0.1, 0.3, 1.0, 0.05, 0.1, 0.05, 0.5);
        let rotated = rot * cov * rot.transpose();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotated[(i, j)], rotated[(j, i)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_transform_cloud_translation() {
        let mat = vec_to_mat(&Vector3::new(1.0, -1.0, 0.0));
        let cloud = vec![[0.0, 0.0, 0.0], [2.0, 3.0, 0.0]];
        let moved = transform_cloud(&cloud, &mat);
        assert_relative_eq!(moved[0][0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(moved[0][1], -1.0, epsilon = 1e-6);
        assert_relative_eq!(moved[1][0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(moved[1][1], 2.0, epsilon = 1e-6);
    }
}
