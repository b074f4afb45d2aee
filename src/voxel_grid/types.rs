//! Type definitions for the voxel covariance grid.

use nalgebra::{Matrix3, Vector3};

/// Configuration for voxel grid construction.
#[derive(Debug, Clone)]
pub struct VoxelGridConfig {
    /// Voxel side length in meters.
    pub leaf_size: f32,
    /// Minimum number of points for a cell to survive.
    pub min_points_per_voxel: usize,
    /// Relative eigenvalue floor: small eigenvalues are clamped to this
    /// fraction of the largest.
    pub eigenvalue_ratio_threshold: f64,
}

impl Default for VoxelGridConfig {
    fn default() -> Self {
        Self {
            leaf_size: 0.25,
            min_points_per_voxel: 1,
            eigenvalue_ratio_threshold: 0.01,
        }
    }
}

/// A single cell: the Gaussian fitted to the points that fell into one voxel.
///
/// Immutable once built. The covariance is conditioned so that its inverse
/// exists even for sparsely populated cells.
#[derive(Debug, Clone)]
pub struct Voxel {
    /// Mean of the contained points.
    pub mean: Vector3<f64>,
    /// Conditioned 3×3 covariance of the contained points.
    pub covariance: Matrix3<f64>,
    /// Number of points that contributed to this cell.
    pub point_count: usize,
}

impl Voxel {
    /// Build a cell from accumulated statistics.
    ///
    /// `sum` and `sum_sq` are the running sum of points and of their outer
    /// products. Returns `None` when the cell holds fewer than
    /// `min_points_per_voxel` points.
    pub fn from_statistics(
        sum: &Vector3<f64>,
        sum_sq: &Matrix3<f64>,
        count: usize,
        config: &VoxelGridConfig,
    ) -> Option<Self> {
        if count < config.min_points_per_voxel || count == 0 {
            return None;
        }

        let n = count as f64;
        let mean = sum / n;

        // Sample covariance; divisor clamped so single-point cells produce a
        // zero matrix instead of 0/0, which conditioning then inflates.
        let divisor = (n - 1.0).max(1.0);
        let covariance = (sum_sq - mean * mean.transpose() * n) / divisor;

        let conditioned = condition_covariance(&covariance, config);

        Some(Self {
            mean,
            covariance: conditioned,
            point_count: count,
        })
    }
}

/// Clamp covariance eigenvalues from below and reconstruct.
///
/// The floor is the larger of `ratio · λ_max` and `(0.1 · leaf)²`, so a cell
/// holding a single point (or a collinear run of points) still carries a
/// tight Gaussian a tenth of the cell wide on its degenerate axes.
fn condition_covariance(cov: &Matrix3<f64>, config: &VoxelGridConfig) -> Matrix3<f64> {
    let eigen = cov.symmetric_eigen();
    let mut eigenvalues = eigen.eigenvalues;

    let max_eigenvalue = eigenvalues.iter().copied().fold(0.0_f64, f64::max);
    let absolute_floor = {
        let tenth = 0.1 * config.leaf_size as f64;
        tenth * tenth
    };
    let min_allowed = (max_eigenvalue * config.eigenvalue_ratio_threshold).max(absolute_floor);

    for ev in eigenvalues.iter_mut() {
        if *ev < min_allowed {
            *ev = min_allowed;
        }
    }

    let diag = Matrix3::from_diagonal(&eigenvalues);
    eigen.eigenvectors * diag * eigen.eigenvectors.transpose()
}

/// Integer voxel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelCoord {
    /// Coordinates of the voxel containing `point`.
    pub fn from_point(point: &[f32; 3], leaf_size: f32) -> Self {
        Self {
            x: (point[0] / leaf_size).floor() as i32,
            y: (point[1] / leaf_size).floor() as i32,
            z: (point[2] / leaf_size).floor() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_voxel_coord_from_point() {
        assert_eq!(
            VoxelCoord::from_point(&[0.0, 0.0, 0.0], 2.0),
            VoxelCoord { x: 0, y: 0, z: 0 }
        );
        assert_eq!(
            VoxelCoord::from_point(&[3.5, 5.1, 1.9], 2.0),
            VoxelCoord { x: 1, y: 2, z: 0 }
        );
        assert_eq!(
            VoxelCoord::from_point(&[-3.5, -1.1, -0.1], 2.0),
            VoxelCoord { x: -2, y: -1, z: -1 }
        );
    }

    #[test]
    fn test_voxel_from_cluster() {
        let config = VoxelGridConfig::default();

        let points = [
            [1.0, 2.0, 0.0],
            [1.1, 2.1, 0.0],
            [0.9, 1.9, 0.0],
            [1.05, 2.05, 0.0],
            [0.95, 1.95, 0.0],
            [1.0, 2.0, 0.0],
        ];

        let mut sum = Vector3::zeros();
        let mut sum_sq = Matrix3::zeros();
        for p in &points {
            let v = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
            sum += v;
            sum_sq += v * v.transpose();
        }

        let voxel = Voxel::from_statistics(&sum, &sum_sq, points.len(), &config).unwrap();
        assert_relative_eq!(voxel.mean.x, 1.0, epsilon = 0.01);
        assert_relative_eq!(voxel.mean.y, 2.0, epsilon = 0.01);

        // Conditioned covariance must be symmetric and invertible.
        let cov = voxel.covariance;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(cov[(i, j)], cov[(j, i)], epsilon = 1e-12);
            }
        }
        assert!(cov.try_inverse().is_some());
    }

    #[test]
    fn test_single_point_cell_gets_isotropic_floor() {
        let config = VoxelGridConfig {
            leaf_size: 0.25,
            ..Default::default()
        };
        let p = Vector3::new(0.1, 0.1, 0.0);
        let voxel = Voxel::from_statistics(&p, &(p * p.transpose()), 1, &config).unwrap();

        let floor = (0.1 * 0.25_f64) * (0.1 * 0.25);
        let eigen = voxel.covariance.symmetric_eigen();
        for ev in eigen.eigenvalues.iter() {
            assert_relative_eq!(*ev, floor, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_min_points_filter() {
        let config = VoxelGridConfig {
            min_points_per_voxel: 6,
            ..Default::default()
        };
        let sum = Vector3::new(1.0, 2.0, 0.0);
        let sum_sq = Matrix3::identity();
        assert!(Voxel::from_statistics(&sum, &sum_sq, 3, &config).is_none());
    }
}
