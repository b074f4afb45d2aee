//! Voxel grid construction.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use super::types::{Voxel, VoxelCoord, VoxelGridConfig};

/// Running statistics of one voxel during accumulation.
#[derive(Debug, Clone, Default)]
struct VoxelAccumulator {
    sum: Vector3<f64>,
    sum_sq: Matrix3<f64>,
    count: usize,
}

impl VoxelAccumulator {
    fn add_point(&mut self, point: &[f32; 3]) {
        let v = Vector3::new(point[0] as f64, point[1] as f64, point[2] as f64);
        self.sum += v;
        self.sum_sq += v * v.transpose();
        self.count += 1;
    }
}

/// Bucket a point cloud into voxels and fit a Gaussian to each.
///
/// Accumulation is serial (HashMap insertions), finalisation is parallel.
/// Non-finite points are skipped.
pub fn build_voxel_grid(points: &[[f32; 3]], config: &VoxelGridConfig) -> Vec<Voxel> {
    let mut accumulators: HashMap<VoxelCoord, VoxelAccumulator> = HashMap::new();

    for point in points {
        if !point.iter().all(|c| c.is_finite()) {
            continue;
        }
        let coord = VoxelCoord::from_point(point, config.leaf_size);
        accumulators.entry(coord).or_default().add_point(point);
    }

    let entries: Vec<_> = accumulators.into_values().collect();

    entries
        .into_par_iter()
        .filter_map(|acc| Voxel::from_statistics(&acc.sum, &acc.sum_sq, acc.count, config))
        .collect()
}
