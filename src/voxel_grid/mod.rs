//! Voxel covariance grid.
//!
//! Buckets a point cloud into cubic cells of a given side length and fits a
//! Gaussian (mean, covariance) to each occupied cell. The grid is built once
//! per resolution per alignment call and never mutated afterwards; the
//! optimiser iterates its cells and issues nearest-k queries against it.

pub mod cpu;
pub mod search;
pub mod types;

pub use search::CellSearch;
pub use types::{Voxel, VoxelCoord, VoxelGridConfig};

use crate::error::RegistrationError;
use cpu::build_voxel_grid;

/// A grid of cell Gaussians with a nearest-k search index.
#[derive(Debug)]
pub struct VoxelGrid {
    config: VoxelGridConfig,
    cells: Vec<Voxel>,
    search: Option<CellSearch>,
}

impl VoxelGrid {
    /// Build a grid from a cloud at the given cell side length.
    pub fn from_points(points: &[[f32; 3]], leaf_size: f32) -> Result<Self, RegistrationError> {
        let config = VoxelGridConfig {
            leaf_size,
            ..Default::default()
        };
        Self::from_points_with_config(points, config)
    }

    /// Build a grid with full control over the configuration.
    pub fn from_points_with_config(
        points: &[[f32; 3]],
        config: VoxelGridConfig,
    ) -> Result<Self, RegistrationError> {
        if !(config.leaf_size > 0.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "cell size must be positive, got {}",
                config.leaf_size
            )));
        }

        let cells = build_voxel_grid(points, &config);
        let search = CellSearch::from_cells(&cells);

        Ok(Self {
            config,
            cells,
            search,
        })
    }

    /// Assemble a grid directly from prebuilt cells.
    #[cfg(test)]
    pub(crate) fn from_cells(cells: Vec<Voxel>, leaf_size: f32) -> Self {
        let search = CellSearch::from_cells(&cells);
        Self {
            config: VoxelGridConfig {
                leaf_size,
                ..Default::default()
            },
            cells,
            search,
        }
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cells, in build order. Query indices refer into this slice.
    pub fn cells(&self) -> &[Voxel] {
        &self.cells
    }

    /// Cell side length.
    pub fn leaf_size(&self) -> f32 {
        self.config.leaf_size
    }

    /// The k cells nearest to `point`, nearest first. Empty for an empty
    /// grid.
    pub fn nearest_k(&self, point: &[f32; 3], k: usize) -> Vec<(usize, f32)> {
        match &self.search {
            Some(search) => search.nearest_k(point, k),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_lattice_pcd;

    #[test]
    fn test_grid_from_lattice() {
        let cloud = make_lattice_pcd(20, 20, 0.5);
        let grid = VoxelGrid::from_points(&cloud, 2.0).unwrap();

        // 9.5m extent at 2m cells: 5×5 occupied columns.
        assert_eq!(grid.len(), 25);
        for cell in grid.cells() {
            assert_eq!(cell.point_count, 16);
        }
    }

    #[test]
    fn test_fine_grid_keeps_single_point_cells() {
        let cloud = make_lattice_pcd(4, 4, 0.5);
        let grid = VoxelGrid::from_points(&cloud, 0.25).unwrap();
        assert_eq!(grid.len(), 16);
    }

    #[test]
    fn test_nearest_k_on_grid() {
        let cloud = make_lattice_pcd(4, 4, 0.5);
        let grid = VoxelGrid::from_points(&cloud, 0.5).unwrap();

        let found = grid.nearest_k(&[0.0, 0.0, 0.0], 2);
        assert_eq!(found.len(), 2);
        assert!(found[0].1 <= found[1].1);
    }

    #[test]
    fn test_invalid_cell_size() {
        let cloud = make_lattice_pcd(2, 2, 0.5);
        assert!(VoxelGrid::from_points(&cloud, 0.0).is_err());
        assert!(VoxelGrid::from_points(&cloud, -1.0).is_err());
    }

    #[test]
    fn test_empty_cloud_grid() {
        let grid = VoxelGrid::from_points(&[], 1.0).unwrap();
        assert!(grid.is_empty());
        assert!(grid.nearest_k(&[0.0, 0.0, 0.0], 2).is_empty());
    }
}
