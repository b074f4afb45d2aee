//! KD-tree nearest-k search over cell means.
//!
//! The optimiser pairs every transformed source cell with the k nearest
//! target cells, so the target grid carries an immutable KD-tree built from
//! its cell means. Queries are read-only and safe to issue concurrently from
//! the parallel score accumulator.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use super::types::Voxel;

/// Bucket size for the KD-tree.
const BUCKET_SIZE: usize = 32;

/// Search index over the means of a grid's cells.
///
/// Indices returned by queries refer to the cell slice the index was built
/// from.
#[derive(Debug)]
pub struct CellSearch {
    kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE>,
}

impl CellSearch {
    /// Build an index from a slice of cells, or `None` when it is empty.
    pub fn from_cells(cells: &[Voxel]) -> Option<Self> {
        if cells.is_empty() {
            return None;
        }

        let means: Vec<[f32; 3]> = cells
            .iter()
            .map(|c| [c.mean.x as f32, c.mean.y as f32, c.mean.z as f32])
            .collect();

        let kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE> = (&*means).into();
        Some(Self { kdtree })
    }

    /// The k cells nearest to `point`, as (cell index, squared distance)
    /// pairs sorted nearest first. Fewer than k pairs are returned when the
    /// grid holds fewer cells.
    pub fn nearest_k(&self, point: &[f32; 3], k: usize) -> Vec<(usize, f32)> {
        let Some(k) = std::num::NonZero::new(k) else {
            return Vec::new();
        };
        self.kdtree
            .nearest_n::<SquaredEuclidean>(point, k)
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance))
            .collect()
    }

    /// Number of indexed cells.
    pub fn len(&self) -> usize {
        self.kdtree.size()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.kdtree.size() == 0
    }
}
