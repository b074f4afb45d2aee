//! Likelihood lookup table over the target cloud.
//!
//! Rasterises the target into a planar grid where each cell holds the
//! likelihood of an aligned point landing there: occupied cells score 1 and
//! a truncated Gaussian kernel smears that mass into their neighbourhood.
//! Scoring a transformed cloud is then a per-point table lookup averaged
//! over the cloud, giving a value in [0, 1] that is independent of the
//! D2D objective. The robust wrapper uses it to arbitrate between
//! candidates; the correlative seeder uses it as its search objective.

use crate::error::RegistrationError;

/// Planar likelihood field with square cells.
#[derive(Debug, Clone)]
pub struct LookUpTable {
    cell_size: f32,
    origin_x: f32,
    origin_y: f32,
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl LookUpTable {
    /// Rasterise `target` at `cell_size`, smoothing each occupied cell with
    /// a Gaussian kernel of standard deviation `sigma` (meters, truncated at
    /// 2σ).
    pub fn new(
        target: &[[f32; 3]],
        cell_size: f32,
        sigma: f32,
    ) -> Result<Self, RegistrationError> {
        if !(cell_size > 0.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        if !(sigma > 0.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "sigma must be positive, got {sigma}"
            )));
        }
        if target.is_empty() {
            return Err(RegistrationError::InvalidParameter(
                "target cloud is empty".into(),
            ));
        }

        let kernel_radius = (2.0 * sigma / cell_size).ceil() as i64;
        let margin = kernel_radius as f32 * cell_size;

        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for p in target {
            if !p[0].is_finite() || !p[1].is_finite() {
                continue;
            }
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
        if !min_x.is_finite() {
            return Err(RegistrationError::InvalidParameter(
                "target cloud has no finite points".into(),
            ));
        }

        let origin_x = min_x - margin;
        let origin_y = min_y - margin;
        let width = (((max_x - origin_x + margin) / cell_size).ceil() as usize).max(1) + 1;
        let height = (((max_y - origin_y + margin) / cell_size).ceil() as usize).max(1) + 1;

        let mut table = Self {
            cell_size,
            origin_x,
            origin_y,
            width,
            height,
            values: vec![0.0; width * height],
        };

        // Precompute the kernel once; splats keep the cell-wise maximum.
        let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
        for p in target {
            if !p[0].is_finite() || !p[1].is_finite() {
                continue;
            }
            let (cx, cy) = table.cell_of(p[0], p[1]);
            for dy in -kernel_radius..=kernel_radius {
                for dx in -kernel_radius..=kernel_radius {
                    let x = cx + dx;
                    let y = cy + dy;
                    if x < 0 || y < 0 || x >= table.width as i64 || y >= table.height as i64 {
                        continue;
                    }
                    let dist_sq = ((dx * dx + dy * dy) as f32) * cell_size * cell_size;
                    let value = (-dist_sq * inv_two_sigma_sq).exp();
                    let idx = y as usize * table.width + x as usize;
                    if value > table.values[idx] {
                        table.values[idx] = value;
                    }
                }
            }
        }

        Ok(table)
    }

    /// Mean cell value under the points of `cloud`, in [0, 1]. Points
    /// outside the table score zero.
    pub fn score(&self, cloud: &[[f32; 3]]) -> f64 {
        if cloud.is_empty() {
            return 0.0;
        }

        let total: f64 = cloud
            .iter()
            .map(|p| {
                let (x, y) = self.cell_of(p[0], p[1]);
                if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
                    0.0
                } else {
                    self.values[y as usize * self.width + x as usize] as f64
                }
            })
            .sum();

        total / cloud.len() as f64
    }

    fn cell_of(&self, x: f32, y: f32) -> (i64, i64) {
        (
            ((x - self.origin_x) / self.cell_size).floor() as i64,
            ((y - self.origin_y) / self.cell_size).floor() as i64,
        )
    }
}
