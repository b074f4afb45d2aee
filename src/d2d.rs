//! Multi-resolution D2D-NDT registration.
//!
//! Runs the Newton loop from the coarsest to the finest
//! voxel grid, threading the estimated pose forward. Coarse grids have wide
//! basins of attraction and absorb large initial errors; fine grids sharpen
//! the estimate. Source and target grids are rebuilt per resolution on every
//! alignment call.

use anyhow::Result;
use nalgebra::{Matrix3, Matrix4};
use tracing::debug;

use crate::derivatives::FittingParams;
use crate::error::RegistrationError;
use crate::optimization::{
    optimize_at_resolution, ConvergenceStatus, OptimizationConfig,
};
use crate::registration::{AlignOutcome, Registration2d};
use crate::se2;
use crate::voxel_grid::VoxelGrid;

/// Distribution-to-distribution NDT estimator for planar rigid motion.
///
/// Defaults: four layers over a 0.25 m finest cell (2.0, 1.0, 0.5, 0.25),
/// step size 0.1, outlier ratio 0.55, 35 iterations per resolution,
/// transformation epsilon 0.1.
pub struct D2dNdt2d {
    cell_sizes: Vec<f32>,
    layer_count: usize,
    base_cell_size: f32,
    outlier_ratio: f64,
    opt_config: OptimizationConfig,
    params: Vec<FittingParams>,

    source: Option<Vec<[f32; 3]>>,
    target: Option<Vec<[f32; 3]>>,

    converged: bool,
    final_transformation: Matrix4<f64>,
    trans_probability: f64,
    covariance: Matrix3<f64>,
    inform_matrix: Matrix3<f64>,
    nr_iterations: usize,
}

impl D2dNdt2d {
    pub fn new() -> Self {
        let mut ndt = Self {
            cell_sizes: Vec::new(),
            layer_count: 4,
            base_cell_size: 0.25,
            outlier_ratio: 0.55,
            opt_config: OptimizationConfig::default(),
            params: Vec::new(),
            source: None,
            target: None,
            converged: false,
            final_transformation: Matrix4::identity(),
            trans_probability: 0.0,
            covariance: Matrix3::identity(),
            inform_matrix: Matrix3::identity(),
            nr_iterations: 0,
        };
        ndt.rebuild_cell_sizes();
        ndt.rebuild_params()
            .expect("default fitting parameters are valid");
        ndt
    }

    /// Set the number of resolution layers; cell sizes become
    /// {base·2^(L−1), …, base·2, base}.
    pub fn set_num_layers(&mut self, layers: usize) -> Result<(), RegistrationError> {
        if layers == 0 {
            return Err(RegistrationError::InvalidParameter(
                "layer count must be at least 1".into(),
            ));
        }
        self.layer_count = layers;
        self.rebuild_cell_sizes();
        self.rebuild_params()
    }

    pub fn num_layers(&self) -> usize {
        self.layer_count
    }

    /// Set the finest cell side length; coarser layers double it per level.
    pub fn set_cell_size(&mut self, base: f32) -> Result<(), RegistrationError> {
        if !(base > 0.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "cell size must be positive, got {base}"
            )));
        }
        self.base_cell_size = base;
        self.rebuild_cell_sizes();
        self.rebuild_params()
    }

    /// Supply the cell-size schedule explicitly. The sizes are sorted
    /// coarsest to finest and the layer count follows the vector length.
    pub fn set_cell_sizes(&mut self, cell_sizes: &[f32]) -> Result<(), RegistrationError> {
        if cell_sizes.is_empty() {
            return Err(RegistrationError::InvalidParameter(
                "cell size schedule is empty".into(),
            ));
        }
        if let Some(bad) = cell_sizes.iter().find(|s| !(**s > 0.0)) {
            return Err(RegistrationError::InvalidParameter(format!(
                "cell size must be positive, got {bad}"
            )));
        }

        let mut sizes = cell_sizes.to_vec();
        sizes.sort_by(|a, b| b.partial_cmp(a).expect("cell sizes are finite"));
        self.layer_count = sizes.len();
        self.base_cell_size = *sizes.last().expect("schedule is non-empty");
        self.cell_sizes = sizes;
        self.rebuild_params()
    }

    /// Cell sizes, coarsest to finest.
    pub fn cell_sizes(&self) -> &[f32] {
        &self.cell_sizes
    }

    /// Maximum line-search step length.
    pub fn set_step_size(&mut self, step_size: f64) {
        self.opt_config.step_size = step_size;
    }

    pub fn step_size(&self) -> f64 {
        self.opt_config.step_size
    }

    /// Fraction of point mass attributed to the uniform outlier component.
    pub fn set_outlier_ratio(&mut self, outlier_ratio: f64) -> Result<(), RegistrationError> {
        if !(outlier_ratio > 0.0 && outlier_ratio < 1.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "outlier ratio must lie in (0, 1), got {outlier_ratio}"
            )));
        }
        self.outlier_ratio = outlier_ratio;
        self.rebuild_params()
    }

    pub fn outlier_ratio(&self) -> f64 {
        self.outlier_ratio
    }

    /// Iteration cap per resolution.
    pub fn set_maximum_iterations(&mut self, max_iterations: usize) {
        self.opt_config.max_iterations = max_iterations;
    }

    pub fn maximum_iterations(&self) -> usize {
        self.opt_config.max_iterations
    }

    /// Convergence threshold on the accepted step length.
    pub fn set_transformation_epsilon(&mut self, epsilon: f64) {
        self.opt_config.transformation_epsilon = epsilon;
    }

    pub fn transformation_epsilon(&self) -> f64 {
        self.opt_config.transformation_epsilon
    }

    /// Normalised score of the last run (value / source point count).
    pub fn transformation_probability(&self) -> f64 {
        self.trans_probability
    }

    /// Iterations spent at the last-run resolution.
    pub fn final_num_iterations(&self) -> usize {
        self.nr_iterations
    }

    /// Score Hessian at the last evaluation of the finest completed
    /// resolution. Reference convention: this stores the Hessian itself.
    pub fn covariance(&self) -> Matrix3<f64> {
        self.covariance
    }

    /// Inverse of [`covariance`](Self::covariance) (identity when singular).
    pub fn information_matrix(&self) -> Matrix3<f64> {
        self.inform_matrix
    }

    pub fn final_transformation(&self) -> Matrix4<f64> {
        self.final_transformation
    }

    pub fn has_converged(&self) -> bool {
        self.converged
    }

    fn rebuild_cell_sizes(&mut self) {
        self.cell_sizes.clear();
        for i in (0..self.layer_count).rev() {
            self.cell_sizes
                .push(self.base_cell_size * 2_f32.powi(i as i32));
        }
    }

    fn rebuild_params(&mut self) -> Result<(), RegistrationError> {
        let mut params = Vec::with_capacity(self.cell_sizes.len());
        for cell_size in &self.cell_sizes {
            params.push(FittingParams::new(self.outlier_ratio, *cell_size as f64)?);
        }
        self.params = params;
        Ok(())
    }

    fn check_cloud(cloud: &[[f32; 3]]) -> Result<Vec<[f32; 3]>, RegistrationError> {
        if cloud.is_empty() {
            return Err(RegistrationError::InvalidParameter(
                "input cloud is empty".into(),
            ));
        }
        Ok(cloud.to_vec())
    }
}

impl Default for D2dNdt2d {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration2d for D2dNdt2d {
    fn set_input_source(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError> {
        self.source = Some(Self::check_cloud(cloud)?);
        Ok(())
    }

    fn set_input_target(&mut self, cloud: &[[f32; 3]]) -> Result<(), RegistrationError> {
        self.target = Some(Self::check_cloud(cloud)?);
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

        let mut pose = se2::mat_to_vec(guess);
        debug!(x = pose.x, y = pose.y, theta = pose.z, "alignment guess");

        self.converged = false;

        let schedule: Vec<(f32, FittingParams)> = self
            .cell_sizes
            .iter()
            .copied()
            .zip(self.params.iter().copied())
            .collect();

        for (cell_size, params) in &schedule {
            let target_grid = VoxelGrid::from_points(&target, *cell_size)?;
            let source_grid = VoxelGrid::from_points(&source, *cell_size)?;

            let entry_pose = pose;
            let outcome = optimize_at_resolution(
                params,
                source_grid.cells(),
                &target_grid,
                pose,
                &self.opt_config,
                source.len(),
            );

            self.trans_probability = outcome.trans_probability;
            self.covariance = outcome.covariance;
            self.inform_matrix = outcome.information;
            self.nr_iterations = outcome.iterations;

            if !outcome.status.is_converged() {
                // Abort the whole schedule; report the pose this resolution
                // started from.
                self.final_transformation = se2::vec_to_mat(&entry_pose);
                return Ok(AlignOutcome {
                    status: ConvergenceStatus::InsufficientOverlap,
                    converged: false,
                    final_transformation: self.final_transformation,
                    aligned_cloud: se2::transform_cloud(&source, &self.final_transformation),
                });
            }

            pose = outcome.pose;
        }

        self.converged = true;
        self.final_transformation = se2::vec_to_mat(&pose);
        debug!(x = pose.x, y = pose.y, theta = pose.z, "alignment finished");

        Ok(AlignOutcome {
            status: ConvergenceStatus::Converged,
            converged: true,
            final_transformation: self.final_transformation,
            aligned_cloud: se2::transform_cloud(&source, &self.final_transformation),
        })
    }
}
