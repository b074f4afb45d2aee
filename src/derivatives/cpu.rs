//! Score, gradient and Hessian of the D2D-NDT objective.
//!
//! Every transformed source cell is paired with its nearest target cells and
//! each pair contributes
//!
//! `value = -d1 * exp(-d2/2 * Δᵀ(Σₛ+Σₜ)⁻¹Δ)`, Δ = μₛ − μₜ,
//!
//! together with the analytic gradient and Hessian of that value with
//! respect to the pose (x, y, θ). The accumulation over cells runs in
//! parallel; addition of contributions is associative, so the reduction
//! order only affects floating-point rounding.

use nalgebra::{Matrix3, RowVector3, Vector3};
use rayon::prelude::*;

use super::types::{FittingParams, JacobianHessianDerivatives, ScoreAndDerivatives};
use crate::se2;
use crate::voxel_grid::{Voxel, VoxelGrid};

/// Number of nearest target cells paired with each source cell.
pub const NEIGHBOR_COUNT: usize = 2;

/// Fill the derivative kit for one transformed source cell.
///
/// `x` and `cov` are the cell mean and covariance already transformed by the
/// current pose. Only the θ slice (pose index 2) carries non-trivial
/// entries; the Hessian blocks are skipped unless requested.
pub fn compute_derivatives(
    x: &Vector3<f64>,
    cov: &Matrix3<f64>,
    calc_hessian: bool,
) -> JacobianHessianDerivatives {
    let mut data = JacobianHessianDerivatives::zeros();

    data.jest[(0, 0)] = 1.0;
    data.jest[(1, 1)] = 1.0;
    data.jest[(0, 2)] = -x.y;
    data.jest[(1, 2)] = x.x;

    data.zest
        .fixed_view_mut::<3, 3>(0, 6)
        .copy_from(&Matrix3::new(
            -2.0 * cov[(0, 1)],
            cov[(0, 0)] - cov[(1, 1)],
            -cov[(1, 2)],
            cov[(0, 0)] - cov[(1, 1)],
            2.0 * cov[(0, 1)],
            cov[(0, 2)],
            -cov[(1, 2)],
            cov[(0, 2)],
            0.0,
        ));

    if calc_hessian {
        data.hest[(6, 2)] = -x.x;
        data.hest[(7, 2)] = -x.y;

        data.zhest
            .fixed_view_mut::<3, 3>(6, 6)
            .copy_from(&Matrix3::new(
                2.0 * (cov[(1, 1)] - cov[(0, 0)]),
                -4.0 * cov[(0, 1)],
                -cov[(0, 2)],
                -4.0 * cov[(0, 1)],
                2.0 * (cov[(0, 0)] - cov[(1, 1)]),
                -cov[(1, 2)],
                -cov[(0, 2)],
                -cov[(1, 2)],
                0.0,
            ));
    }

    data
}

/// Contribution of one (source cell, target cell) pair.
///
/// Pairs with a singular covariance sum or a non-finite Mahalanobis
/// distance contribute zero; those failures are absorbed here and never
/// surface.
pub fn pair_score(
    mean_source: &Vector3<f64>,
    cov_source: &Matrix3<f64>,
    target: &Voxel,
    deriv: &JacobianHessianDerivatives,
    params: &FittingParams,
    calc_hessian: bool,
) -> ScoreAndDerivatives {
    let diff = mean_source - target.mean;
    let cov_sum = target.covariance + cov_source;

    let Some(icov) = cov_sum.try_inverse() else {
        return ScoreAndDerivatives::zeros();
    };

    let dist = diff.dot(&(icov * diff));
    if !dist.is_finite() {
        return ScoreAndDerivatives::zeros();
    }

    let value = -params.d1 * (-params.d2_half * dist).exp();

    let xt_b: RowVector3<f64> = diff.transpose() * icov;
    let xt_b_j: Vector3<f64> = (xt_b * deriv.jest).transpose();

    let z_theta = deriv.zest.fixed_view::<3, 3>(0, 6).into_owned();
    let tmp1: RowVector3<f64> = xt_b * z_theta * icov;

    let mut xt_b_z_b_x = Vector3::zeros();
    xt_b_z_b_x[2] = (tmp1 * diff)[(0, 0)];

    let q = 2.0 * xt_b_j - xt_b_z_b_x;
    let factor = -params.d2_half * value;

    let mut result = ScoreAndDerivatives::zeros();
    result.value = value;
    result.gradient = q * factor;

    if calc_hessian {
        let mut xt_b_z_b_j = Matrix3::zeros();
        xt_b_z_b_j.set_column(2, &(tmp1 * deriv.jest).transpose());

        let mut xt_bh = Matrix3::zeros();
        let mut xt_b_z_b_z_b_x = Matrix3::zeros();
        let mut xt_b_zh_b_x = Matrix3::zeros();
        for j in 0..3 {
            let h_col = deriv.hest.fixed_view::<3, 1>(6, j).into_owned();
            xt_bh[(2, j)] = (xt_b * h_col)[(0, 0)];

            let z_j = deriv.zest.fixed_view::<3, 3>(0, 3 * j).into_owned();
            xt_b_z_b_z_b_x[(2, j)] = (tmp1 * z_j * icov * diff)[(0, 0)];

            let zh_j = deriv.zhest.fixed_view::<3, 3>(6, 3 * j).into_owned();
            xt_b_zh_b_x[(2, j)] = (xt_b * zh_j * icov * diff)[(0, 0)];
        }

        result.hessian = factor
            * (2.0 * deriv.jest.transpose() * icov * deriv.jest + 2.0 * xt_bh
                - xt_b_zh_b_x
                - 2.0 * xt_b_z_b_j.transpose()
                - 2.0 * xt_b_z_b_j
                + xt_b_z_b_z_b_x
                + xt_b_z_b_z_b_x.transpose()
                - params.d2_half * q * q.transpose());
    }

    result
}

/// Total score of a candidate pose over all source cells.
///
/// Each source cell is transformed by the pose, its derivative kit is
/// filled, and the contributions of its `NEIGHBOR_COUNT` nearest target
/// cells are accumulated. Cells are partitioned across rayon workers, each
/// holding its own accumulator; the final reduction is a plain sum.
pub fn compute_score(
    params: &FittingParams,
    source_cells: &[Voxel],
    target_grid: &VoxelGrid,
    pose: &Vector3<f64>,
    calc_hessian: bool,
) -> ScoreAndDerivatives {
    let trans = se2::vec_to_mat(pose);
    let rot = se2::rotation(&trans);

    source_cells
        .par_iter()
        .fold(ScoreAndDerivatives::zeros, |mut acc, cell| {
            let mean_source = se2::transform_point(&trans, &cell.mean);
            let cov_source = rot * cell.covariance * rot.transpose();

            let deriv = compute_derivatives(&mean_source, &cov_source, calc_hessian);

            let query = [
                mean_source.x as f32,
                mean_source.y as f32,
                mean_source.z as f32,
            ];
            for (idx, _) in target_grid.nearest_k(&query, NEIGHBOR_COUNT) {
                acc += pair_score(
                    &mean_source,
                    &cov_source,
                    &target_grid.cells()[idx],
                    &deriv,
                    params,
                    calc_hessian,
                );
            }
            acc
        })
        .reduce(ScoreAndDerivatives::zeros, |a, b| a + b)
}
