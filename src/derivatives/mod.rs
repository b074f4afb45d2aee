//! Score and derivative computation for the D2D-NDT objective.
//!
//! The objective compares Gaussians fitted to voxel cells of the source and
//! target clouds. For a pose p and a pair of cells, the contribution is
//!
//! `-d1 * exp(-d2/2 * Δᵀ(Σₛ+Σₜ)⁻¹Δ)`
//!
//! with Δ the difference of the transformed source mean and the target mean.
//! The gradient and Hessian are analytic in (x, y, θ); only the θ coordinate
//! has non-trivial second-order structure.

pub mod cpu;
pub mod types;

pub use cpu::{compute_derivatives, compute_score, pair_score, NEIGHBOR_COUNT};
pub use types::{FittingParams, JacobianHessianDerivatives, ScoreAndDerivatives};
