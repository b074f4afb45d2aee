//! 2-D distribution-to-distribution NDT scan registration.
//!
//! This library aligns a moving *source* point cloud to a fixed *target*
//! cloud in the plane, estimating a rigid transformation (x, y, θ). Both
//! clouds are abstracted into voxel grids of Gaussians (mean + covariance
//! per cell) and the registration maximises the agreement between the two
//! sets of distributions.
//!
//! # Architecture
//!
//! The alignment is split into stages:
//! - Voxel grid construction per resolution ([`voxel_grid`])
//! - Analytic score, gradient and Hessian of the D2D objective
//!   ([`derivatives`])
//! - Newton iteration with a More–Thuente line search ([`optimization`])
//! - A coarse-to-fine schedule over grid resolutions ([`D2dNdt2d`])
//! - A robust wrapper staging direct D2D, a correlative reseed and an
//!   independent validator ([`D2dNdt2dRobust`])
//!
//! # Usage
//!
//! ```ignore
//! use ndt2d::{D2dNdt2d, Registration2d};
//! use nalgebra::Matrix4;
//!
//! let mut ndt = D2dNdt2d::new();
//! ndt.set_input_source(&scan)?;
//! ndt.set_input_target(&map)?;
//!
//! let outcome = ndt.align(&Matrix4::identity())?;
//! println!(
//!     "converged: {}, probability: {}",
//!     outcome.converged,
//!     ndt.transformation_probability()
//! );
//! ```

pub mod correlative;
pub mod d2d;
pub mod derivatives;
pub mod error;
pub mod icp;
pub mod lookup;
pub mod optimization;
pub mod registration;
pub mod robust;
pub mod se2;
pub mod test_utils;
pub mod voxel_grid;

pub use correlative::CorrelativeEstimation;
pub use d2d::D2dNdt2d;
pub use derivatives::{FittingParams, JacobianHessianDerivatives, ScoreAndDerivatives};
pub use error::RegistrationError;
pub use icp::IterativeClosestPoint2d;
pub use lookup::LookUpTable;
pub use optimization::{ConvergenceStatus, OptimizationConfig};
pub use registration::{AlignOutcome, Registration2d};
pub use robust::D2dNdt2dRobust;
pub use voxel_grid::{Voxel, VoxelGrid, VoxelGridConfig};
