//! Newton-based optimisation of the D2D-NDT score.
//!
//! One resolution at a time:
//! 1. Evaluate score, gradient and Hessian at the current pose
//! 2. Solve the Newton system through a full SVD
//! 3. Pick a step length with the More–Thuente search
//! 4. Update the pose and test convergence

pub mod more_thuente;
pub mod newton;
pub mod solver;
pub mod types;

pub use more_thuente::{more_thuente_search, MoreThuenteConfig};
pub use newton::{newton_step, SVD_TOLERANCE};
pub use solver::optimize_at_resolution;
pub use types::{ConvergenceStatus, OptimizationConfig, ResolutionOutcome};
