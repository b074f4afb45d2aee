//! Error types for registration configuration.

use thiserror::Error;

/// Errors raised while configuring a registration object.
///
/// Run-level outcomes (insufficient overlap, failed robust alignment) are
/// not errors; they are reported through
/// [`ConvergenceStatus`](crate::optimization::ConvergenceStatus).
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A parameter is outside its admissible range, or a supplied cloud is
    /// empty.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// `align` was called before the named input was set.
    #[error("missing input: {0}")]
    MissingInput(&'static str),
}
