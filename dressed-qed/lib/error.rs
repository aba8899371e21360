//! Failure modes for every stage of a dressed solve.

use thiserror::Error;

/// Errors that can occur while building inputs or running any of the solver
/// stages.
///
/// Construction-time checks always surface as [`Error::InvalidInput`]; the
/// remaining variants carry enough of the solver state (last residual,
/// iteration count, offending frequency) to decide whether to retry with
/// relaxed settings.
#[derive(Debug, Error)]
pub enum Error {
    /// A Green's function evaluation was requested within `epsilon` of a
    /// vacuum mode frequency.
    #[error("Green's function diverges at omega = {omega} (within {epsilon:.1e} of vacuum pole {pole})")]
    DivergentEvaluation { omega: f64, pole: f64, epsilon: f64 },

    /// The Newton search for a dressed photon frequency failed inside its
    /// bracket.
    #[error("no root for mode {mode} in ({lower}, {upper}) after {iterations} iterations (|f| = {residual:.2e}): {reason}")]
    RootNotFound {
        mode: usize,
        lower: f64,
        upper: f64,
        iterations: usize,
        residual: f64,
        reason: String,
    },

    /// A converged dressed frequency whose mode cannot be normalized: the
    /// residue norm `Re(v† λ ∂G/∂ω λ† v)` is zero, negative, or non-finite.
    #[error("dressed mode {mode} at omega = {omega} has degenerate residue norm {norm:.2e}")]
    DegenerateMode { mode: usize, omega: f64, norm: f64 },

    /// A self-energy denominator came too close to zero under
    /// [`ResonancePolicy::Fail`][crate::config::ResonancePolicy::Fail].
    #[error("resonant self-energy term for level {level}, photon mode {mode} (denominator {denominator:.2e})")]
    ResonanceFailure { level: usize, mode: usize, denominator: f64 },

    /// The matter fixed-point iteration hit its cap without meeting
    /// tolerance (or produced a non-finite residual).
    #[error("fixed-point iteration failed to converge after {iterations} iterations (residual: {residual:.2e})")]
    NonConvergence { iterations: usize, residual: f64 },

    /// Malformed system or configuration data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("linear algebra error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("npz error: {0}")]
    Npz(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid<S>(msg: S) -> Self
    where S: Into<String>
    {
        Self::InvalidInput(msg.into())
    }
}
