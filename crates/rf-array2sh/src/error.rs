//! Error types for array encoding

use rf_dsp::FilterbankError;
use thiserror::Error;

/// Array encoder error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpatialError {
    /// Time-frequency transform could not be (re)initialised
    #[error("Filterbank initialisation failed: {0}")]
    Filterbank(#[from] FilterbankError),

    /// Encoder is faulted and can no longer process audio
    #[error("Encoder is faulted after a filterbank failure")]
    Faulted,

    /// Invalid Ambisonic order
    #[error("Invalid Ambisonic order: {0} (supported: 1..=7)")]
    InvalidAmbisonicOrder(usize),

    /// Invalid channel count
    #[error("Invalid channel count: expected {expected}, got {got}")]
    InvalidChannelCount { expected: usize, got: usize },

    /// Solver returned something other than one regular matrix per band
    #[error("Solver contract violated: {0}")]
    SolverContract(String),

    /// Linear algebra failure inside the solver
    #[error("Solver error: {0}")]
    Solver(String),
}

/// Result type for encoder operations
pub type SpatialResult<T> = Result<T, SpatialError>;
