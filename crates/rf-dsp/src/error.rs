//! Error types for the DSP crate

use thiserror::Error;

/// Filterbank error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterbankError {
    /// Hop size must be even and at least two samples
    #[error("Invalid hop size: {0}")]
    InvalidHopSize(usize),

    /// Channel count out of range
    #[error("Invalid channel count: {got} (supported: 1..={max})")]
    InvalidChannelCount { max: usize, got: usize },
}

/// Result type for filterbank operations
pub type FilterbankResult<T> = Result<T, FilterbankError>;
