//! rf-dsp: DSP building blocks for FluxForge
//!
//! ## Modules
//! - `filterbank` - Multichannel STFT analysis/synthesis filterbank

pub mod filterbank;

mod error;

pub use error::{FilterbankError, FilterbankResult};
pub use filterbank::StftFilterbank;

/// Trait for all DSP processors
pub trait Processor: Send + Sync {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}
