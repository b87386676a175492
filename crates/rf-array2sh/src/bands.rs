//! Frequency band table
//!
//! One centre frequency per filterbank band. Two sample rates are
//! supported, each with its own table; band 0 is moved off DC so filter
//! design never evaluates the array response at zero frequency.

use rf_dsp::filterbank::bin_frequency;

use crate::{HOP_SIZE, NUM_BANDS};

/// Supported sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedRate {
    Hz44100,
    Hz48000,
}

impl SupportedRate {
    /// Map a host rate onto a supported table; anything else uses 48 kHz
    pub fn from_hz(sample_rate: u32) -> Self {
        match sample_rate {
            44100 => SupportedRate::Hz44100,
            48000 => SupportedRate::Hz48000,
            other => {
                log::warn!("Unsupported sample rate {} Hz, using the 48 kHz band table", other);
                SupportedRate::Hz48000
            }
        }
    }

    pub fn as_hz(&self) -> f32 {
        match self {
            SupportedRate::Hz44100 => 44100.0,
            SupportedRate::Hz48000 => 48000.0,
        }
    }
}

/// Centre frequency of every band for one sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable {
    rate: SupportedRate,
    sample_rate: u32,
    freqs: [f32; NUM_BANDS],
}

impl BandTable {
    pub fn new(sample_rate: u32) -> Self {
        let rate = SupportedRate::from_hz(sample_rate);
        let mut freqs = [0.0f32; NUM_BANDS];
        for (bin, f) in freqs.iter_mut().enumerate() {
            *f = bin_frequency(bin, HOP_SIZE, rate.as_hz());
        }
        // avoids the DC singularity in filter design
        freqs[0] = freqs[1] / 4.0;

        Self {
            rate,
            sample_rate,
            freqs,
        }
    }

    /// Host sample rate this table was created for
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Rate whose table is in use
    pub fn rate(&self) -> SupportedRate {
        self.rate
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.freqs
    }

    pub fn frequency(&self, band: usize) -> f32 {
        self.freqs[band]
    }

    pub fn len(&self) -> usize {
        NUM_BANDS
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
