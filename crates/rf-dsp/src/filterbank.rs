//! STFT analysis/synthesis filterbank
//!
//! Multichannel short-time Fourier transform with 50% overlap and a
//! square-root periodic Hann window on both sides, which gives perfect
//! reconstruction when the spectra are passed through untouched.
//!
//! The transform is hop-driven: each call to [`StftFilterbank::forward`]
//! consumes exactly one hop of samples for one channel and produces one
//! spectrum of `hop_size + 1` bands. [`StftFilterbank::inverse`] is the
//! mirror image. Neither call allocates.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;

use crate::Processor;
use crate::error::{FilterbankError, FilterbankResult};

/// Upper bound on channels per direction
pub const MAX_FILTERBANK_CHANNELS: usize = 256;

/// Processing delay of an STFT with the given hop size, in samples
pub const fn processing_delay(hop_size: usize) -> usize {
    hop_size
}

/// Centre frequency of `bin` for a filterbank with the given hop size
pub fn bin_frequency(bin: usize, hop_size: usize, sample_rate: f32) -> f32 {
    bin as f32 * sample_rate / (2 * hop_size) as f32
}

// ============ Channel State ============

/// Per-input analysis state (previous hop)
#[derive(Clone)]
struct AnalysisState {
    history: Vec<f32>,
}

impl AnalysisState {
    fn new(hop_size: usize) -> Self {
        Self {
            history: vec![0.0; hop_size],
        }
    }
}

/// Per-output synthesis state (overlap-add tail)
#[derive(Clone)]
struct SynthesisState {
    overlap: Vec<f32>,
}

impl SynthesisState {
    fn new(hop_size: usize) -> Self {
        Self {
            overlap: vec![0.0; hop_size],
        }
    }
}

// ============ Filterbank ============

/// Multichannel STFT filterbank
pub struct StftFilterbank {
    /// Hop size (samples per call)
    hop_size: usize,
    /// FFT size (two hops)
    fft_size: usize,
    /// sqrt-Hann window, used for analysis and synthesis
    window: Vec<f32>,
    /// FFT planner outputs
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    analysis: Vec<AnalysisState>,
    synthesis: Vec<SynthesisState>,
    /// Scratch buffers
    time_scratch: Vec<f32>,
    freq_scratch: Vec<Complex32>,
    forward_scratch: Vec<Complex32>,
    inverse_scratch: Vec<Complex32>,
}

impl StftFilterbank {
    /// Create a filterbank for `num_inputs` analysis and `num_outputs`
    /// synthesis channels
    pub fn new(hop_size: usize, num_inputs: usize, num_outputs: usize) -> FilterbankResult<Self> {
        if hop_size < 2 || hop_size % 2 != 0 {
            return Err(FilterbankError::InvalidHopSize(hop_size));
        }
        validate_channels(num_inputs, num_outputs)?;

        let fft_size = 2 * hop_size;
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| (PI * i as f32 / fft_size as f32).sin())
            .collect();

        let forward_scratch = fft_forward.make_scratch_vec();
        let inverse_scratch = fft_inverse.make_scratch_vec();

        log::debug!(
            "STFT filterbank: hop {}, fft {}, {} in / {} out",
            hop_size,
            fft_size,
            num_inputs,
            num_outputs
        );

        Ok(Self {
            hop_size,
            fft_size,
            window,
            fft_forward,
            fft_inverse,
            analysis: vec![AnalysisState::new(hop_size); num_inputs],
            synthesis: vec![SynthesisState::new(hop_size); num_outputs],
            time_scratch: vec![0.0; fft_size],
            freq_scratch: vec![Complex32::new(0.0, 0.0); hop_size + 1],
            forward_scratch,
            inverse_scratch,
        })
    }

    /// Change channel counts, keeping the state of surviving channels
    pub fn channel_change(&mut self, num_inputs: usize, num_outputs: usize) -> FilterbankResult<()> {
        validate_channels(num_inputs, num_outputs)?;

        let hop = self.hop_size;
        self.analysis.resize_with(num_inputs, || AnalysisState::new(hop));
        self.synthesis.resize_with(num_outputs, || SynthesisState::new(hop));

        log::debug!(
            "STFT filterbank channel change: {} in / {} out",
            num_inputs,
            num_outputs
        );
        Ok(())
    }

    /// Hop size
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of frequency bands per spectrum
    pub fn num_bands(&self) -> usize {
        self.hop_size + 1
    }

    /// Number of analysis channels
    pub fn num_inputs(&self) -> usize {
        self.analysis.len()
    }

    /// Number of synthesis channels
    pub fn num_outputs(&self) -> usize {
        self.synthesis.len()
    }

    /// Delay between input and reconstructed output, in samples
    pub fn processing_delay(&self) -> usize {
        processing_delay(self.hop_size)
    }

    /// Analyse one hop of `channel` into `spectrum`.
    ///
    /// `hop` must hold `hop_size` samples and `spectrum` at least
    /// `num_bands()` bins. Unknown channels produce a zero spectrum.
    pub fn forward(&mut self, channel: usize, hop: &[f32], spectrum: &mut [Complex32]) {
        let bands = self.num_bands();
        let Some(state) = self.analysis.get_mut(channel) else {
            spectrum.iter_mut().take(bands).for_each(|c| *c = Complex32::new(0.0, 0.0));
            return;
        };
        debug_assert_eq!(hop.len(), self.hop_size);

        let h = self.hop_size;
        for i in 0..h {
            self.time_scratch[i] = state.history[i] * self.window[i];
            self.time_scratch[h + i] = hop[i] * self.window[h + i];
        }
        state.history.copy_from_slice(&hop[..h]);

        let result = self.fft_forward.process_with_scratch(
            &mut self.time_scratch,
            &mut spectrum[..bands],
            &mut self.forward_scratch,
        );
        debug_assert!(result.is_ok(), "forward FFT buffer sizes");
    }

    /// Synthesise one hop of `channel` from `spectrum`.
    ///
    /// Unknown channels produce silence.
    pub fn inverse(&mut self, channel: usize, spectrum: &[Complex32], hop: &mut [f32]) {
        let Some(state) = self.synthesis.get_mut(channel) else {
            hop.fill(0.0);
            return;
        };
        debug_assert_eq!(hop.len(), self.hop_size);

        let bands = self.hop_size + 1;
        self.freq_scratch.copy_from_slice(&spectrum[..bands]);
        // DC and Nyquist must be real for a real-valued output
        self.freq_scratch[0].im = 0.0;
        self.freq_scratch[bands - 1].im = 0.0;

        let result = self.fft_inverse.process_with_scratch(
            &mut self.freq_scratch,
            &mut self.time_scratch,
            &mut self.inverse_scratch,
        );
        debug_assert!(result.is_ok(), "inverse FFT buffer sizes");

        let norm = 1.0 / self.fft_size as f32;
        let h = self.hop_size;
        for i in 0..h {
            hop[i] = state.overlap[i] + self.time_scratch[i] * self.window[i] * norm;
            state.overlap[i] = self.time_scratch[h + i] * self.window[h + i] * norm;
        }
    }
}

impl Processor for StftFilterbank {
    fn reset(&mut self) {
        for state in &mut self.analysis {
            state.history.fill(0.0);
        }
        for state in &mut self.synthesis {
            state.overlap.fill(0.0);
        }
        self.time_scratch.fill(0.0);
    }

    fn latency(&self) -> usize {
        self.processing_delay()
    }
}

fn validate_channels(num_inputs: usize, num_outputs: usize) -> FilterbankResult<()> {
    for count in [num_inputs, num_outputs] {
        if count == 0 || count > MAX_FILTERBANK_CHANNELS {
            return Err(FilterbankError::InvalidChannelCount {
                max: MAX_FILTERBANK_CHANNELS,
                got: count,
            });
        }
    }
    Ok(())
}
