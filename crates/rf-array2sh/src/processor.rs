//! Per-block encoding pipeline
//!
//! framing → forward STFT → per-band W·X → masking and post gain →
//! inverse STFT → channel reordering → normalisation.
//!
//! Every buffer is allocated once in [`FrameProcessor::new`]; nothing here
//! allocates, locks or logs.

use ndarray::{Array2, Array3, s};
use num_complex::Complex32;
use rf_dsp::StftFilterbank;

use crate::config::{ChannelOrdering, Normalization};
use crate::matrix::EncodingMatrices;
use crate::{FRAME_SIZE, HOP_SIZE, MAX_NUM_SENSORS, MAX_NUM_SH_SIGNALS, NUM_BANDS, TIME_SLOTS};

/// Scalar parameters for one block, snapshotted by the encoder
#[derive(Debug, Clone, Copy)]
pub struct FrameParams {
    /// Sensors the filterbank and matrices were built for
    pub num_sensors: usize,
    /// Harmonics the filterbank and matrices were built for
    pub num_sh: usize,
    /// Order matching `num_sh`
    pub order: usize,
    pub post_gain: f32,
    pub max_frequency_hz: f32,
    pub ordering: ChannelOrdering,
    pub normalization: Normalization,
    pub is_playing: bool,
}

/// Preallocated frame buffers
pub struct FrameBuffers {
    /// Sensor signals, one row per sensor
    input_frame: Array2<f32>,
    /// Encoded N3D/ACN signals, one row per harmonic
    output_frame: Array2<f32>,
    /// (band, sensor, time slot)
    input_tf: Array3<Complex32>,
    /// (band, harmonic, time slot)
    output_tf: Array3<Complex32>,
    spectrum: Vec<Complex32>,
    hop: Vec<f32>,
}

impl FrameBuffers {
    pub fn new() -> Self {
        Self {
            input_frame: Array2::zeros((MAX_NUM_SENSORS, FRAME_SIZE)),
            output_frame: Array2::zeros((MAX_NUM_SH_SIGNALS, FRAME_SIZE)),
            input_tf: Array3::zeros((NUM_BANDS, MAX_NUM_SENSORS, TIME_SLOTS)),
            output_tf: Array3::zeros((NUM_BANDS, MAX_NUM_SH_SIGNALS, TIME_SLOTS)),
            spectrum: vec![Complex32::new(0.0, 0.0); NUM_BANDS],
            hop: vec![0.0; HOP_SIZE],
        }
    }
}

impl Default for FrameBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one block through the pipeline
pub struct FrameProcessor {
    buffers: FrameBuffers,
}

impl FrameProcessor {
    pub fn new() -> Self {
        Self {
            buffers: FrameBuffers::new(),
        }
    }

    /// Encode one `FRAME_SIZE` block. The caller guarantees block lengths
    /// and that the filterbank and matrices match `params`.
    pub fn process(
        &mut self,
        filterbank: &mut StftFilterbank,
        matrices: &EncodingMatrices,
        frequencies: &[f32],
        params: &FrameParams,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
    ) {
        let q = params.num_sensors.min(MAX_NUM_SENSORS);
        let nsh = params.num_sh.min(MAX_NUM_SH_SIGNALS);
        let buf = &mut self.buffers;

        // Framing, zero-filling missing sensors
        for ch in 0..q {
            let mut row = buf.input_frame.row_mut(ch);
            match inputs.get(ch) {
                Some(input) => row.iter_mut().zip(input.iter()).for_each(|(d, s)| *d = *s),
                None => row.fill(0.0),
            }
        }

        // Analysis
        for t in 0..TIME_SLOTS {
            for ch in 0..q {
                let src = buf.input_frame.slice(s![ch, t * HOP_SIZE..(t + 1) * HOP_SIZE]);
                buf.hop.iter_mut().zip(src.iter()).for_each(|(d, s)| *d = *s);
                filterbank.forward(ch, &buf.hop, &mut buf.spectrum);
                for (band, bin) in buf.spectrum.iter().enumerate() {
                    buf.input_tf[(band, ch, t)] = *bin;
                }
            }
        }

        // Encoding, Y = W·X per band. Accumulated by hand: gemm packs into
        // a fresh buffer on every call.
        if params.is_playing {
            for band in 0..NUM_BANDS {
                let w = matrices.band(band);
                for j in 0..nsh {
                    for t in 0..TIME_SLOTS {
                        let mut acc = Complex32::new(0.0, 0.0);
                        for sensor in 0..q {
                            acc += w[(j, sensor)] * buf.input_tf[(band, sensor, t)];
                        }
                        buf.output_tf[(band, j, t)] = acc;
                    }
                }
            }
        } else {
            buf.output_tf.fill(Complex32::new(0.0, 0.0));
        }

        // Masking and post gain
        for (band, &freq) in frequencies.iter().enumerate().take(NUM_BANDS) {
            let gain = band_gain(freq, params.max_frequency_hz, params.post_gain);
            let mut bins = buf.output_tf.slice_mut(s![band, ..nsh, ..]);
            if gain == 0.0 {
                bins.fill(Complex32::new(0.0, 0.0));
            } else {
                bins.mapv_inplace(|v| v * gain);
            }
        }

        // Synthesis
        for t in 0..TIME_SLOTS {
            for ch in 0..nsh {
                for (band, bin) in buf.spectrum.iter_mut().enumerate() {
                    *bin = buf.output_tf[(band, ch, t)];
                }
                filterbank.inverse(ch, &buf.spectrum, &mut buf.hop);
                buf.output_frame
                    .slice_mut(s![ch, t * HOP_SIZE..(t + 1) * HOP_SIZE])
                    .iter_mut()
                    .zip(buf.hop.iter())
                    .for_each(|(d, s)| *d = *s);
            }
        }

        reorder_channels(params.ordering, &buf.output_frame, nsh, outputs);
        apply_normalization(params.normalization, params.order, outputs);
    }
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Gain for a band: post gain below the cutoff, zero at or above it
pub fn band_gain(freq: f32, max_frequency_hz: f32, post_gain: f32) -> f32 {
    if freq < max_frequency_hz { post_gain } else { 0.0 }
}

/// Copy the first `num_sh` rows of `frame` into `outputs` in the requested
/// order. Outputs without a source are zeroed.
pub fn reorder_channels(ordering: ChannelOrdering, frame: &Array2<f32>, num_sh: usize, outputs: &mut [&mut [f32]]) {
    match ordering {
        ChannelOrdering::Acn => {
            for (ch, out) in outputs.iter_mut().enumerate() {
                if ch < num_sh {
                    copy_row(frame, ch, out);
                } else {
                    out.fill(0.0);
                }
            }
        }
        ChannelOrdering::FuMa => {
            if outputs.len() >= 4 && num_sh >= 4 {
                // ACN W,Y,Z,X → FuMa W,X,Y,Z
                copy_row(frame, 0, outputs[0]);
                copy_row(frame, 3, outputs[1]);
                copy_row(frame, 1, outputs[2]);
                copy_row(frame, 2, outputs[3]);
                outputs[4..].iter_mut().for_each(|out| out.fill(0.0));
            } else {
                outputs.iter_mut().for_each(|out| out.fill(0.0));
            }
        }
    }
}

fn copy_row(frame: &Array2<f32>, row: usize, out: &mut [f32]) {
    out.iter_mut()
        .zip(frame.row(row).iter())
        .for_each(|(d, s)| *d = *s);
}

/// Gain turning an N3D signal on output `channel` into the requested
/// normalisation. FuMa is defined for the first four channels only.
pub fn normalization_gain(normalization: Normalization, channel: usize) -> f32 {
    match normalization {
        Normalization::N3D => 1.0,
        Normalization::SN3D => {
            let n = (channel as f32).sqrt().floor();
            1.0 / (2.0 * n + 1.0).sqrt()
        }
        Normalization::FuMa => match channel {
            0 => std::f32::consts::FRAC_1_SQRT_2,
            1..=3 => 1.0 / 3.0f32.sqrt(),
            _ => 0.0,
        },
    }
}

/// Convert the N3D output block in place
pub fn apply_normalization(normalization: Normalization, order: usize, outputs: &mut [&mut [f32]]) {
    match normalization {
        Normalization::N3D => {}
        Normalization::SN3D => {
            let limit = ((order + 1) * (order + 1)).min(outputs.len());
            for (ch, out) in outputs.iter_mut().enumerate().take(limit) {
                let gain = normalization_gain(Normalization::SN3D, ch);
                out.iter_mut().for_each(|v| *v *= gain);
            }
        }
        Normalization::FuMa => {
            if outputs.len() >= 4 {
                for (ch, out) in outputs.iter_mut().enumerate().take(4) {
                    let gain = normalization_gain(Normalization::FuMa, ch);
                    out.iter_mut().for_each(|v| *v *= gain);
                }
            } else {
                outputs.iter_mut().for_each(|out| out.fill(0.0));
            }
        }
    }
}
