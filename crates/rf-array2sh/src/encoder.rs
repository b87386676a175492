//! Array encoder engine
//!
//! Host contract, once per block on the audio thread:
//!
//! ```text
//! encoder.checkpoint()?;               // drain deltas, run pending rebuilds
//! encoder.process(&inputs, &mut outputs, is_playing);
//! ```
//!
//! Control threads either call [`ArrayEncoder::apply`] through whatever
//! owns the encoder, or hold the [`EncoderControl`] returned by
//! [`ArrayEncoder::take_control`] and send deltas lock-free.

use crate::array::SensorDirection;
use crate::bands::BandTable;
use crate::config::{ConfigDelta, EncoderSettings, Invalidation};
use crate::control::{ControlQueue, ControlReceiver, DEFAULT_CONTROL_CAPACITY, EncoderControl};
use crate::dirty::{DirtyFlags, DirtyState};
use crate::error::{SpatialError, SpatialResult};
use crate::evaluation::{EvaluationCurves, EvaluationEngine};
use crate::filterbank::FilterbankAdapter;
use crate::matrix::{EncodingMatrices, EncodingMatrixBuilder, MagnitudeCurves};
use crate::processor::{FrameParams, FrameProcessor};
use crate::sh::AmbisonicOrder;
use crate::solver::{HarmonicSolver, TheoreticalSolver};
use crate::{FRAME_SIZE, MAX_NUM_SENSORS};

/// How many times each subsystem has been rebuilt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub filterbank: u64,
    pub matrix: u64,
    pub evaluation: u64,
}

/// Real-time sensor-array to Ambisonics encoder
pub struct ArrayEncoder {
    /// Pending configuration
    settings: EncoderSettings,
    /// Configuration the current matrices were built from
    built: EncoderSettings,
    current_order: AmbisonicOrder,
    current_num_sensors: usize,
    current_num_sh: usize,
    bands: BandTable,
    flags: DirtyFlags,
    filterbank: FilterbankAdapter,
    builder: EncodingMatrixBuilder,
    evaluation: EvaluationEngine,
    frame: FrameProcessor,
    receiver: ControlReceiver,
    control: Option<EncoderControl>,
    evaluation_ready: bool,
    evaluation_valid: bool,
    faulted: bool,
    stats: RebuildStats,
}

impl ArrayEncoder {
    /// Default tetrahedral encoder at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        let mut settings = EncoderSettings::default();
        settings.set_sample_rate(sample_rate);
        Self::with_settings(settings, Box::new(TheoreticalSolver::new()))
    }

    /// Default configuration with a custom solver
    pub fn with_solver(sample_rate: u32, solver: Box<dyn HarmonicSolver>) -> Self {
        let mut settings = EncoderSettings::default();
        settings.set_sample_rate(sample_rate);
        Self::with_settings(settings, solver)
    }

    /// Start from explicit settings (validated before adoption)
    pub fn with_settings(settings: EncoderSettings, solver: Box<dyn HarmonicSolver>) -> Self {
        let settings = settings.validated();
        let (control, receiver) = ControlQueue::new(DEFAULT_CONTROL_CAPACITY).split();

        let mut flags = DirtyFlags::default();
        flags.filterbank.mark_pending();
        flags.matrix.mark_pending();

        log::info!(
            "Array encoder: {} sensors, order {}, {} Hz",
            settings.num_sensors(),
            settings.order().as_usize(),
            settings.sample_rate()
        );

        Self {
            bands: BandTable::new(settings.sample_rate()),
            current_order: settings.order(),
            current_num_sensors: settings.num_sensors(),
            current_num_sh: settings.num_sh(),
            built: settings.clone(),
            settings,
            flags,
            filterbank: FilterbankAdapter::new(),
            builder: EncodingMatrixBuilder::new(solver),
            evaluation: EvaluationEngine::new(),
            frame: FrameProcessor::new(),
            receiver,
            control: Some(control),
            evaluation_ready: false,
            evaluation_valid: false,
            faulted: false,
            stats: RebuildStats::default(),
        }
    }

    /// Lock-free control handle for another thread. Only one exists; later
    /// calls return `None`.
    pub fn take_control(&mut self) -> Option<EncoderControl> {
        self.control.take()
    }

    /// Validate and adopt a configuration change. Only raises flags.
    pub fn apply(&mut self, delta: ConfigDelta) {
        let invalidation = self.settings.apply(delta);
        self.raise(invalidation);
    }

    fn raise(&mut self, invalidation: Invalidation) {
        if invalidation.filterbank {
            self.flags.filterbank.mark_pending();
        }
        if invalidation.matrix {
            self.flags.matrix.mark_pending();
        }
        if invalidation.evaluation {
            self.flags.evaluation.mark_pending();
        }
    }

    /// Drain queued deltas and run every pending rebuild: filterbank, then
    /// matrices, then evaluation. Call from the audio thread before
    /// [`Self::process`].
    pub fn checkpoint(&mut self) -> SpatialResult<()> {
        if self.faulted {
            return Err(SpatialError::Faulted);
        }

        while let Some(delta) = self.receiver.pop() {
            self.apply(delta);
        }

        if self.flags.filterbank.claim() {
            let q = self.settings.num_sensors();
            let nsh = self.settings.num_sh();
            if let Err(e) = self.filterbank.reconfigure(q, nsh) {
                self.faulted = true;
                return Err(e);
            }
            self.current_num_sensors = q;
            self.current_num_sh = nsh;
            self.stats.filterbank += 1;
            self.flags.filterbank.complete();
        }

        if self.flags.matrix.claim() {
            if self.bands.sample_rate() != self.settings.sample_rate() {
                self.bands = BandTable::new(self.settings.sample_rate());
            }
            let result = self.builder.rebuild(&self.settings, self.bands.frequencies());
            self.built = self.settings.clone();
            self.current_order = self.settings.order();
            self.evaluation_valid = false;
            self.stats.matrix += 1;
            self.flags.matrix.complete();
            if let Err(e) = result {
                log::error!("Encoding matrix rebuild failed, output muted: {}", e);
                return Err(e);
            }
            log::debug!(
                "Encoding matrices rebuilt: order {}, {} sensors",
                self.current_order.as_usize(),
                self.current_num_sensors
            );
        }

        if self.flags.evaluation.claim() {
            let result = self
                .evaluation
                .evaluate(&self.built, self.bands.frequencies(), self.builder.matrices());
            self.stats.evaluation += 1;
            self.flags.evaluation.complete();
            result?;
            self.evaluation_ready = true;
            self.evaluation_valid = true;
        }

        Ok(())
    }

    /// Encode one block of `FRAME_SIZE` samples per channel.
    ///
    /// Outputs are zero-filled when the block size is wrong, any rebuild is
    /// pending or the encoder is faulted. Missing sensor inputs are treated
    /// as silence.
    pub fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], is_playing: bool) {
        let sized = inputs.iter().all(|ch| ch.len() == FRAME_SIZE)
            && outputs.iter().all(|ch| ch.len() == FRAME_SIZE);
        let consistent =
            self.builder.matrices().extent() == (self.current_num_sh, self.current_num_sensors);

        if self.faulted || !sized || !consistent || !self.flags.all_clean() {
            self.filterbank.mark_stale();
            silence(outputs);
            return;
        }
        let Some(filterbank) = self.filterbank.prepare() else {
            silence(outputs);
            return;
        };

        let params = FrameParams {
            num_sensors: self.current_num_sensors,
            num_sh: self.current_num_sh,
            order: self.current_order.as_usize(),
            post_gain: self.settings.post_gain_linear(),
            max_frequency_hz: self.settings.max_frequency_hz(),
            ordering: self.settings.channel_ordering(),
            normalization: self.settings.normalization(),
            is_playing,
        };
        self.frame.process(
            filterbank,
            self.builder.matrices(),
            self.bands.frequencies(),
            &params,
            inputs,
            outputs,
        );
    }

    /// Pending configuration
    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Order the current matrices were built for
    pub fn current_order(&self) -> usize {
        self.current_order.as_usize()
    }

    pub fn pending_order(&self) -> usize {
        self.settings.order().as_usize()
    }

    /// Sensor count the filterbank runs with
    pub fn current_num_sensors(&self) -> usize {
        self.current_num_sensors
    }

    pub fn pending_num_sensors(&self) -> usize {
        self.settings.num_sensors()
    }

    /// Harmonic count the filterbank runs with
    pub fn current_num_sh(&self) -> usize {
        self.current_num_sh
    }

    pub fn pending_num_sh(&self) -> usize {
        self.settings.num_sh()
    }

    /// Sensors needed for the pending order
    pub fn min_num_sensors(&self) -> usize {
        self.settings.num_sh()
    }

    pub fn max_num_sensors(&self) -> usize {
        MAX_NUM_SENSORS
    }

    pub fn sensor_direction(&self, index: usize) -> Option<&SensorDirection> {
        self.settings.array().sensor(index)
    }

    /// Band centre frequencies in Hz
    pub fn frequencies(&self) -> &[f32] {
        self.bands.frequencies()
    }

    pub fn sample_rate(&self) -> u32 {
        self.bands.sample_rate()
    }

    /// Latency of the block pipeline in samples
    pub fn processing_delay(&self) -> usize {
        self.filterbank.latency()
    }

    pub fn matrices(&self) -> &EncodingMatrices {
        self.builder.matrices()
    }

    pub fn magnitude_curves(&self) -> &MagnitudeCurves {
        self.builder.curves()
    }

    pub fn evaluation_curves(&self) -> &EvaluationCurves {
        self.evaluation.curves()
    }

    /// True once after each completed evaluation
    pub fn take_evaluation_ready(&mut self) -> bool {
        std::mem::take(&mut self.evaluation_ready)
    }

    /// Evaluation curves describe the current matrices
    pub fn is_evaluation_valid(&self) -> bool {
        self.evaluation_valid
    }

    pub fn filterbank_state(&self) -> DirtyState {
        self.flags.filterbank.state()
    }

    pub fn matrix_state(&self) -> DirtyState {
        self.flags.matrix.state()
    }

    pub fn evaluation_state(&self) -> DirtyState {
        self.flags.evaluation.state()
    }

    pub fn rebuild_stats(&self) -> RebuildStats {
        self.stats
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }
}

fn silence(outputs: &mut [&mut [f32]]) {
    outputs.iter_mut().for_each(|out| out.fill(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(channels: usize, value: f32) -> Vec<Vec<f32>> {
        vec![vec![value; FRAME_SIZE]; channels]
    }

    fn run(encoder: &mut ArrayEncoder, input: &[Vec<f32>], outputs: usize, playing: bool) -> Vec<Vec<f32>> {
        let inputs: Vec<&[f32]> = input.iter().map(|v| v.as_slice()).collect();
        let mut out = block(outputs, 1.0);
        {
            let mut refs: Vec<&mut [f32]> = out.iter_mut().map(|v| v.as_mut_slice()).collect();
            encoder.process(&inputs, &mut refs, playing);
        }
        out
    }

    #[test]
    fn test_silent_until_first_checkpoint() {
        let mut encoder = ArrayEncoder::new(48000);
        assert_eq!(encoder.matrix_state(), DirtyState::Pending);
        let out = run(&mut encoder, &block(4, 0.5), 4, true);
        assert!(out.iter().flatten().all(|&v| v == 0.0));

        encoder.checkpoint().unwrap();
        assert_eq!(encoder.matrix_state(), DirtyState::Clean);
        assert_eq!(encoder.rebuild_stats().filterbank, 1);
        assert_eq!(encoder.rebuild_stats().matrix, 1);
        assert_eq!(encoder.rebuild_stats().evaluation, 0);
    }

    #[test]
    fn test_gain_change_needs_no_rebuild() {
        let mut encoder = ArrayEncoder::new(48000);
        encoder.checkpoint().unwrap();
        encoder.apply(ConfigDelta::PostGain(-6.0));
        encoder.apply(ConfigDelta::MaxFrequency(8000.0));
        assert!(encoder.flags.all_clean());
        encoder.checkpoint().unwrap();
        assert_eq!(encoder.rebuild_stats().matrix, 1);
    }

    #[test]
    fn test_order_change_is_deferred() {
        let mut encoder = ArrayEncoder::new(48000);
        encoder.apply(ConfigDelta::NumSensors(32));
        encoder.apply(ConfigDelta::Order(3));
        assert_eq!(encoder.pending_order(), 3);
        assert_eq!(encoder.pending_num_sh(), 16);
        assert_eq!(encoder.min_num_sensors(), 16);
        assert_eq!(encoder.current_num_sh(), 4);

        encoder.checkpoint().unwrap();
        assert_eq!(encoder.current_order(), 3);
        assert_eq!(encoder.current_num_sh(), 16);
        assert_eq!(encoder.current_num_sensors(), 32);
        assert_eq!(encoder.matrices().extent(), (16, 32));
    }

    #[test]
    fn test_filterbank_failure_is_fatal() {
        let mut encoder = ArrayEncoder::new(48000);
        encoder.filterbank = FilterbankAdapter::with_hop_size(3);

        let err = encoder.checkpoint().unwrap_err();
        assert!(matches!(err, SpatialError::Filterbank(_)));
        assert!(encoder.is_faulted());
        assert_eq!(encoder.checkpoint().unwrap_err(), SpatialError::Faulted);

        let out = run(&mut encoder, &block(4, 0.5), 4, true);
        assert!(out.iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn test_evaluation_on_request_only() {
        let mut encoder = ArrayEncoder::new(48000);
        encoder.checkpoint().unwrap();
        assert!(!encoder.take_evaluation_ready());
        assert!(!encoder.is_evaluation_valid());

        encoder.apply(ConfigDelta::RequestEvaluation);
        encoder.checkpoint().unwrap();
        assert!(encoder.is_evaluation_valid());
        assert!(encoder.take_evaluation_ready());
        assert!(!encoder.take_evaluation_ready());
        assert_eq!(encoder.evaluation_curves().order(), 1);

        // geometry changes invalidate but do not re-evaluate
        encoder.apply(ConfigDelta::ArrayRadius(0.05));
        encoder.checkpoint().unwrap();
        assert!(!encoder.is_evaluation_valid());
        assert_eq!(encoder.rebuild_stats().evaluation, 1);
    }

    #[test]
    fn test_sample_rate_change_swaps_band_table() {
        let mut encoder = ArrayEncoder::new(48000);
        encoder.checkpoint().unwrap();
        encoder.apply(ConfigDelta::SampleRate(44100));
        assert_eq!(encoder.matrix_state(), DirtyState::Pending);
        encoder.checkpoint().unwrap();
        assert_eq!(encoder.sample_rate(), 44100);
        assert!((encoder.frequencies()[crate::NUM_BANDS - 1] - 22050.0).abs() < 0.01);
    }

    #[test]
    fn test_skipped_block_flushes_transform() {
        let mut encoder = ArrayEncoder::new(48000);
        encoder.checkpoint().unwrap();
        run(&mut encoder, &block(4, 0.5), 4, true);

        // a short block is skipped, the overlap tail must not resurface
        let short = vec![vec![0.5f32; FRAME_SIZE / 2]; 4];
        let inputs: Vec<&[f32]> = short.iter().map(|v| v.as_slice()).collect();
        let mut out = vec![vec![1.0f32; FRAME_SIZE / 2]; 4];
        let mut refs: Vec<&mut [f32]> = out.iter_mut().map(|v| v.as_mut_slice()).collect();
        encoder.process(&inputs, &mut refs, true);

        let out = run(&mut encoder, &block(4, 0.0), 4, true);
        assert!(out.iter().flatten().all(|&v| v == 0.0));
        assert_eq!(encoder.processing_delay(), crate::HOP_SIZE);
    }

    #[test]
    fn test_control_handle_is_unique() {
        let mut encoder = ArrayEncoder::new(48000);
        let mut control = encoder.take_control().unwrap();
        assert!(encoder.take_control().is_none());

        control.send(ConfigDelta::Regularization(30.0));
        assert_eq!(encoder.settings().regularization_db(), 15.0);
        encoder.checkpoint().unwrap();
        assert_eq!(encoder.settings().regularization_db(), 30.0);
    }
}
