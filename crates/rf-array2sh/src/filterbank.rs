//! Filterbank lifecycle
//!
//! Creates the STFT on first use and afterwards only changes its channel
//! counts. A failed (re)initialisation drops the instance; the encoder
//! treats that as fatal. Blocks the encoder skips leave the overlap state
//! out of date, so the transform is flushed before the next real block.

use rf_dsp::{Processor, StftFilterbank};
use rf_dsp::filterbank::processing_delay;

use crate::HOP_SIZE;
use crate::error::SpatialResult;

pub struct FilterbankAdapter {
    hop_size: usize,
    inner: Option<StftFilterbank>,
    stale: bool,
}

impl FilterbankAdapter {
    pub fn new() -> Self {
        Self::with_hop_size(HOP_SIZE)
    }

    pub(crate) fn with_hop_size(hop_size: usize) -> Self {
        Self {
            hop_size,
            inner: None,
            stale: false,
        }
    }

    /// Bring the transform to `num_inputs` sensors and `num_outputs`
    /// harmonics
    pub fn reconfigure(&mut self, num_inputs: usize, num_outputs: usize) -> SpatialResult<()> {
        let result = match self.inner.as_mut() {
            Some(fb) => fb.channel_change(num_inputs, num_outputs),
            None => StftFilterbank::new(self.hop_size, num_inputs, num_outputs).map(|fb| {
                self.inner = Some(fb);
            }),
        };

        if let Err(e) = result {
            log::error!("Filterbank reconfiguration to {}/{} failed: {}", num_inputs, num_outputs, e);
            self.inner = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// A block went by without reaching the transform
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Transform for the next block, flushed first if blocks were skipped
    pub fn prepare(&mut self) -> Option<&mut StftFilterbank> {
        let fb = self.inner.as_mut()?;
        if std::mem::take(&mut self.stale) {
            fb.reset();
        }
        Some(fb)
    }

    /// Delay of the transform in samples
    pub fn latency(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(processing_delay(self.hop_size), |fb| fb.latency())
    }
}

impl Default for FilterbankAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpatialError;
    use num_complex::Complex32;

    fn channels(adapter: &mut FilterbankAdapter) -> Option<(usize, usize)> {
        adapter.prepare().map(|fb| (fb.num_inputs(), fb.num_outputs()))
    }

    #[test]
    fn test_init_then_channel_change() {
        let mut adapter = FilterbankAdapter::new();
        assert!(adapter.prepare().is_none());
        assert_eq!(adapter.latency(), HOP_SIZE);

        adapter.reconfigure(4, 4).unwrap();
        assert_eq!(channels(&mut adapter), Some((4, 4)));

        adapter.reconfigure(32, 16).unwrap();
        assert_eq!(channels(&mut adapter), Some((32, 16)));
        assert_eq!(adapter.prepare().map(|fb| fb.hop_size()), Some(HOP_SIZE));
        assert_eq!(adapter.latency(), HOP_SIZE);
    }

    #[test]
    fn test_failure_drops_instance() {
        let mut adapter = FilterbankAdapter::new();
        adapter.reconfigure(4, 4).unwrap();

        let err = adapter.reconfigure(0, 4).unwrap_err();
        assert!(matches!(err, SpatialError::Filterbank(_)));
        assert!(adapter.prepare().is_none());
    }

    #[test]
    fn test_bad_hop_fails_at_init() {
        let mut adapter = FilterbankAdapter::with_hop_size(3);
        assert!(adapter.reconfigure(4, 4).is_err());
        assert!(adapter.prepare().is_none());
    }

    #[test]
    fn test_stale_transform_is_flushed() {
        let mut adapter = FilterbankAdapter::new();
        adapter.reconfigure(1, 1).unwrap();

        let mut spectrum = vec![Complex32::new(0.0, 0.0); HOP_SIZE + 1];
        let mut hop = vec![0.0f32; HOP_SIZE];
        if let Some(fb) = adapter.prepare() {
            fb.forward(0, &vec![1.0; HOP_SIZE], &mut spectrum);
            fb.inverse(0, &spectrum, &mut hop);
        }

        adapter.mark_stale();
        let fb = adapter.prepare().unwrap();
        fb.forward(0, &vec![0.0; HOP_SIZE], &mut spectrum);
        fb.inverse(0, &spectrum, &mut hop);
        assert!(hop.iter().all(|&s| s == 0.0));
    }
}
