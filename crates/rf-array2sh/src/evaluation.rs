//! Encoder evaluation
//!
//! Simulates the theoretical array response on a dense direction grid,
//! encodes it with the current matrices and compares the result with ideal
//! N3D harmonics. Produces per order and band:
//! - spatial correlation (normalised real inner product, 1 = ideal)
//! - level difference (dB energy ratio, 0 = ideal)
//!
//! Never runs on the per-block path.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2, s};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::array::{ArrayType, fibonacci_directions};
use crate::config::EncoderSettings;
use crate::error::{SpatialError, SpatialResult};
use crate::matrix::EncodingMatrices;
use crate::sh::sh_matrix;
use crate::theory::{ArrayResponse, modal_coefficients, truncation_order, wavenumber};
use crate::{MAX_SH_ORDER, NUM_BANDS};

/// Directions simulated for spherical arrays
pub const SPHERICAL_GRID_SIZE: usize = 240;
/// Directions simulated for cylindrical arrays (horizontal ring)
pub const RING_GRID_SIZE: usize = 180;

const LEVEL_FLOOR_DB: f32 = -200.0;

/// Spatial correlation and level difference curves
#[derive(Debug, Clone)]
pub struct EvaluationCurves {
    correlation: Array2<f32>,
    level_difference: Array2<f32>,
    order: usize,
}

impl EvaluationCurves {
    pub fn new() -> Self {
        Self {
            correlation: Array2::zeros((MAX_SH_ORDER + 1, NUM_BANDS)),
            level_difference: Array2::zeros((MAX_SH_ORDER + 1, NUM_BANDS)),
            order: 0,
        }
    }

    /// Order the curves were computed for
    pub fn order(&self) -> usize {
        self.order
    }

    /// Rows 0..=order, one column per band
    pub fn spatial_correlation(&self) -> ArrayView2<'_, f32> {
        self.correlation.slice(s![..=self.order, ..])
    }

    /// Rows 0..=order, one column per band
    pub fn level_difference(&self) -> ArrayView2<'_, f32> {
        self.level_difference.slice(s![..=self.order, ..])
    }
}

impl Default for EvaluationCurves {
    fn default() -> Self {
        Self::new()
    }
}

/// Directions used to evaluate an array of the given topology
pub fn evaluation_grid(array_type: ArrayType) -> Vec<(f64, f64)> {
    match array_type {
        ArrayType::Spherical => fibonacci_directions(SPHERICAL_GRID_SIZE),
        ArrayType::Cylindrical => (0..RING_GRID_SIZE)
            .map(|d| {
                let azi = 2.0 * std::f64::consts::PI * d as f64 / RING_GRID_SIZE as f64
                    - std::f64::consts::PI;
                (azi, 0.0)
            })
            .collect(),
    }
}

#[derive(Default)]
pub struct EvaluationEngine {
    curves: EvaluationCurves,
}

impl EvaluationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn curves(&self) -> &EvaluationCurves {
        &self.curves
    }

    /// Evaluate `matrices`, which must have been built for `settings`
    pub fn evaluate(
        &mut self,
        settings: &EncoderSettings,
        frequencies: &[f32],
        matrices: &EncodingMatrices,
    ) -> SpatialResult<()> {
        let order = settings.order().as_usize();
        let nsh = settings.num_sh();
        let q = settings.num_sensors();
        let (rows, cols) = matrices.extent();
        if rows != nsh {
            return Err(SpatialError::InvalidChannelCount {
                expected: nsh,
                got: rows,
            });
        }
        if cols != q {
            return Err(SpatialError::InvalidChannelCount {
                expected: q,
                got: cols,
            });
        }

        let array = settings.array();
        let c = settings.speed_of_sound() as f64;
        let radius = array.radius as f64;
        let baffle = array.baffle_radius as f64;
        let outer = radius.max(baffle);

        let grid = evaluation_grid(array.array_type);
        let ideal = sh_matrix(order, &grid);
        let top_freq = frequencies.iter().copied().fold(0.0f32, f32::max) as f64;
        let tmax = truncation_order(wavenumber(top_freq, c) * outer, order);
        let response = ArrayResponse::new(array, &grid, tmax);

        let per_band: Vec<(Vec<f32>, Vec<f32>)> = frequencies
            .par_iter()
            .enumerate()
            .map(|(band, &freq)| {
                let k = wavenumber(freq as f64, c);
                let nmax = truncation_order(k * outer, order);
                let mut b = vec![Complex64::new(0.0, 0.0); nmax + 1];
                modal_coefficients(array.array_type, array.weight_type, k * radius, k * baffle, nmax, &mut b);

                let captured = response.response(&b);
                let w = matrices
                    .band(band)
                    .mapv(|v| Complex64::new(v.re as f64, v.im as f64));
                let encoded = w.dot(&captured);
                compare_with_ideal(&encoded, &ideal, order)
            })
            .collect();

        self.curves.correlation.fill(0.0);
        self.curves.level_difference.fill(LEVEL_FLOOR_DB);
        for (band, (corr, level)) in per_band.into_iter().enumerate().take(NUM_BANDS) {
            for n in 0..=order {
                self.curves.correlation[(n, band)] = corr[n];
                self.curves.level_difference[(n, band)] = level[n];
            }
        }
        self.curves.order = order;

        log::debug!("Evaluated order {} encoder over {} directions", order, grid.len());
        Ok(())
    }
}

/// Per-order (correlation, level difference) of encoded vs ideal harmonics
fn compare_with_ideal(encoded: &Array2<Complex64>, ideal: &DMatrix<f64>, order: usize) -> (Vec<f32>, Vec<f32>) {
    let mut corr = vec![0.0f32; order + 1];
    let mut level = vec![LEVEL_FLOOR_DB; order + 1];

    for n in 0..=order {
        let mut cross = 0.0f64;
        let mut e_enc = 0.0f64;
        let mut e_ideal = 0.0f64;
        for j in n * n..(n + 1) * (n + 1) {
            for (d, y) in encoded.row(j).iter().enumerate() {
                let target = ideal[(d, j)];
                cross += y.re * target;
                e_enc += y.norm_sqr();
                e_ideal += target * target;
            }
        }
        if e_enc > 1.0e-20 && e_ideal > 1.0e-20 {
            corr[n] = (cross / (e_enc * e_ideal).sqrt()) as f32;
            level[n] = ((10.0 * (e_enc / e_ideal).log10()) as f32).max(LEVEL_FLOOR_DB);
        }
    }

    (corr, level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArraySpecification;
    use crate::bands::BandTable;
    use crate::config::ConfigDelta;
    use crate::matrix::EncodingMatrixBuilder;
    use crate::sh::AmbisonicOrder;
    use crate::solver::TheoreticalSolver;

    fn built(settings: &EncoderSettings, bands: &BandTable) -> EncodingMatrixBuilder {
        let mut builder = EncodingMatrixBuilder::new(Box::new(TheoreticalSolver::new()));
        builder.rebuild(settings, bands.frequencies()).unwrap();
        builder
    }

    #[test]
    fn test_dense_array_is_near_ideal_below_aliasing() {
        let mut settings =
            EncoderSettings::with_array(ArraySpecification::spherical_uniform(32, 0.042), AmbisonicOrder::First);
        settings.apply(ConfigDelta::DiffuseEqPastAliasing(false));
        let bands = BandTable::new(48000);
        let builder = built(&settings, &bands);

        let mut engine = EvaluationEngine::new();
        engine.evaluate(&settings, bands.frequencies(), builder.matrices()).unwrap();
        let curves = engine.curves();
        assert_eq!(curves.spatial_correlation().dim(), (2, NUM_BANDS));

        // band 4 = 750 Hz
        for n in 0..=1 {
            assert!(curves.spatial_correlation()[(n, 4)] > 0.95, "order {}", n);
            assert!(curves.level_difference()[(n, 4)].abs() < 1.0, "order {}", n);
        }
    }

    #[test]
    fn test_zero_matrices_give_floor() {
        let settings = EncoderSettings::default();
        let bands = BandTable::new(48000);
        let mut matrices = EncodingMatrices::new();
        matrices.clear(4, 4);

        let mut engine = EvaluationEngine::new();
        engine.evaluate(&settings, bands.frequencies(), &matrices).unwrap();
        assert!(engine.curves().spatial_correlation().iter().all(|&c| c == 0.0));
        assert!(engine.curves().level_difference().iter().all(|&l| l == LEVEL_FLOOR_DB));
    }

    #[test]
    fn test_extent_mismatch_is_rejected() {
        let settings = EncoderSettings::default();
        let bands = BandTable::new(48000);
        let mut matrices = EncodingMatrices::new();
        matrices.clear(9, 4);

        let mut engine = EvaluationEngine::new();
        assert!(engine.evaluate(&settings, bands.frequencies(), &matrices).is_err());
    }

    #[test]
    fn test_ring_grid_is_horizontal() {
        let grid = evaluation_grid(ArrayType::Cylindrical);
        assert_eq!(grid.len(), RING_GRID_SIZE);
        assert!(grid.iter().all(|&(_, elev)| elev == 0.0));
    }
}
