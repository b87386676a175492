//! Harmonic solver seam
//!
//! A [`HarmonicSolver`] turns a configuration into one complex encoding
//! matrix per band (rows = harmonics, columns = sensors) plus the modal and
//! inverse magnitudes used for the diagnostic curves.
//! [`TheoreticalSolver`] derives them from closed-form array models.

use nalgebra::DMatrix;
use ndarray::Array2;
use num_complex::{Complex32, Complex64};
use rayon::prelude::*;

use crate::array::ArrayType;
use crate::config::EncoderSettings;
use crate::error::{SpatialError, SpatialResult};
use crate::sh::{acn_to_order_degree, num_sh, sh_matrix};
use crate::theory::{
    ArrayResponse, MAX_TRUNCATION, aliasing_frequency, max_filter_gain, modal_coefficients,
    regularized_inverse, truncation_order, wavenumber,
};

/// Singular values below this are dropped by the pseudo-inverse
const PINV_EPSILON: f64 = 1.0e-6;

/// Everything a solver needs for one rebuild
#[derive(Debug, Clone, Copy)]
pub struct SolverRequest<'a> {
    /// Pending configuration
    pub settings: &'a EncoderSettings,
    /// Band centre frequencies in Hz
    pub frequencies: &'a [f32],
}

impl SolverRequest<'_> {
    pub fn order(&self) -> usize {
        self.settings.order().as_usize()
    }

    pub fn num_sh(&self) -> usize {
        self.settings.num_sh()
    }

    pub fn num_sensors(&self) -> usize {
        self.settings.num_sensors()
    }

    pub fn num_bands(&self) -> usize {
        self.frequencies.len()
    }
}

/// Result of one rebuild
#[derive(Debug, Clone)]
pub struct SolverOutput {
    /// One nSH × Q matrix per band
    pub matrices: Vec<Array2<Complex32>>,
    /// |bₙ| per order (rows) and band (columns)
    pub modal: Array2<f64>,
    /// |Hₙ| per order and band, before any diffuse-field correction
    pub inverse: Array2<f64>,
}

/// Produces per-band encoding matrices
pub trait HarmonicSolver: Send {
    fn solve(&self, request: &SolverRequest<'_>) -> SpatialResult<SolverOutput>;
}

/// Closed-form solver: W(f) = diag(Hₙ(f)) · pinv(Y)
#[derive(Debug, Clone, Copy, Default)]
pub struct TheoreticalSolver;

impl TheoreticalSolver {
    pub fn new() -> Self {
        Self
    }
}

struct BandSolution {
    matrix: Array2<Complex32>,
    modal: Vec<f64>,
    inverse: Vec<f64>,
}

impl HarmonicSolver for TheoreticalSolver {
    fn solve(&self, request: &SolverRequest<'_>) -> SpatialResult<SolverOutput> {
        let settings = request.settings;
        let array = settings.array();
        let order = request.order();
        let nsh = num_sh(order);
        let q = request.num_sensors();

        let directions = array.directions_rad();
        let y_pinv = sh_pseudo_inverse(order, &directions)?;

        let c = settings.speed_of_sound() as f64;
        let radius = array.radius as f64;
        let baffle = array.baffle_radius as f64;
        let max_gain = max_filter_gain(q, settings.regularization_db() as f64);
        let filter = settings.filter_type();

        let diffuse_eq = settings.diffuse_eq_past_aliasing() && array.array_type == ArrayType::Spherical;
        if settings.diffuse_eq_past_aliasing() && !diffuse_eq {
            log::debug!("Diffuse-field EQ skipped for cylindrical array");
        }
        let f_alias = aliasing_frequency(c, order, radius);
        let coherence = diffuse_eq.then(|| ArrayResponse::new(array, &directions, MAX_TRUNCATION));

        log::debug!(
            "Solving {} bands: order {}, {} sensors, alias {:.0} Hz",
            request.num_bands(),
            order,
            q,
            f_alias
        );

        let bands: Vec<BandSolution> = request
            .frequencies
            .par_iter()
            .map(|&freq| {
                let k = wavenumber(freq as f64, c);
                let kernel = coherence.as_ref().filter(|_| freq as f64 > f_alias);
                let nmax = match kernel {
                    Some(_) => truncation_order(k * radius.max(baffle), order),
                    None => order,
                };

                let mut b = vec![Complex64::new(0.0, 0.0); nmax + 1];
                modal_coefficients(array.array_type, array.weight_type, k * radius, k * baffle, nmax, &mut b);
                let h: Vec<Complex64> = b[..=order]
                    .iter()
                    .map(|&bn| regularized_inverse(bn, filter, max_gain))
                    .collect();

                let mut w = Array2::from_shape_fn((nsh, q), |(j, s)| {
                    let n = acn_to_order_degree(j).0 as usize;
                    h[n] * y_pinv[(j, s)]
                });
                if let Some(kernel) = kernel {
                    diffuse_equalise(&mut w, &b, kernel, order);
                }

                BandSolution {
                    matrix: w.mapv(|v| Complex32::new(v.re as f32, v.im as f32)),
                    modal: b[..=order].iter().map(|v| v.norm()).collect(),
                    inverse: h.iter().map(|v| v.norm()).collect(),
                }
            })
            .collect();

        let num_bands = bands.len();
        let modal = Array2::from_shape_fn((order + 1, num_bands), |(n, band)| bands[band].modal[n]);
        let inverse = Array2::from_shape_fn((order + 1, num_bands), |(n, band)| bands[band].inverse[n]);
        let matrices = bands.into_iter().map(|band| band.matrix).collect();

        Ok(SolverOutput {
            matrices,
            modal,
            inverse,
        })
    }
}

/// Scale each order's rows so a unit diffuse field encodes to unit power
/// per harmonic
fn diffuse_equalise(w: &mut Array2<Complex64>, b: &[Complex64], kernel: &ArrayResponse, order: usize) {
    let power: Vec<Complex64> = b.iter().map(|bn| Complex64::new(bn.norm_sqr(), 0.0)).collect();
    let coherence = kernel.response(&power);
    let projected = w.dot(&coherence);

    for n in 0..=order {
        let rows = n * n..(n + 1) * (n + 1);
        let total: f64 = rows
            .clone()
            .map(|j| {
                projected
                    .row(j)
                    .iter()
                    .zip(w.row(j).iter())
                    .map(|(p, wv)| (p * wv.conj()).re)
                    .sum::<f64>()
            })
            .sum();
        let mean = total / (2 * n + 1) as f64;
        if mean.is_finite() && mean > 1.0e-12 {
            let gain = 1.0 / mean.sqrt();
            for j in rows {
                w.row_mut(j).mapv_inplace(|v| v * gain);
            }
        }
    }
}

/// Pseudo-inverse of the SH matrix for a set of directions, as used by
/// [`TheoreticalSolver`]
pub fn sh_pseudo_inverse(order: usize, directions: &[(f64, f64)]) -> SpatialResult<DMatrix<f64>> {
    sh_matrix(order, directions)
        .pseudo_inverse(PINV_EPSILON)
        .map_err(|e| SpatialError::Solver(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArraySpecification, WeightType};
    use crate::bands::BandTable;
    use crate::config::ConfigDelta;
    use crate::sh::AmbisonicOrder;

    fn solve(settings: &EncoderSettings) -> SolverOutput {
        let bands = BandTable::new(48000);
        TheoreticalSolver::new()
            .solve(&SolverRequest {
                settings,
                frequencies: bands.frequencies(),
            })
            .unwrap()
    }

    #[test]
    fn test_shapes_follow_request() {
        let settings =
            EncoderSettings::with_array(ArraySpecification::spherical_uniform(16, 0.05), AmbisonicOrder::Second);
        let out = solve(&settings);
        assert_eq!(out.matrices.len(), crate::NUM_BANDS);
        assert!(out.matrices.iter().all(|m| m.dim() == (9, 16)));
        assert_eq!(out.modal.dim(), (3, crate::NUM_BANDS));
        assert_eq!(out.inverse.dim(), (3, crate::NUM_BANDS));
    }

    #[test]
    fn test_tetrahedral_omni_row_at_low_frequency() {
        let out = solve(&EncoderSettings::default());
        let w = &out.matrices[1];
        for s in 0..4 {
            assert!((w[(0, s)].norm() - 0.25).abs() < 0.02, "|W[0,{}]| = {}", s, w[(0, s)].norm());
        }
    }

    #[test]
    fn test_inverse_respects_max_gain() {
        for filter in [crate::config::FilterType::SoftLimiting, crate::config::FilterType::Tikhonov] {
            let mut settings = EncoderSettings::default();
            settings.apply(ConfigDelta::FilterType(filter));
            settings.apply(ConfigDelta::Regularization(6.0));
            let out = solve(&settings);
            let limit = max_filter_gain(4, 6.0);
            assert!(out.inverse.iter().all(|&g| g <= limit * (1.0 + 1e-9)));
        }
    }

    #[test]
    fn test_diffuse_eq_only_above_aliasing() {
        let mut plain = EncoderSettings::default();
        plain.apply(ConfigDelta::DiffuseEqPastAliasing(false));
        let eq = EncoderSettings::default();

        let a = solve(&plain);
        let b = solve(&eq);

        // 42 mm first-order array aliases at ~1.3 kHz; band 2 is 375 Hz
        assert_eq!(a.matrices[2], b.matrices[2]);
        assert_ne!(a.matrices[100], b.matrices[100]);
    }

    #[test]
    fn test_diffuse_eq_normalises_power() {
        let array = ArraySpecification::spherical_uniform(32, 0.042);
        let settings = EncoderSettings::with_array(array.clone(), AmbisonicOrder::Second);
        let out = solve(&settings);
        let bands = BandTable::new(48000);

        let band = 80;
        let freq = bands.frequency(band) as f64;
        let k = wavenumber(freq, settings.speed_of_sound() as f64);
        let nmax = truncation_order(k * 0.042, 2);
        let mut b = vec![Complex64::new(0.0, 0.0); nmax + 1];
        modal_coefficients(ArrayType::Spherical, WeightType::RigidOmni, k * 0.042, k * 0.042, nmax, &mut b);

        let kernel = ArrayResponse::new(&array, &array.directions_rad(), MAX_TRUNCATION);
        let power: Vec<Complex64> = b.iter().map(|v| Complex64::new(v.norm_sqr(), 0.0)).collect();
        let coherence = kernel.response(&power);
        let w = out.matrices[band].mapv(|v| Complex64::new(v.re as f64, v.im as f64));
        let projected = w.dot(&coherence);

        for n in 0..=2 {
            let mut total = 0.0;
            for j in n * n..(n + 1) * (n + 1) {
                for s in 0..32 {
                    total += (projected[(j, s)] * w[(j, s)].conj()).re;
                }
            }
            let mean = total / (2 * n + 1) as f64;
            assert!((mean - 1.0).abs() < 1e-3, "order {} power {}", n, mean);
        }
    }

    #[test]
    fn test_pseudo_inverse_of_tetrahedron() {
        let dirs = ArraySpecification::tetrahedral().directions_rad();
        let pinv = sh_pseudo_inverse(1, &dirs).unwrap();
        assert_eq!(pinv.shape(), (4, 4));
        for s in 0..4 {
            assert!((pinv[(0, s)] - 0.25).abs() < 1e-5);
        }
    }
}
