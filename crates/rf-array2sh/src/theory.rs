//! Theoretical array models
//!
//! Modal coefficients of spherical and cylindrical arrays, their
//! regularised inverses, and a plane-wave simulator that predicts what each
//! sensor captures. All coefficients omit the 4π (or 2π) factor so an ideal
//! omni sensor at the origin has b_0 = 1.

use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;

use crate::array::{ArraySpecification, ArrayType, WeightType};
use crate::bessel;
use crate::config::FilterType;
use crate::sh::legendre;

/// Highest order ever expanded when simulating a plane wave
pub const MAX_TRUNCATION: usize = 40;

/// iⁿ
fn i_pow(n: usize) -> Complex64 {
    match n % 4 {
        0 => Complex64::new(1.0, 0.0),
        1 => Complex64::new(0.0, 1.0),
        2 => Complex64::new(-1.0, 0.0),
        _ => Complex64::new(0.0, -1.0),
    }
}

/// Wavenumber for frequency `freq_hz` at propagation speed `c`
pub fn wavenumber(freq_hz: f64, c: f64) -> f64 {
    2.0 * std::f64::consts::PI * freq_hz / c
}

/// Frequency above which an order-`order` array of radius `radius` aliases
pub fn aliasing_frequency(c: f64, order: usize, radius: f64) -> f64 {
    c * order as f64 / (2.0 * std::f64::consts::PI * radius)
}

/// Expansion order needed to simulate a plane wave at `kr`
pub fn truncation_order(kr: f64, order: usize) -> usize {
    let t = (1.5 * kr).ceil() as usize + 4;
    t.clamp(order + 2, MAX_TRUNCATION)
}

/// Modal coefficients b_0..=b_nmax.
///
/// `kr` is the wavenumber times the sensor radius, `k_baffle` the
/// wavenumber times the baffle radius (used by rigid arrays only).
pub fn modal_coefficients(
    array_type: ArrayType,
    weight_type: WeightType,
    kr: f64,
    k_baffle: f64,
    nmax: usize,
    out: &mut [Complex64],
) {
    let len = nmax + 2;
    let mut f = vec![0.0f64; len];
    let mut fp = vec![0.0f64; len];
    match array_type {
        ArrayType::Spherical => {
            bessel::spherical_j(nmax + 1, kr, &mut f);
            bessel::spherical_derivative(&f, kr, &mut fp);
        }
        ArrayType::Cylindrical => {
            bessel::cylindrical_j(nmax + 1, kr, &mut f);
            bessel::cylindrical_derivative(&f, &mut fp[..=nmax]);
        }
    }

    match weight_type {
        WeightType::OpenOmni => {
            for n in 0..=nmax {
                out[n] = i_pow(n) * f[n];
            }
        }
        WeightType::OpenCardioid | WeightType::OpenDipole => {
            let alpha = weight_type.directivity();
            for n in 0..=nmax {
                out[n] = i_pow(n) * Complex64::new(alpha * f[n], -(1.0 - alpha) * fp[n]);
            }
        }
        WeightType::RigidOmni => {
            let scattered = rigid_scattering(array_type, kr, k_baffle, nmax);
            for n in 0..=nmax {
                out[n] = i_pow(n) * (Complex64::new(f[n], 0.0) - scattered[n]);
            }
        }
    }
}

/// jₙ'(kR)/hₙ'(kR) · hₙ(kr) with hₙ = jₙ − i yₙ (cylindrical analogue for
/// cylinders). Terms that overflow are dropped; they only occur where the
/// scattered field is negligible.
fn rigid_scattering(array_type: ArrayType, kr: f64, k_baffle: f64, nmax: usize) -> Vec<Complex64> {
    let len = nmax + 2;
    let mut j_r = vec![0.0f64; len];
    let mut y_r = vec![0.0f64; len];
    let mut j_b = vec![0.0f64; len];
    let mut y_b = vec![0.0f64; len];
    let mut jp_b = vec![0.0f64; len];
    let mut yp_b = vec![0.0f64; len];

    match array_type {
        ArrayType::Spherical => {
            bessel::spherical_j(nmax + 1, kr, &mut j_r);
            bessel::spherical_y(nmax + 1, kr, &mut y_r);
            bessel::spherical_j(nmax + 1, k_baffle, &mut j_b);
            bessel::spherical_y(nmax + 1, k_baffle, &mut y_b);
            bessel::spherical_derivative(&j_b, k_baffle, &mut jp_b);
            bessel::spherical_derivative(&y_b, k_baffle, &mut yp_b);
        }
        ArrayType::Cylindrical => {
            bessel::cylindrical_j(nmax + 1, kr, &mut j_r);
            bessel::cylindrical_y(nmax + 1, kr, &j_r, &mut y_r);
            bessel::cylindrical_j(nmax + 1, k_baffle, &mut j_b);
            bessel::cylindrical_y(nmax + 1, k_baffle, &j_b, &mut y_b);
            bessel::cylindrical_derivative(&j_b, &mut jp_b[..=nmax]);
            bessel::cylindrical_derivative(&y_b, &mut yp_b[..=nmax]);
        }
    }

    (0..=nmax)
        .map(|n| {
            let h = Complex64::new(j_r[n], -y_r[n]);
            let hp = Complex64::new(jp_b[n], -yp_b[n]);
            let term = Complex64::new(jp_b[n], 0.0).fdiv(hp) * h;
            if term.re.is_finite() && term.im.is_finite() {
                term
            } else {
                Complex64::new(0.0, 0.0)
            }
        })
        .collect()
}

/// Largest linear gain an encoding filter may apply
pub fn max_filter_gain(num_sensors: usize, regularization_db: f64) -> f64 {
    (num_sensors as f64).sqrt() * 10.0f64.powf(regularization_db / 20.0)
}

/// Regularised inverse of one modal coefficient, bounded by `max_gain`
pub fn regularized_inverse(b: Complex64, filter: FilterType, max_gain: f64) -> Complex64 {
    let mag = b.norm();
    if mag < 1.0e-300 || !mag.is_finite() {
        return Complex64::new(0.0, 0.0);
    }
    match filter {
        FilterType::SoftLimiting => {
            let limit = (std::f64::consts::PI / (2.0 * max_gain * mag)).atan();
            b.conj() / mag * (2.0 * max_gain / std::f64::consts::PI * limit)
        }
        FilterType::Tikhonov => {
            let s = (1.0 - 1.0 / (max_gain * max_gain)).max(0.0).sqrt();
            let beta_sq = (1.0 - s) / (1.0 + s);
            b.conj() / (mag * mag + beta_sq)
        }
    }
}

/// Plane-wave response of an array over a set of source directions.
///
/// Holds the order-dependent angular kernel for every (sensor, direction)
/// pair so each band only has to weight it by the modal coefficients:
/// (2n+1)Pₙ(cos γ) for spheres, εₙ cos(nΔφ) for cylinders.
#[derive(Debug, Clone)]
pub struct ArrayResponse {
    kernel: Array3<f64>,
    max_order: usize,
}

impl ArrayResponse {
    pub fn new(array: &ArraySpecification, directions: &[(f64, f64)], max_order: usize) -> Self {
        let sensors = array.directions_rad();
        let mut kernel = Array3::<f64>::zeros((sensors.len(), directions.len(), max_order + 1));
        let mut p = vec![0.0f64; max_order + 1];

        for (q, &(sa, se)) in sensors.iter().enumerate() {
            for (d, &(da, de)) in directions.iter().enumerate() {
                let mut cell = kernel.slice_mut(ndarray::s![q, d, ..]);
                match array.array_type {
                    ArrayType::Spherical => {
                        let cos_gamma = (se.sin() * de.sin() + se.cos() * de.cos() * (sa - da).cos())
                            .clamp(-1.0, 1.0);
                        legendre(max_order, cos_gamma, &mut p);
                        for (n, v) in cell.iter_mut().enumerate() {
                            *v = (2 * n + 1) as f64 * p[n];
                        }
                    }
                    ArrayType::Cylindrical => {
                        let dphi = sa - da;
                        for (n, v) in cell.iter_mut().enumerate() {
                            let eps = if n == 0 { 1.0 } else { 2.0 };
                            *v = eps * (n as f64 * dphi).cos();
                        }
                    }
                }
            }
        }

        Self { kernel, max_order }
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    pub fn num_sensors(&self) -> usize {
        self.kernel.len_of(Axis(0))
    }

    pub fn num_directions(&self) -> usize {
        self.kernel.len_of(Axis(1))
    }

    /// Sensor × direction response for modal coefficients `b`
    pub fn response(&self, b: &[Complex64]) -> Array2<Complex64> {
        let orders = b.len().min(self.max_order + 1);
        let mut out = Array2::<Complex64>::zeros((self.num_sensors(), self.num_directions()));
        for ((q, d), v) in out.indexed_iter_mut() {
            let cell = self.kernel.slice(ndarray::s![q, d, ..orders]);
            *v = cell
                .iter()
                .zip(b)
                .fold(Complex64::new(0.0, 0.0), |acc, (&k, &bn)| acc + bn * k);
        }
        out
    }
}
