//! Real spherical harmonics (ACN ordering, N3D normalisation)
//!
//! Everything inside the encoder works in N3D; conversion to the host's
//! normalisation happens at the very end of the frame pipeline.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{SpatialError, SpatialResult};

/// Ambisonic order (determines spatial resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AmbisonicOrder {
    /// First order (4 channels)
    First = 1,
    /// Second order (9 channels)
    Second = 2,
    /// Third order (16 channels)
    Third = 3,
    /// Fourth order (25 channels)
    Fourth = 4,
    /// Fifth order (36 channels)
    Fifth = 5,
    /// Sixth order (49 channels)
    Sixth = 6,
    /// Seventh order (64 channels)
    Seventh = 7,
}

impl AmbisonicOrder {
    /// Get channel count for this order
    pub fn channel_count(&self) -> usize {
        num_sh(self.as_usize())
    }

    /// Create from order number
    pub fn from_order(order: usize) -> SpatialResult<Self> {
        match order {
            1 => Ok(AmbisonicOrder::First),
            2 => Ok(AmbisonicOrder::Second),
            3 => Ok(AmbisonicOrder::Third),
            4 => Ok(AmbisonicOrder::Fourth),
            5 => Ok(AmbisonicOrder::Fifth),
            6 => Ok(AmbisonicOrder::Sixth),
            7 => Ok(AmbisonicOrder::Seventh),
            _ => Err(SpatialError::InvalidAmbisonicOrder(order)),
        }
    }

    /// Clamp an arbitrary order number into the supported range
    pub fn clamped(order: usize) -> Self {
        Self::from_order(order.clamp(1, 7)).unwrap_or(AmbisonicOrder::First)
    }

    /// Get order number
    pub fn as_usize(&self) -> usize {
        *self as usize
    }
}

/// Number of SH channels up to `order`
pub const fn num_sh(order: usize) -> usize {
    (order + 1) * (order + 1)
}

/// ACN channel index from (order, degree)
pub fn acn_index(order: i32, degree: i32) -> usize {
    (order * order + order + degree) as usize
}

/// Get (order, degree) from ACN index
pub fn acn_to_order_degree(acn: usize) -> (i32, i32) {
    let order = (acn as f64).sqrt().floor() as i32;
    let degree = acn as i32 - order * order - order;
    (order, degree)
}

/// Legendre polynomials P_0..=P_nmax evaluated at `t`
pub fn legendre(nmax: usize, t: f64, out: &mut [f64]) {
    out[0] = 1.0;
    if nmax == 0 {
        return;
    }
    out[1] = t;
    for n in 1..nmax {
        let nf = n as f64;
        out[n + 1] = ((2.0 * nf + 1.0) * t * out[n] - nf * out[n - 1]) / (nf + 1.0);
    }
}

/// Real N3D spherical harmonics for one direction, ACN order.
///
/// `out` must hold at least `(order+1)^2` values. Angles in radians,
/// elevation measured from the horizontal plane. No Condon-Shortley phase.
pub fn real_sh_n3d(order: usize, azimuth: f64, elevation: f64, out: &mut [f64]) {
    let t = elevation.sin();
    let s = elevation.cos().abs();

    // Associated Legendre table, p[n][m]
    let mut p = vec![vec![0.0f64; order + 1]; order + 1];
    p[0][0] = 1.0;
    for m in 1..=order {
        p[m][m] = p[m - 1][m - 1] * (2 * m - 1) as f64 * s;
    }
    for m in 0..order {
        p[m + 1][m] = (2 * m + 1) as f64 * t * p[m][m];
    }
    for m in 0..=order {
        for n in (m + 2)..=order {
            p[n][m] = ((2 * n - 1) as f64 * t * p[n - 1][m] - (n + m - 1) as f64 * p[n - 2][m])
                / (n - m) as f64;
        }
    }

    for n in 0..=order {
        for m in 0..=n {
            let norm = n3d_factor(n, m);
            let base = norm * p[n][m];
            if m == 0 {
                out[acn_index(n as i32, 0)] = base;
            } else {
                let mf = m as f64;
                out[acn_index(n as i32, m as i32)] = base * (mf * azimuth).cos();
                out[acn_index(n as i32, -(m as i32))] = base * (mf * azimuth).sin();
            }
        }
    }
}

/// N3D normalisation factor for order `n`, degree magnitude `m`
fn n3d_factor(n: usize, m: usize) -> f64 {
    let delta = if m == 0 { 1.0 } else { 2.0 };
    // (n-m)!/(n+m)!
    let ratio: f64 = ((n - m + 1)..=(n + m)).map(|k| 1.0 / k as f64).product();
    ((2 * n + 1) as f64 * delta * ratio).sqrt()
}

/// SH matrix for a set of directions: one row per direction, one column
/// per ACN channel
pub fn sh_matrix(order: usize, directions: &[(f64, f64)]) -> DMatrix<f64> {
    let nsh = num_sh(order);
    let mut row = vec![0.0f64; nsh];
    let mut y = DMatrix::<f64>::zeros(directions.len(), nsh);
    for (i, &(azi, elev)) in directions.iter().enumerate() {
        real_sh_n3d(order, azi, elev, &mut row);
        for (j, &v) in row.iter().enumerate() {
            y[(i, j)] = v;
        }
    }
    y
}
