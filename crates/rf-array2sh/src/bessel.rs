//! Bessel functions for modal array responses
//!
//! All routines fill `out[0..=nmax]` for a single real argument. Regular
//! functions use Miller's downward recurrence below the turning point,
//! irregular ones recur upward from closed forms.

use std::f64::consts::PI;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const RESCALE_LIMIT: f64 = 1.0e250;
const RESCALE: f64 = 1.0e-250;
/// Below this Y0/Y1 use the ascending series, above it the Hankel expansion
const SERIES_LIMIT: f64 = 12.0;

fn miller_start(nmax: usize, x: f64) -> usize {
    let top = nmax.max(x.ceil() as usize);
    top + 20 + (4.0 * x.sqrt()) as usize
}

/// Spherical Bessel functions of the first kind j_0..=j_nmax
pub fn spherical_j(nmax: usize, x: f64, out: &mut [f64]) {
    let out = &mut out[..=nmax];
    out.fill(0.0);
    if x.abs() < 1.0e-12 {
        out[0] = 1.0;
        return;
    }

    let j0 = x.sin() / x;
    if nmax == 0 {
        out[0] = j0;
        return;
    }
    let j1 = x.sin() / (x * x) - x.cos() / x;

    if x >= nmax as f64 {
        out[0] = j0;
        out[1] = j1;
        for n in 1..nmax {
            out[n + 1] = (2 * n + 1) as f64 / x * out[n] - out[n - 1];
        }
        return;
    }

    let start = miller_start(nmax, x);
    let mut next = 0.0;
    let mut cur = 1.0e-30;
    for k in (1..=start).rev() {
        let prev = (2 * k + 1) as f64 / x * cur - next;
        next = cur;
        cur = prev;
        if k - 1 <= nmax {
            out[k - 1] = cur;
        }
        if cur.abs() > RESCALE_LIMIT {
            cur *= RESCALE;
            next *= RESCALE;
            out.iter_mut().for_each(|v| *v *= RESCALE);
        }
    }

    // normalise against whichever closed form is further from a zero
    let scale = if j0.abs() >= j1.abs() {
        j0 / out[0]
    } else {
        j1 / out[1]
    };
    out.iter_mut().for_each(|v| *v *= scale);
}

/// Spherical Bessel functions of the second kind y_0..=y_nmax
pub fn spherical_y(nmax: usize, x: f64, out: &mut [f64]) {
    let out = &mut out[..=nmax];
    out[0] = -x.cos() / x;
    if nmax == 0 {
        return;
    }
    out[1] = -x.cos() / (x * x) - x.sin() / x;
    for n in 1..nmax {
        out[n + 1] = (2 * n + 1) as f64 / x * out[n] - out[n - 1];
    }
}

/// Derivatives of spherical Bessel functions from their values.
/// `values` must hold orders 0..=nmax with nmax ≥ 1.
pub fn spherical_derivative(values: &[f64], x: f64, out: &mut [f64]) {
    let nmax = values.len() - 1;
    out[0] = -values[1];
    for n in 1..=nmax {
        out[n] = values[n - 1] - (n + 1) as f64 / x * values[n];
    }
}

/// Cylindrical Bessel functions of the first kind J_0..=J_nmax
pub fn cylindrical_j(nmax: usize, x: f64, out: &mut [f64]) {
    let out = &mut out[..=nmax];
    out.fill(0.0);
    if x.abs() < 1.0e-12 {
        out[0] = 1.0;
        return;
    }

    // even start so the normalisation sum sees every even order
    let start = (miller_start(nmax, x) + 1) & !1;
    let mut next = 0.0;
    let mut cur = 1.0e-30;
    let mut sum = 2.0 * cur;
    for k in (1..=start).rev() {
        let prev = (2 * k) as f64 / x * cur - next;
        next = cur;
        cur = prev;
        let idx = k - 1;
        if idx <= nmax {
            out[idx] = cur;
        }
        if idx % 2 == 0 {
            sum += if idx == 0 { cur } else { 2.0 * cur };
        }
        if cur.abs() > RESCALE_LIMIT {
            cur *= RESCALE;
            next *= RESCALE;
            sum *= RESCALE;
            out.iter_mut().for_each(|v| *v *= RESCALE);
        }
    }

    // J0 + 2ΣJ_2k = 1
    let scale = 1.0 / sum;
    out.iter_mut().for_each(|v| *v *= scale);
}

/// Cylindrical Bessel functions of the second kind Y_0..=Y_nmax.
/// `j` must hold J_0 and J_1 at the same argument.
pub fn cylindrical_y(nmax: usize, x: f64, j: &[f64], out: &mut [f64]) {
    let out = &mut out[..=nmax];
    let (y0, y1) = if x < SERIES_LIMIT {
        y01_series(x, j[0], j[1])
    } else {
        (hankel_asymptotic(0, x).1, hankel_asymptotic(1, x).1)
    };
    out[0] = y0;
    if nmax == 0 {
        return;
    }
    out[1] = y1;
    for n in 1..nmax {
        out[n + 1] = (2 * n) as f64 / x * out[n] - out[n - 1];
    }
}

/// Derivatives of cylindrical Bessel functions from their values.
/// `values` must hold orders 0..=nmax+1; fills `out[0..=nmax]`.
pub fn cylindrical_derivative(values: &[f64], out: &mut [f64]) {
    let nmax = values.len() - 2;
    out[0] = -values[1];
    for n in 1..=nmax {
        out[n] = 0.5 * (values[n - 1] - values[n + 1]);
    }
}

fn y01_series(x: f64, j0: f64, j1: f64) -> (f64, f64) {
    let q = -0.25 * x * x;
    let log_term = (0.5 * x).ln();

    // Y0 = (2/π)[(ln(x/2) + γ) J0 − Σ_{k≥1} t_k H_k]
    let mut t = 1.0;
    let mut harmonic = 0.0;
    let mut acc0 = 0.0;
    for k in 1..200 {
        let kf = k as f64;
        t *= q / (kf * kf);
        harmonic += 1.0 / kf;
        let term = t * harmonic;
        acc0 += term;
        if term.abs() < 1.0e-17 * acc0.abs().max(1.0e-300) && kf > x {
            break;
        }
    }
    let y0 = 2.0 / PI * ((log_term + EULER_GAMMA) * j0 - acc0);

    // Y1 = −2/(πx) + (2/π) ln(x/2) J1 − (1/π) Σ_{k≥0} u_k (ψ(k+1) + ψ(k+2))
    let mut u = 0.5 * x;
    let mut h_k = 0.0;
    let mut h_k1 = 1.0;
    let mut acc1 = u * (h_k + h_k1 - 2.0 * EULER_GAMMA);
    for k in 1..200 {
        let kf = k as f64;
        u *= q / (kf * (kf + 1.0));
        h_k = h_k1;
        h_k1 += 1.0 / (kf + 1.0);
        let term = u * (h_k + h_k1 - 2.0 * EULER_GAMMA);
        acc1 += term;
        if term.abs() < 1.0e-17 * acc1.abs().max(1.0e-300) && kf > x {
            break;
        }
    }
    let y1 = -2.0 / (PI * x) + 2.0 / PI * log_term * j1 - acc1 / PI;

    (y0, y1)
}

/// (J_n, Y_n) from the large-argument Hankel expansion
fn hankel_asymptotic(n: usize, x: f64) -> (f64, f64) {
    let mu = 4.0 * (n * n) as f64;
    let chi = x - (0.5 * n as f64 + 0.25) * PI;

    let mut p = 1.0;
    let mut q = 0.0;
    let mut t = 1.0f64;
    for k in 1..=30 {
        let odd = (2 * k - 1) as f64;
        let t_next = t * (mu - odd * odd) / (k as f64 * 8.0 * x);
        if t_next.abs() > t.abs() {
            break;
        }
        t = t_next;
        match k % 4 {
            1 => q += t,
            2 => p -= t,
            3 => q -= t,
            _ => p += t,
        }
        if t.abs() < 1.0e-17 {
            break;
        }
    }

    let amp = (2.0 / (PI * x)).sqrt();
    (
        amp * (p * chi.cos() - q * chi.sin()),
        amp * (p * chi.sin() + q * chi.cos()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_spherical_known_values() {
        let mut j = [0.0f64; 4];
        let mut y = [0.0f64; 4];
        spherical_j(3, 1.0, &mut j);
        spherical_y(3, 1.0, &mut y);

        assert_abs_diff_eq!(j[0], 1.0f64.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(j[1], 1.0f64.sin() - 1.0f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(j[2], 0.062_035_052_011_405_6, epsilon = 1e-10);
        assert_abs_diff_eq!(y[0], -1.0f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(y[1], -1.0f64.cos() - 1.0f64.sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_spherical_wronskian() {
        for &x in &[0.05, 0.7, 3.0, 9.5, 40.0] {
            let mut j = [0.0f64; 9];
            let mut y = [0.0f64; 9];
            spherical_j(8, x, &mut j);
            spherical_y(8, x, &mut y);
            for n in 1..=8 {
                let w = j[n] * y[n - 1] - j[n - 1] * y[n];
                let expected = 1.0 / (x * x);
                assert!(
                    ((w - expected) / expected).abs() < 1e-8,
                    "x={} n={} w={} expected={}",
                    x,
                    n,
                    w,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_spherical_small_argument() {
        let mut j = [0.0f64; 5];
        spherical_j(4, 1.0e-3, &mut j);
        assert_abs_diff_eq!(j[0], 1.0, epsilon = 1e-6);
        // j1(x) ≈ x/3
        assert_abs_diff_eq!(j[1], 1.0e-3 / 3.0, epsilon = 1e-9);
        assert!(j.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_spherical_derivative() {
        let x = 2.5;
        let h = 1.0e-6;
        let mut j = [0.0f64; 4];
        let mut jp = [0.0f64; 4];
        let mut lo = [0.0f64; 4];
        let mut hi = [0.0f64; 4];
        spherical_j(3, x, &mut j);
        spherical_derivative(&j, x, &mut jp);
        spherical_j(3, x - h, &mut lo);
        spherical_j(3, x + h, &mut hi);
        for n in 0..=3 {
            assert_abs_diff_eq!(jp[n], (hi[n] - lo[n]) / (2.0 * h), epsilon = 1e-7);
        }
    }

    #[test]
    fn test_cylindrical_known_values() {
        let mut j = [0.0f64; 4];
        let mut y = [0.0f64; 4];
        cylindrical_j(3, 1.0, &mut j);
        cylindrical_y(3, 1.0, &j, &mut y);
        assert_abs_diff_eq!(j[0], 0.765_197_686_557_966_6, epsilon = 1e-10);
        assert_abs_diff_eq!(j[1], 0.440_050_585_744_933_5, epsilon = 1e-10);
        assert_abs_diff_eq!(j[2], 0.114_903_484_931_900_5, epsilon = 1e-10);
        assert_abs_diff_eq!(y[0], 0.088_256_964_215_676_96, epsilon = 1e-9);
        assert_abs_diff_eq!(y[1], -0.781_212_821_300_288_7, epsilon = 1e-9);

        cylindrical_j(1, 10.0, &mut j);
        cylindrical_y(1, 10.0, &j, &mut y);
        assert_abs_diff_eq!(j[0], -0.245_935_764_451_348_3, epsilon = 1e-9);
        assert_abs_diff_eq!(y[0], 0.055_671_167_283_599_4, epsilon = 1e-8);
    }

    #[test]
    fn test_cylindrical_wronskian() {
        // J_{n+1} Y_n − J_n Y_{n+1} = 2/(πx), across both Y0/Y1 branches
        for &x in &[0.02, 1.5, 11.9, 12.1, 30.0, 150.0] {
            let mut j = [0.0f64; 10];
            let mut y = [0.0f64; 10];
            cylindrical_j(9, x, &mut j);
            cylindrical_y(9, x, &j, &mut y);
            let expected = 2.0 / (PI * x);
            for n in 0..9 {
                let w = j[n + 1] * y[n] - j[n] * y[n + 1];
                assert!(
                    ((w - expected) / expected).abs() < 1e-6,
                    "x={} n={} w={} expected={}",
                    x,
                    n,
                    w,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_cylindrical_derivative() {
        let mut j = [0.0f64; 4];
        let mut jp = [0.0f64; 3];
        cylindrical_j(3, 2.0, &mut j);
        cylindrical_derivative(&j, &mut jp);
        assert_abs_diff_eq!(jp[0], -j[1], epsilon = 1e-15);
        // J1' = J0 − J1/x
        assert_abs_diff_eq!(jp[1], j[0] - j[1] / 2.0, epsilon = 1e-12);
    }
}
