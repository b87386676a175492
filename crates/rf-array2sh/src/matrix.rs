//! Encoding matrix storage and rebuild

use ndarray::{Array2, Array3, ArrayView2, s};
use num_complex::Complex32;

use crate::config::EncoderSettings;
use crate::error::{SpatialError, SpatialResult};
use crate::solver::{HarmonicSolver, SolverOutput, SolverRequest};
use crate::{MAX_NUM_SENSORS, MAX_NUM_SH_SIGNALS, MAX_SH_ORDER, NUM_BANDS};

/// Floor for magnitude curves in dB
const CURVE_FLOOR_DB: f32 = -200.0;

/// Per-band complex encoding matrices in fixed-capacity storage
#[derive(Debug, Clone)]
pub struct EncodingMatrices {
    data: Array3<Complex32>,
    num_sh: usize,
    num_sensors: usize,
}

impl EncodingMatrices {
    pub fn new() -> Self {
        Self {
            data: Array3::zeros((NUM_BANDS, MAX_NUM_SH_SIGNALS, MAX_NUM_SENSORS)),
            num_sh: 0,
            num_sensors: 0,
        }
    }

    /// (bands, harmonics, sensors) the storage can hold
    pub fn capacity(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Valid (harmonics, sensors) extent of every band
    pub fn extent(&self) -> (usize, usize) {
        (self.num_sh, self.num_sensors)
    }

    /// Matrix of one band, sliced to the valid extent
    pub fn band(&self, band: usize) -> ArrayView2<'_, Complex32> {
        self.data.slice(s![band, ..self.num_sh, ..self.num_sensors])
    }

    /// Replace every band at once. On any contract violation the storage is
    /// zeroed at the expected extent and an error returned.
    pub fn replace(&mut self, matrices: &[Array2<Complex32>], num_sh: usize, num_sensors: usize) -> SpatialResult<()> {
        if let Err(e) = validate(matrices, num_sh, num_sensors) {
            self.clear(num_sh, num_sensors);
            return Err(e);
        }

        self.data.fill(Complex32::new(0.0, 0.0));
        for (band, matrix) in matrices.iter().enumerate() {
            self.data
                .slice_mut(s![band, ..num_sh, ..num_sensors])
                .assign(matrix);
        }
        self.num_sh = num_sh;
        self.num_sensors = num_sensors;
        Ok(())
    }

    /// Zero all bands and set the valid extent
    pub fn clear(&mut self, num_sh: usize, num_sensors: usize) {
        self.data.fill(Complex32::new(0.0, 0.0));
        self.num_sh = num_sh.min(MAX_NUM_SH_SIGNALS);
        self.num_sensors = num_sensors.min(MAX_NUM_SENSORS);
    }

    /// True when every element in the valid extent is zero
    pub fn is_zero(&self) -> bool {
        (0..NUM_BANDS).all(|b| self.band(b).iter().all(|v| v.re == 0.0 && v.im == 0.0))
    }
}

impl Default for EncodingMatrices {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(matrices: &[Array2<Complex32>], num_sh: usize, num_sensors: usize) -> SpatialResult<()> {
    if num_sh > MAX_NUM_SH_SIGNALS || num_sensors > MAX_NUM_SENSORS {
        return Err(SpatialError::SolverContract(format!(
            "extent {}x{} exceeds capacity",
            num_sh, num_sensors
        )));
    }
    if matrices.len() != NUM_BANDS {
        return Err(SpatialError::SolverContract(format!(
            "expected {} bands, got {}",
            NUM_BANDS,
            matrices.len()
        )));
    }
    for (band, matrix) in matrices.iter().enumerate() {
        if matrix.dim() != (num_sh, num_sensors) {
            return Err(SpatialError::SolverContract(format!(
                "band {} is {:?}, expected ({}, {})",
                band,
                matrix.dim(),
                num_sh,
                num_sensors
            )));
        }
        if matrix.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
            return Err(SpatialError::SolverContract(format!("band {} is not finite", band)));
        }
    }
    Ok(())
}

/// Modal and inverse magnitude responses in dB (rows = order, cols = band)
#[derive(Debug, Clone)]
pub struct MagnitudeCurves {
    modal_db: Array2<f32>,
    inverse_db: Array2<f32>,
    order: usize,
}

impl MagnitudeCurves {
    pub fn new() -> Self {
        Self {
            modal_db: Array2::from_elem((MAX_SH_ORDER + 1, NUM_BANDS), CURVE_FLOOR_DB),
            inverse_db: Array2::from_elem((MAX_SH_ORDER + 1, NUM_BANDS), CURVE_FLOOR_DB),
            order: 0,
        }
    }

    /// Order the curves were computed for
    pub fn order(&self) -> usize {
        self.order
    }

    /// 20·log10|bₙ| for orders 0..=order
    pub fn modal_db(&self) -> ArrayView2<'_, f32> {
        self.modal_db.slice(s![..=self.order, ..])
    }

    /// 20·log10|Hₙ| for orders 0..=order
    pub fn inverse_db(&self) -> ArrayView2<'_, f32> {
        self.inverse_db.slice(s![..=self.order, ..])
    }

    fn update(&mut self, output: &SolverOutput, order: usize) {
        self.modal_db.fill(CURVE_FLOOR_DB);
        self.inverse_db.fill(CURVE_FLOOR_DB);
        for ((n, band), &mag) in output.modal.indexed_iter() {
            if n <= MAX_SH_ORDER && band < NUM_BANDS {
                self.modal_db[(n, band)] = to_db(mag);
            }
        }
        for ((n, band), &mag) in output.inverse.indexed_iter() {
            if n <= MAX_SH_ORDER && band < NUM_BANDS {
                self.inverse_db[(n, band)] = to_db(mag);
            }
        }
        self.order = order.min(MAX_SH_ORDER);
    }
}

impl Default for MagnitudeCurves {
    fn default() -> Self {
        Self::new()
    }
}

fn to_db(mag: f64) -> f32 {
    if mag > 0.0 && mag.is_finite() {
        ((20.0 * mag.log10()) as f32).max(CURVE_FLOOR_DB)
    } else {
        CURVE_FLOOR_DB
    }
}

/// Owns the solver, the matrices and the magnitude curves
pub struct EncodingMatrixBuilder {
    solver: Box<dyn HarmonicSolver>,
    matrices: EncodingMatrices,
    curves: MagnitudeCurves,
}

impl EncodingMatrixBuilder {
    pub fn new(solver: Box<dyn HarmonicSolver>) -> Self {
        Self {
            solver,
            matrices: EncodingMatrices::new(),
            curves: MagnitudeCurves::new(),
        }
    }

    /// Rebuild every band for the pending configuration. On failure the
    /// matrices are left zeroed so the encoder outputs silence.
    pub fn rebuild(&mut self, settings: &EncoderSettings, frequencies: &[f32]) -> SpatialResult<()> {
        let request = SolverRequest { settings, frequencies };
        let num_sh = request.num_sh();
        let num_sensors = request.num_sensors();

        let output = match self.solver.solve(&request) {
            Ok(output) => output,
            Err(e) => {
                self.matrices.clear(num_sh, num_sensors);
                return Err(e);
            }
        };

        self.matrices.replace(&output.matrices, num_sh, num_sensors)?;
        self.curves.update(&output, request.order());
        Ok(())
    }

    pub fn matrices(&self) -> &EncodingMatrices {
        &self.matrices
    }

    pub fn curves(&self) -> &MagnitudeCurves {
        &self.curves
    }
}
