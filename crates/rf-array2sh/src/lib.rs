//! FluxForge Array Encoder
//!
//! Real-time encoding of spherical and cylindrical microphone arrays into
//! spherical-harmonic (Ambisonic) signals:
//!
//! ## Encoding
//! - Up to 7th order (64 channels) from up to 64 sensors
//! - Rigid or open baffles, omni/cardioid/dipole sensors
//! - Soft-limiting or Tikhonov regularised modal inversion
//! - Diffuse-field equalisation past the spatial aliasing frequency
//! - ACN/FuMa ordering, N3D/SN3D/FuMa normalisation
//!
//! ## Runtime reconfiguration
//! - Configuration changes are [`ConfigDelta`] values, applied directly or
//!   queued lock-free through an [`EncoderControl`]
//! - Expensive rebuilds run only in [`ArrayEncoder::checkpoint`], never in
//!   [`ArrayEncoder::process`]
//!
//! ## Diagnostics
//! - Modal and inverse filter magnitude curves
//! - Spatial correlation and level difference on request

pub mod array;
pub mod bands;
pub mod config;
pub mod control;
pub mod dirty;
pub mod encoder;
pub mod evaluation;
pub mod filterbank;
pub mod matrix;
pub mod processor;
pub mod sh;
pub mod solver;
pub mod theory;

mod bessel;
mod error;

pub use array::{ArraySpecification, ArrayType, SensorDirection, WeightType};
pub use config::{ChannelOrdering, ConfigDelta, EncoderSettings, FilterType, Invalidation, Normalization};
pub use control::EncoderControl;
pub use dirty::{DirtyFlag, DirtyState};
pub use encoder::{ArrayEncoder, RebuildStats};
pub use error::{SpatialError, SpatialResult};
pub use sh::AmbisonicOrder;
pub use solver::{HarmonicSolver, SolverOutput, SolverRequest, TheoreticalSolver};

/// Samples per processing block
pub const FRAME_SIZE: usize = 512;
/// Filterbank hop size
pub const HOP_SIZE: usize = 128;
/// Hops per block
pub const TIME_SLOTS: usize = FRAME_SIZE / HOP_SIZE;
/// Frequency bands per hop
pub const NUM_BANDS: usize = HOP_SIZE + 1;
/// Highest supported encoding order
pub const MAX_SH_ORDER: usize = 7;
/// Harmonic channels at the highest order
pub const MAX_NUM_SH_SIGNALS: usize = (MAX_SH_ORDER + 1) * (MAX_SH_ORDER + 1);
/// Sensors the encoder can address
pub const MAX_NUM_SENSORS: usize = 64;
