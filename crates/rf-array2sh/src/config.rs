//! Encoder configuration
//!
//! [`EncoderSettings`] is the pending configuration owned by the encoder.
//! It is never mutated field by field from outside: callers build a
//! [`ConfigDelta`] and the settings validate and adopt it in
//! [`EncoderSettings::apply`], which reports which subsystems went stale.

use serde::{Deserialize, Serialize};

use crate::MAX_NUM_SENSORS;
use crate::array::{ArraySpecification, ArrayType, RADIUS_MAX, RADIUS_MIN, WeightType};
use crate::sh::AmbisonicOrder;

/// Regularisation (maximum filter gain) range in dB
pub const REGULARIZATION_MIN_DB: f32 = 0.0;
pub const REGULARIZATION_MAX_DB: f32 = 80.0;
/// Propagation speed range in m/s
pub const SPEED_OF_SOUND_MIN: f32 = 200.0;
pub const SPEED_OF_SOUND_MAX: f32 = 2000.0;
/// Post gain range in dB
pub const POST_GAIN_MIN_DB: f32 = -60.0;
pub const POST_GAIN_MAX_DB: f32 = 12.0;

/// Encoding filter design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    /// Magnitude soft-limited inverse of the modal response
    SoftLimiting,
    /// Tikhonov-regularised inverse
    Tikhonov,
}

/// Output channel ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrdering {
    /// ACN (Ambisonic Channel Number)
    #[default]
    Acn,
    /// FuMa ordering, first order only
    FuMa,
}

/// Output normalisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Normalization {
    /// N3D (fully normalised)
    N3D,
    /// SN3D (Schmidt semi-normalised)
    #[default]
    SN3D,
    /// FuMa (Furse-Malham), first order only
    FuMa,
}

/// One configuration change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigDelta {
    Order(usize),
    NumSensors(usize),
    SensorAzimuthRad { index: usize, value: f32 },
    SensorElevationRad { index: usize, value: f32 },
    SensorAzimuthDeg { index: usize, value: f32 },
    SensorElevationDeg { index: usize, value: f32 },
    ArrayRadius(f32),
    BaffleRadius(f32),
    ArrayType(ArrayType),
    WeightType(WeightType),
    FilterType(FilterType),
    /// Maximum filter gain in dB
    Regularization(f32),
    SpeedOfSound(f32),
    ChannelOrdering(ChannelOrdering),
    Normalization(Normalization),
    PostGain(f32),
    MaxFrequency(f32),
    DiffuseEqPastAliasing(bool),
    /// Host sample rate in Hz
    SampleRate(u32),
    /// Rebuild filterbank and matrices unconditionally
    Refresh,
    /// Recompute the diagnostic curves at the next checkpoint
    RequestEvaluation,
}

/// Subsystems made stale by a configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Invalidation {
    pub filterbank: bool,
    pub matrix: bool,
    pub evaluation: bool,
}

impl Invalidation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matrix() -> Self {
        Self {
            matrix: true,
            ..Self::default()
        }
    }

    pub fn channels() -> Self {
        Self {
            filterbank: true,
            matrix: true,
            evaluation: false,
        }
    }

    pub fn evaluation() -> Self {
        Self {
            evaluation: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.filterbank || self.matrix || self.evaluation)
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            filterbank: self.filterbank || other.filterbank,
            matrix: self.matrix || other.matrix,
            evaluation: self.evaluation || other.evaluation,
        }
    }
}

/// Pending encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    array: ArraySpecification,
    order: AmbisonicOrder,
    filter_type: FilterType,
    regularization_db: f32,
    speed_of_sound: f32,
    channel_ordering: ChannelOrdering,
    normalization: Normalization,
    post_gain_db: f32,
    diffuse_eq_past_aliasing: bool,
    max_frequency_hz: f32,
    sample_rate: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            array: ArraySpecification::default(),
            order: AmbisonicOrder::First,
            filter_type: FilterType::Tikhonov,
            regularization_db: 15.0,
            speed_of_sound: 343.0,
            channel_ordering: ChannelOrdering::Acn,
            normalization: Normalization::SN3D,
            post_gain_db: 0.0,
            diffuse_eq_past_aliasing: true,
            max_frequency_hz: 20000.0,
            sample_rate: 48000,
        }
    }
}

impl EncoderSettings {
    /// Settings for a given array at a given order
    pub fn with_array(array: ArraySpecification, order: AmbisonicOrder) -> Self {
        Self {
            array,
            order,
            ..Self::default()
        }
        .validated()
    }

    /// Clamp every field into range and enforce the cross-field rules.
    /// Used for settings that did not arrive through [`Self::apply`].
    pub fn validated(mut self) -> Self {
        let a = &mut self.array;
        a.num_sensors = a.num_sensors.clamp(1, MAX_NUM_SENSORS);
        a.radius = clamp_finite(a.radius, RADIUS_MIN, RADIUS_MAX);
        a.baffle_radius = clamp_finite(a.baffle_radius, RADIUS_MIN, RADIUS_MAX);
        self.regularization_db = clamp_finite(
            self.regularization_db,
            REGULARIZATION_MIN_DB,
            REGULARIZATION_MAX_DB,
        );
        self.speed_of_sound = clamp_finite(self.speed_of_sound, SPEED_OF_SOUND_MIN, SPEED_OF_SOUND_MAX);
        self.post_gain_db = clamp_finite(self.post_gain_db, POST_GAIN_MIN_DB, POST_GAIN_MAX_DB);
        if self.sample_rate == 0 {
            self.sample_rate = Self::default().sample_rate;
        }
        if !self.max_frequency_hz.is_finite() || self.max_frequency_hz < 0.0 {
            self.max_frequency_hz = Self::default().max_frequency_hz;
        }
        self.enforce_sensor_rule();
        self.coerce_legacy_formats();
        self
    }

    /// Adopt one change. Returns the subsystems that must be rebuilt.
    pub fn apply(&mut self, delta: ConfigDelta) -> Invalidation {
        match delta {
            ConfigDelta::Order(order) => {
                let order = AmbisonicOrder::clamped(order);
                if order == self.order {
                    return Invalidation::none();
                }
                self.order = order;
                self.coerce_legacy_formats();
                Invalidation::channels()
            }
            ConfigDelta::NumSensors(q) => {
                let q = q.clamp(1, MAX_NUM_SENSORS);
                if q == self.array.num_sensors {
                    return Invalidation::none();
                }
                self.array.num_sensors = q;
                self.enforce_sensor_rule();
                self.coerce_legacy_formats();
                Invalidation::channels()
            }
            ConfigDelta::SensorAzimuthRad { index, value } => {
                self.update_sensor(index, value, |s, v| s.set_azimuth_rad(v))
            }
            ConfigDelta::SensorElevationRad { index, value } => {
                self.update_sensor(index, value, |s, v| s.set_elevation_rad(v))
            }
            ConfigDelta::SensorAzimuthDeg { index, value } => {
                self.update_sensor(index, value, |s, v| s.set_azimuth_deg(v))
            }
            ConfigDelta::SensorElevationDeg { index, value } => {
                self.update_sensor(index, value, |s, v| s.set_elevation_deg(v))
            }
            ConfigDelta::ArrayRadius(r) => {
                let r = clamp_finite(r, RADIUS_MIN, RADIUS_MAX);
                changed_matrix(&mut self.array.radius, r)
            }
            ConfigDelta::BaffleRadius(r) => {
                let r = clamp_finite(r, RADIUS_MIN, RADIUS_MAX);
                changed_matrix(&mut self.array.baffle_radius, r)
            }
            ConfigDelta::ArrayType(t) => changed_matrix(&mut self.array.array_type, t),
            ConfigDelta::WeightType(w) => changed_matrix(&mut self.array.weight_type, w),
            ConfigDelta::FilterType(f) => changed_matrix(&mut self.filter_type, f),
            ConfigDelta::Regularization(db) => {
                let db = clamp_finite(db, REGULARIZATION_MIN_DB, REGULARIZATION_MAX_DB);
                changed_matrix(&mut self.regularization_db, db)
            }
            ConfigDelta::SpeedOfSound(c) => {
                let c = clamp_finite(c, SPEED_OF_SOUND_MIN, SPEED_OF_SOUND_MAX);
                changed_matrix(&mut self.speed_of_sound, c)
            }
            ConfigDelta::DiffuseEqPastAliasing(on) => {
                changed_matrix(&mut self.diffuse_eq_past_aliasing, on)
            }
            ConfigDelta::SampleRate(rate) => {
                if rate == 0 {
                    return Invalidation::none();
                }
                changed_matrix(&mut self.sample_rate, rate)
            }
            ConfigDelta::ChannelOrdering(ordering) => {
                self.channel_ordering = ordering;
                self.coerce_legacy_formats();
                Invalidation::none()
            }
            ConfigDelta::Normalization(norm) => {
                self.normalization = norm;
                self.coerce_legacy_formats();
                Invalidation::none()
            }
            ConfigDelta::PostGain(db) => {
                self.post_gain_db = clamp_finite(db, POST_GAIN_MIN_DB, POST_GAIN_MAX_DB);
                Invalidation::none()
            }
            ConfigDelta::MaxFrequency(hz) => {
                if hz.is_finite() {
                    self.max_frequency_hz = hz.max(0.0);
                }
                Invalidation::none()
            }
            ConfigDelta::Refresh => Invalidation::channels(),
            ConfigDelta::RequestEvaluation => Invalidation::evaluation(),
        }
    }

    fn update_sensor(
        &mut self,
        index: usize,
        value: f32,
        set: impl FnOnce(&mut crate::array::SensorDirection, f32),
    ) -> Invalidation {
        if !value.is_finite() {
            return Invalidation::none();
        }
        match self.array.sensor_mut(index) {
            Some(sensor) => {
                let before = *sensor;
                set(sensor, value);
                if *sensor == before {
                    Invalidation::none()
                } else {
                    Invalidation::matrix()
                }
            }
            None => {
                log::warn!("Ignoring direction for sensor {} (max {})", index, MAX_NUM_SENSORS);
                Invalidation::none()
            }
        }
    }

    /// Fewer sensors than harmonics at the pending order forces first order
    fn enforce_sensor_rule(&mut self) {
        if self.array.num_sensors < self.order.channel_count() && self.order != AmbisonicOrder::First {
            log::debug!(
                "{} sensors cannot support order {}, falling back to first order",
                self.array.num_sensors,
                self.order.as_usize()
            );
            self.order = AmbisonicOrder::First;
        }
    }

    /// FuMa ordering/normalisation exist only at first order
    fn coerce_legacy_formats(&mut self) {
        if self.order == AmbisonicOrder::First {
            return;
        }
        if self.channel_ordering == ChannelOrdering::FuMa {
            log::debug!("FuMa ordering requires first order, using ACN");
            self.channel_ordering = ChannelOrdering::default();
        }
        if self.normalization == Normalization::FuMa {
            log::debug!("FuMa normalisation requires first order, using SN3D");
            self.normalization = Normalization::default();
        }
    }

    pub fn array(&self) -> &ArraySpecification {
        &self.array
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Harmonic channel count at the pending order
    pub fn num_sh(&self) -> usize {
        self.order.channel_count()
    }

    pub fn num_sensors(&self) -> usize {
        self.array.num_sensors
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn regularization_db(&self) -> f32 {
        self.regularization_db
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.speed_of_sound
    }

    pub fn channel_ordering(&self) -> ChannelOrdering {
        self.channel_ordering
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn post_gain_db(&self) -> f32 {
        self.post_gain_db
    }

    /// Post gain as a linear factor
    pub fn post_gain_linear(&self) -> f32 {
        10.0f32.powf(self.post_gain_db / 20.0)
    }

    pub fn diffuse_eq_past_aliasing(&self) -> bool {
        self.diffuse_eq_past_aliasing
    }

    pub fn max_frequency_hz(&self) -> f32 {
        self.max_frequency_hz
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate > 0 {
            self.sample_rate = sample_rate;
        }
    }
}

fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() { min } else { value.clamp(min, max) }
}

fn changed_matrix<T: PartialEq>(slot: &mut T, value: T) -> Invalidation {
    if *slot == value {
        Invalidation::none()
    } else {
        *slot = value;
        Invalidation::matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_settings(order: usize) -> EncoderSettings {
        EncoderSettings::with_array(
            ArraySpecification::spherical_uniform(32, 0.042),
            AmbisonicOrder::clamped(order),
        )
    }

    #[test]
    fn test_defaults() {
        let s = EncoderSettings::default();
        assert_eq!(s.order(), AmbisonicOrder::First);
        assert_eq!(s.num_sh(), 4);
        assert_eq!(s.filter_type(), FilterType::Tikhonov);
        assert_eq!(s.channel_ordering(), ChannelOrdering::Acn);
        assert_eq!(s.normalization(), Normalization::SN3D);
        assert!(s.diffuse_eq_past_aliasing());
    }

    #[test]
    fn test_fuma_preserved_at_first_order() {
        let mut s = EncoderSettings::default();
        assert!(s.apply(ConfigDelta::ChannelOrdering(ChannelOrdering::FuMa)).is_empty());
        assert!(s.apply(ConfigDelta::Normalization(Normalization::FuMa)).is_empty());
        assert_eq!(s.channel_ordering(), ChannelOrdering::FuMa);
        assert_eq!(s.normalization(), Normalization::FuMa);
    }

    #[test]
    fn test_fuma_coerced_at_higher_orders() {
        for order in 2..=7 {
            let mut s = dense_settings(order);
            s.apply(ConfigDelta::Normalization(Normalization::N3D));
            s.apply(ConfigDelta::ChannelOrdering(ChannelOrdering::FuMa));
            s.apply(ConfigDelta::Normalization(Normalization::FuMa));
            assert_eq!(s.channel_ordering(), ChannelOrdering::Acn, "order {}", order);
            assert_eq!(s.normalization(), Normalization::SN3D, "order {}", order);
        }
    }

    #[test]
    fn test_order_change_drops_fuma() {
        let mut s = dense_settings(1);
        s.apply(ConfigDelta::ChannelOrdering(ChannelOrdering::FuMa));
        s.apply(ConfigDelta::Normalization(Normalization::FuMa));

        let inv = s.apply(ConfigDelta::Order(3));
        assert_eq!(inv, Invalidation::channels());
        assert_eq!(s.channel_ordering(), ChannelOrdering::Acn);
        assert_eq!(s.normalization(), Normalization::SN3D);
    }

    #[test]
    fn test_sensor_count_forces_first_order() {
        let mut s = dense_settings(3);
        assert_eq!(s.num_sh(), 16);

        let inv = s.apply(ConfigDelta::NumSensors(8));
        assert_eq!(inv, Invalidation::channels());
        assert_eq!(s.order(), AmbisonicOrder::First);
        assert_eq!(s.num_sensors(), 8);
    }

    #[test]
    fn test_unchanged_values_raise_nothing() {
        let mut s = EncoderSettings::default();
        assert!(s.apply(ConfigDelta::Order(1)).is_empty());
        assert!(s.apply(ConfigDelta::NumSensors(4)).is_empty());
        assert!(s.apply(ConfigDelta::Regularization(15.0)).is_empty());
        assert!(s.apply(ConfigDelta::DiffuseEqPastAliasing(true)).is_empty());
    }

    #[test]
    fn test_gain_and_masking_raise_nothing() {
        let mut s = EncoderSettings::default();
        assert!(s.apply(ConfigDelta::PostGain(6.0)).is_empty());
        assert!(s.apply(ConfigDelta::MaxFrequency(8000.0)).is_empty());
        assert!((s.post_gain_linear() - 1.995).abs() < 1e-3);
        assert_eq!(s.max_frequency_hz(), 8000.0);
    }

    #[test]
    fn test_geometry_raises_matrix_only() {
        let mut s = EncoderSettings::default();
        assert_eq!(s.apply(ConfigDelta::ArrayRadius(0.05)), Invalidation::matrix());
        assert_eq!(
            s.apply(ConfigDelta::SensorAzimuthDeg { index: 0, value: 10.0 }),
            Invalidation::matrix()
        );
        assert_eq!(
            s.apply(ConfigDelta::WeightType(WeightType::OpenCardioid)),
            Invalidation::matrix()
        );
        assert_eq!(s.apply(ConfigDelta::SampleRate(44100)), Invalidation::matrix());
        assert_eq!(s.apply(ConfigDelta::Refresh), Invalidation::channels());
        assert_eq!(s.apply(ConfigDelta::RequestEvaluation), Invalidation::evaluation());
    }

    #[test]
    fn test_out_of_range_values() {
        let mut s = EncoderSettings::default();
        s.apply(ConfigDelta::ArrayRadius(5.0));
        assert_eq!(s.array().radius, RADIUS_MAX);
        s.apply(ConfigDelta::Regularization(-3.0));
        assert_eq!(s.regularization_db(), REGULARIZATION_MIN_DB);
        s.apply(ConfigDelta::SpeedOfSound(1.0e6));
        assert_eq!(s.speed_of_sound(), SPEED_OF_SOUND_MAX);
        s.apply(ConfigDelta::Order(42));
        assert_eq!(s.order(), AmbisonicOrder::Seventh);
        assert!(
            s.apply(ConfigDelta::SensorElevationRad { index: MAX_NUM_SENSORS, value: 0.1 })
                .is_empty()
        );
    }

    #[test]
    fn test_deserialized_settings_are_validated() {
        let json = r#"{ "order": "Third", "normalization": "FuMa", "post_gain_db": 40.0 }"#;
        let s: EncoderSettings = serde_json::from_str(json).unwrap();
        let s = s.validated();
        // default tetrahedral array only supports first order
        assert_eq!(s.order(), AmbisonicOrder::First);
        assert_eq!(s.normalization(), Normalization::FuMa);
        assert_eq!(s.post_gain_db(), POST_GAIN_MAX_DB);
    }
}
