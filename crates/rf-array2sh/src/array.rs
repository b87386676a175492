//! Sensor array geometry

use serde::{Deserialize, Serialize};

use crate::MAX_NUM_SENSORS;

/// Smallest supported array/baffle radius (metres)
pub const RADIUS_MIN: f32 = 0.001;
/// Largest supported array/baffle radius (metres)
pub const RADIUS_MAX: f32 = 0.4;

/// Array topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayType {
    /// Sensors on (or around) a sphere
    Spherical,
    /// Sensors on a circle around a cylinder
    Cylindrical,
}

/// Baffle and sensor directivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightType {
    /// Omni sensors flush-mounted on a rigid baffle
    RigidOmni,
    /// Omni sensors in free field
    OpenOmni,
    /// Outward-facing cardioids in free field
    OpenCardioid,
    /// Outward-facing dipoles in free field
    OpenDipole,
}

impl WeightType {
    /// Rigid baffle present
    pub fn is_rigid(&self) -> bool {
        matches!(self, WeightType::RigidOmni)
    }

    /// Pressure weight α of the first-order sensor pattern α + (1-α)cosθ
    pub fn directivity(&self) -> f64 {
        match self {
            WeightType::RigidOmni | WeightType::OpenOmni => 1.0,
            WeightType::OpenCardioid => 0.5,
            WeightType::OpenDipole => 0.0,
        }
    }
}

/// Sensor direction, kept in radians and degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorDirection {
    azimuth_rad: f32,
    elevation_rad: f32,
    azimuth_deg: f32,
    elevation_deg: f32,
}

impl SensorDirection {
    /// From radians
    pub fn from_radians(azimuth: f32, elevation: f32) -> Self {
        Self {
            azimuth_rad: azimuth,
            elevation_rad: elevation,
            azimuth_deg: azimuth.to_degrees(),
            elevation_deg: elevation.to_degrees(),
        }
    }

    /// From degrees
    pub fn from_degrees(azimuth: f32, elevation: f32) -> Self {
        Self {
            azimuth_rad: azimuth.to_radians(),
            elevation_rad: elevation.to_radians(),
            azimuth_deg: azimuth,
            elevation_deg: elevation,
        }
    }

    pub fn azimuth_rad(&self) -> f32 {
        self.azimuth_rad
    }

    pub fn elevation_rad(&self) -> f32 {
        self.elevation_rad
    }

    pub fn azimuth_deg(&self) -> f32 {
        self.azimuth_deg
    }

    pub fn elevation_deg(&self) -> f32 {
        self.elevation_deg
    }

    pub fn set_azimuth_rad(&mut self, value: f32) {
        self.azimuth_rad = value;
        self.azimuth_deg = value.to_degrees();
    }

    pub fn set_elevation_rad(&mut self, value: f32) {
        self.elevation_rad = value;
        self.elevation_deg = value.to_degrees();
    }

    pub fn set_azimuth_deg(&mut self, value: f32) {
        self.azimuth_deg = value;
        self.azimuth_rad = value.to_radians();
    }

    pub fn set_elevation_deg(&mut self, value: f32) {
        self.elevation_deg = value;
        self.elevation_rad = value.to_radians();
    }
}

/// Complete array description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySpecification {
    /// Number of sensors in use (pending until the next rebuild)
    pub num_sensors: usize,
    /// Topology
    pub array_type: ArrayType,
    /// Radius at which the sensors sit (metres)
    pub radius: f32,
    /// Radius of the rigid baffle (metres)
    pub baffle_radius: f32,
    /// Baffle and sensor directivity
    pub weight_type: WeightType,
    /// Storage for every possible sensor; only the first `num_sensors` are used
    sensors: Vec<SensorDirection>,
}

impl ArraySpecification {
    /// Four sensors on the vertices of a tetrahedron, rigid 42 mm sphere
    pub fn tetrahedral() -> Self {
        let elev = (1.0f32 / 2.0f32.sqrt()).atan().to_degrees();
        let mut sensors = vec![SensorDirection::default(); MAX_NUM_SENSORS];
        sensors[0] = SensorDirection::from_degrees(45.0, elev);
        sensors[1] = SensorDirection::from_degrees(-45.0, -elev);
        sensors[2] = SensorDirection::from_degrees(135.0, -elev);
        sensors[3] = SensorDirection::from_degrees(-135.0, elev);

        Self {
            num_sensors: 4,
            array_type: ArrayType::Spherical,
            radius: 0.042,
            baffle_radius: 0.042,
            weight_type: WeightType::RigidOmni,
            sensors,
        }
    }

    /// Near-uniform spherical layout (Fibonacci lattice) on a rigid sphere
    pub fn spherical_uniform(num_sensors: usize, radius: f32) -> Self {
        let q = num_sensors.clamp(1, MAX_NUM_SENSORS);
        let mut sensors = vec![SensorDirection::default(); MAX_NUM_SENSORS];
        for (slot, (azi, elev)) in sensors.iter_mut().zip(fibonacci_directions(q)) {
            *slot = SensorDirection::from_radians(azi as f32, elev as f32);
        }

        Self {
            num_sensors: q,
            array_type: ArrayType::Spherical,
            radius: radius.clamp(RADIUS_MIN, RADIUS_MAX),
            baffle_radius: radius.clamp(RADIUS_MIN, RADIUS_MAX),
            weight_type: WeightType::RigidOmni,
            sensors,
        }
    }

    /// Equally spaced sensors around a rigid cylinder
    pub fn circular(num_sensors: usize, radius: f32) -> Self {
        let q = num_sensors.clamp(1, MAX_NUM_SENSORS);
        let mut sensors = vec![SensorDirection::default(); MAX_NUM_SENSORS];
        for (i, slot) in sensors.iter_mut().take(q).enumerate() {
            let azi = 2.0 * std::f32::consts::PI * i as f32 / q as f32;
            *slot = SensorDirection::from_radians(azi, 0.0);
        }

        Self {
            num_sensors: q,
            array_type: ArrayType::Cylindrical,
            radius: radius.clamp(RADIUS_MIN, RADIUS_MAX),
            baffle_radius: radius.clamp(RADIUS_MIN, RADIUS_MAX),
            weight_type: WeightType::RigidOmni,
            sensors,
        }
    }

    /// Sensor at `index`, if it exists in storage
    pub fn sensor(&self, index: usize) -> Option<&SensorDirection> {
        self.sensors.get(index)
    }

    /// Mutable sensor at `index`, if it exists in storage
    pub fn sensor_mut(&mut self, index: usize) -> Option<&mut SensorDirection> {
        self.sensors.get_mut(index)
    }

    /// Directions (azimuth, elevation) in radians of the sensors in use
    pub fn directions_rad(&self) -> Vec<(f64, f64)> {
        self.sensors
            .iter()
            .take(self.num_sensors)
            .map(|s| (s.azimuth_rad as f64, s.elevation_rad as f64))
            .collect()
    }
}

impl Default for ArraySpecification {
    fn default() -> Self {
        Self::tetrahedral()
    }
}

/// Near-uniform directions on the sphere (azimuth, elevation) in radians
pub fn fibonacci_directions(count: usize) -> Vec<(f64, f64)> {
    let golden = std::f64::consts::PI * (3.0 - 5.0f64.sqrt());
    (0..count)
        .map(|i| {
            let z = 1.0 - (2.0 * i as f64 + 1.0) / count as f64;
            let azi = (golden * i as f64).rem_euclid(2.0 * std::f64::consts::PI);
            let azi = if azi > std::f64::consts::PI {
                azi - 2.0 * std::f64::consts::PI
            } else {
                azi
            };
            (azi, z.asin())
        })
        .collect()
}
