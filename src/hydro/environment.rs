use serde::Deserialize;

use crate::error::ConfigError;

/// Penalty contact model of the seabed
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SeabedContact {
    /// Normal stiffness per unit length of contact (N/m^2)
    pub stiffness: f64,
    /// Normal damping per unit length of contact (N s/m^2)
    pub damping: f64,
    /// Coulomb friction coefficient
    pub friction: f64,
    /// Tangential speed at which friction is fully developed (m/s)
    pub friction_velocity: f64,
}

impl Default for SeabedContact {
    fn default() -> Self {
        Self {
            stiffness: 1e5,
            damping: 1e4,
            friction: 0.5,
            friction_velocity: 0.01,
        }
    }
}

/// Fluid and site properties shared by every load evaluation
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Water density (kg/m^3)
    pub water_density: f64,
    /// Air density (kg/m^3)
    pub air_density: f64,
    /// Gravitational acceleration (m/s^2)
    pub gravity: f64,
    /// Still water depth below mean sea level (m)
    pub water_depth: f64,
    /// Elevation of the mean sea level (m)
    pub mean_sea_level: f64,
    /// Kinematic viscosity of water (m^2/s)
    pub water_viscosity: f64,
    /// Kinematic viscosity of air (m^2/s)
    pub air_viscosity: f64,
    pub seabed: SeabedContact,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            water_density: 1025.,
            air_density: 1.225,
            gravity: 9.80665,
            water_depth: 200.,
            mean_sea_level: 0.,
            water_viscosity: 1.1892e-6,
            air_viscosity: 1.4657e-5,
            seabed: SeabedContact::default(),
        }
    }
}

impl Environment {
    /// Elevation of the seabed
    pub fn seabed_level(&self) -> f64 {
        self.mean_sea_level - self.water_depth
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("water_density", self.water_density),
            ("air_density", self.air_density),
            ("gravity", self.gravity),
            ("water_depth", self.water_depth),
            ("water_viscosity", self.water_viscosity),
            ("air_viscosity", self.air_viscosity),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.) {
                return Err(ConfigError::Setting {
                    name,
                    value,
                    details: "must be positive",
                });
            }
        }
        let non_negative = [
            ("seabed.stiffness", self.seabed.stiffness),
            ("seabed.damping", self.seabed.damping),
            ("seabed.friction", self.seabed.friction),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.) {
                return Err(ConfigError::Setting {
                    name,
                    value,
                    details: "must be non-negative",
                });
            }
        }
        let v = self.seabed.friction_velocity;
        if !(v.is_finite() && v > 0.) {
            return Err(ConfigError::Setting {
                name: "seabed.friction_velocity",
                value: v,
                details: "must be positive",
            });
        }
        if !self.mean_sea_level.is_finite() {
            return Err(ConfigError::Setting {
                name: "mean_sea_level",
                value: self.mean_sea_level,
                details: "must be finite",
            });
        }
        Ok(())
    }
}
