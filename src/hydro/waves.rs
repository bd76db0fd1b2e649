use std::f64::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;

use crate::{error::ConfigError, hydro::environment::Environment, util::Vec3};

/// Product `k * d` beyond which water is treated as deep
const DEEP_WATER_KD: f64 = 25.;

//------------------------------------------------------------------------------
// Components
//------------------------------------------------------------------------------

/// Single linear (Airy) wave component
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveComponent {
    /// Amplitude (m)
    pub amplitude: f64,
    /// Angular frequency (rad/s)
    pub omega: f64,
    /// Phase (rad)
    pub phase: f64,
    /// Propagation direction from the global X axis (rad)
    pub direction: f64,
    /// Wavenumber (rad/m)
    pub wavenumber: f64,
}

impl WaveComponent {
    pub fn new(
        amplitude: f64,
        omega: f64,
        phase: f64,
        direction: f64,
        water_depth: f64,
        gravity: f64,
    ) -> Self {
        Self {
            amplitude,
            omega,
            phase,
            direction,
            wavenumber: wavenumber(omega, water_depth, gravity),
        }
    }

    pub fn period(&self) -> f64 {
        TAU / self.omega
    }

    /// Phase angle at a horizontal position and time
    pub fn theta(&self, x: f64, y: f64, t: f64) -> f64 {
        let (s, c) = self.direction.sin_cos();
        self.wavenumber * (x * c + y * s) - self.omega * t + self.phase
    }
}

/// Solves the linear dispersion relation `w^2 = g k tanh(k d)` for `k`
pub fn wavenumber(omega: f64, depth: f64, gravity: f64) -> f64 {
    if omega <= 0. {
        return 0.;
    }
    let k_deep = omega * omega / gravity;
    if !depth.is_finite() || k_deep * depth > DEEP_WATER_KD {
        return k_deep;
    }

    // Eckart's approximation as the initial guess
    let mut k = k_deep / (k_deep * depth).tanh().sqrt();
    for _ in 0..50 {
        let t = (k * depth).tanh();
        let f = gravity * k * t - omega * omega;
        let df = gravity * t + gravity * k * depth * (1. - t * t);
        let dk = f / df;
        k -= dk;
        if dk.abs() < 1e-14 * k {
            break;
        }
    }
    k
}

/// Depth attenuation of horizontal velocity, vertical velocity and pressure
#[derive(Clone, Copy, Debug, PartialEq)]
struct DepthFactors {
    horizontal: f64,
    vertical: f64,
    pressure: f64,
}

impl DepthFactors {
    /// Factors at `z` (relative to the mean sea level, negative downwards)
    fn at(k: f64, depth: f64, z: f64) -> Self {
        let kd = k * depth;
        if !kd.is_finite() || kd > DEEP_WATER_KD {
            let e = (k * z).exp();
            return Self {
                horizontal: e,
                vertical: e,
                pressure: e,
            };
        }
        let s = k * (z + depth);
        Self {
            horizontal: s.cosh() / kd.sinh(),
            vertical: s.sinh() / kd.sinh(),
            pressure: s.cosh() / kd.cosh(),
        }
    }

    /// First order Taylor extension above the mean sea level
    fn extrapolated(k: f64, depth: f64, z: f64) -> Self {
        let kd = k * depth;
        let t = if !kd.is_finite() || kd > DEEP_WATER_KD {
            1.
        } else {
            kd.tanh()
        };
        Self {
            horizontal: 1. / t + k * z,
            vertical: 1. + k * z / t,
            pressure: 1. + k * z * t,
        }
    }
}

//------------------------------------------------------------------------------
// Spectrum
//------------------------------------------------------------------------------

/// JONSWAP spectrum discretized into equally spaced components
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Jonswap {
    /// Significant wave height (m)
    pub hs: f64,
    /// Peak period (s)
    pub tp: f64,
    /// Peak enhancement factor
    pub gamma: f64,
    pub n_components: usize,
    pub omega_min: f64,
    pub omega_max: f64,
    /// Mean propagation direction (rad)
    pub direction: f64,
    /// Seed of the random phases
    pub seed: u64,
}

impl Default for Jonswap {
    fn default() -> Self {
        Self {
            hs: 1.,
            tp: 10.,
            gamma: 3.3,
            n_components: 100,
            omega_min: 0.2,
            omega_max: 3.,
            direction: 0.,
            seed: 0,
        }
    }
}

impl Jonswap {
    pub fn peak_omega(&self) -> f64 {
        TAU / self.tp
    }

    /// One-sided spectral density (m^2 s/rad)
    pub fn spectral_density(&self, omega: f64) -> f64 {
        if omega <= 0. {
            return 0.;
        }
        let wp = self.peak_omega();
        let sigma = if omega <= wp { 0.07 } else { 0.09 };
        let r = (-(omega - wp).powi(2) / (2. * sigma * sigma * wp * wp)).exp();
        let pm = 5. / 16. * self.hs * self.hs * wp.powi(4) / omega.powi(5)
            * (-1.25 * (wp / omega).powi(4)).exp();
        pm * (1. - 0.287 * self.gamma.ln()) * self.gamma.powf(r)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let err = |name, value, details| {
            Err(ConfigError::Setting {
                name,
                value,
                details,
            })
        };
        if !(self.hs.is_finite() && self.hs > 0.) {
            return err("jonswap.hs", self.hs, "must be positive");
        }
        if !(self.tp.is_finite() && self.tp > 0.) {
            return err("jonswap.tp", self.tp, "must be positive");
        }
        if !(self.gamma.is_finite() && self.gamma >= 1.) {
            return err("jonswap.gamma", self.gamma, "must be at least 1");
        }
        if self.n_components == 0 {
            return err("jonswap.n_components", 0., "must be positive");
        }
        if !(self.omega_min > 0. && self.omega_max > self.omega_min) {
            return err(
                "jonswap.omega_max",
                self.omega_max,
                "must exceed a positive omega_min",
            );
        }
        Ok(())
    }

    /// Components at the midpoints of equal frequency bins with seeded random phases
    pub fn components(&self, env: &Environment) -> Result<Vec<WaveComponent>, ConfigError> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let dw = (self.omega_max - self.omega_min) / self.n_components as f64;
        Ok((0..self.n_components)
            .map(|i| {
                let omega = self.omega_min + (i as f64 + 0.5) * dw;
                let amplitude = (2. * self.spectral_density(omega) * dw).sqrt();
                let phase = rng.gen_range(0. ..TAU);
                WaveComponent::new(
                    amplitude,
                    omega,
                    phase,
                    self.direction,
                    env.water_depth,
                    env.gravity,
                )
            })
            .collect())
    }
}

//------------------------------------------------------------------------------
// Current
//------------------------------------------------------------------------------

/// Near-surface power law current plus a uniform sub-surface current
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Current {
    /// Near-surface current speed at the mean sea level (m/s)
    pub surface_speed: f64,
    /// Depth at which the near-surface current vanishes (m)
    pub reference_depth: f64,
    pub exponent: f64,
    /// Uniform current over the whole water column (m/s)
    pub sub_surface_speed: f64,
    /// Direction from the global X axis (rad)
    pub direction: f64,
}

impl Default for Current {
    fn default() -> Self {
        Self {
            surface_speed: 0.,
            reference_depth: 20.,
            exponent: 1. / 7.,
            sub_surface_speed: 0.,
            direction: 0.,
        }
    }
}

impl Current {
    /// Current velocity at `z` relative to the mean sea level
    pub fn velocity(&self, z: f64) -> Vec3 {
        let z = z.min(0.);
        let near = if self.reference_depth > 0. && z > -self.reference_depth {
            let r = (z + self.reference_depth) / self.reference_depth;
            self.surface_speed * r.powf(self.exponent)
        } else {
            0.
        };
        let speed = near + self.sub_surface_speed;
        let (s, c) = self.direction.sin_cos();
        [speed * c, speed * s, 0.]
    }
}

//------------------------------------------------------------------------------
// Kinematics provider
//------------------------------------------------------------------------------

/// Treatment of the kinematics between the mean sea level and the free surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stretching {
    /// Linear theory at the actual elevation
    #[default]
    None,
    /// Values at the mean sea level held constant up to the surface
    Vertical,
    /// Water column stretched so the free surface maps to the mean sea level
    Wheeler,
    /// Linear extrapolation of the mean sea level gradient
    Extrapolation,
}

/// Fluid kinematics at a point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FluidKinematics {
    /// Absolute elevation of the free surface above the point
    pub elevation: f64,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    /// Dynamic pressure (Pa)
    pub dynamic_pressure: f64,
    /// The point lies inside the water column
    pub wet: bool,
}

pub trait WaveKinematics {
    /// Absolute free surface elevation at a horizontal position
    fn elevation(&self, x: f64, y: f64, t: f64) -> f64;

    fn kinematics(&self, position: &Vec3, t: f64) -> FluidKinematics;

    fn components(&self) -> &[WaveComponent];

    fn mean_sea_level(&self) -> f64;

    /// Angular frequency of the most energetic component
    fn peak_omega(&self) -> Option<f64> {
        self.components()
            .iter()
            .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
            .map(|c| c.omega)
    }
}

/// Superposition of linear wave components with an optional current
#[derive(Clone, Debug)]
pub struct LinearWaves {
    pub components: Vec<WaveComponent>,
    pub stretching: Stretching,
    pub current: Current,
    water_depth: f64,
    mean_sea_level: f64,
    gravity: f64,
    density: f64,
}

impl LinearWaves {
    pub fn new(
        components: Vec<WaveComponent>,
        stretching: Stretching,
        current: Current,
        env: &Environment,
    ) -> Self {
        Self {
            components,
            stretching,
            current,
            water_depth: env.water_depth,
            mean_sea_level: env.mean_sea_level,
            gravity: env.gravity,
            density: env.water_density,
        }
    }

    pub fn still_water(env: &Environment) -> Self {
        Self::new(vec![], Stretching::None, Current::default(), env)
    }

    /// Single regular wave of height `height` and period `period`
    pub fn regular(height: f64, period: f64, direction: f64, env: &Environment) -> Self {
        let c = WaveComponent::new(
            height / 2.,
            TAU / period,
            0.,
            direction,
            env.water_depth,
            env.gravity,
        );
        Self::new(vec![c], Stretching::None, Current::default(), env)
    }

    pub fn from_spectrum(
        spectrum: &Jonswap,
        stretching: Stretching,
        current: Current,
        env: &Environment,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(spectrum.components(env)?, stretching, current, env))
    }

    fn surface(&self, x: f64, y: f64, t: f64) -> f64 {
        self.components
            .iter()
            .map(|c| c.amplitude * c.theta(x, y, t).cos())
            .sum()
    }
}

impl WaveKinematics for LinearWaves {
    fn elevation(&self, x: f64, y: f64, t: f64) -> f64 {
        self.mean_sea_level + self.surface(x, y, t)
    }

    fn kinematics(&self, position: &Vec3, t: f64) -> FluidKinematics {
        let eta = self.surface(position[0], position[1], t);
        let z = position[2] - self.mean_sea_level;
        let mut out = FluidKinematics {
            elevation: self.mean_sea_level + eta,
            ..Default::default()
        };
        if z > eta || z < -self.water_depth {
            return out;
        }
        out.wet = true;

        let d = self.water_depth;
        let z_eval = match self.stretching {
            Stretching::None | Stretching::Extrapolation => z,
            Stretching::Vertical => z.min(0.),
            Stretching::Wheeler => (z - eta) * d / (d + eta),
        };

        for c in &self.components {
            let k = c.wavenumber;
            let f = match self.stretching {
                Stretching::Extrapolation if z_eval > 0. => {
                    DepthFactors::extrapolated(k, d, z_eval)
                }
                _ => DepthFactors::at(k, d, z_eval),
            };
            let (sin_t, cos_t) = c.theta(position[0], position[1], t).sin_cos();
            let (sin_b, cos_b) = c.direction.sin_cos();
            let aw = c.amplitude * c.omega;
            let aww = aw * c.omega;

            let u = aw * f.horizontal * cos_t;
            let du = aww * f.horizontal * sin_t;
            out.velocity[0] += u * cos_b;
            out.velocity[1] += u * sin_b;
            out.velocity[2] += aw * f.vertical * sin_t;
            out.acceleration[0] += du * cos_b;
            out.acceleration[1] += du * sin_b;
            out.acceleration[2] -= aww * f.vertical * cos_t;
            out.dynamic_pressure +=
                self.density * self.gravity * c.amplitude * f.pressure * cos_t;
        }

        let uc = self.current.velocity(z_eval);
        (0..3).for_each(|i| out.velocity[i] += uc[i]);
        out
    }

    fn components(&self) -> &[WaveComponent] {
        &self.components
    }

    fn mean_sea_level(&self) -> f64 {
        self.mean_sea_level
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn env(depth: f64) -> Environment {
        Environment {
            water_depth: depth,
            ..Default::default()
        }
    }

    #[test]
    fn test_wavenumber() {
        let g = 9.80665;
        struct Case {
            omega: f64,
            depth: f64,
        }
        vec![
            Case {
                omega: 1.,
                depth: 1000.,
            },
            Case {
                omega: 0.5,
                depth: 20.,
            },
            Case {
                omega: 0.2,
                depth: 5.,
            },
        ]
        .iter()
        .for_each(|c| {
            let k = wavenumber(c.omega, c.depth, g);
            assert_relative_eq!(
                g * k * (k * c.depth).tanh(),
                c.omega * c.omega,
                epsilon = 1e-10
            );
        });

        // Shallow water limit
        let k = wavenumber(0.01, 10., g);
        assert_relative_eq!(k, 0.01 / (g * 10.).sqrt(), max_relative = 1e-4);
    }

    #[test]
    fn test_regular_wave_crest() {
        let e = env(30.);
        let waves = LinearWaves::regular(2., 8., 0., &e);
        let c = waves.components[0];
        let kd = c.wavenumber * 30.;

        assert_relative_eq!(waves.elevation(0., 0., 0.), 1., epsilon = 1e-12);

        // Under the crest at the mean sea level
        let k = waves.kinematics(&[0., 0., 0.], 0.);
        assert!(k.wet);
        assert_relative_eq!(k.velocity[0], c.omega / kd.tanh(), epsilon = 1e-10);
        assert_relative_eq!(k.velocity[2], 0., epsilon = 1e-12);
        assert_relative_eq!(k.acceleration[2], -c.omega * c.omega, epsilon = 1e-10);
        assert_relative_eq!(k.dynamic_pressure, e.water_density * e.gravity, epsilon = 1e-8);

        // Above the crest
        let k = waves.kinematics(&[0., 0., 1.5], 0.);
        assert!(!k.wet);
        assert_eq!(k.velocity, [0., 0., 0.]);
    }

    #[test]
    fn test_stretching_at_crest() {
        let e = env(30.);
        let mut waves = LinearWaves::regular(2., 8., 0., &e);
        let at_msl = waves.kinematics(&[0., 0., 0.], 0.).velocity[0];

        struct Case {
            stretching: Stretching,
            exp: f64,
        }
        let c = waves.components[0];
        let extrapolated = c.omega * (1. / (c.wavenumber * 30.).tanh() + c.wavenumber);
        vec![
            Case {
                stretching: Stretching::Vertical,
                exp: at_msl,
            },
            Case {
                stretching: Stretching::Wheeler,
                exp: at_msl,
            },
            Case {
                stretching: Stretching::Extrapolation,
                exp: extrapolated,
            },
        ]
        .iter()
        .for_each(|case| {
            waves.stretching = case.stretching;
            let k = waves.kinematics(&[0., 0., 1.], 0.);
            assert_relative_eq!(k.velocity[0], case.exp, epsilon = 1e-10);
        });
    }

    #[test]
    fn test_jonswap_significant_height() {
        let spectrum = Jonswap {
            hs: 4.,
            tp: 10.,
            n_components: 400,
            omega_min: 0.1,
            omega_max: 4.,
            ..Default::default()
        };
        let components = spectrum.components(&env(200.)).unwrap();
        let m0: f64 = components.iter().map(|c| 0.5 * c.amplitude * c.amplitude).sum();
        assert_relative_eq!(4. * m0.sqrt(), 4., max_relative = 0.05);

        // Deterministic phases
        let again = spectrum.components(&env(200.)).unwrap();
        assert_eq!(components, again);
    }

    #[test]
    fn test_current_profile() {
        let current = Current {
            surface_speed: 1.,
            reference_depth: 10.,
            sub_surface_speed: 0.5,
            direction: std::f64::consts::FRAC_PI_2,
            ..Default::default()
        };
        assert_relative_eq!(current.velocity(0.)[1], 1.5, epsilon = 1e-12);
        assert_relative_eq!(current.velocity(-20.)[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(current.velocity(0.)[0], 0., epsilon = 1e-12);
    }
}
