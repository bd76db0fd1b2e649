use std::{collections::VecDeque, f64::consts::PI};

use crate::{error::ConfigError, potential::data::Mat6};

/// Radiation impulse response sampled at the simulation time step
#[derive(Clone, Debug, PartialEq)]
pub struct ImpulseResponse {
    pub dt: f64,
    /// `K(k dt)` for `k = 0..n`
    pub samples: Vec<Mat6>,
}

impl ImpulseResponse {
    /// Cosine transform of the radiation damping,
    /// `K(t) = 2/pi * int B(w) cos(w t) dw`, integrated by the trapezoidal rule
    /// over the tabulated frequencies and truncated at `truncation_time`
    pub fn from_damping(
        frequencies: &[f64],
        damping: &[Mat6],
        dt: f64,
        truncation_time: f64,
    ) -> Result<Self, ConfigError> {
        if !(dt.is_finite() && dt > 0.) {
            return Err(ConfigError::Setting {
                name: "time_step",
                value: dt,
                details: "must be positive",
            });
        }
        if !(truncation_time.is_finite() && truncation_time >= dt) {
            return Err(ConfigError::Setting {
                name: "truncation_time",
                value: truncation_time,
                details: "must be at least one time step",
            });
        }
        let n = (truncation_time / dt).ceil() as usize + 1;
        let samples = (0..n)
            .map(|k| {
                let t = k as f64 * dt;
                let mut kt = [[0.; 6]; 6];
                for (w, b) in frequencies.windows(2).zip(damping.windows(2)) {
                    let dw = w[1] - w[0];
                    let (c0, c1) = ((w[0] * t).cos(), (w[1] * t).cos());
                    for i in 0..6 {
                        for j in 0..6 {
                            kt[i][j] += 0.5 * dw * (b[0][i][j] * c0 + b[1][i][j] * c1);
                        }
                    }
                }
                kt.map(|row| row.map(|v| v * 2. / PI))
            })
            .collect();
        Ok(Self { dt, samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Rolling velocity history convolved against the impulse response
#[derive(Clone, Debug)]
pub struct RadiationMemory {
    kernel: ImpulseResponse,
    /// Most recent first
    history: VecDeque<[f64; 6]>,
}

impl RadiationMemory {
    pub fn new(kernel: ImpulseResponse) -> Self {
        let capacity = kernel.len();
        Self {
            kernel,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Records the body velocity (translation and rotation rates) of the
    /// current step, dropping samples older than the kernel
    pub fn push(&mut self, velocity: [f64; 6]) {
        if self.history.len() == self.kernel.len() {
            self.history.pop_back();
        }
        self.history.push_front(velocity);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Radiation force `-int_0^T K(tau) v(t - tau) dtau` over the recorded
    /// history, trapezoidal rule
    pub fn force(&self) -> [f64; 6] {
        let n = self.history.len();
        let mut f = [0.; 6];
        for (k, (v, kt)) in self.history.iter().zip(&self.kernel.samples).enumerate() {
            let w = if k == 0 || k == n - 1 { 0.5 } else { 1. };
            for i in 0..6 {
                for j in 0..6 {
                    f[i] -= w * self.kernel.dt * kt[i][j] * v[j];
                }
            }
        }
        f
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::potential::data::tests::diagonal;

    fn kernel() -> ImpulseResponse {
        // Constant damping of 100 up to 2 rad/s
        let w = (0..=40).map(|i| i as f64 * 0.05).collect::<Vec<_>>();
        let b = vec![diagonal(100.); w.len()];
        ImpulseResponse::from_damping(&w, &b, 0.1, 20.).unwrap()
    }

    #[test]
    fn test_kernel_values() {
        let k = kernel();
        assert_eq!(k.len(), 201);
        // K(0) = 2/pi * B * w_max
        assert_relative_eq!(k.samples[0][0][0], 2. / PI * 200., epsilon = 1e-9);
        assert_relative_eq!(k.samples[0][0][1], 0.);
        // K(t) = 2/pi * B * sin(w_max t)/t, trapezoid error is small
        let t: f64 = 1.;
        assert_relative_eq!(
            k.samples[10][3][3],
            2. / PI * 100. * (2. * t).sin() / t,
            epsilon = 0.1
        );
    }

    #[test]
    fn test_impulse_leaves_history() {
        let k = kernel();
        let n = k.len();
        let k0 = k.samples[0][2][2];
        let mut memory = RadiationMemory::new(k);

        memory.push([0., 0., 1., 0., 0., 0.]);
        assert_relative_eq!(memory.force()[2], -0.5 * 0.1 * k0, epsilon = 1e-12);
        assert_relative_eq!(memory.force()[0], 0.);

        for _ in 0..n {
            memory.push([0.; 6]);
        }
        assert_eq!(memory.force(), [0.; 6]);
    }

    #[test]
    fn test_steady_velocity_approaches_low_frequency_damping() {
        // int_0^inf K dt = B(0) for band-limited constant damping
        let mut memory = RadiationMemory::new(kernel());
        for _ in 0..500 {
            memory.push([1., 0., 0., 0., 0., 0.]);
        }
        assert_relative_eq!(memory.force()[0], -100., max_relative = 0.05);
    }

    #[test]
    fn test_invalid_sampling() {
        let w = [0., 1.];
        let b = [diagonal(1.); 2];
        assert!(ImpulseResponse::from_damping(&w, &b, 0., 10.).is_err());
        assert!(ImpulseResponse::from_damping(&w, &b, 0.1, 0.01).is_err());
    }
}
