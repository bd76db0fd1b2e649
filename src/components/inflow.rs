use serde::Deserialize;

use crate::{interp::interp_clamped, util::Vec3};

/// Wind field used for aerodynamic drag on structural members
#[derive(Debug, Clone)]
pub struct Inflow {
    typ: InflowType,
    uniform_flow: UniformFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflowType {
    Uniform = 1,
}

impl Inflow {
    pub fn steady_wind(
        velocity_horizontal: f64,
        height_reference: f64,
        shear_vertical: f64,
        flow_angle_horizontal: f64,
    ) -> Self {
        Inflow {
            typ: InflowType::Uniform,
            uniform_flow: UniformFlow {
                time: vec![0.],
                data: vec![UniformFlowParameters {
                    velocity_horizontal,
                    height_reference,
                    shear_vertical,
                    flow_angle_horizontal,
                    ground_level: 0.,
                }],
            },
        }
    }

    /// Uniform flow whose parameters are interpolated in time
    pub fn uniform_series(time: Vec<f64>, data: Vec<UniformFlowParameters>) -> Self {
        Inflow {
            typ: InflowType::Uniform,
            uniform_flow: UniformFlow { time, data },
        }
    }

    /// Still air
    pub fn calm() -> Self {
        Self::steady_wind(0., 1., 0., 0.)
    }

    pub fn velocity(&self, t: f64, position: &Vec3) -> Vec3 {
        match self.typ {
            InflowType::Uniform => self.uniform_flow.velocity(t, position),
        }
    }

    pub fn parameters(&self, t: f64) -> UniformFlowParameters {
        self.uniform_flow.parameters(t)
    }
}

#[derive(Debug, Clone)]
pub struct UniformFlow {
    pub time: Vec<f64>, // Time vector for uniform flow parameters
    pub data: Vec<UniformFlowParameters>,
}

impl UniformFlow {
    fn parameters(&self, t: f64) -> UniformFlowParameters {
        match self.data.len() {
            0 => UniformFlowParameters::default(),
            1 => self.data[0],
            _ => {
                let series = |f: fn(&UniformFlowParameters) -> f64| {
                    let y = self.data.iter().map(f).collect::<Vec<_>>();
                    interp_clamped(&self.time, &y, t)
                };
                UniformFlowParameters {
                    velocity_horizontal: series(|p| p.velocity_horizontal),
                    height_reference: series(|p| p.height_reference),
                    shear_vertical: series(|p| p.shear_vertical),
                    flow_angle_horizontal: series(|p| p.flow_angle_horizontal),
                    ground_level: series(|p| p.ground_level),
                }
            }
        }
    }

    pub fn velocity(&self, t: f64, position: &Vec3) -> Vec3 {
        self.parameters(t).velocity(position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct UniformFlowParameters {
    pub velocity_horizontal: f64,   // Horizontal inflow velocity (m/s)
    pub height_reference: f64,      // Reference height above ground (m)
    pub shear_vertical: f64,        // Vertical shear exponent
    pub flow_angle_horizontal: f64, // Flow angle relative to x axis (radians)
    pub ground_level: f64,          // Elevation where the wind vanishes (m)
}

impl Default for UniformFlowParameters {
    fn default() -> Self {
        Self {
            velocity_horizontal: 0.,
            height_reference: 100.,
            shear_vertical: 0.,
            flow_angle_horizontal: 0.,
            ground_level: 0.,
        }
    }
}

impl UniformFlowParameters {
    pub fn velocity(&self, position: &Vec3) -> Vec3 {
        // Calculate horizontal velocity, zero at and below ground
        let height = position[2] - self.ground_level;
        if height <= 0. {
            return [0., 0., 0.];
        }
        let vh = self.velocity_horizontal
            * (height / self.height_reference).powf(self.shear_vertical);

        // Get sin and cos of flow angle
        let (sin_flow_angle, cos_flow_angle) = self.flow_angle_horizontal.sin_cos();

        // Apply horizontal direction
        [vh * cos_flow_angle, -vh * sin_flow_angle, 0.]
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    struct Case {
        time: f64,
        position: [f64; 3],
        vel_exp: [f64; 3],
    }

    fn check(inflow: &Inflow, cases: &[Case]) {
        for case in cases {
            let velocity = inflow.velocity(case.time, &case.position);
            assert_relative_eq!(velocity[0], case.vel_exp[0], epsilon = 1e-12);
            assert_relative_eq!(velocity[1], case.vel_exp[1], epsilon = 1e-12);
            assert_relative_eq!(velocity[2], case.vel_exp[2], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_steady_wind_with_shear_nonzero_flow_angle() {
        // Steady 10 m/s wind at 100 m with 0.1 power law shear, 45 degrees from X
        let ref_height = 100.0;
        let inflow = Inflow::steady_wind(10.0, ref_height, 0.1, 45.0_f64.to_radians());
        check(
            &inflow,
            &[
                Case {
                    time: 0.0,
                    position: [0.0, 0.0, ref_height],
                    vel_exp: [7.0710678118654755, -7.0710678118654755, 0.0],
                },
                // Below the water line the wind vanishes instead of turning NaN
                Case {
                    time: 1.0,
                    position: [0.0, 0.0, -5.0],
                    vel_exp: [0.0, 0.0, 0.0],
                },
                // [10*sqrt(2)/2*0.5**0.1, ...]
                Case {
                    time: 100.0,
                    position: [100.0, 100.0, ref_height / 2.0],
                    vel_exp: [6.597539553864471, -6.597539553864471, 0.0],
                },
            ],
        );
    }

    #[test]
    fn test_uniform_series() {
        let p = |v| UniformFlowParameters {
            velocity_horizontal: v,
            ..Default::default()
        };
        let inflow = Inflow::uniform_series(vec![0., 10.], vec![p(4.), p(8.)]);
        check(
            &inflow,
            &[
                Case {
                    time: 5.0,
                    position: [0.0, 0.0, 100.0],
                    vel_exp: [6.0, 0.0, 0.0],
                },
                Case {
                    time: 20.0,
                    position: [0.0, 0.0, 100.0],
                    vel_exp: [8.0, 0.0, 0.0],
                },
            ],
        );
    }
}
