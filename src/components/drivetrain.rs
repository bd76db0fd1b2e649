use faer::Mat;
use log::warn;
use serde::Deserialize;

use crate::{
    constraints::LinkKind,
    engine::{DynamicsEngine, LinkId, LinkState},
    error::{ConfigError, EngineError},
    model::Model,
    node::NodeId,
    util::{outer, scale, unit_vector, Vec3},
};

/// Torsional flexibility of the low-speed shaft
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct ShaftFlexibility {
    /// Torsional stiffness (N m/rad, low-speed side)
    pub stiffness: f64,
    /// Torsional damping (N m s/rad, low-speed side)
    pub damping: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    /// Shaft axis (global)
    pub axis: Vec3,
    /// High-speed over low-speed shaft speed
    pub gear_ratio: f64,
    /// Generator rotor inertia (kg m^2, high-speed side)
    pub generator_inertia: f64,
    /// Mass carried by the high-speed node of a flexible drivetrain (kg)
    pub generator_mass: f64,
    /// `None` for a rigid gearbox
    pub flexibility: Option<ShaftFlexibility>,
    /// Torque (N m, generator side) per unit speed error under speed control.
    /// Applied explicitly, so `speed_gain * h` must stay below the generator
    /// inertia.
    pub speed_gain: f64,
    /// Brake slip speed below which friction is regularized (rad/s)
    pub brake_regularization_speed: f64,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            axis: [1., 0., 0.],
            gear_ratio: 1.,
            generator_inertia: 0.,
            generator_mass: 1000.,
            flexibility: None,
            speed_gain: 1e4,
            brake_regularization_speed: 0.1,
        }
    }
}

impl DrivetrainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("drivetrain.gear_ratio", self.gear_ratio),
            ("drivetrain.brake_regularization_speed", self.brake_regularization_speed),
        ];
        let non_negative = [
            ("drivetrain.generator_inertia", self.generator_inertia),
            ("drivetrain.generator_mass", self.generator_mass),
            ("drivetrain.speed_gain", self.speed_gain),
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
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.) {
                return Err(ConfigError::Setting {
                    name,
                    value,
                    details: "must be non-negative",
                });
            }
        }
        if let Some(f) = &self.flexibility {
            if !(f.stiffness.is_finite() && f.stiffness > 0. && f.damping >= 0.) {
                return Err(ConfigError::Setting {
                    name: "drivetrain.flexibility.stiffness",
                    value: f.stiffness,
                    details: "stiffness must be positive and damping non-negative",
                });
            }
            if self.generator_inertia <= 0. {
                return Err(ConfigError::Setting {
                    name: "drivetrain.generator_inertia",
                    value: self.generator_inertia,
                    details: "a flexible drivetrain needs generator inertia",
                });
            }
        }
        if unit_vector(&self.axis).is_none() {
            return Err(ConfigError::Setting {
                name: "drivetrain.axis",
                value: 0.,
                details: "axis has zero length",
            });
        }
        Ok(())
    }
}

/// Generator command from the control layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeneratorCommand {
    /// Electrical torque opposing rotation (N m, high-speed side)
    Torque(f64),
    /// High-speed shaft speed (rad/s), tracked by a proportional torque
    Speed(f64),
}

/// Shaft and generator quantities after the last step
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrivetrainTelemetry {
    pub low_speed_angle: f64,
    pub low_speed_speed: f64,
    pub high_speed_angle: f64,
    pub high_speed_speed: f64,
    pub generator_torque: f64,
    pub brake_torque: f64,
    /// Torsional torque in a flexible shaft (low-speed side)
    pub shaft_torque: f64,
    /// Generator power (W)
    pub power: f64,
}

impl DrivetrainTelemetry {
    pub fn low_speed_rpm(&self) -> f64 {
        self.low_speed_speed * 60. / std::f64::consts::TAU
    }

    pub fn high_speed_rpm(&self) -> f64 {
        self.high_speed_speed * 60. / std::f64::consts::TAU
    }
}

/// Gearbox, generator and brake between a rotor shaft node and its support.
/// A rigid gearbox reflects the generator inertia onto the shaft node; a
/// flexible one carries the generator on its own high-speed node joined to
/// the shaft by a torsional spring-damper.
#[derive(Clone, Debug)]
pub struct Drivetrain {
    pub config: DrivetrainConfig,
    axis: Vec3,
    /// Support node, `None` for ground
    pub base: Option<NodeId>,
    pub low_speed_node: NodeId,
    pub high_speed_node: Option<NodeId>,
    pub low_speed_bearing: LinkId,
    high_speed_bearing: Option<LinkId>,
    generator: GeneratorCommand,
    brake_command: f64,
    grid_loss: bool,
    pub telemetry: DrivetrainTelemetry,
}

impl Drivetrain {
    /// Adds bearings, generator inertia and (for a flexible shaft) the
    /// high-speed node to the model
    pub fn attach(
        model: &mut Model,
        config: DrivetrainConfig,
        base: Option<NodeId>,
        shaft: NodeId,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let axis = unit_vector(&config.axis).unwrap_or([1., 0., 0.]);
        let position = model.node(shaft)?.position();
        if let Some(b) = base {
            model.node(b)?;
        }
        let low_speed_bearing = model.add_link(LinkKind::Bearing { axis }, base, shaft);
        let reflected = config.gear_ratio * config.gear_ratio * config.generator_inertia;

        let (high_speed_node, high_speed_bearing) = match config.flexibility {
            None => {
                if reflected > 0. {
                    model.add_mass_element(shaft, axial_inertia(&axis, reflected));
                }
                (None, None)
            }
            Some(_) => {
                let node = model
                    .add_node()
                    .position(position[0], position[1], position[2])
                    .build();
                let j = config.generator_inertia;
                model.add_point_mass(node, config.generator_mass, [j, j, j]);
                let link = model.add_link(LinkKind::Bearing { axis }, base, node);
                (Some(node), Some(link))
            }
        };

        Ok(Self {
            config,
            axis,
            base,
            low_speed_node: shaft,
            high_speed_node,
            low_speed_bearing,
            high_speed_bearing,
            generator: GeneratorCommand::Torque(0.),
            brake_command: 0.,
            grid_loss: false,
            telemetry: DrivetrainTelemetry::default(),
        })
    }

    pub fn command_generator(&mut self, command: GeneratorCommand) {
        self.generator = command;
    }

    /// Brake torque capacity (N m, low-speed side)
    pub fn command_brake(&mut self, torque: f64) {
        self.brake_command = torque.max(0.);
    }

    /// Disconnects the generator from the grid, its torque drops to zero
    pub fn set_grid_loss(&mut self, lost: bool) {
        if lost && !self.grid_loss {
            warn!("drivetrain: grid loss, generator torque released");
        }
        self.grid_loss = lost;
    }

    pub fn grid_loss(&self) -> bool {
        self.grid_loss
    }

    /// Low-speed bearing state with high-speed shaft angle and speed
    fn shaft_state(
        &self,
        engine: &dyn DynamicsEngine,
    ) -> Result<(LinkState, f64, f64), EngineError> {
        let r = self.config.gear_ratio;
        let ls = engine.link_state(self.low_speed_bearing)?;
        let (hs_angle, hs_speed) = match self.high_speed_bearing {
            Some(link) => {
                let hs = engine.link_state(link)?;
                (hs.angle, hs.speed)
            }
            None => (r * ls.angle, r * ls.speed),
        };
        Ok((ls, hs_angle, hs_speed))
    }

    /// Reads shaft states and applies generator, brake and shaft torques for
    /// the next step
    pub fn pre_advance(&mut self, engine: &mut dyn DynamicsEngine) -> Result<(), EngineError> {
        let r = self.config.gear_ratio;
        let (ls, hs_angle, hs_speed) = self.shaft_state(engine)?;

        let generator_torque = if self.grid_loss {
            0.
        } else {
            match self.generator {
                GeneratorCommand::Torque(t) => t,
                GeneratorCommand::Speed(target) => self.config.speed_gain * (hs_speed - target),
            }
        };
        let v_reg = self.config.brake_regularization_speed;
        let brake_torque = self.brake_command * ls.speed / ls.speed.abs().max(v_reg);

        // Torques about the axis on each shaft node, reactions on the base
        let mut on_low_speed = -brake_torque;
        let mut shaft_torque = 0.;
        match (self.high_speed_node, self.config.flexibility) {
            (Some(hs_node), Some(flex)) => {
                let twist = ls.angle - hs_angle / r;
                let twist_rate = ls.speed - hs_speed / r;
                shaft_torque = flex.stiffness * twist + flex.damping * twist_rate;
                on_low_speed -= shaft_torque;
                let on_high_speed = shaft_torque / r - generator_torque;
                engine.add_torque(hs_node, &scale(&self.axis, on_high_speed));
                if let Some(b) = self.base {
                    engine.add_torque(b, &scale(&self.axis, -on_high_speed));
                }
            }
            _ => on_low_speed -= r * generator_torque,
        }
        engine.add_torque(self.low_speed_node, &scale(&self.axis, on_low_speed));
        if let Some(b) = self.base {
            engine.add_torque(b, &scale(&self.axis, -on_low_speed));
        }

        self.telemetry = DrivetrainTelemetry {
            low_speed_angle: ls.angle,
            low_speed_speed: ls.speed,
            high_speed_angle: hs_angle,
            high_speed_speed: hs_speed,
            generator_torque,
            brake_torque,
            shaft_torque,
            power: generator_torque * hs_speed,
        };
        Ok(())
    }

    /// Refreshes shaft angles and speeds from the converged state. Torques
    /// keep the values applied over the step.
    pub fn post_advance(&mut self, engine: &dyn DynamicsEngine) -> Result<(), EngineError> {
        let (ls, hs_angle, hs_speed) = self.shaft_state(engine)?;
        let t = &mut self.telemetry;
        t.low_speed_angle = ls.angle;
        t.low_speed_speed = ls.speed;
        t.high_speed_angle = hs_angle;
        t.high_speed_speed = hs_speed;
        t.power = t.generator_torque * hs_speed;
        Ok(())
    }
}

/// 6x6 mass block with rotational inertia `j` about `axis` only
fn axial_inertia(axis: &Vec3, j: f64) -> Mat<f64> {
    let aa = outer(axis, axis);
    Mat::from_fn(6, 6, |i, k| {
        if i >= 3 && k >= 3 {
            j * aa[i - 3][k - 3]
        } else {
            0.
        }
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const H: f64 = 0.01;

    /// Rotor disc on a grounded bearing about X
    fn rotor(config: DrivetrainConfig, omega0: f64) -> (Model, Drivetrain) {
        let mut model = Model::new();
        model.set_gravity(0., 0., 0.);
        model.set_time_step(H);
        let hub = model
            .add_node()
            .position(0., 0., 0.)
            .angular_velocity(omega0, 0., 0.)
            .build();
        model.add_point_mass(hub, 100., [50., 50., 50.]);
        let drivetrain = Drivetrain::attach(&mut model, config, None, hub).unwrap();
        (model, drivetrain)
    }

    fn run(model: &mut Model, dt: &mut Drivetrain, steps: usize) {
        let mut engine = model.create_engine().unwrap();
        for _ in 0..steps {
            dt.pre_advance(&mut engine).unwrap();
            engine.step(H).unwrap();
            dt.post_advance(&engine).unwrap();
        }
    }

    #[test]
    fn test_generator_torque_decelerates_rotor() {
        let config = DrivetrainConfig {
            gear_ratio: 10.,
            generator_inertia: 0.5,
            ..Default::default()
        };
        let (mut model, mut dt) = rotor(config, 2.);
        dt.command_generator(GeneratorCommand::Torque(10.));
        run(&mut model, &mut dt, 100);

        // Inertia 50 + 10^2 * 0.5, torque 100 on the low-speed side
        let decel = 100. / 100.;
        let t = 100. * H;
        // Speed after the last step, within the start-up lag of the first step
        assert_relative_eq!(dt.telemetry.low_speed_speed, 2. - decel * t, epsilon = 1e-2);
        assert_relative_eq!(
            dt.telemetry.high_speed_speed,
            10. * dt.telemetry.low_speed_speed,
            epsilon = 1e-9
        );
        assert!(dt.telemetry.power > 0.);
    }

    #[test]
    fn test_grid_loss_releases_generator() {
        let config = DrivetrainConfig {
            gear_ratio: 10.,
            generator_inertia: 0.5,
            ..Default::default()
        };
        let (mut model, mut dt) = rotor(config, 2.);
        dt.command_generator(GeneratorCommand::Torque(10.));
        dt.set_grid_loss(true);
        run(&mut model, &mut dt, 50);
        assert_relative_eq!(dt.telemetry.generator_torque, 0.);
        assert_relative_eq!(dt.telemetry.low_speed_speed, 2., epsilon = 1e-6);
    }

    #[test]
    fn test_brake_stops_rotor() {
        let (mut model, mut dt) = rotor(DrivetrainConfig::default(), 1.);
        dt.command_brake(100.);
        run(&mut model, &mut dt, 300);
        assert!(dt.telemetry.low_speed_speed.abs() < 0.02);
    }

    #[test]
    fn test_flexible_shaft_transmits_torque() {
        let config = DrivetrainConfig {
            gear_ratio: 1.,
            generator_inertia: 5.,
            flexibility: Some(ShaftFlexibility {
                stiffness: 1e4,
                damping: 50.,
            }),
            speed_gain: 100.,
            ..Default::default()
        };
        let (mut model, mut dt) = rotor(config, 0.);
        assert!(dt.high_speed_node.is_some());
        dt.command_generator(GeneratorCommand::Speed(1.));
        run(&mut model, &mut dt, 2000);

        // Speed control spins up the generator, which drags the rotor along
        assert_relative_eq!(dt.telemetry.high_speed_speed, 1., epsilon = 0.05);
        assert_relative_eq!(dt.telemetry.low_speed_speed, 1., epsilon = 0.05);
    }

    #[test]
    fn test_invalid_config() {
        let config = DrivetrainConfig {
            gear_ratio: 0.,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = DrivetrainConfig {
            flexibility: Some(ShaftFlexibility {
                stiffness: 1e4,
                damping: 0.,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
