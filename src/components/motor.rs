use log::warn;

use crate::{
    constraints::LinkKind,
    engine::{DynamicsEngine, LinkCommand, LinkId, LinkState},
    error::EngineError,
    model::Model,
    node::NodeId,
    util::Vec3,
};

/// Actuator failure modes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MotorFault {
    /// Holds the angle reached when the fault occurred
    Stuck,
    /// Rotates at a fixed rate regardless of the command
    Runaway { rate: f64 },
}

/// Achieved and commanded motion of a motor
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotorTelemetry {
    pub angle: f64,
    pub speed: f64,
    pub acceleration: f64,
    pub reaction_torque: f64,
    /// Angle the motor is trying to reach
    pub commanded_angle: f64,
}

/// Single-axis actuator between two nodes. All relative motion except rotation
/// about the axis is locked; the rotation follows the command.
#[derive(Clone, Debug)]
pub struct RotationalMotor {
    pub name: String,
    pub link: LinkId,
    pub axis: Vec3,
    command: LinkCommand,
    fault: Option<MotorFault>,
    /// Angle held by a stuck motor
    stuck_angle: f64,
    /// Angle the engine was last told to reach
    commanded_angle: f64,
}

impl RotationalMotor {
    /// Adds the motor link to the model. `base` of `None` mounts the motor on ground.
    pub fn attach(
        model: &mut Model,
        name: &str,
        base: Option<NodeId>,
        target: NodeId,
        axis: Vec3,
    ) -> Self {
        let link = model.add_link(LinkKind::Motor { axis }, base, target);
        Self {
            name: name.to_string(),
            link,
            axis,
            command: LinkCommand::Angle(0.),
            fault: None,
            stuck_angle: 0.,
            commanded_angle: 0.,
        }
    }

    /// Sets the command from the control layer. Travel limits are the control
    /// layer's responsibility.
    pub fn command(&mut self, command: LinkCommand) {
        self.command = command;
    }

    pub fn fault(&self) -> Option<MotorFault> {
        self.fault
    }

    /// Activates a fault, latching the current angle for a stuck motor
    pub fn set_fault(
        &mut self,
        fault: MotorFault,
        engine: &dyn DynamicsEngine,
    ) -> Result<(), EngineError> {
        warn!("motor '{}' fault: {:?}", self.name, fault);
        if fault == MotorFault::Stuck {
            self.stuck_angle = engine.link_state(self.link)?.angle;
        }
        self.fault = Some(fault);
        Ok(())
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    /// Pushes the effective command into the engine before a step of size `h`
    pub fn pre_advance(
        &mut self,
        engine: &mut dyn DynamicsEngine,
        h: f64,
    ) -> Result<(), EngineError> {
        let command = match self.fault {
            Some(MotorFault::Stuck) => LinkCommand::Angle(self.stuck_angle),
            Some(MotorFault::Runaway { rate }) => LinkCommand::Speed(rate),
            None => self.command,
        };
        self.commanded_angle = match command {
            LinkCommand::Angle(angle) => angle,
            LinkCommand::Speed(speed) => engine.link_state(self.link)?.angle + speed * h,
        };
        engine.command_link(self.link, command)
    }

    pub fn telemetry(&self, engine: &dyn DynamicsEngine) -> Result<MotorTelemetry, EngineError> {
        let LinkState {
            angle,
            speed,
            acceleration,
            reaction_torque,
        } = engine.link_state(self.link)?;
        Ok(MotorTelemetry {
            angle,
            speed,
            acceleration,
            reaction_torque,
            commanded_angle: self.commanded_angle,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Blade root on a hub held in place, pitch motor about Z
    fn pitch_model() -> (Model, RotationalMotor) {
        let mut model = Model::new();
        model.set_gravity(0., 0., 0.);
        model.set_time_step(0.01);
        let hub = model.add_node().position(0., 0., 0.).build();
        let root = model.add_node().position(0., 0., 1.).build();
        model.add_point_mass(hub, 10., [1., 1., 1.]);
        model.add_point_mass(root, 10., [1., 1., 1.]);
        model.add_fixed_constraint(hub);
        let motor = RotationalMotor::attach(&mut model, "pitch", Some(hub), root, [0., 0., 1.]);
        (model, motor)
    }

    #[test]
    fn test_angle_command() {
        let (mut model, mut motor) = pitch_model();
        let mut engine = model.create_engine().unwrap();
        motor.command(LinkCommand::Angle(0.1));
        for _ in 0..5 {
            motor.pre_advance(&mut engine, 0.01).unwrap();
            engine.step(0.01).unwrap();
        }
        let t = motor.telemetry(&engine).unwrap();
        assert_relative_eq!(t.angle, 0.1, epsilon = 1e-6);
        assert_relative_eq!(t.commanded_angle, 0.1);
    }

    #[test]
    fn test_stuck_motor_ignores_command() {
        let (mut model, mut motor) = pitch_model();
        let mut engine = model.create_engine().unwrap();
        motor.command(LinkCommand::Speed(1.));
        for _ in 0..10 {
            motor.pre_advance(&mut engine, 0.01).unwrap();
            engine.step(0.01).unwrap();
        }
        let before = motor.telemetry(&engine).unwrap().angle;
        assert_relative_eq!(before, 0.1, epsilon = 1e-6);

        motor.set_fault(MotorFault::Stuck, &engine).unwrap();
        for _ in 0..10 {
            motor.pre_advance(&mut engine, 0.01).unwrap();
            engine.step(0.01).unwrap();
        }
        assert_relative_eq!(motor.telemetry(&engine).unwrap().angle, before, epsilon = 1e-6);
    }

    #[test]
    fn test_runaway() {
        let (mut model, mut motor) = pitch_model();
        let mut engine = model.create_engine().unwrap();
        motor.command(LinkCommand::Angle(0.));
        motor.set_fault(MotorFault::Runaway { rate: -0.5 }, &engine).unwrap();
        for _ in 0..20 {
            motor.pre_advance(&mut engine, 0.01).unwrap();
            engine.step(0.01).unwrap();
        }
        assert_relative_eq!(motor.telemetry(&engine).unwrap().angle, -0.1, epsilon = 1e-6);
    }
}
