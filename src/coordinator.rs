//! Per-step sequencing of actuator commands, load evaluation and the engine step.
//!
//! Loads are evaluated from the converged state of the previous step and
//! applied during the next one, so every load lags the structure by one step.

use itertools::Itertools;
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::{
    components::{
        aero::AeroComponent,
        drivetrain::{Drivetrain, GeneratorCommand},
        motor::{MotorFault, RotationalMotor},
    },
    engine::{DynamicsEngine, LinkCommand},
    error::{ConfigError, DivergenceSnapshot, EngineError, ModalError, SimulationError},
    hydro::{waves::WaveComponent, ForceBreakdown, LoadEngine},
    loads::NodalLoads,
    modal::{modal_analysis, DenseEigenSolver, ModalResults, ModalSettings},
    model::Model,
    node::NodeId,
    output_writer::Recorder,
    potential::PotentialFlowBody,
    util::Vec3,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Accepting steps
    Ready,
    Running,
    /// Aborted by a divergence, results end at the last good step
    Incomplete,
    Finished,
}

/// Commands from the control layer for the next step. `None` keeps the
/// previous command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlCommands {
    /// Commands by motor index
    pub motors: Vec<(usize, LinkCommand)>,
    pub generator: Option<GeneratorCommand>,
    /// Brake torque capacity (N m)
    pub brake: Option<f64>,
}

/// Scripted fault or recovery
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultEvent {
    MotorStuck { motor: usize },
    MotorRunaway { motor: usize, rate: f64 },
    MotorRecovered { motor: usize },
    GridLoss,
    GridRestored,
    /// Applies the brake regardless of later control commands
    BrakeEngage { torque: f64 },
    BrakeRelease,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct ScheduledEvent {
    pub time: f64,
    #[serde(flatten)]
    pub event: FaultEvent,
}

/// Time-ordered faults, each fired once at the first step starting at or
/// after its time
#[derive(Clone, Debug, Default)]
pub struct EventSchedule {
    events: Vec<ScheduledEvent>,
    next: usize,
}

impl EventSchedule {
    pub fn new(mut events: Vec<ScheduledEvent>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { events, next: 0 }
    }

    /// Events due at `t` not yet fired
    pub fn due(&mut self, t: f64) -> &[ScheduledEvent] {
        let start = self.next;
        while self.next < self.events.len() && self.events[self.next].time <= t + 1e-9 {
            self.next += 1;
        }
        &self.events[start..self.next]
    }

    pub fn pending(&self) -> usize {
        self.events.len() - self.next
    }
}

pub struct Simulation {
    pub model: Model,
    engine: Box<dyn DynamicsEngine + Send>,
    pub hydro: Option<LoadEngine>,
    pub aero: Vec<AeroComponent>,
    aero_loads: NodalLoads,
    aero_forces: Vec<Vec3>,
    pub potential: Vec<PotentialFlowBody>,
    pub motors: Vec<RotationalMotor>,
    pub drivetrain: Option<Drivetrain>,
    pub events: EventSchedule,
    pub recorder: Recorder,
    record_every: usize,
    h: f64,
    step: usize,
    status: RunStatus,
    initialized: bool,
    brake_latched: Option<f64>,
}

impl Simulation {
    pub fn new(model: Model, engine: Box<dyn DynamicsEngine + Send>) -> Self {
        let h = model.time_step();
        let n_nodes = model.n_nodes();
        Self {
            model,
            engine,
            hydro: None,
            aero: vec![],
            aero_loads: NodalLoads::new(n_nodes),
            aero_forces: vec![],
            potential: vec![],
            motors: vec![],
            drivetrain: None,
            events: EventSchedule::default(),
            recorder: Recorder::new(),
            record_every: 1,
            h,
            step: 0,
            status: RunStatus::Ready,
            initialized: false,
            brake_latched: None,
        }
    }

    /// Creates the reference engine from the model
    pub fn from_model(mut model: Model) -> Result<Self, ConfigError> {
        let engine = model.create_engine()?;
        Ok(Self::new(model, Box::new(engine)))
    }

    pub fn with_hydro(mut self, hydro: LoadEngine) -> Self {
        self.hydro = Some(hydro);
        self
    }

    pub fn with_aero(mut self, aero: AeroComponent) -> Self {
        self.aero.push(aero);
        self
    }

    pub fn with_potential_body(mut self, body: PotentialFlowBody) -> Self {
        self.potential.push(body);
        self
    }

    pub fn with_motor(mut self, motor: RotationalMotor) -> Self {
        self.motors.push(motor);
        self
    }

    pub fn with_drivetrain(mut self, drivetrain: Drivetrain) -> Self {
        self.drivetrain = Some(drivetrain);
        self
    }

    pub fn with_events(mut self, events: EventSchedule) -> Self {
        self.events = events;
        self
    }

    /// Samples the recorder every `n` steps, `0` disables recording
    pub fn with_record_every(mut self, n: usize) -> Self {
        self.record_every = n;
        self
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn time(&self) -> f64 {
        self.engine.time()
    }

    pub fn step_count(&self) -> usize {
        self.step
    }

    pub fn time_step(&self) -> f64 {
        self.h
    }

    pub fn engine(&self) -> &dyn DynamicsEngine {
        self.engine.as_ref()
    }

    /// Aerodynamic force of each aero component from the last evaluation
    pub fn aero_forces(&self) -> &[Vec3] {
        &self.aero_forces
    }

    pub fn hydro_forces(&self, body: usize) -> Option<&ForceBreakdown> {
        self.hydro.as_ref()?.body_forces.get(body)
    }

    fn ensure_runnable(&self) -> Result<(), SimulationError> {
        match self.status {
            RunStatus::Incomplete | RunStatus::Finished => {
                Err(SimulationError::NotRunnable(self.status))
            }
            RunStatus::Ready | RunStatus::Running => Ok(()),
        }
    }

    /// Validates the assembly and evaluates the loads for the first step
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        self.ensure_runnable()?;
        self.model.validate()?;
        if self.engine.n_nodes() != self.model.n_nodes() {
            return Err(ConfigError::Topology {
                body: "model".to_string(),
                details: format!(
                    "engine has {} nodes, model has {}",
                    self.engine.n_nodes(),
                    self.model.n_nodes()
                ),
            }
            .into());
        }
        if !(self.h.is_finite() && self.h > 0.) {
            return Err(ConfigError::Setting {
                name: "time_step",
                value: self.h,
                details: "must be positive",
            }
            .into());
        }
        for p in &self.potential {
            self.model.node(p.node)?;
        }

        self.model.update_frames(self.engine.as_ref());
        if let Some(d) = &mut self.drivetrain {
            d.post_advance(self.engine.as_ref())?;
        }
        self.compute_loads();
        self.initialized = true;
        if self.record_every > 0 {
            let sample = self.sample()?;
            self.recorder.record(sample);
        }
        info!(
            "simulation initialized: {} nodes, {} aero components, {} potential bodies, {} motors, drivetrain={}, h={}",
            self.model.n_nodes(),
            self.aero.len(),
            self.potential.len(),
            self.motors.len(),
            self.drivetrain.is_some(),
            self.h
        );
        Ok(())
    }

    /// Advances one step: actuator commands and faults, loads from the last
    /// converged state, engine step, frame refresh, load evaluation for the
    /// next step, sampling.
    pub fn step(&mut self, commands: &ControlCommands) -> Result<(), SimulationError> {
        self.ensure_runnable()?;
        if !self.initialized {
            self.initialize()?;
        }
        self.status = RunStatus::Running;

        let t = self.engine.time();
        self.engine.clear_loads();
        self.pre_advance(commands, t)?;
        self.apply_loads();

        match self.engine.step(self.h) {
            Ok(res) => debug!(
                "t={:.4}: converged in {} iterations, err={:.3e}",
                t + self.h,
                res.iter,
                res.err
            ),
            Err(EngineError::UnknownLink(id)) => {
                return Err(EngineError::UnknownLink(id).into());
            }
            Err(e) => return Err(self.diverge(e.to_string())),
        }
        if let Some(node) = self.first_non_finite_node() {
            return Err(self.diverge(format!("non-finite state at node {node}")));
        }

        self.model.update_frames(self.engine.as_ref());
        if let Some(d) = &mut self.drivetrain {
            d.post_advance(self.engine.as_ref())?;
        }
        self.compute_loads();
        self.step += 1;
        if self.record_every > 0 && self.step % self.record_every == 0 {
            let sample = self.sample()?;
            self.recorder.record(sample);
        }
        Ok(())
    }

    /// Runs `n_steps` steps with commands from `controller`, then marks the run
    /// finished
    pub fn run<F>(&mut self, n_steps: usize, mut controller: F) -> Result<(), SimulationError>
    where
        F: FnMut(&Simulation) -> ControlCommands,
    {
        info!("run started: {n_steps} steps from t={:.4}", self.time());
        for _ in 0..n_steps {
            let commands = controller(self);
            self.step(&commands)?;
        }
        self.status = RunStatus::Finished;
        info!("run finished at t={:.4} after {} steps", self.time(), self.step);
        Ok(())
    }

    /// Modal analysis of the current linearized system. Failures are reported
    /// to the caller and leave the run untouched.
    pub fn modal_analysis(&self, settings: &ModalSettings) -> Result<ModalResults, ModalError> {
        modal_analysis(
            &self.engine.system_matrices(),
            &self.model.nodes,
            &DenseEigenSolver,
            settings,
        )
    }

    fn pre_advance(&mut self, commands: &ControlCommands, t: f64) -> Result<(), SimulationError> {
        let due = self.events.due(t).to_vec();
        for e in due {
            self.fire(e, t)?;
        }

        for &(i, command) in &commands.motors {
            match self.motors.get_mut(i) {
                Some(m) => m.command(command),
                None => warn!("command for unknown motor {i} ignored"),
            }
        }
        for m in &mut self.motors {
            m.pre_advance(self.engine.as_mut(), self.h)?;
        }

        if let Some(d) = &mut self.drivetrain {
            if let Some(g) = commands.generator {
                d.command_generator(g);
            }
            match (self.brake_latched, commands.brake) {
                (Some(torque), _) => d.command_brake(torque),
                (None, Some(torque)) => d.command_brake(torque),
                (None, None) => {}
            }
            d.pre_advance(self.engine.as_mut())?;
        }
        Ok(())
    }

    fn fire(&mut self, e: ScheduledEvent, t: f64) -> Result<(), SimulationError> {
        warn!("t={t:.4}: scripted event {:?}", e.event);
        match e.event {
            FaultEvent::MotorStuck { motor } => {
                motor_mut(&mut self.motors, motor)?
                    .set_fault(MotorFault::Stuck, self.engine.as_ref())?;
            }
            FaultEvent::MotorRunaway { motor, rate } => {
                motor_mut(&mut self.motors, motor)?
                    .set_fault(MotorFault::Runaway { rate }, self.engine.as_ref())?;
            }
            FaultEvent::MotorRecovered { motor } => motor_mut(&mut self.motors, motor)?.clear_fault(),
            FaultEvent::GridLoss | FaultEvent::GridRestored => match &mut self.drivetrain {
                Some(d) => d.set_grid_loss(e.event == FaultEvent::GridLoss),
                None => warn!("grid event without a drivetrain ignored"),
            },
            FaultEvent::BrakeEngage { torque } => self.brake_latched = Some(torque),
            FaultEvent::BrakeRelease => {
                self.brake_latched = None;
                if let Some(d) = &mut self.drivetrain {
                    d.command_brake(0.);
                }
            }
        }
        Ok(())
    }

    fn apply_loads(&mut self) {
        let engine = self.engine.as_mut();
        if let Some(h) = &self.hydro {
            h.apply_to(&mut *engine);
        }
        self.aero_loads.apply_to(&mut *engine);
        for p in &self.potential {
            p.apply_to(&mut *engine);
        }
    }

    fn compute_loads(&mut self) {
        let t = self.engine.time();
        if let Some(h) = &mut self.hydro {
            h.compute(&self.model, t);
        }

        self.aero_loads.clear();
        let model = &self.model;
        let loads = &mut self.aero_loads;
        self.aero_forces = self.aero.iter().map(|a| a.apply(model, t, loads)).collect();

        let components: &[WaveComponent] = match &self.hydro {
            Some(h) => h.waves.components(),
            None => &[],
        };
        for p in &mut self.potential {
            p.compute(&self.model.nodes[p.node.0], components, t);
        }
    }

    fn first_non_finite_node(&self) -> Option<usize> {
        (0..self.engine.n_nodes()).find(|&i| !self.engine.node_state(NodeId(i)).is_finite())
    }

    fn diverge(&mut self, reason: String) -> SimulationError {
        let states = (0..self.engine.n_nodes())
            .map(|i| self.engine.node_state(NodeId(i)))
            .collect_vec();
        let snapshot = DivergenceSnapshot {
            positions: states.iter().map(|k| k.position).collect(),
            velocities: states.iter().map(|k| k.velocity).collect(),
            first_bad_node: states.iter().position(|k| !k.is_finite()),
        };
        let time = self.engine.time();
        error!(
            "simulation diverged at t={time:.4} (step {}): {reason}",
            self.step + 1
        );
        self.status = RunStatus::Incomplete;
        SimulationError::Divergence {
            time,
            step: self.step + 1,
            reason,
            snapshot: Box::new(snapshot),
        }
    }

    /// Channel values at the current step
    fn sample(&self) -> Result<Vec<(String, f64)>, EngineError> {
        let mut s = vec![("time".to_string(), self.engine.time())];
        let xyz = ["x", "y", "z"];
        let push_vec = |s: &mut Vec<(String, f64)>, prefix: String, v: &Vec3| {
            for (c, value) in xyz.iter().zip(v) {
                s.push((format!("{prefix}_{c}"), *value));
            }
        };

        for node in &self.model.nodes {
            push_vec(&mut s, format!("node{}.position", node.id.0), &node.kinematics.position);
            push_vec(
                &mut s,
                format!("node{}.acceleration", node.id.0),
                &node.kinematics.acceleration,
            );
        }

        if let Some(h) = &self.hydro {
            for (body, f) in self.model.bodies.iter().zip(&h.body_forces) {
                let name = &body.name;
                for (kind, v) in [
                    ("inertia", &f.inertia),
                    ("drag", &f.drag),
                    ("added_mass", &f.added_mass),
                    ("buoyancy", &f.buoyancy),
                    ("axial", &f.axial),
                    ("aero_drag", &f.aero_drag),
                    ("seabed", &f.seabed),
                ] {
                    push_vec(&mut s, format!("{name}.{kind}"), v);
                }
            }
            for r in &h.results {
                let e = r.element.0;
                s.push((format!("element{e}.submerged_fraction"), r.submerged_fraction));
                s.push((format!("element{e}.reynolds"), r.reynolds));
                s.push((format!("element{e}.kc"), r.keulegan_carpenter));
            }
        }

        for body in self.model.bodies.iter().filter(|b| b.kind.is_cable()) {
            if let Ok(view) = self.model.body_view(body.id) {
                for (j, tension) in view.tensions().into_iter().enumerate() {
                    s.push((format!("{}.tension{j}", body.name), tension));
                }
            }
        }

        for (i, f) in self.aero_forces.iter().enumerate() {
            push_vec(&mut s, format!("aero{i}.force"), f);
        }

        for m in &self.motors {
            let t = m.telemetry(self.engine.as_ref())?;
            for (k, v) in [
                ("angle", t.angle),
                ("speed", t.speed),
                ("acceleration", t.acceleration),
                ("reaction_torque", t.reaction_torque),
                ("commanded_angle", t.commanded_angle),
            ] {
                s.push((format!("{}.{k}", m.name), v));
            }
        }

        if let Some(d) = &self.drivetrain {
            let t = &d.telemetry;
            for (k, v) in [
                ("low_speed_angle", t.low_speed_angle),
                ("low_speed_rpm", t.low_speed_rpm()),
                ("high_speed_rpm", t.high_speed_rpm()),
                ("generator_torque", t.generator_torque),
                ("brake_torque", t.brake_torque),
                ("shaft_torque", t.shaft_torque),
                ("power", t.power),
            ] {
                s.push((format!("drivetrain.{k}"), v));
            }
        }

        let dofs = ["fx", "fy", "fz", "mx", "my", "mz"];
        for p in &self.potential {
            for (kind, f) in [
                ("radiation", &p.forces.radiation),
                ("diffraction", &p.forces.diffraction),
                ("difference_frequency", &p.forces.difference_frequency),
                ("sum_frequency", &p.forces.sum_frequency),
                ("hydrostatic", &p.forces.hydrostatic),
            ] {
                for (d, v) in dofs.iter().zip(f) {
                    s.push((format!("{}.{kind}_{d}", p.name), *v));
                }
            }
        }
        Ok(s)
    }
}

fn motor_mut(
    motors: &mut [RotationalMotor],
    i: usize,
) -> Result<&mut RotationalMotor, ConfigError> {
    motors
        .get_mut(i)
        .ok_or(ConfigError::UnknownHandle { kind: "motor", id: i })
}
