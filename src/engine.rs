//! Narrow interface to the multibody time integrator.
//!
//! The load engines only read node kinematics, inject forces/torques, accrue
//! mass into node blocks and ask the engine to advance by one step.

use faer::Mat;

use crate::{
    error::EngineError,
    node::{ActiveDOFs, NodeId, NodeKinematics},
    util::{Mat3, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

/// Command for a motorized link
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LinkCommand {
    /// Relative rotation angle about the motor axis (rad)
    Angle(f64),
    /// Relative rotation speed about the motor axis (rad/s)
    Speed(f64),
}

/// Relative motion about a link axis and the torque needed to enforce it
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LinkState {
    pub angle: f64,
    pub speed: f64,
    pub acceleration: f64,
    pub reaction_torque: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResults {
    pub err: f64,
    pub iter: usize,
    pub converged: bool,
}

/// Linearized system matrices at the current state
#[derive(Debug, Clone)]
pub struct SystemMatrices {
    pub m: Mat<f64>,
    pub c: Mat<f64>,
    pub k: Mat<f64>,
    /// Constraint gradient `[n_constraints][n_dofs]`
    pub b: Mat<f64>,
    /// First system dof and active dofs of each node
    pub node_dofs: Vec<(usize, ActiveDOFs)>,
}

pub trait DynamicsEngine {
    fn n_nodes(&self) -> usize;

    fn time(&self) -> f64;

    fn node_state(&self, node: NodeId) -> NodeKinematics;

    /// Adds a force (global axes) applied at the node for the next step
    fn add_force(&mut self, node: NodeId, f: &Vec3);

    /// Adds a torque (global axes) applied at the node for the next step
    fn add_torque(&mut self, node: NodeId, t: &Vec3);

    /// Accrues a translational mass block for the next step
    fn add_mass(&mut self, node: NodeId, m: &Mat3);

    /// Accrues a full 6x6 mass block for the next step
    fn add_mass_6x6(&mut self, node: NodeId, m: &[[f64; 6]; 6]);

    /// Clears injected loads and accrued mass
    fn clear_loads(&mut self);

    fn command_link(&mut self, link: LinkId, command: LinkCommand) -> Result<(), EngineError>;

    fn link_state(&self, link: LinkId) -> Result<LinkState, EngineError>;

    /// Advances the solution by one step of size `h`. Loads and accrued mass are
    /// consumed by the step.
    fn step(&mut self, h: f64) -> Result<StepResults, EngineError>;

    fn system_matrices(&self) -> SystemMatrices;
}
