//! Error types shared across the crate.

use thiserror::Error;

/// Rejected model or dataset, reported before a run starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid topology in body '{body}': {details}")]
    Topology { body: String, details: String },

    #[error("length intervals of body '{body}' do not partition [0, 1]: {details}")]
    LengthPartition { body: String, details: String },

    #[error("invalid {field} for element {element}: {value}")]
    ElementProperty {
        element: usize,
        field: &'static str,
        value: f64,
    },

    #[error("hydrodynamic coefficient table '{table}': {details}")]
    CoefficientTable { table: String, details: String },

    #[error("missing {table} data required by {required_by}")]
    MissingTable {
        table: &'static str,
        required_by: &'static str,
    },

    #[error("invalid setting {name} = {value}: {details}")]
    Setting {
        name: &'static str,
        value: f64,
        details: &'static str,
    },

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: usize },

    #[error("unable to read '{path}': {details}")]
    Read { path: String, details: String },

    #[error("unable to parse input: {0}")]
    Parse(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Failure reported by a dynamics engine step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("singular system matrix at t={time}")]
    Singular { time: f64 },

    #[error("no convergence after {iterations} iterations, err={err}")]
    NotConverged { iterations: usize, err: f64 },

    #[error("non-finite state at node {node}")]
    NonFinite { node: usize },

    #[error("unknown link {0}")]
    UnknownLink(usize),
}

/// Kinematic state captured when a run is aborted
#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceSnapshot {
    /// Node positions `[n_nodes][3]`
    pub positions: Vec<[f64; 3]>,
    /// Node translational velocities `[n_nodes][3]`
    pub velocities: Vec<[f64; 3]>,
    /// First node with a non-finite quantity, if any
    pub first_bad_node: Option<usize>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("simulation diverged at t={time} (step {step}): {reason}")]
    Divergence {
        time: f64,
        step: usize,
        reason: String,
        snapshot: Box<DivergenceSnapshot>,
    },

    #[error("simulation is not runnable in state {0:?}")]
    NotRunnable(crate::coordinator::RunStatus),

    #[error(transparent)]
    Sweep(#[from] SweepError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModalError {
    #[error("mass matrix is singular")]
    SingularMass,

    #[error("eigenvalue solver did not converge")]
    EigenSolveFailed,

    #[error("no physical modes found among {0} eigenvalues")]
    NoPhysicalModes(usize),

    #[error("system matrices have inconsistent dimensions: {0}")]
    Dimension(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SweepError {
    #[error("unable to build worker pool: {0}")]
    Pool(String),

    #[error("sweep cell {0} panicked")]
    Panicked(usize),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
