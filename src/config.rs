//! YAML inputs: run settings, structure layout and potential-flow datasets.

use std::path::Path;

use num_complex::Complex64;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    body::{AxialCoefficients, BodyKind, ConnectorRelease, ElementProperties},
    components::{drivetrain::DrivetrainConfig, inflow::Inflow},
    constraints::LinkKind,
    coordinator::ScheduledEvent,
    elements::springs::SpringEnd,
    error::ConfigError,
    hydro::{
        environment::Environment,
        waves::{Current, Jonswap, LinearWaves, Stretching},
        HydroSettings,
    },
    modal::ModalSettings,
    model::{BodyId, MemberInput, Model},
    node::{FrameReference, NodeId},
    potential::{
        data::{ExcitationTable, Mat6, PotentialFlowData, QtfTable, Rao6, Requirements},
        PotentialFlowSettings,
    },
    sweep::SweepGrid,
    util::Vec3,
};

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    Ok(serde_yaml::from_str(&text)?)
}

pub fn read_simulation_config_from_file(
    path: impl AsRef<Path>,
) -> Result<SimulationConfig, ConfigError> {
    let config: SimulationConfig = read_yaml(path.as_ref())?;
    config.validate()?;
    Ok(config)
}

pub fn read_structure_from_file(path: impl AsRef<Path>) -> Result<StructureInput, ConfigError> {
    read_yaml(path.as_ref())
}

/// Reads and validates a potential-flow dataset
pub fn read_potential_flow_from_file(
    path: impl AsRef<Path>,
) -> Result<PotentialFlowData, ConfigError> {
    let input: PotentialFlowInput = read_yaml(path.as_ref())?;
    input.into_data()
}

//------------------------------------------------------------------------------
// Simulation
//------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaveInput {
    Still,
    Regular {
        height: f64,
        period: f64,
        #[serde(default)]
        direction: f64,
    },
    Jonswap(Jonswap),
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindInput {
    /// Horizontal wind speed at the reference height (m/s)
    pub speed: f64,
    pub reference_height: f64,
    /// Power law shear exponent
    pub shear: f64,
    /// Direction of the flow in the horizontal plane (rad)
    pub direction: f64,
}

impl Default for WindInput {
    fn default() -> Self {
        Self {
            speed: 0.,
            reference_height: 90.,
            shear: 0.14,
            direction: 0.,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub time_step: f64,
    /// Generalized-alpha spectral radius at infinite frequency
    pub rho_inf: f64,
    pub max_iter: usize,
    /// Newton convergence tolerances
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
    pub n_steps: usize,
    pub record_every: usize,
    pub environment: Environment,
    pub hydro: HydroSettings,
    pub waves: WaveInput,
    pub stretching: Stretching,
    pub current: Current,
    pub wind: WindInput,
    pub potential_flow: PotentialFlowSettings,
    pub drivetrain: Option<DrivetrainConfig>,
    pub events: Vec<ScheduledEvent>,
    pub modal: ModalSettings,
    /// Operating points for a parametric sweep
    pub sweep: Option<SweepGrid>,
    pub output_dir: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            rho_inf: 0.9,
            max_iter: 6,
            abs_tolerance: 1e-5,
            rel_tolerance: 1e-3,
            n_steps: 1000,
            record_every: 1,
            environment: Environment::default(),
            hydro: HydroSettings::default(),
            waves: WaveInput::Still,
            stretching: Stretching::default(),
            current: Current::default(),
            wind: WindInput::default(),
            potential_flow: PotentialFlowSettings::default(),
            drivetrain: None,
            events: vec![],
            modal: ModalSettings::default(),
            sweep: None,
            output_dir: "output".to_string(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step.is_finite() && self.time_step > 0.) {
            return invalid("time_step", self.time_step, "must be positive");
        }
        if !(0. ..=1.).contains(&self.rho_inf) {
            return invalid("rho_inf", self.rho_inf, "must be within [0, 1]");
        }
        if self.max_iter == 0 {
            return invalid("max_iter", 0., "must be at least 1");
        }
        if !(self.abs_tolerance > 0. && self.rel_tolerance > 0.) {
            return invalid("abs_tolerance", self.abs_tolerance, "tolerances must be positive");
        }
        if self.record_every == 0 {
            return invalid("record_every", 0., "must be at least 1");
        }
        match &self.waves {
            WaveInput::Regular { height, period, .. } if !(*height >= 0. && *period > 0.) => {
                return invalid("waves.period", *period, "regular waves need a positive period");
            }
            WaveInput::Jonswap(spectrum) => spectrum.validate()?,
            _ => {}
        }
        if self.potential_flow.truncation_time <= 0. {
            return invalid(
                "potential_flow.truncation_time",
                self.potential_flow.truncation_time,
                "must be positive",
            );
        }
        if let Some(d) = &self.drivetrain {
            d.validate()?;
        }
        self.environment.validate()?;
        self.hydro.validate()
    }

    pub fn wave_field(&self) -> Result<LinearWaves, ConfigError> {
        let env = &self.environment;
        Ok(match &self.waves {
            WaveInput::Still => LinearWaves::new(vec![], self.stretching, self.current, env),
            WaveInput::Regular {
                height,
                period,
                direction,
            } => {
                let mut w = LinearWaves::regular(*height, *period, *direction, env);
                w.stretching = self.stretching;
                w.current = self.current;
                w
            }
            WaveInput::Jonswap(spectrum) => {
                LinearWaves::from_spectrum(spectrum, self.stretching, self.current, env)?
            }
        })
    }

    pub fn inflow(&self) -> Inflow {
        let w = &self.wind;
        Inflow::steady_wind(w.speed, w.reference_height, w.shear, w.direction)
    }

    /// Applies gravity and the integrator settings to a model
    pub fn configure(&self, model: &mut Model) {
        model.set_gravity(0., 0., -self.environment.gravity);
        model.set_time_step(self.time_step);
        model.set_rho_inf(self.rho_inf);
        model.set_max_iter(self.max_iter);
        model.set_solver_tolerance(self.abs_tolerance, self.rel_tolerance);
    }
}

fn invalid(name: &'static str, value: f64, details: &'static str) -> Result<(), ConfigError> {
    Err(ConfigError::Setting {
        name,
        value,
        details,
    })
}

//------------------------------------------------------------------------------
// Structure
//------------------------------------------------------------------------------

/// Node of a member, counted from the start; negative indices count from the end
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NodeRef {
    pub member: String,
    #[serde(default)]
    pub node: i64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MemberConfig {
    pub name: String,
    pub kind: BodyKind,
    pub start: Vec3,
    pub end: Vec3,
    pub elements: usize,
    #[serde(default)]
    pub properties: ElementProperties,
    #[serde(default)]
    pub axial: AxialCoefficients,
    /// Twist of the section frames about the member axis (rad)
    #[serde(default)]
    pub twist: f64,
    /// Secondary axis used to build the node frames, global z when absent
    #[serde(default)]
    pub up: Option<Vec3>,
    /// Joins consecutive nodes with rigid links
    #[serde(default)]
    pub rigid: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PointMassInput {
    pub at: NodeRef,
    pub mass: f64,
    #[serde(default)]
    pub inertia: Vec3,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GroundSpringInput {
    pub at: NodeRef,
    pub anchor: Vec3,
    pub stiffness: f64,
    #[serde(default)]
    pub damping: f64,
    /// Unstretched length, the initial length when absent
    #[serde(default)]
    pub length: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConnectorInput {
    pub nodes: [NodeRef; 2],
    pub release: ConnectorRelease,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PotentialBodyInput {
    /// Dataset file, relative to the structure file
    pub file: String,
    pub node: NodeRef,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StructureInput {
    pub members: Vec<MemberConfig>,
    #[serde(default)]
    pub point_masses: Vec<PointMassInput>,
    #[serde(default)]
    pub springs: Vec<GroundSpringInput>,
    #[serde(default)]
    pub fixed: Vec<NodeRef>,
    #[serde(default)]
    pub connectors: Vec<ConnectorInput>,
    #[serde(default)]
    pub potential_bodies: Vec<PotentialBodyInput>,
}

/// Model assembled from a structure input
pub struct AssembledStructure {
    pub model: Model,
    /// Datasets with the node their loads act on
    pub potential_bodies: Vec<(PotentialFlowData, NodeId)>,
}

impl StructureInput {
    /// Builds the model. Dataset paths resolve against `base_dir`.
    pub fn assemble(
        &self,
        config: &SimulationConfig,
        base_dir: &Path,
    ) -> Result<AssembledStructure, ConfigError> {
        let mut model = Model::new();
        config.configure(&mut model);

        for m in &self.members {
            let mut input = MemberInput::new(&m.name, m.kind, m.start, m.end, m.elements);
            input.props = m.properties.clone();
            input.axial = m.axial;
            input.twist = m.twist;
            if let Some(up) = m.up {
                input.frame_reference = FrameReference::Fixed(up);
            }
            let body = model.add_member(&input);
            if m.rigid {
                let nodes = model.bodies[body.0].nodes.clone();
                for w in nodes.windows(2) {
                    model.add_link(LinkKind::Rigid, Some(w[0]), w[1]);
                }
            }
        }

        for p in &self.point_masses {
            let (_, node) = resolve(&model, &p.at)?;
            model.add_point_mass(node, p.mass, p.inertia);
        }
        for s in &self.springs {
            let (_, node) = resolve(&model, &s.at)?;
            model.add_spring_element(
                [SpringEnd::Ground(s.anchor), SpringEnd::Node(node.0)],
                s.stiffness,
                s.damping,
                s.length,
            );
        }
        for f in &self.fixed {
            let (_, node) = resolve(&model, f)?;
            model.add_fixed_constraint(node);
        }
        for c in &self.connectors {
            let (b0, n0) = resolve(&model, &c.nodes[0])?;
            let (b1, n1) = resolve(&model, &c.nodes[1])?;
            model.add_connector([b0, b1], [n0, n1], c.release);
        }
        model.validate()?;

        let potential_bodies = self
            .potential_bodies
            .iter()
            .map(|p| {
                let (_, node) = resolve(&model, &p.node)?;
                let mut data = read_potential_flow_from_file(base_dir.join(&p.file))?;
                data.validate(&config.potential_flow.requirements())?;
                if data.name.is_empty() {
                    data.name = p.file.clone();
                }
                Ok((data, node))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(AssembledStructure {
            model,
            potential_bodies,
        })
    }
}

fn resolve(model: &Model, r: &NodeRef) -> Result<(BodyId, NodeId), ConfigError> {
    let body = model
        .body_by_name(&r.member)
        .ok_or_else(|| ConfigError::Topology {
            body: r.member.clone(),
            details: "unknown member".to_string(),
        })?;
    let nodes = &model.bodies[body.0].nodes;
    let n = nodes.len() as i64;
    let i = if r.node < 0 { n + r.node } else { r.node };
    if !(0..n).contains(&i) {
        return Err(ConfigError::Topology {
            body: r.member.clone(),
            details: format!("node index {} outside 0..{n}", r.node),
        });
    }
    Ok((body, nodes[i as usize]))
}

//------------------------------------------------------------------------------
// Potential-flow datasets
//------------------------------------------------------------------------------

/// Symmetric 6x6 matrix given as 21 upper-triangle values, or a full
/// row-major 36 values
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FlatMatrix(Vec<f64>);

impl FlatMatrix {
    pub fn as_mat6(&self, table: &str) -> Result<Mat6, ConfigError> {
        let v = &self.0;
        let mut m = [[0.; 6]; 6];
        match v.len() {
            36 => (0..6).for_each(|i| (0..6).for_each(|j| m[i][j] = v[6 * i + j])),
            21 => {
                let mut k = 0;
                for i in 0..6 {
                    for j in i..6 {
                        m[i][j] = v[k];
                        m[j][i] = v[k];
                        k += 1;
                    }
                }
            }
            n => {
                return Err(ConfigError::CoefficientTable {
                    table: table.to_string(),
                    details: format!("matrix has {n} values, expected 21 or 36"),
                })
            }
        }
        Ok(m)
    }
}

/// Real and imaginary parts of a six-component coefficient
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ComplexRow {
    pub re: [f64; 6],
    #[serde(default)]
    pub im: [f64; 6],
}

impl ComplexRow {
    fn as_rao(&self) -> Rao6 {
        [0, 1, 2, 3, 4, 5].map(|k| Complex64::new(self.re[k], self.im[k]))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ExcitationInput {
    pub frequencies: Vec<f64>,
    /// Wave headings (deg)
    pub headings: Vec<f64>,
    /// `[frequency][heading]`
    pub coefficients: Vec<Vec<ComplexRow>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QtfKind {
    #[default]
    Difference,
    Sum,
}

/// One tabulated QTF entry, grid indices into the table's frequencies and headings
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QtfEntry {
    #[serde(default)]
    pub kind: QtfKind,
    #[serde(default)]
    pub heading: usize,
    pub i: usize,
    pub j: usize,
    #[serde(flatten)]
    pub value: ComplexRow,
}

/// Sparse QTF table, entries not listed are zero
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QtfInput {
    pub frequencies: Vec<f64>,
    /// Wave headings (deg)
    pub headings: Vec<f64>,
    pub entries: Vec<QtfEntry>,
    #[serde(default)]
    pub one_sided: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PotentialFlowInput {
    #[serde(default)]
    pub name: String,
    pub frequencies: Vec<f64>,
    pub added_mass: Vec<FlatMatrix>,
    pub damping: Vec<FlatMatrix>,
    pub added_mass_infinite: FlatMatrix,
    #[serde(default)]
    pub hydrostatic_stiffness: Option<FlatMatrix>,
    #[serde(default)]
    pub excitation: Option<ExcitationInput>,
    #[serde(default)]
    pub qtf: Option<QtfInput>,
}

impl PotentialFlowInput {
    /// Converts to the solver representation and checks the tables that are present
    pub fn into_data(self) -> Result<PotentialFlowData, ConfigError> {
        let name = self.name;
        let mats = |table: &str, v: &[FlatMatrix]| {
            v.iter()
                .map(|m| m.as_mat6(&format!("{name}/{table}")))
                .collect::<Result<Vec<_>, _>>()
        };

        let excitation = self.excitation.map(|e| ExcitationTable {
            frequencies: e.frequencies,
            headings: e.headings.iter().map(|h| h.to_radians()).collect(),
            coefficients: e
                .coefficients
                .iter()
                .map(|row| row.iter().map(ComplexRow::as_rao).collect())
                .collect(),
        });

        let qtf = match self.qtf {
            Some(q) => Some(sparse_qtf(&name, q)?),
            None => None,
        };

        let data = PotentialFlowData {
            frequencies: self.frequencies,
            added_mass: mats("added_mass", &self.added_mass)?,
            damping: mats("damping", &self.damping)?,
            added_mass_infinite: self
                .added_mass_infinite
                .as_mat6(&format!("{name}/added_mass_infinite"))?,
            hydrostatic_stiffness: match &self.hydrostatic_stiffness {
                Some(m) => Some(m.as_mat6(&format!("{name}/hydrostatic_stiffness"))?),
                None => None,
            },
            excitation,
            qtf,
            name,
        };
        data.validate(&Requirements::default())?;
        Ok(data)
    }
}

fn sparse_qtf(name: &str, q: QtfInput) -> Result<QtfTable, ConfigError> {
    let (nf, nh) = (q.frequencies.len(), q.headings.len());
    let zero = [Complex64::new(0., 0.); 6];
    let mut difference = vec![vec![vec![zero; nf]; nf]; nh];
    let mut sum = q
        .entries
        .iter()
        .any(|e| e.kind == QtfKind::Sum)
        .then(|| vec![vec![vec![zero; nf]; nf]; nh]);

    for e in &q.entries {
        if e.heading >= nh || e.i >= nf || e.j >= nf {
            return Err(ConfigError::CoefficientTable {
                table: format!("{name}/qtf"),
                details: format!(
                    "entry ({}, {}, {}) outside the {nh} x {nf} x {nf} grid",
                    e.heading, e.i, e.j
                ),
            });
        }
        let target = match (e.kind, &mut sum) {
            (QtfKind::Sum, Some(s)) => s,
            _ => &mut difference,
        };
        target[e.heading][e.i][e.j] = e.value.as_rao();
    }

    Ok(QtfTable {
        frequencies: q.frequencies,
        headings: q.headings.iter().map(|h| h.to_radians()).collect(),
        difference,
        sum,
        one_sided: q.one_sided,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const DATASET: &str = r#"
name: spar
frequencies: [0.1, 0.5, 1.0]
added_mass:
  - [1000, 0, 0, 0, 0, 0, 1000, 0, 0, 0, 0, 1000, 0, 0, 0, 1, 0, 0, 1, 0, 1]
  - [1000, 0, 0, 0, 0, 0, 1000, 0, 0, 0, 0, 1000, 0, 0, 0, 1, 0, 0, 1, 0, 1]
  - [1000, 0, 0, 0, 0, 0, 1000, 0, 0, 0, 0, 1000, 0, 0, 0, 1, 0, 0, 1, 0, 1]
damping:
  - [10, 0, 0, 0, 0, 0, 10, 0, 0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 0, 0, 0]
  - [50, 0, 0, 0, 0, 0, 50, 0, 0, 0, 0, 50, 0, 0, 0, 0, 0, 0, 0, 0, 0]
  - [20, 0, 0, 0, 0, 0, 20, 0, 0, 0, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0]
added_mass_infinite: [900, 0, 0, 0, 0, 0, 900, 0, 0, 0, 0, 900, 0, 0, 0, 1, 0, 0, 1, 0, 1]
excitation:
  frequencies: [0.5, 1.0]
  headings: [0, 90]
  coefficients:
    - [{re: [1, 0, 0, 0, 0, 0]}, {re: [0, 1, 0, 0, 0, 0]}]
    - [{re: [2, 0, 0, 0, 0, 0], im: [1, 0, 0, 0, 0, 0]}, {re: [0, 2, 0, 0, 0, 0]}]
qtf:
  frequencies: [0.5, 1.0]
  headings: [0]
  one_sided: true
  entries:
    - {i: 0, j: 0, re: [3, 0, 0, 0, 0, 0]}
    - {i: 1, j: 0, re: [1, 0, 0, 0, 0, 0], im: [0.5, 0, 0, 0, 0, 0]}
    - {kind: sum, i: 1, j: 1, re: [4, 0, 0, 0, 0, 0]}
"#;

    #[test]
    fn test_potential_flow_input() {
        let input: PotentialFlowInput = serde_yaml::from_str(DATASET).unwrap();
        let data = input.into_data().unwrap();
        assert_eq!(data.added_mass.len(), 3);
        assert_relative_eq!(data.added_mass[1][3][3], 1.);
        assert_relative_eq!(data.added_mass_infinite[2][2], 900.);

        let e = data.excitation.as_ref().unwrap();
        assert_relative_eq!(e.headings[1], std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(e.coefficients[1][0][0].im, 1.);

        let q = data.qtf.as_ref().unwrap();
        assert_relative_eq!(q.difference[0][1][0][0].im, 0.5);
        assert_relative_eq!(q.difference[0][0][1][0].re, 0.);
        assert_relative_eq!(q.sum.as_ref().unwrap()[0][1][1][0].re, 4.);
    }

    #[test]
    fn test_bad_matrix_size() {
        let text = DATASET.replace("added_mass_infinite: [900, 0, 0,", "added_mass_infinite: [900,");
        let input: PotentialFlowInput = serde_yaml::from_str(&text).unwrap();
        assert!(matches!(
            input.into_data(),
            Err(ConfigError::CoefficientTable { .. })
        ));
    }

    #[test]
    fn test_qtf_entry_outside_grid() {
        let text = DATASET.replace("{i: 0, j: 0,", "{i: 5, j: 0,");
        let input: PotentialFlowInput = serde_yaml::from_str(&text).unwrap();
        assert!(input.into_data().is_err());
    }

    #[test]
    fn test_simulation_config() {
        let config: SimulationConfig = serde_yaml::from_str(
            r#"
time_step: 0.05
n_steps: 200
waves: {type: regular, height: 4.0, period: 10.0}
hydro: {buoyancy: {mode: analytic}}
events:
  - {time: 5.0, type: grid_loss}
  - {time: 2.0, type: motor_stuck, motor: 1}
"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_relative_eq!(config.time_step, 0.05);
        assert_eq!(config.events.len(), 2);
        assert_eq!(config.wave_field().unwrap().components.len(), 1);

        let bad = SimulationConfig {
            rho_inf: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Setting { name: "rho_inf", .. })
        ));
    }

    #[test]
    fn test_assemble_structure() {
        let structure: StructureInput = serde_yaml::from_str(
            r#"
members:
  - name: spar
    kind: substructure
    start: [0, 0, -100]
    end: [0, 0, 10]
    elements: 11
    rigid: true
    properties: {diameter: 9.4, mass_per_length: 60000}
point_masses:
  - {at: {member: spar, node: -1}, mass: 3.5e5, inertia: [1e7, 1e7, 1e6]}
springs:
  - {at: {member: spar, node: 7}, anchor: [800, 0, -320], stiffness: 4e4}
"#,
        )
        .unwrap();
        let config = SimulationConfig::default();
        let assembled = structure.assemble(&config, Path::new(".")).unwrap();
        let model = assembled.model;
        assert_eq!(model.n_nodes(), 12);
        assert_eq!(model.spring_elements.len(), 1);
        assert_relative_eq!(model.structural_mass(), 110. * 60000. + 3.5e5, max_relative = 1e-9);
        assert_relative_eq!(model.gravity()[2], -config.environment.gravity);

        let bad: StructureInput = serde_yaml::from_str(
            r#"
members:
  - {name: a, kind: tower, start: [0, 0, 0], end: [0, 0, 10], elements: 2}
fixed:
  - {member: b}
"#,
        )
        .unwrap();
        assert!(matches!(
            bad.assemble(&config, Path::new(".")),
            Err(ConfigError::Topology { .. })
        ));
    }
}
