//! Potential-flow loads on floating bodies from precomputed frequency-domain
//! coefficients: radiation memory, first-order diffraction, second-order drift
//! and linear hydrostatic restoring.

pub mod data;
pub mod diffraction;
pub mod qtf;
pub mod radiation;

use log::info;
use serde::Deserialize;

use crate::{
    engine::DynamicsEngine,
    error::ConfigError,
    hydro::waves::WaveComponent,
    model::Model,
    node::{Node, NodeId, RigidPose},
    util::sub,
};
use data::{Mat6, PotentialFlowData, Requirements};
use diffraction::Diffraction;
use qtf::{QtfMethod, SecondOrderForce};
use radiation::{ImpulseResponse, RadiationMemory};

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PotentialFlowSettings {
    pub radiation: bool,
    pub diffraction: bool,
    /// Second-order difference-frequency method, `None` to disable
    pub qtf: Option<QtfMethod>,
    pub sum_frequency: bool,
    pub hydrostatics: bool,
    /// Length of the radiation impulse response (s)
    pub truncation_time: f64,
}

impl Default for PotentialFlowSettings {
    fn default() -> Self {
        Self {
            radiation: true,
            diffraction: true,
            qtf: None,
            sum_frequency: false,
            hydrostatics: false,
            truncation_time: 60.,
        }
    }
}

impl PotentialFlowSettings {
    pub fn requirements(&self) -> Requirements {
        Requirements {
            excitation: self.diffraction,
            qtf: self.qtf.is_some(),
            sum_frequency: self.qtf.is_some() && self.sum_frequency,
            hydrostatics: self.hydrostatics,
        }
    }
}

/// Generalized forces `[fx, fy, fz, mx, my, mz]` by type from the last evaluation
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PotentialFlowForces {
    pub radiation: [f64; 6],
    pub diffraction: [f64; 6],
    pub difference_frequency: [f64; 6],
    pub sum_frequency: [f64; 6],
    pub hydrostatic: [f64; 6],
}

impl PotentialFlowForces {
    pub fn total(&self) -> [f64; 6] {
        let mut f = [0.; 6];
        for g in [
            &self.radiation,
            &self.diffraction,
            &self.difference_frequency,
            &self.sum_frequency,
            &self.hydrostatic,
        ] {
            f.iter_mut().zip(g).for_each(|(a, b)| *a += b);
        }
        f
    }
}

/// A rigid floating body whose potential-flow loads act at one reference node
pub struct PotentialFlowBody {
    pub name: String,
    pub node: NodeId,
    /// Pose the hydrostatic restoring is measured from
    pub initial_pose: RigidPose,
    pub added_mass_infinite: Mat6,
    hydrostatics: Option<Mat6>,
    radiation: Option<RadiationMemory>,
    diffraction: Option<Diffraction>,
    second_order: Option<SecondOrderForce>,
    pub forces: PotentialFlowForces,
}

impl PotentialFlowBody {
    /// Validates the dataset against the enabled force models and prepares the
    /// impulse response and the interpolated transfer functions
    pub fn new(
        data: &PotentialFlowData,
        node: NodeId,
        model: &Model,
        settings: &PotentialFlowSettings,
        components: &[WaveComponent],
        time_step: f64,
    ) -> Result<Self, ConfigError> {
        data.validate(&settings.requirements())?;
        let reference = model.node(node)?;

        let radiation = if settings.radiation {
            let kernel = ImpulseResponse::from_damping(
                &data.frequencies,
                &data.damping,
                time_step,
                settings.truncation_time,
            )?;
            Some(RadiationMemory::new(kernel))
        } else {
            None
        };

        let diffraction = match (&data.excitation, settings.diffraction) {
            (Some(table), true) => Some(Diffraction::new(table, components)),
            _ => None,
        };
        let second_order = match (&data.qtf, settings.qtf) {
            (Some(table), Some(method)) => Some(SecondOrderForce::new(
                table,
                components,
                method,
                settings.sum_frequency,
            )),
            _ => None,
        };
        let hydrostatics = if settings.hydrostatics {
            data.hydrostatic_stiffness
        } else {
            None
        };

        info!(
            "potential flow body '{}' at node {}: radiation={} diffraction={} qtf={:?}",
            data.name,
            node.0,
            radiation.is_some(),
            diffraction.is_some(),
            settings.qtf
        );

        Ok(Self {
            name: data.name.clone(),
            node,
            initial_pose: reference.initial_pose(),
            added_mass_infinite: data.added_mass_infinite,
            hydrostatics,
            radiation,
            diffraction,
            second_order,
            forces: PotentialFlowForces::default(),
        })
    }

    /// Evaluates all potential-flow forces from the reference node state at `t`.
    /// Each call records one velocity sample in the radiation history, so call
    /// once per step.
    pub fn compute(&mut self, node: &Node, components: &[WaveComponent], t: f64) {
        let k = &node.kinematics;
        let (x, y) = (k.position[0], k.position[1]);
        let mut forces = PotentialFlowForces::default();

        if let Some(memory) = &mut self.radiation {
            let w = k.angular_velocity;
            memory.push([
                k.velocity[0],
                k.velocity[1],
                k.velocity[2],
                w[0],
                w[1],
                w[2],
            ]);
            forces.radiation = memory.force();
        }
        if let Some(d) = &self.diffraction {
            forces.diffraction = d.force(components, x, y, t);
        }
        if let Some(q) = &self.second_order {
            forces.difference_frequency = q.difference_force(components, x, y, t);
            forces.sum_frequency = q.sum_force(components, x, y, t);
        }
        if let Some(c) = &self.hydrostatics {
            let dx = sub(&k.position, &self.initial_pose.position);
            let dr = k
                .orientation
                .relative_to(&self.initial_pose.orientation)
                .as_rotation_vector();
            let q = [dx[0], dx[1], dx[2], dr[0], dr[1], dr[2]];
            for (f, row) in forces.hydrostatic.iter_mut().zip(c) {
                *f = -row.iter().zip(&q).map(|(c, q)| c * q).sum::<f64>();
            }
        }
        self.forces = forces;
    }

    /// Injects the last evaluated forces and folds the infinite-frequency added
    /// mass into the reference node
    pub fn apply_to(&self, engine: &mut dyn DynamicsEngine) {
        let f = self.forces.total();
        engine.add_force(self.node, &[f[0], f[1], f[2]]);
        engine.add_torque(self.node, &[f[3], f[4], f[5]]);
        engine.add_mass_6x6(self.node, &self.added_mass_infinite);
    }

    /// Clears the radiation history, used when a run restarts
    pub fn reset(&mut self) {
        if let Some(memory) = &mut self.radiation {
            memory.clear();
        }
        self.forces = PotentialFlowForces::default();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    use super::*;
    use crate::potential::data::{tests::dataset, tests::diagonal, ExcitationTable};

    fn floater() -> (Model, NodeId) {
        let mut model = Model::new();
        let node = model.add_node().position(0., 0., -10.).build();
        (model, node)
    }

    #[test]
    fn test_missing_excitation_rejected() {
        let (model, node) = floater();
        let result = PotentialFlowBody::new(
            &dataset(),
            node,
            &model,
            &PotentialFlowSettings::default(),
            &[],
            0.1,
        );
        assert!(matches!(result, Err(ConfigError::MissingTable { .. })));
    }

    #[test]
    fn test_hydrostatic_restoring() {
        let (mut model, node) = floater();
        let mut data = dataset();
        data.hydrostatic_stiffness = Some(diagonal(5000.));
        let settings = PotentialFlowSettings {
            radiation: false,
            diffraction: false,
            hydrostatics: true,
            ..Default::default()
        };
        let mut body = PotentialFlowBody::new(&data, node, &model, &settings, &[], 0.1).unwrap();

        model.nodes[node.0].kinematics.position[2] = -9.5;
        body.compute(&model.nodes[node.0], &[], 0.);
        assert_relative_eq!(body.forces.hydrostatic[2], -2500., epsilon = 1e-9);
        assert_relative_eq!(body.forces.total()[0], 0.);
    }

    #[test]
    fn test_diffraction_and_radiation_together() {
        let (mut model, node) = floater();
        let mut data = dataset();
        data.excitation = Some(ExcitationTable {
            frequencies: vec![0.1, 2.],
            headings: vec![0.],
            coefficients: vec![vec![[Complex64::new(1000., 0.); 6]]; 2],
        });
        let c = WaveComponent::new(1., 0.6, 0., 0., 200., 9.80665);
        let mut body = PotentialFlowBody::new(
            &data,
            node,
            &model,
            &PotentialFlowSettings::default(),
            &[c],
            0.1,
        )
        .unwrap();

        model.nodes[node.0].kinematics.velocity = [0.5, 0., 0.];
        body.compute(&model.nodes[node.0], &[c], 0.);
        assert_relative_eq!(body.forces.diffraction[0], 1000., epsilon = 1e-9);
        // One sample of history opposes the motion
        assert!(body.forces.radiation[0] < 0.);
        assert_relative_eq!(body.forces.radiation[1], 0.);

        body.reset();
        assert_eq!(body.forces, PotentialFlowForces::default());
    }
}
