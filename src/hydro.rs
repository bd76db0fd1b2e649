//! Hydrodynamic and aerodynamic loads on slender structural members.
//!
//! Each element is processed in a fixed order every step: sea state quantities,
//! Morison terms, buoyancy, aerodynamic drag and hydrodynamic (rotor) mass. Node
//! level end-cap and seabed terms follow per body.

pub mod added_mass;
pub mod buoyancy;
pub mod environment;
pub mod morison;
pub mod seabed;
pub mod waves;

use log::warn;
use serde::Deserialize;

use crate::{
    body::{Body, Element, SectionShape},
    components::inflow::Inflow,
    engine::DynamicsEngine,
    error::ConfigError,
    frame::CoordSys,
    loads::{LoadTarget, NodalLoads, SegmentTarget},
    model::{BodyId, ElementId, Model},
    node::Node,
    util::{add, cross, lerp, norm, normal_component, scale, sub, unit_vector, Vec3},
};
use added_mass::{rotor_added_mass, AddedMassTreatment};
use buoyancy::{advanced_buoyancy, analytic_buoyancy, BuoyancyMode};
use environment::Environment;
use morison::{
    application_length, axial_terms, circle_area, keulegan_carpenter, morison_terms, reynolds,
    submerged_fraction, ElementFlow,
};
use waves::{FluidKinematics, WaveKinematics};

//------------------------------------------------------------------------------
// Settings and results
//------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HydroSettings {
    pub buoyancy: BuoyancyMode,
    pub added_mass: AddedMassTreatment,
    /// End-cap terms at diameter transitions
    pub axial_terms: bool,
    pub aero_drag: bool,
    pub seabed: bool,
    /// Scale applied to all buoyancy volumes
    pub buoyancy_tuning: f64,
    /// Scale applied to end-cap entrained volumes
    pub end_volume_tuning: f64,
}

impl Default for HydroSettings {
    fn default() -> Self {
        Self {
            buoyancy: BuoyancyMode::default(),
            added_mass: AddedMassTreatment::FoldIntoMass,
            axial_terms: true,
            aero_drag: true,
            seabed: true,
            buoyancy_tuning: 1.,
            end_volume_tuning: 1.,
        }
    }
}

impl HydroSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("buoyancy_tuning", self.buoyancy_tuning),
            ("end_volume_tuning", self.end_volume_tuning),
        ] {
            if !(value.is_finite() && value >= 0.) {
                return Err(ConfigError::Setting {
                    name,
                    value,
                    details: "must be non-negative",
                });
            }
        }
        if let BuoyancyMode::Auto {
            diameter_threshold, ..
        } = self.buoyancy
        {
            if !(diameter_threshold.is_finite() && diameter_threshold > 0.) {
                return Err(ConfigError::Setting {
                    name: "buoyancy.diameter_threshold",
                    value: diameter_threshold,
                    details: "must be positive",
                });
            }
        }
        Ok(())
    }
}

/// Forces by type, global axes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceBreakdown {
    pub inertia: Vec3,
    pub drag: Vec3,
    /// Hydrodynamic mass force, nonzero only when applied as a delayed force
    pub added_mass: Vec3,
    pub buoyancy: Vec3,
    pub axial: Vec3,
    pub aero_drag: Vec3,
    pub seabed: Vec3,
}

impl ForceBreakdown {
    pub fn accumulate(&mut self, other: &ForceBreakdown) {
        self.inertia = add(&self.inertia, &other.inertia);
        self.drag = add(&self.drag, &other.drag);
        self.added_mass = add(&self.added_mass, &other.added_mass);
        self.buoyancy = add(&self.buoyancy, &other.buoyancy);
        self.axial = add(&self.axial, &other.axial);
        self.aero_drag = add(&self.aero_drag, &other.aero_drag);
        self.seabed = add(&self.seabed, &other.seabed);
    }

    pub fn total(&self) -> Vec3 {
        [
            self.inertia,
            self.drag,
            self.added_mass,
            self.buoyancy,
            self.axial,
            self.aero_drag,
            self.seabed,
        ]
        .iter()
        .fold([0.; 3], |acc, f| add(&acc, f))
    }
}

/// Per-element quantities from the last load evaluation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementResult {
    pub element: ElementId,
    pub submerged_fraction: f64,
    pub reynolds: f64,
    pub keulegan_carpenter: f64,
    pub forces: ForceBreakdown,
}

impl ElementResult {
    fn new(element: ElementId) -> Self {
        Self {
            element,
            submerged_fraction: 0.,
            reynolds: 0.,
            keulegan_carpenter: 0.,
            forces: ForceBreakdown::default(),
        }
    }
}

/// Sea state quantities of an element at its kinematic query point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeastateQuantities {
    pub submerged_fraction: f64,
    /// Element coordinate of the query point
    pub s: f64,
    pub point: Vec3,
    pub fluid: FluidKinematics,
    pub structure_velocity: Vec3,
    pub structure_acceleration: Vec3,
    pub tangent: Vec3,
    pub length: f64,
    /// Free surface elevation above the element midpoint
    pub surface: f64,
}

//------------------------------------------------------------------------------
// Load engine
//------------------------------------------------------------------------------

pub struct LoadEngine {
    pub env: Environment,
    pub settings: HydroSettings,
    pub waves: Box<dyn WaveKinematics + Send>,
    pub inflow: Inflow,
    /// Loads accumulated for the next engine step
    pub loads: NodalLoads,
    /// Indexed by element
    pub results: Vec<ElementResult>,
    /// Summed forces, indexed by body
    pub body_forces: Vec<ForceBreakdown>,
    crest_bound: f64,
}

/// Read-only inputs shared by every element evaluation
struct LoadContext<'a> {
    env: &'a Environment,
    settings: &'a HydroSettings,
    waves: &'a dyn WaveKinematics,
    inflow: &'a Inflow,
    t: f64,
    crest_bound: f64,
    peak_omega: Option<f64>,
}

impl LoadEngine {
    pub fn new(
        env: Environment,
        settings: HydroSettings,
        waves: Box<dyn WaveKinematics + Send>,
        inflow: Inflow,
        model: &Model,
    ) -> Result<Self, ConfigError> {
        env.validate()?;
        settings.validate()?;
        let crest_bound = waves.mean_sea_level()
            + waves
                .components()
                .iter()
                .map(|c| c.amplitude.abs())
                .sum::<f64>();
        Ok(Self {
            env,
            settings,
            waves,
            inflow,
            loads: NodalLoads::new(model.n_nodes()),
            results: (0..model.elements.len())
                .map(|i| ElementResult::new(ElementId(i)))
                .collect(),
            body_forces: vec![ForceBreakdown::default(); model.bodies.len()],
            crest_bound,
        })
    }

    /// Evaluates all loads from the model's current kinematics at time `t`
    pub fn compute(&mut self, model: &Model, t: f64) {
        self.loads.clear();
        let ctx = LoadContext {
            env: &self.env,
            settings: &self.settings,
            waves: self.waves.as_ref(),
            inflow: &self.inflow,
            t,
            crest_bound: self.crest_bound,
            peak_omega: self.waves.peak_omega(),
        };

        for body in &model.bodies {
            let mut total = ForceBreakdown::default();
            for &id in &body.elements {
                let e = &model.elements[id.0];
                let result = ctx.element_loads(e, &model.nodes, &mut self.loads);
                total.accumulate(&result.forces);
                self.results[id.0] = result;
            }
            if self.settings.axial_terms {
                let f = ctx.axial_loads(body, model, &mut self.loads);
                total.axial = add(&total.axial, &f);
            }
            if self.settings.seabed {
                let f = ctx.seabed_loads(body, model, &mut self.loads);
                total.seabed = add(&total.seabed, &f);
            }
            self.body_forces[body.id.0] = total;
        }
    }

    /// Injects the computed loads into the engine for its next step
    pub fn apply_to(&self, engine: &mut dyn DynamicsEngine) {
        self.loads.apply_to(engine);
    }

    pub fn body_forces(&self, body: BodyId) -> Option<&ForceBreakdown> {
        self.body_forces.get(body.0)
    }

    pub fn element_result(&self, element: ElementId) -> Option<&ElementResult> {
        self.results.get(element.0)
    }
}

impl LoadContext<'_> {
    /// Locates the wetted part of an element and queries the fluid there.
    /// Returns `None` without querying the waves when the element is out of water.
    fn seastate_quantities(&self, target: &SegmentTarget) -> Option<SeastateQuantities> {
        let (pa, pb) = (target.position_at(0.), target.position_at(1.));
        let (lo, hi) = (pa[2].min(pb[2]), pa[2].max(pb[2]));
        let seabed = self.env.seabed_level();
        if lo > self.crest_bound || hi < seabed {
            return None;
        }

        let d = sub(&pb, &pa);
        let length = norm(&d);
        let tangent = unit_vector(&d)?;
        let mid = lerp(&pa, &pb, 0.5);
        let surface = self.waves.elevation(mid[0], mid[1], self.t);
        let fraction = submerged_fraction(surface, seabed, pa[2], pb[2]);
        if fraction <= 0. {
            return None;
        }

        let s = application_length(fraction, pa[2], pb[2]);
        let point = target.position_at(s);
        Some(SeastateQuantities {
            submerged_fraction: fraction,
            s,
            point,
            fluid: self.waves.kinematics(&point, self.t),
            structure_velocity: target.velocity_at(s),
            structure_acceleration: target.acceleration_at(s),
            tangent,
            length,
            surface,
        })
    }

    fn element_loads(&self, e: &Element, nodes: &[Node], loads: &mut NodalLoads) -> ElementResult {
        let (a, b) = (&nodes[e.nodes[0].0], &nodes[e.nodes[1].0]);
        let mut target = SegmentTarget::new(a, b, loads);
        let mut result = ElementResult::new(e.id);
        let props = &e.props;
        let rho = self.env.water_density;
        let d = props.effective_diameter();

        //----------------------------------------------------------------------
        // Morison and hydrodynamic mass
        //----------------------------------------------------------------------

        let seastate = self.seastate_quantities(&target);
        if let Some(q) = &seastate {
            let flow = ElementFlow {
                fluid: &q.fluid,
                structure_velocity: q.structure_velocity,
                structure_acceleration: q.structure_acceleration,
                tangent: q.tangent,
                length: q.length,
                fraction: q.submerged_fraction,
            };
            let terms = morison_terms(rho, props, &flow);
            target.add_force_at(q.s, &terms.inertia);
            target.add_force_at(q.s, &terms.drag);

            let added_mass = match props.section {
                SectionShape::Circular => terms.added_mass,
                SectionShape::Airfoil {
                    chord,
                    ca_chordwise,
                    ca_flapwise,
                } => rotor_added_mass(
                    &a.twisted_frame,
                    rho,
                    chord,
                    ca_chordwise,
                    ca_flapwise,
                    q.length,
                    q.submerged_fraction,
                ),
            };
            let f_added = self.settings.added_mass.apply(
                &mut target,
                q.s,
                &added_mass,
                &q.structure_acceleration,
            );

            let u_n = normal_component(&q.fluid.velocity, &q.tangent);
            result.submerged_fraction = q.submerged_fraction;
            result.reynolds = reynolds(
                norm(&terms.relative_normal_velocity),
                d,
                self.env.water_viscosity,
            );
            result.keulegan_carpenter = self
                .peak_omega
                .map_or(0., |w| keulegan_carpenter(norm(&u_n), w, d));
            result.forces.inertia = terms.inertia;
            result.forces.drag = terms.drag;
            result.forces.added_mass = f_added;
        }

        //----------------------------------------------------------------------
        // Buoyancy
        //----------------------------------------------------------------------

        if props.buoyancy {
            if let Some(f) = self.buoyancy(&mut target, d, seastate.as_ref()) {
                result.forces.buoyancy = f;
            }
        }

        //----------------------------------------------------------------------
        // Aerodynamic drag on the dry part
        //----------------------------------------------------------------------

        let wet = seastate.as_ref().map_or(0., |q| q.submerged_fraction);
        if self.settings.aero_drag && props.aero_cd > 0. && wet < 1. {
            let (pa, pb) = (target.position_at(0.), target.position_at(1.));
            if let Some(t) = unit_vector(&sub(&pb, &pa)) {
                let dry = 1. - wet;
                // Centre of the dry part, measured from the upper end
                let s = 1. - application_length(dry, pb[2], pa[2]);
                let point = target.position_at(s);
                let wind = self.inflow.velocity(self.t, &point);
                let v_rel = normal_component(&sub(&wind, &target.velocity_at(s)), &t);
                let l_dry = norm(&sub(&pb, &pa)) * dry;
                let f = scale(
                    &v_rel,
                    0.5 * self.env.air_density * props.aero_cd * d * l_dry * norm(&v_rel),
                );
                target.add_force_at(s, &f);
                result.forces.aero_drag = f;
            }
        }

        result
    }

    /// Applies buoyancy at the element midpoint with the torque of its offset from
    /// the submerged centroid
    fn buoyancy(
        &self,
        target: &mut SegmentTarget,
        diameter: f64,
        seastate: Option<&SeastateQuantities>,
    ) -> Option<Vec3> {
        let (pa, pb) = (target.position_at(0.), target.position_at(1.));
        if pa[2].min(pb[2]) > self.crest_bound {
            return None;
        }
        let rho_g = self.env.water_density * self.env.gravity;
        let tuning = self.settings.buoyancy_tuning;
        let d = sub(&pb, &pa);
        let mid = lerp(&pa, &pb, 0.5);

        let load = match self.settings.buoyancy.samples_for(&d, diameter) {
            None => {
                let surface = seastate
                    .map(|q| q.surface)
                    .unwrap_or_else(|| self.waves.elevation(mid[0], mid[1], self.t));
                analytic_buoyancy(rho_g, circle_area(diameter), &pa, &pb, surface, tuning)?
            }
            Some(samples) => {
                let frame = CoordSys::from_tangent(mid, &d, &[0., 0., 1.]);
                let surface = |p: &Vec3| self.waves.elevation(p[0], p[1], self.t);
                advanced_buoyancy(
                    rho_g,
                    diameter,
                    &pa,
                    &pb,
                    (&frame.y, &frame.z),
                    &surface,
                    samples,
                    tuning,
                )?
            }
        };

        target.add_force_at(0.5, &load.force);
        let torque = cross(&sub(&load.centroid, &mid), &load.force);
        target.add_torque_at(0.5, &torque);
        Some(load.force)
    }

    /// End-cap terms at nodes where the cross-section changes
    fn axial_loads(&self, body: &Body, model: &Model, loads: &mut NodalLoads) -> Vec3 {
        let mut total = [0.; 3];
        let n_el = body.elements.len();
        let seabed = self.env.seabed_level();
        let rho = self.env.water_density;

        for (i, &node_id) in body.nodes.iter().enumerate() {
            let prev = (i > 0).then(|| &model.elements[body.elements[i - 1].0]);
            let next = (i < n_el).then(|| &model.elements[body.elements[i].0]);
            let area = |e: Option<&Element>| e.map_or(0., |e| e.props.area());
            let delta_area = area(next) - area(prev);
            if delta_area.abs() < 1e-9 {
                continue;
            }

            let node = &model.nodes[node_id.0];
            let p = node.position();
            if p[2] <= seabed || p[2] > self.crest_bound {
                continue;
            }
            let fluid = self.waves.kinematics(&p, self.t);
            if !fluid.wet {
                continue;
            }

            // Adjacent element and the node's coordinate on it
            let Some((e, s)) = next.map(|e| (e, 0.)).or_else(|| prev.map(|e| (e, 1.))) else {
                continue;
            };
            let (a, b) = (&model.nodes[e.nodes[0].0], &model.nodes[e.nodes[1].0]);
            let Some(tangent) = unit_vector(&sub(&b.position(), &a.position())) else {
                continue;
            };

            let terms = axial_terms(
                rho,
                &body.axial_coefficients[i],
                delta_area,
                &tangent,
                &fluid,
                &node.velocity(),
                &node.acceleration(),
                self.settings.end_volume_tuning,
            );
            let mut target = SegmentTarget::new(a, b, loads);
            let f = terms.total_force(false);
            target.add_force_at(s, &f);
            let f_added =
                self.settings
                    .added_mass
                    .apply(&mut target, s, &terms.added_mass, &node.acceleration());
            total = add(&total, &add(&f, &f_added));
        }
        total
    }

    /// Seabed contact on nodes below the seabed
    fn seabed_loads(&self, body: &Body, model: &Model, loads: &mut NodalLoads) -> Vec3 {
        let mut total = [0.; 3];
        let seabed = self.env.seabed_level();
        for &node_id in &body.nodes {
            let node = &model.nodes[node_id.0];
            let tributary = 0.5
                * node
                    .connected_elements
                    .iter()
                    .filter(|id| model.elements[id.0].body == body.id)
                    .map(|id| model.elements[id.0].current_length(&model.nodes))
                    .sum::<f64>();
            if let Some(f) = seabed::seabed_force(
                &self.env.seabed,
                seabed,
                &node.position(),
                &node.velocity(),
                tributary,
            ) {
                if !f.iter().all(|v| v.is_finite()) {
                    warn!("non-finite seabed force at node {}", node_id.0);
                    continue;
                }
                loads.add_force(node_id.0, &f);
                total = add(&total, &f);
            }
        }
        total
    }
}
