use faer::Mat;
use itertools::Itertools;
use log::info;

use crate::{
    body::{
        AxialCoefficients, Body, BodyKind, BodyView, Connector, ConnectorRelease, Element,
        ElementProperties,
    },
    constraints::{Constraints, LinkInput, LinkKind},
    elements::{
        masses::{MassElement, Masses},
        springs::{SpringElement, SpringEnd, Springs},
        Elements,
    },
    engine::{DynamicsEngine, LinkId},
    error::ConfigError,
    node::{ActiveDOFs, FrameReference, Node, NodeId, RigidPose},
    quaternion::Quaternion,
    solver::{LinearEngine, StepParameters},
    state::{NodeFreedomMap, State},
    util::{lerp, norm, sub, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectorId(pub usize);

const PARTITION_TOL: f64 = 1e-9;

/// Straight member discretized into equal elements
#[derive(Clone, Debug)]
pub struct MemberInput {
    pub name: String,
    pub kind: BodyKind,
    pub start: Vec3,
    pub end: Vec3,
    pub n_elements: usize,
    pub props: ElementProperties,
    pub axial: AxialCoefficients,
    pub is_rotating: bool,
    pub is_reversed: bool,
    pub twist: f64,
    pub frame_reference: FrameReference,
    pub rigid_reference: Option<NodeId>,
}

impl MemberInput {
    pub fn new(name: &str, kind: BodyKind, start: Vec3, end: Vec3, n_elements: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            start,
            end,
            n_elements,
            props: ElementProperties::default(),
            axial: AxialCoefficients::default(),
            is_rotating: false,
            is_reversed: false,
            twist: 0.,
            frame_reference: FrameReference::Fixed([0., 0., 1.]),
            rigid_reference: None,
        }
    }
}

pub struct Model {
    gravity: [f64; 3],
    h: f64,
    rho_inf: f64,
    max_iter: usize,
    solver_abs_tol: f64,
    solver_rel_tol: f64,
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    pub bodies: Vec<Body>,
    pub connectors: Vec<Connector>,
    pub mass_elements: Vec<MassElement>,
    pub spring_elements: Vec<SpringElement>,
    links: Vec<LinkInput>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Creates and initializes a model
    pub fn new() -> Model {
        Model {
            gravity: [0., 0., 0.],
            h: 0.01,
            rho_inf: 1.,
            max_iter: 6,
            solver_abs_tol: 1e-5,
            solver_rel_tol: 1e-3,
            nodes: vec![],
            elements: vec![],
            bodies: vec![],
            connectors: vec![],
            mass_elements: vec![],
            spring_elements: vec![],
            links: vec![],
        }
    }

    /// Set the gravity acceleration in each direction
    pub fn set_gravity(&mut self, x: f64, y: f64, z: f64) {
        self.gravity = [x, y, z];
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_time_step(&mut self, h: f64) {
        self.h = h;
    }

    pub fn time_step(&self) -> f64 {
        self.h
    }

    pub fn set_rho_inf(&mut self, rho_inf: f64) {
        self.rho_inf = rho_inf;
    }

    pub fn set_max_iter(&mut self, max_iter: usize) {
        self.max_iter = max_iter;
    }

    pub fn set_solver_tolerance(&mut self, abs_tol: f64, rel_tol: f64) {
        self.solver_abs_tol = abs_tol;
        self.solver_rel_tol = rel_tol;
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    //--------------------------------------------------------------------------
    // Assembly
    //--------------------------------------------------------------------------

    /// Creates and returns a node builder for adding a new node to the model
    pub fn add_node(&mut self) -> NodeBuilder<'_> {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, [0., 0., 0.]));
        let i = self.nodes.len() - 1;
        NodeBuilder {
            node: &mut self.nodes[i],
        }
    }

    /// Adds a straight member as a new body, creating its nodes, elements,
    /// lumped structural masses and (for cables) axial springs
    pub fn add_member(&mut self, input: &MemberInput) -> BodyId {
        let body_id = BodyId(self.bodies.len());
        let n = input.n_elements.max(1);
        let tangent = sub(&input.end, &input.start);
        let length0 = norm(&tangent) / n as f64;

        // Nodes
        let node_ids = (0..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                let p = lerp(&input.start, &input.end, t);
                let id = NodeId(self.nodes.len());
                let mut node = Node::new(id, p);
                node.active_dofs = if input.kind.is_cable() {
                    ActiveDOFs::Translation
                } else {
                    ActiveDOFs::All
                };
                node.is_rotating = input.is_rotating;
                node.is_reversed = input.is_reversed;
                node.twist = input.twist;
                node.set_frame(&tangent, &input.frame_reference);
                self.nodes.push(node);
                id
            })
            .collect_vec();

        // Elements
        let element_ids = (0..n)
            .map(|i| {
                let id = ElementId(self.elements.len());
                self.elements.push(Element {
                    id,
                    body: body_id,
                    nodes: [node_ids[i], node_ids[i + 1]],
                    props: input.props.clone(),
                    length_a: i as f64 / n as f64,
                    length_b: if i + 1 == n { 1. } else { (i + 1) as f64 / n as f64 },
                    length0,
                });
                self.nodes[node_ids[i].0].connected_elements.push(id);
                self.nodes[node_ids[i + 1].0].connected_elements.push(id);
                id
            })
            .collect_vec();

        // Lumped structural and marine growth mass
        let m_elem = (input.props.mass_per_length + input.props.marine_growth_mass_per_length())
            * length0;
        if m_elem > 0. {
            node_ids.iter().enumerate().for_each(|(i, &node)| {
                let share = if i == 0 || i == n { 0.5 } else { 1. };
                let m = m_elem * share;
                let j = m * length0 * length0 / 12.;
                self.add_point_mass(node, m, [j, j, j]);
            });
        }

        // Axial springs for cables
        if let Some(ea) = input.props.axial_stiffness {
            for w in node_ids.windows(2) {
                self.add_spring_element(
                    [SpringEnd::Node(w[0].0), SpringEnd::Node(w[1].0)],
                    ea / length0,
                    0.,
                    Some(length0),
                );
            }
        }

        self.bodies.push(Body {
            id: body_id,
            name: input.name.clone(),
            kind: input.kind,
            axial_coefficients: vec![input.axial; node_ids.len()],
            nodes: node_ids,
            elements: element_ids,
            is_rotating: input.is_rotating,
            frame_reference: input.frame_reference,
            rigid_reference: input.rigid_reference,
        });
        body_id
    }

    pub fn add_mass_element(&mut self, node: NodeId, mass_matrix: Mat<f64>) -> usize {
        let id = self.mass_elements.len();
        self.mass_elements.push(MassElement {
            id,
            node_id: node.0,
            m: mass_matrix,
        });
        id
    }

    pub fn add_point_mass(&mut self, node: NodeId, mass: f64, inertia: Vec3) -> usize {
        let id = self.mass_elements.len();
        self.mass_elements
            .push(MassElement::point(id, node.0, mass, inertia));
        id
    }

    pub fn add_spring_element(
        &mut self,
        ends: [SpringEnd; 2],
        stiffness: f64,
        damping: f64,
        undeformed_length: Option<f64>,
    ) -> usize {
        let id = self.spring_elements.len();
        self.spring_elements.push(SpringElement {
            id,
            ends,
            stiffness,
            damping,
            undeformed_length,
        });
        id
    }

    /// Adds a link between two nodes, or between a node and ground when `base` is `None`
    pub fn add_link(&mut self, kind: LinkKind, base: Option<NodeId>, target: NodeId) -> LinkId {
        let id = self.links.len();
        self.links.push(LinkInput {
            id,
            kind,
            node_id_base: base.map(|n| n.0),
            node_id_target: target.0,
        });
        LinkId(id)
    }

    /// Clamps a node to ground
    pub fn add_fixed_constraint(&mut self, node: NodeId) -> LinkId {
        self.add_link(LinkKind::Fixed, None, node)
    }

    /// Couples two bodies at a pair of coincident nodes
    pub fn add_connector(
        &mut self,
        bodies: [BodyId; 2],
        nodes: [NodeId; 2],
        release: ConnectorRelease,
    ) -> (ConnectorId, LinkId) {
        let id = ConnectorId(self.connectors.len());
        self.connectors.push(Connector {
            id,
            bodies,
            nodes,
            release,
        });
        let kind = match release {
            ConnectorRelease::Rigid => LinkKind::Rigid,
            ConnectorRelease::Bearing { axis } => LinkKind::Bearing { axis },
            ConnectorRelease::Slider { axis } => LinkKind::Slider { axis },
        };
        (id, self.add_link(kind, Some(nodes[0]), nodes[1]))
    }

    //--------------------------------------------------------------------------
    // Queries
    //--------------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Result<&Node, ConfigError> {
        self.nodes.get(id.0).ok_or(ConfigError::UnknownHandle {
            kind: "node",
            id: id.0,
        })
    }

    pub fn body(&self, id: BodyId) -> Result<&Body, ConfigError> {
        self.bodies.get(id.0).ok_or(ConfigError::UnknownHandle {
            kind: "body",
            id: id.0,
        })
    }

    pub fn body_view(&self, id: BodyId) -> Result<BodyView<'_>, ConfigError> {
        Ok(BodyView {
            body: self.body(id)?,
            nodes: &self.nodes,
            elements: &self.elements,
        })
    }

    pub fn body_by_name(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().find(|b| b.name == name).map(|b| b.id)
    }

    //--------------------------------------------------------------------------
    // Validation
    //--------------------------------------------------------------------------

    /// Checks topology, length partitions, element properties and handles
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n_nodes = self.nodes.len();
        let check_node = |id: NodeId| {
            if id.0 < n_nodes {
                Ok(())
            } else {
                Err(ConfigError::UnknownHandle {
                    kind: "node",
                    id: id.0,
                })
            }
        };

        for e in &self.elements {
            e.nodes.iter().try_for_each(|&n| check_node(n))?;
            self.body(e.body)?;
            validate_properties(e.id.0, &e.props)?;
            let l = norm(&sub(
                &self.nodes[e.nodes[1].0].position0,
                &self.nodes[e.nodes[0].0].position0,
            ));
            if e.nodes[0] == e.nodes[1] || l < 1e-12 {
                return Err(ConfigError::Topology {
                    body: self.bodies[e.body.0].name.clone(),
                    details: format!("element {} has coincident nodes", e.id.0),
                });
            }
        }

        for b in &self.bodies {
            self.validate_body(b)?;
        }

        for c in &self.connectors {
            for i in 0..2 {
                check_node(c.nodes[i])?;
                let body = self.body(c.bodies[i])?;
                if body.node_index(c.nodes[i]).is_none() {
                    return Err(ConfigError::Topology {
                        body: body.name.clone(),
                        details: format!(
                            "connector {} references node {} outside the body",
                            c.id.0, c.nodes[i].0
                        ),
                    });
                }
            }
        }

        for l in &self.links {
            check_node(NodeId(l.node_id_target))?;
            if let Some(b) = l.node_id_base {
                check_node(NodeId(b))?;
            }
        }
        for m in &self.mass_elements {
            check_node(NodeId(m.node_id))?;
        }
        for s in &self.spring_elements {
            for e in &s.ends {
                if let SpringEnd::Node(n) = e {
                    check_node(NodeId(*n))?;
                }
            }
        }
        Ok(())
    }

    fn validate_body(&self, b: &Body) -> Result<(), ConfigError> {
        let topology = |details: String| ConfigError::Topology {
            body: b.name.clone(),
            details,
        };
        let partition = |details: String| ConfigError::LengthPartition {
            body: b.name.clone(),
            details,
        };

        if b.elements.is_empty() {
            return Err(topology("body has no elements".to_string()));
        }
        if b.axial_coefficients.len() != b.nodes.len() {
            return Err(topology(format!(
                "{} axial coefficient sets for {} nodes",
                b.axial_coefficients.len(),
                b.nodes.len()
            )));
        }

        let elements = b
            .elements
            .iter()
            .map(|&id| {
                self.elements.get(id.0).ok_or(ConfigError::UnknownHandle {
                    kind: "element",
                    id: id.0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for e in &elements {
            if e.body != b.id {
                return Err(topology(format!(
                    "element {} belongs to body {}",
                    e.id.0, e.body.0
                )));
            }
            if let Some(n) = e.nodes.iter().find(|&&n| b.node_index(n).is_none()) {
                return Err(topology(format!(
                    "element {} references node {} of another body",
                    e.id.0, n.0
                )));
            }
            if e.length_b <= e.length_a {
                return Err(partition(format!(
                    "element {} has empty interval [{}, {}]",
                    e.id.0, e.length_a, e.length_b
                )));
            }
        }

        // Ordered chain
        for w in elements.windows(2) {
            if w[0].nodes[1] != w[1].nodes[0] {
                return Err(topology(format!(
                    "elements {} and {} are not connected",
                    w[0].id.0, w[1].id.0
                )));
            }
        }

        // Contiguous partition of [0, 1]
        let first = elements[0];
        let last = elements[elements.len() - 1];
        if first.length_a.abs() > PARTITION_TOL {
            return Err(partition(format!("starts at {}", first.length_a)));
        }
        if (last.length_b - 1.).abs() > PARTITION_TOL {
            return Err(partition(format!("ends at {}", last.length_b)));
        }
        for w in elements.windows(2) {
            let gap = w[1].length_a - w[0].length_b;
            if gap.abs() > PARTITION_TOL {
                let kind = if gap > 0. { "gap" } else { "overlap" };
                return Err(partition(format!(
                    "{} of {:.3e} between elements {} and {}",
                    kind,
                    gap.abs(),
                    w[0].id.0,
                    w[1].id.0
                )));
            }
        }
        Ok(())
    }

    //--------------------------------------------------------------------------
    // Engine
    //--------------------------------------------------------------------------

    /// Validates the model and creates the reference engine
    pub fn create_engine(&mut self) -> Result<LinearEngine, ConfigError> {
        self.validate()?;
        if self.h <= 0. || !self.h.is_finite() {
            return Err(ConfigError::Setting {
                name: "time_step",
                value: self.h,
                details: "must be positive",
            });
        }
        if !(0. ..=1.).contains(&self.rho_inf) {
            return Err(ConfigError::Setting {
                name: "rho_inf",
                value: self.rho_inf,
                details: "must be within [0, 1]",
            });
        }

        self.initialize_rigid_poses();

        let x0 = self.nodes.iter().map(|n| n.position0).collect_vec();
        let q0 = self.nodes.iter().map(|n| n.orientation0()).collect_vec();
        let v0 = self
            .nodes
            .iter()
            .map(|n| {
                let (v, w) = (n.kinematics.velocity, n.kinematics.angular_velocity);
                [v[0], v[1], v[2], w[0], w[1], w[2]]
            })
            .collect_vec();
        let nfm = NodeFreedomMap::new(&self.nodes.iter().map(|n| n.active_dofs).collect_vec());
        let state = State::new(&x0, &q0, &v0);
        let elements = Elements::new(
            Masses::new(&self.mass_elements, &self.gravity),
            Springs::new(&self.spring_elements, &x0),
        );
        let constraints = Constraints::new(&self.links, &state, &nfm);

        info!(
            "model: {} nodes, {} elements, {} bodies, {} dofs, {} constraint rows",
            self.nodes.len(),
            self.elements.len(),
            self.bodies.len(),
            nfm.n_system_dofs,
            constraints.n_rows
        );

        Ok(LinearEngine::new(
            StepParameters::new(
                self.h,
                self.rho_inf,
                self.solver_abs_tol,
                self.solver_rel_tol,
                self.max_iter,
            ),
            self.rho_inf,
            nfm,
            elements,
            constraints,
            state,
        ))
    }

    fn initialize_rigid_poses(&mut self) {
        for b in 0..self.bodies.len() {
            let Some(hub) = self.bodies[b].rigid_reference else {
                continue;
            };
            let Some(pose) = self.nodes.get(hub.0).map(|n| n.initial_pose()) else {
                continue;
            };
            for &n in &self.bodies[b].nodes {
                self.nodes[n.0].set_rigid_pose(pose);
            }
        }
    }

    /// Refreshes node kinematics and frames from the engine state
    pub fn update_frames(&mut self, engine: &dyn DynamicsEngine) {
        let mut updated = vec![false; self.nodes.len()];
        for b in &self.bodies {
            let rigid = b.rigid_reference.map(|hub| {
                let k = engine.node_state(hub);
                RigidPose {
                    position: k.position,
                    orientation: k.orientation,
                }
            });
            for &n in &b.nodes {
                let k = engine.node_state(n);
                self.nodes[n.0].update_coord_sys(&k, rigid.as_ref());
                updated[n.0] = true;
            }
        }
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if !updated[i] {
                let k = engine.node_state(NodeId(i));
                node.update_coord_sys(&k, None);
            }
        }
    }

    /// Total structural mass carried by mass elements
    pub fn structural_mass(&self) -> f64 {
        self.mass_elements.iter().map(|m| m.m[(0, 0)]).sum()
    }
}

fn validate_properties(element: usize, p: &ElementProperties) -> Result<(), ConfigError> {
    let err = |field: &'static str, value: f64| ConfigError::ElementProperty {
        element,
        field,
        value,
    };
    if !(p.diameter.is_finite() && p.diameter > 0.) {
        return Err(err("diameter", p.diameter));
    }
    for (field, value) in [
        ("ca", p.ca),
        ("cd", p.cd),
        ("cp", p.cp),
        ("aero_cd", p.aero_cd),
        ("marine_growth_thickness", p.marine_growth_thickness),
        ("marine_growth_density", p.marine_growth_density),
        ("mass_per_length", p.mass_per_length),
    ] {
        if !(value.is_finite() && value >= 0.) {
            return Err(err(field, value));
        }
    }
    if let Some(ea) = p.axial_stiffness {
        if !(ea.is_finite() && ea > 0.) {
            return Err(err("axial_stiffness", ea));
        }
    }
    Ok(())
}

//------------------------------------------------------------------------------
// Builder
//------------------------------------------------------------------------------

pub struct NodeBuilder<'a> {
    node: &'a mut Node,
}

impl NodeBuilder<'_> {
    /// Sets initial position
    pub fn position(self, x: f64, y: f64, z: f64) -> Self {
        self.node.position0 = [x, y, z];
        self.node.frame0.origin = [x, y, z];
        self.node.frame = self.node.frame0;
        self.node.twisted_frame = self.node.frame0;
        self.node.ref_frame = self.node.frame0;
        self.node.kinematics.position = [x, y, z];
        self
    }

    /// Sets initial orientation from a quaternion
    pub fn orientation(self, q: Quaternion) -> Self {
        let frame = crate::frame::CoordSys::from_quaternion(self.node.position0, &q);
        self.node.frame0 = frame;
        self.node.frame = frame;
        self.node.twisted_frame = frame;
        self.node.ref_frame = frame;
        self.node.set_engine_orientation(q);
        self
    }

    /// Sets initial translational velocity
    pub fn translation_velocity(self, x: f64, y: f64, z: f64) -> Self {
        self.node.kinematics.velocity = [x, y, z];
        self
    }

    /// Sets initial angular velocity
    pub fn angular_velocity(self, x: f64, y: f64, z: f64) -> Self {
        self.node.kinematics.angular_velocity = [x, y, z];
        self
    }

    /// Restricts the node to translational degrees of freedom
    pub fn translation_only(self) -> Self {
        self.node.active_dofs = ActiveDOFs::Translation;
        self
    }

    pub fn build(self) -> NodeId {
        self.node.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tower_model() -> (Model, BodyId) {
        let mut model = Model::new();
        let body = model.add_member(&MemberInput::new(
            "tower",
            BodyKind::Tower,
            [0., 0., 0.],
            [0., 0., 10.],
            4,
        ));
        (model, body)
    }

    #[test]
    fn test_add_member_partition() {
        let (model, body) = tower_model();
        model.validate().unwrap();
        let b = model.body(body).unwrap();
        assert_eq!(b.nodes.len(), 5);
        assert_eq!(b.elements.len(), 4);
        assert_eq!(model.elements[3].length_b, 1.);
        assert_eq!(model.nodes[1].connected_elements.len(), 2);
    }

    #[test]
    fn test_validate_rejects_gap() {
        let (mut model, _) = tower_model();
        model.elements[2].length_a = 0.55;
        let err = model.validate().unwrap_err();
        assert!(matches!(err, ConfigError::LengthPartition { .. }));
    }

    #[test]
    fn test_validate_rejects_foreign_node() {
        let (mut model, _) = tower_model();
        let other = model.add_node().position(5., 0., 0.).build();
        model.elements[0].nodes[0] = other;
        let err = model.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Topology { .. }));
    }

    #[test]
    fn test_validate_rejects_dangling_handle() {
        let (mut model, _) = tower_model();
        model.elements[0].nodes[1] = NodeId(99);
        let err = model.validate().unwrap_err();
        assert_eq!(err, ConfigError::UnknownHandle { kind: "node", id: 99 });
    }

    #[test]
    fn test_validate_rejects_bad_diameter() {
        let (mut model, _) = tower_model();
        model.elements[1].props.diameter = -1.;
        let err = model.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::ElementProperty {
                element: 1,
                field: "diameter",
                value: -1.
            }
        );
    }

    #[test]
    fn test_create_engine_rejects_bad_rho_inf() {
        let (mut model, _) = tower_model();
        model.set_rho_inf(1.5);
        assert!(matches!(
            model.create_engine(),
            Err(ConfigError::Setting { name: "rho_inf", .. })
        ));
    }
}
