use serde::Deserialize;

use crate::{
    loads::NodalLoads,
    model::{BodyId, ElementId},
    node::{FrameReference, Node, NodeId},
    util::{dot, lerp, norm, scale, sub, unit_vector, Vec3},
};

//------------------------------------------------------------------------------
// Element
//------------------------------------------------------------------------------

/// Cross-section shape of a member
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionShape {
    #[default]
    Circular,
    /// Airfoil section of a rotor member, added mass coefficients per unit chord
    /// length in the chordwise (local Y) and flapwise (local Z) directions
    Airfoil {
        chord: f64,
        ca_chordwise: f64,
        ca_flapwise: f64,
    },
}

/// Physical properties carried by a load-bearing element
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElementProperties {
    /// Outer diameter (m)
    pub diameter: f64,
    /// Added mass coefficient
    pub ca: f64,
    /// Drag coefficient
    pub cd: f64,
    /// Dynamic pressure (Froude-Krylov) coefficient
    pub cp: f64,
    /// Aerodynamic drag coefficient
    pub aero_cd: f64,
    /// Marine growth thickness (m)
    pub marine_growth_thickness: f64,
    /// Marine growth density (kg/m^3)
    pub marine_growth_density: f64,
    /// Element contributes buoyancy
    pub buoyancy: bool,
    pub section: SectionShape,
    /// Structural mass per unit length (kg/m)
    pub mass_per_length: f64,
    /// Axial stiffness EA (N) of cable elements
    pub axial_stiffness: Option<f64>,
}

impl Default for ElementProperties {
    fn default() -> Self {
        Self {
            diameter: 1.,
            ca: 1.,
            cd: 1.,
            cp: 1.,
            aero_cd: 0.,
            marine_growth_thickness: 0.,
            marine_growth_density: 1100.,
            buoyancy: true,
            section: SectionShape::Circular,
            mass_per_length: 0.,
            axial_stiffness: None,
        }
    }
}

impl ElementProperties {
    /// Diameter including marine growth
    pub fn effective_diameter(&self) -> f64 {
        self.diameter + 2. * self.marine_growth_thickness
    }

    /// Mass of marine growth per unit length
    pub fn marine_growth_mass_per_length(&self) -> f64 {
        let d_eff = self.effective_diameter();
        std::f64::consts::FRAC_PI_4
            * (d_eff * d_eff - self.diameter * self.diameter)
            * self.marine_growth_density
    }

    pub fn area(&self) -> f64 {
        let d = self.effective_diameter();
        std::f64::consts::FRAC_PI_4 * d * d
    }
}

/// Axial (end-cap) hydrodynamic coefficients of a node
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AxialCoefficients {
    pub ca: f64,
    pub cd: f64,
    pub cp: f64,
}

impl Default for AxialCoefficients {
    fn default() -> Self {
        Self {
            ca: 0.6,
            cd: 0.,
            cp: 1.,
        }
    }
}

/// Two-node load-bearing segment of a body
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub body: BodyId,
    pub nodes: [NodeId; 2],
    pub props: ElementProperties,
    /// Normalized start of the element within its body
    pub length_a: f64,
    /// Normalized end of the element within its body
    pub length_b: f64,
    /// Unstretched length
    pub length0: f64,
}

impl Element {
    pub fn current_length(&self, nodes: &[Node]) -> f64 {
        norm(&sub(
            &nodes[self.nodes[1].0].position(),
            &nodes[self.nodes[0].0].position(),
        ))
    }

    /// Unit vector from the first to the second node
    pub fn tangent(&self, nodes: &[Node]) -> Option<Vec3> {
        unit_vector(&sub(
            &nodes[self.nodes[1].0].position(),
            &nodes[self.nodes[0].0].position(),
        ))
    }

    /// Axial tension from the current strain, zero if the element has no axial stiffness
    pub fn tension(&self, nodes: &[Node]) -> f64 {
        match self.props.axial_stiffness {
            Some(ea) if self.length0 > 0. => {
                ea * (self.current_length(nodes) - self.length0) / self.length0
            }
            _ => 0.,
        }
    }

    /// Maps a body coordinate onto the element's local coordinate in `[0, 1]`
    pub fn local_coordinate(&self, s: f64) -> f64 {
        let span = self.length_b - self.length_a;
        if span <= 0. {
            return 0.;
        }
        ((s - self.length_a) / span).clamp(0., 1.)
    }
}

//------------------------------------------------------------------------------
// Body
//------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Blade,
    Strut,
    Tower,
    TorqueTube,
    Substructure,
    Cable,
    Mooring,
}

impl BodyKind {
    pub fn is_cable(&self) -> bool {
        matches!(self, BodyKind::Cable | BodyKind::Mooring)
    }
}

/// Ordered sequence of nodes and elements of one kind
#[derive(Clone, Debug)]
pub struct Body {
    pub id: BodyId,
    pub name: String,
    pub kind: BodyKind,
    pub nodes: Vec<NodeId>,
    pub elements: Vec<ElementId>,
    /// Axial coefficients aligned with `nodes`
    pub axial_coefficients: Vec<AxialCoefficients>,
    pub is_rotating: bool,
    pub frame_reference: FrameReference,
    /// Node whose motion defines the rigid rotation of a rotating body (e.g. the hub)
    pub rigid_reference: Option<NodeId>,
}

impl Body {
    /// Position of a node within the body's node list
    pub fn node_index(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }
}

/// Read access to a body together with the arena it lives in
pub struct BodyView<'a> {
    pub body: &'a Body,
    pub nodes: &'a [Node],
    pub elements: &'a [Element],
}

impl<'a> BodyView<'a> {
    /// Element containing normalized coordinate `s` and the local coordinate within it
    pub fn locate(&self, s: f64) -> Option<(&'a Element, f64)> {
        let s = s.clamp(0., 1.);
        let elements = self.body.elements.iter().map(|id| &self.elements[id.0]);
        let mut last = None;
        for e in elements {
            last = Some(e);
            if s <= e.length_b {
                return Some((e, e.local_coordinate(s)));
            }
        }
        last.map(|e| (e, 1.))
    }

    fn interpolate(&self, s: f64, f: impl Fn(&Node) -> Vec3) -> Vec3 {
        match self.locate(s) {
            Some((e, t)) => lerp(
                &f(&self.nodes[e.nodes[0].0]),
                &f(&self.nodes[e.nodes[1].0]),
                t,
            ),
            None => [0., 0., 0.],
        }
    }

    pub fn position_at(&self, s: f64) -> Vec3 {
        self.interpolate(s, |n| n.position())
    }

    pub fn velocity_at(&self, s: f64) -> Vec3 {
        self.interpolate(s, |n| n.velocity())
    }

    pub fn acceleration_at(&self, s: f64) -> Vec3 {
        self.interpolate(s, |n| n.acceleration())
    }

    /// Nodal force interpolated to `s`
    pub fn force_at(&self, s: f64, loads: &NodalLoads) -> Vec3 {
        self.interpolate(s, |n| loads.force[n.id.0])
    }

    /// Reynolds number at `s` for a given fluid velocity and kinematic viscosity
    pub fn reynolds_at(&self, s: f64, fluid_velocity: &Vec3, viscosity: f64) -> f64 {
        let Some((e, _)) = self.locate(s) else {
            return 0.;
        };
        let v_rel = sub(fluid_velocity, &self.velocity_at(s));
        let v_n = match e.tangent(self.nodes) {
            Some(t) => sub(&v_rel, &scale(&t, dot(&v_rel, &t))),
            None => v_rel,
        };
        norm(&v_n) * e.props.effective_diameter() / viscosity
    }

    /// Current length along the node chain
    pub fn length(&self) -> f64 {
        self.body
            .elements
            .iter()
            .map(|id| self.elements[id.0].current_length(self.nodes))
            .sum()
    }

    /// Tension of each element (zero for elements without axial stiffness)
    pub fn tensions(&self) -> Vec<f64> {
        self.body
            .elements
            .iter()
            .map(|id| self.elements[id.0].tension(self.nodes))
            .collect()
    }
}

//------------------------------------------------------------------------------
// Connector
//------------------------------------------------------------------------------

/// Relative motion permitted between two connected nodes
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorRelease {
    Rigid,
    /// Free rotation about `axis`
    Bearing { axis: Vec3 },
    /// Free translation along `axis`
    Slider { axis: Vec3 },
}

/// Couples two bodies at a pair of coincident nodes
#[derive(Clone, Debug, PartialEq)]
pub struct Connector {
    pub id: crate::model::ConnectorId,
    pub bodies: [BodyId; 2],
    pub nodes: [NodeId; 2],
    pub release: ConnectorRelease,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_effective_diameter_and_growth_mass() {
        let p = ElementProperties {
            diameter: 2.,
            marine_growth_thickness: 0.1,
            marine_growth_density: 1000.,
            ..Default::default()
        };
        assert_relative_eq!(p.effective_diameter(), 2.2);
        assert_relative_eq!(
            p.marine_growth_mass_per_length(),
            std::f64::consts::FRAC_PI_4 * (2.2 * 2.2 - 4.) * 1000.,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_local_coordinate() {
        let e = Element {
            id: ElementId(0),
            body: BodyId(0),
            nodes: [NodeId(0), NodeId(1)],
            props: ElementProperties::default(),
            length_a: 0.25,
            length_b: 0.75,
            length0: 1.,
        };
        assert_relative_eq!(e.local_coordinate(0.5), 0.5);
        assert_relative_eq!(e.local_coordinate(0.), 0.);
        assert_relative_eq!(e.local_coordinate(1.), 1.);
    }

    #[test]
    fn test_body_queries() {
        let mut model = crate::model::Model::new();
        let mut input = crate::model::MemberInput::new(
            "brace",
            BodyKind::Substructure,
            [0., 0., -5.],
            [10., 0., -5.],
            2,
        );
        input.props.diameter = 1.;
        let body = model.add_member(&input);
        let view = model.body_view(body).unwrap();

        assert_relative_eq!(view.length(), 10.);
        assert_relative_eq!(view.position_at(0.25)[0], 2.5);
        let (e, xi) = view.locate(0.75).unwrap();
        assert_eq!(e.id, ElementId(1));
        assert_relative_eq!(xi, 0.5);

        let mut loads = NodalLoads::new(model.n_nodes());
        loads.add_force(1, &[0., 0., 10.]);
        loads.add_force(2, &[0., 0., 20.]);
        assert_relative_eq!(view.force_at(0.75, &loads)[2], 15.);

        // Only the flow normal to the axis counts
        struct Case {
            flow: Vec3,
            reynolds: f64,
        }
        for case in [
            Case {
                flow: [0., 1., 0.],
                reynolds: 1e6,
            },
            Case {
                flow: [2., 0., 0.],
                reynolds: 0.,
            },
            Case {
                flow: [2., 0., 0.5],
                reynolds: 5e5,
            },
        ] {
            assert_relative_eq!(
                view.reynolds_at(0.5, &case.flow, 1e-6),
                case.reynolds,
                max_relative = 1e-12,
                epsilon = 1e-6
            );
        }
    }
}
