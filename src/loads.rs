use itertools::izip;

use crate::{
    engine::DynamicsEngine,
    node::{Node, NodeId},
    util::{add, cross, dot, lerp, mat3_add_assign, mat3_scaled, norm, scale, sub, Mat3, Vec3},
};

/// Capability shared by every element kind that receives distributed loads.
/// `s` is the normalized coordinate along the element in `[0, 1]`.
pub trait LoadTarget {
    fn position_at(&self, s: f64) -> Vec3;
    fn velocity_at(&self, s: f64) -> Vec3;
    fn acceleration_at(&self, s: f64) -> Vec3;
    fn add_force_at(&mut self, s: f64, f: &Vec3);
    fn add_torque_at(&mut self, s: f64, t: &Vec3);
    /// Accrues a translational mass block (global axes) at `s`
    fn add_mass_at(&mut self, s: f64, m: &Mat3);
}

//------------------------------------------------------------------------------
// Nodal load buffer
//------------------------------------------------------------------------------

/// Loads accumulated on each node for the next engine step
#[derive(Clone, Debug, PartialEq)]
pub struct NodalLoads {
    pub force: Vec<Vec3>,
    pub torque: Vec<Vec3>,
    /// Translational mass accrued this step (global axes)
    pub mass: Vec<Mat3>,
}

impl NodalLoads {
    pub fn new(n_nodes: usize) -> Self {
        Self {
            force: vec![[0.; 3]; n_nodes],
            torque: vec![[0.; 3]; n_nodes],
            mass: vec![[[0.; 3]; 3]; n_nodes],
        }
    }

    pub fn clear(&mut self) {
        self.force.iter_mut().for_each(|f| *f = [0.; 3]);
        self.torque.iter_mut().for_each(|t| *t = [0.; 3]);
        self.mass.iter_mut().for_each(|m| *m = [[0.; 3]; 3]);
    }

    pub fn add_force(&mut self, node: usize, f: &Vec3) {
        self.force[node] = add(&self.force[node], f);
    }

    pub fn add_torque(&mut self, node: usize, t: &Vec3) {
        self.torque[node] = add(&self.torque[node], t);
    }

    pub fn add_mass(&mut self, node: usize, m: &Mat3) {
        mat3_add_assign(&mut self.mass[node], m);
    }

    pub fn total_force(&self) -> Vec3 {
        self.force.iter().fold([0.; 3], |acc, f| add(&acc, f))
    }

    /// Injects the accumulated loads and mass into the engine for its next step
    pub fn apply_to(&self, engine: &mut dyn DynamicsEngine) {
        let zero = [[0.; 3]; 3];
        for (i, (f, t, m)) in izip!(&self.force, &self.torque, &self.mass).enumerate() {
            let node = NodeId(i);
            if *f != [0.; 3] {
                engine.add_force(node, f);
            }
            if *t != [0.; 3] {
                engine.add_torque(node, t);
            }
            if *m != zero {
                engine.add_mass(node, m);
            }
        }
    }
}

//------------------------------------------------------------------------------
// Segment view
//------------------------------------------------------------------------------

/// Two-node segment writing into the nodal load buffer
pub struct SegmentTarget<'a> {
    pub a: &'a Node,
    pub b: &'a Node,
    pub loads: &'a mut NodalLoads,
}

impl<'a> SegmentTarget<'a> {
    pub fn new(a: &'a Node, b: &'a Node, loads: &'a mut NodalLoads) -> Self {
        Self { a, b, loads }
    }

    /// Converts a torque into an equivalent couple of forces on the two nodes.
    /// The component along the segment cannot be carried and is dropped.
    fn add_torque_as_couple(&mut self, t: &Vec3) {
        let d = sub(&self.b.position(), &self.a.position());
        let l2 = dot(&d, &d);
        if l2 < f64::EPSILON {
            return;
        }
        let t_perp = sub(t, &scale(&d, dot(t, &d) / l2));
        let f = scale(&cross(&t_perp, &d), 1. / l2);
        self.loads.add_force(self.b.id.0, &f);
        self.loads.add_force(self.a.id.0, &scale(&f, -1.));
    }
}

impl LoadTarget for SegmentTarget<'_> {
    fn position_at(&self, s: f64) -> Vec3 {
        lerp(&self.a.position(), &self.b.position(), s)
    }

    fn velocity_at(&self, s: f64) -> Vec3 {
        lerp(&self.a.velocity(), &self.b.velocity(), s)
    }

    fn acceleration_at(&self, s: f64) -> Vec3 {
        lerp(&self.a.acceleration(), &self.b.acceleration(), s)
    }

    fn add_force_at(&mut self, s: f64, f: &Vec3) {
        self.loads.add_force(self.a.id.0, &scale(f, 1. - s));
        self.loads.add_force(self.b.id.0, &scale(f, s));
    }

    fn add_torque_at(&mut self, s: f64, t: &Vec3) {
        if norm(t) == 0. {
            return;
        }
        if self.a.active_dofs.has_rotation() && self.b.active_dofs.has_rotation() {
            self.loads.add_torque(self.a.id.0, &scale(t, 1. - s));
            self.loads.add_torque(self.b.id.0, &scale(t, s));
        } else {
            self.add_torque_as_couple(t);
        }
    }

    fn add_mass_at(&mut self, s: f64, m: &Mat3) {
        self.loads.add_mass(self.a.id.0, &mat3_scaled(m, 1. - s));
        self.loads.add_mass(self.b.id.0, &mat3_scaled(m, s));
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::node::ActiveDOFs;

    fn nodes(dofs: ActiveDOFs) -> (Node, Node) {
        let mut a = Node::new(NodeId(0), [0., 0., 0.]);
        let mut b = Node::new(NodeId(1), [2., 0., 0.]);
        a.active_dofs = dofs;
        b.active_dofs = dofs;
        (a, b)
    }

    #[test]
    fn test_force_split() {
        let (a, b) = nodes(ActiveDOFs::All);
        let mut loads = NodalLoads::new(2);
        let mut seg = SegmentTarget::new(&a, &b, &mut loads);
        seg.add_force_at(0.25, &[0., 0., 4.]);
        assert_relative_eq!(loads.force[0][2], 3.);
        assert_relative_eq!(loads.force[1][2], 1.);
    }

    #[test]
    fn test_torque_couple_on_translation_nodes() {
        let (a, b) = nodes(ActiveDOFs::Translation);
        let mut loads = NodalLoads::new(2);
        let mut seg = SegmentTarget::new(&a, &b, &mut loads);
        // Axial component is dropped, transverse component becomes a couple
        seg.add_torque_at(0.5, &[5., 0., 10.]);
        assert_relative_eq!(loads.force[1][1], 5.);
        assert_relative_eq!(loads.force[0][1], -5.);
        assert_eq!(loads.torque[0], [0.; 3]);

        // Moment of the couple about node a reproduces the transverse torque
        let m = cross(&[2., 0., 0.], &loads.force[1]);
        assert_relative_eq!(m[2], 10.);
        assert_relative_eq!(loads.total_force()[1], 0.);
    }

    #[test]
    fn test_mass_split() {
        let (a, b) = nodes(ActiveDOFs::All);
        let mut loads = NodalLoads::new(2);
        let mut seg = SegmentTarget::new(&a, &b, &mut loads);
        seg.add_mass_at(0.5, &[[2., 0., 0.], [0., 2., 0.], [0., 0., 2.]]);
        assert_relative_eq!(loads.mass[0][1][1], 1.);
        assert_relative_eq!(loads.mass[1][2][2], 1.);
    }
}
