use crate::{
    frame::CoordSys,
    model::ElementId,
    quaternion::Quaternion,
    util::{cross, norm, normal_component, sub, unit_vector, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

//------------------------------------------------------------------------------
// Degrees of freedom
//------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveDOFs {
    None,
    Translation,
    Rotation,
    All,
}

impl ActiveDOFs {
    pub fn add_dofs(&mut self, dofs: ActiveDOFs) {
        *self = match (*self, dofs) {
            (ActiveDOFs::None, d) | (d, ActiveDOFs::None) => d,
            (ActiveDOFs::Translation, ActiveDOFs::Translation) => ActiveDOFs::Translation,
            (ActiveDOFs::Rotation, ActiveDOFs::Rotation) => ActiveDOFs::Rotation,
            _ => ActiveDOFs::All,
        }
    }

    pub fn has_translation(&self) -> bool {
        matches!(self, ActiveDOFs::Translation | ActiveDOFs::All)
    }

    pub fn has_rotation(&self) -> bool {
        matches!(self, ActiveDOFs::Rotation | ActiveDOFs::All)
    }

    pub fn n_dofs(&self) -> usize {
        match self {
            ActiveDOFs::None => 0,
            ActiveDOFs::Translation | ActiveDOFs::Rotation => 3,
            ActiveDOFs::All => 6,
        }
    }
}

//------------------------------------------------------------------------------
// Kinematics
//------------------------------------------------------------------------------

/// Solved node state as reported by the dynamics engine
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeKinematics {
    pub position: Vec3,
    pub orientation: Quaternion,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub acceleration: Vec3,
    pub angular_acceleration: Vec3,
}

impl NodeKinematics {
    pub fn at_rest(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
            ..Default::default()
        }
    }

    pub fn is_finite(&self) -> bool {
        [
            self.position,
            self.velocity,
            self.angular_velocity,
            self.acceleration,
            self.angular_acceleration,
        ]
        .iter()
        .all(|v| v.iter().all(|x| x.is_finite()))
            && self.orientation.as_vec().iter().all(|x| x.is_finite())
    }
}

/// Position and orientation of a rigid reference (e.g. the hub of a rotating body)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RigidPose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

//------------------------------------------------------------------------------
// Frame reference
//------------------------------------------------------------------------------

/// Secondary direction used to complete a node frame from its tangent
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameReference {
    /// Fixed global direction
    Fixed(Vec3),
    /// Radial offset of the node from a rotation axis. Members whose cross-section
    /// tracks its circumferential location (rotating blades and struts) use this.
    /// `fallback` is used when the radial offset is parallel to the tangent.
    Radial {
        center: Vec3,
        axis: Vec3,
        fallback: Vec3,
    },
}

impl FrameReference {
    pub fn up_vector(&self, position: &Vec3, tangent: &Vec3) -> Vec3 {
        match self {
            FrameReference::Fixed(up) => *up,
            FrameReference::Radial {
                center,
                axis,
                fallback,
            } => {
                let axis = unit_vector(axis).unwrap_or([0., 0., 1.]);
                let radial = normal_component(&sub(position, center), &axis);
                let t = unit_vector(tangent).unwrap_or([1., 0., 0.]);
                match unit_vector(&radial) {
                    Some(r) if norm(&cross(&r, &t)) > 1e-6 => r,
                    _ => *fallback,
                }
            }
        }
    }
}

//------------------------------------------------------------------------------
// Node
//------------------------------------------------------------------------------

pub struct Node {
    pub id: NodeId,
    /// Assembly position
    pub position0: Vec3,
    pub active_dofs: ActiveDOFs,
    /// Member rotates with a rotor: its reference frame is transported with the rigid motion
    pub is_rotating: bool,
    /// Member direction reversed relative to its body definition
    pub is_reversed: bool,
    /// Structural twist about the local X axis (radians)
    pub twist: f64,
    /// Frame at assembly time (untwisted)
    pub frame0: CoordSys,
    /// Current frame (untwisted)
    pub frame: CoordSys,
    /// Current frame with twist correction
    pub twisted_frame: CoordSys,
    /// Frame used to measure elastic deformation
    pub ref_frame: CoordSys,
    /// Latest solved state
    pub kinematics: NodeKinematics,
    /// Engine orientation at assembly
    orientation0: Quaternion,
    /// Last rigid pose used to transport the reference frame
    rigid_pose: Option<RigidPose>,
    /// Non-owning handles of elements attached to this node
    pub connected_elements: Vec<ElementId>,
}

impl Node {
    pub fn new(id: NodeId, position: Vec3) -> Self {
        let frame = CoordSys {
            origin: position,
            ..CoordSys::global()
        };
        Self {
            id,
            position0: position,
            active_dofs: ActiveDOFs::All,
            is_rotating: false,
            is_reversed: false,
            twist: 0.,
            frame0: frame,
            frame,
            twisted_frame: frame,
            ref_frame: frame,
            kinematics: NodeKinematics::at_rest(position, Quaternion::identity()),
            orientation0: Quaternion::identity(),
            rigid_pose: None,
            connected_elements: vec![],
        }
    }

    /// Builds the node frame from a tangent and a secondary reference direction.
    /// Returns the orientation the dynamics engine should be initialized with.
    pub fn set_frame(&mut self, tangent: &Vec3, reference: &FrameReference) -> Quaternion {
        let up = reference.up_vector(&self.position0, tangent);
        let mut frame = CoordSys::from_tangent(self.position0, tangent, &up);
        if self.is_reversed {
            frame = frame.reversed();
        }
        self.frame0 = frame;
        self.frame = frame;
        self.twisted_frame = self.twist_corrected(&frame);
        self.ref_frame = frame;
        self.orientation0 = frame.as_quaternion();
        self.kinematics.orientation = self.orientation0;
        self.orientation0
    }

    /// Declares the orientation the engine node was created with
    pub fn set_engine_orientation(&mut self, q: Quaternion) {
        self.orientation0 = q;
        self.kinematics.orientation = q;
    }

    /// Recomputes the current frame from the latest solved orientation, applies the
    /// twist correction and, for rotating members, transports the reference frame
    /// from the last rigid pose to `rigid`.
    pub fn update_coord_sys(&mut self, solved: &NodeKinematics, rigid: Option<&RigidPose>) {
        self.kinematics = *solved;

        // Rotation since assembly applied to the assembly frame
        let q_rel = solved.orientation.relative_to(&self.orientation0);
        self.frame = self
            .frame0
            .transported(&q_rel, &self.frame0.origin, &solved.position);
        self.twisted_frame = self.twist_corrected(&self.frame);

        if !self.is_rotating {
            return;
        }
        if let Some(rigid) = rigid {
            if let Some(last) = self.rigid_pose {
                let q = rigid.orientation.relative_to(&last.orientation);
                self.ref_frame = self
                    .ref_frame
                    .transported(&q, &last.position, &rigid.position);
            }
            self.rigid_pose = Some(*rigid);
        }
    }

    /// Engine orientation at assembly
    pub fn orientation0(&self) -> Quaternion {
        self.orientation0
    }

    /// Assembly pose of the node
    pub fn initial_pose(&self) -> RigidPose {
        RigidPose {
            position: self.position0,
            orientation: self.orientation0,
        }
    }

    /// Sets the rigid pose the reference frame is currently aligned with
    pub fn set_rigid_pose(&mut self, rigid: RigidPose) {
        self.rigid_pose = Some(rigid);
    }

    fn twist_corrected(&self, frame: &CoordSys) -> CoordSys {
        let twist = if self.is_reversed {
            -self.twist
        } else {
            self.twist
        };
        frame.rotated_about_x(twist)
    }

    /// Elastic deformation of the current frame relative to the reference frame:
    /// (translation, rotation vector), both expressed in the reference frame
    pub fn deformation(&self) -> (Vec3, Vec3) {
        let translation = self.ref_frame.point_to_local(&self.frame.origin);
        let q = self
            .frame
            .as_quaternion()
            .relative_to(&self.ref_frame.as_quaternion());
        let rotation = self.ref_frame.to_local(&q.as_rotation_vector());
        (translation, rotation)
    }

    pub fn position(&self) -> Vec3 {
        self.kinematics.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.kinematics.velocity
    }

    pub fn acceleration(&self) -> Vec3 {
        self.kinematics.acceleration
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_add_dofs() {
        let mut d = ActiveDOFs::None;
        d.add_dofs(ActiveDOFs::Translation);
        assert_eq!(d, ActiveDOFs::Translation);
        d.add_dofs(ActiveDOFs::Rotation);
        assert_eq!(d, ActiveDOFs::All);
        assert_eq!(d.n_dofs(), 6);
    }

    #[test]
    fn test_radial_reference() {
        // Vertical blade of a vertical-axis rotor at radius 5 along y
        let r = FrameReference::Radial {
            center: [0., 0., 0.],
            axis: [0., 0., 1.],
            fallback: [1., 0., 0.],
        };
        let up = r.up_vector(&[0., 5., 10.], &[0., 0., 1.]);
        assert_relative_eq!(up[1], 1., epsilon = 1e-14);

        // Radial tangent falls back
        let up = r.up_vector(&[0., 5., 0.], &[0., 1., 0.]);
        assert_eq!(up, [1., 0., 0.]);
    }

    #[test]
    fn test_twist_correction() {
        let mut node = Node::new(NodeId(0), [0., 0., 0.]);
        node.twist = PI / 2.;
        node.set_frame(&[1., 0., 0.], &FrameReference::Fixed([0., 0., 1.]));
        assert_relative_eq!(node.twisted_frame.y[2], 1., epsilon = 1e-14);
        assert_relative_eq!(node.frame.y[1], 1., epsilon = 1e-14);
    }

    #[test]
    fn test_rotating_reference_transport() {
        let mut node = Node::new(NodeId(0), [0., 5., 0.]);
        node.is_rotating = true;
        let q0 = node.set_frame(&[0., 1., 0.], &FrameReference::Fixed([1., 0., 0.]));
        node.set_rigid_pose(RigidPose::default());

        // Rigid rotation about x by 90 degrees without elastic deformation
        let q = Quaternion::from_axis_angle(PI / 2., &[1., 0., 0.]);
        let solved = NodeKinematics::at_rest(q.rotate_vector(&[0., 5., 0.]), q.compose(&q0));
        node.update_coord_sys(
            &solved,
            Some(&RigidPose {
                position: [0., 0., 0.],
                orientation: q,
            }),
        );

        let (t, r) = node.deformation();
        for i in 0..3 {
            assert_relative_eq!(t[i], 0., epsilon = 1e-12);
            assert_relative_eq!(r[i], 0., epsilon = 1e-12);
        }
        assert_relative_eq!(node.frame.x[2], 1., epsilon = 1e-12);
    }

    #[test]
    fn test_fixed_reference_measures_rigid_rotation() {
        let mut node = Node::new(NodeId(0), [0., 5., 0.]);
        let q0 = node.set_frame(&[0., 1., 0.], &FrameReference::Fixed([1., 0., 0.]));
        let q = Quaternion::from_axis_angle(0.1, &[1., 0., 0.]);
        let solved = NodeKinematics::at_rest([0., 5., 0.], q.compose(&q0));
        node.update_coord_sys(&solved, None);
        let (_, r) = node.deformation();
        assert_relative_eq!(norm(&r), 0.1, epsilon = 1e-12);
    }
}
