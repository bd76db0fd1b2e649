use serde::Deserialize;

use crate::{
    frame::CoordSys,
    loads::LoadTarget,
    util::{mat3_diag, mat3_vec, rotate_tensor, scale, Mat3, Vec3},
};

/// How hydrodynamic mass reaches the dynamics engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddedMassTreatment {
    /// Accrued into the node mass blocks of the next step
    #[default]
    FoldIntoMass,
    /// Applied as the external force `-M_a a` from the last solved acceleration.
    /// Unstable once the added mass exceeds the structural mass.
    DelayedForce,
}

impl AddedMassTreatment {
    /// Applies an added mass block (global axes) at `s`. Returns the force applied
    /// in place of the mass, zero when folded.
    pub fn apply(
        &self,
        target: &mut dyn LoadTarget,
        s: f64,
        mass: &Mat3,
        structure_acceleration: &Vec3,
    ) -> Vec3 {
        match self {
            AddedMassTreatment::FoldIntoMass => {
                target.add_mass_at(s, mass);
                [0.; 3]
            }
            AddedMassTreatment::DelayedForce => {
                let f = scale(&mat3_vec(mass, structure_acceleration), -1.);
                target.add_force_at(s, &f);
                f
            }
        }
    }
}

/// Mass block with `m_local` on the diagonal of `frame`'s axes, rotated into the
/// global frame
pub fn local_mass_to_global(frame: &CoordSys, m_local: &Vec3) -> Mat3 {
    rotate_tensor(&frame.dcm(), &mat3_diag(m_local))
}

/// Added mass of an airfoil section segment of length `length`, fraction `f`
/// submerged. Chordwise acts along the twisted frame's Y axis, flapwise along Z.
pub fn rotor_added_mass(
    twisted_frame: &CoordSys,
    rho: f64,
    chord: f64,
    ca_chordwise: f64,
    ca_flapwise: f64,
    length: f64,
    fraction: f64,
) -> Mat3 {
    let reference = rho * std::f64::consts::FRAC_PI_4 * chord * chord * length * fraction;
    local_mass_to_global(
        twisted_frame,
        &[0., ca_chordwise * reference, ca_flapwise * reference],
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        loads::{NodalLoads, SegmentTarget},
        node::{Node, NodeId},
    };

    #[test]
    fn test_rotor_added_mass_follows_twist() {
        let frame = CoordSys::global().rotated_about_x(std::f64::consts::FRAC_PI_2);
        let m = rotor_added_mass(&frame, 1000., 2., 1., 0.5, 1., 1.);
        let reference = 1000. * std::f64::consts::PI;

        // Twisted by 90 degrees: chordwise now along global Z
        assert_relative_eq!(m[2][2], reference, epsilon = 1e-9);
        assert_relative_eq!(m[1][1], 0.5 * reference, epsilon = 1e-9);
        assert_relative_eq!(m[0][0], 0., epsilon = 1e-9);
        assert_relative_eq!(m[1][2], 0., epsilon = 1e-9);
    }

    #[test]
    fn test_apply_treatments() {
        let a = Node::new(NodeId(0), [0., 0., 0.]);
        let b = Node::new(NodeId(1), [1., 0., 0.]);
        let m = mat3_diag(&[2., 2., 2.]);

        let mut loads = NodalLoads::new(2);
        let f = AddedMassTreatment::FoldIntoMass.apply(
            &mut SegmentTarget::new(&a, &b, &mut loads),
            0.5,
            &m,
            &[0., 0., 3.],
        );
        assert_eq!(f, [0.; 3]);
        assert_relative_eq!(loads.mass[0][2][2], 1.);
        assert_eq!(loads.total_force(), [0.; 3]);

        let mut loads = NodalLoads::new(2);
        let f = AddedMassTreatment::DelayedForce.apply(
            &mut SegmentTarget::new(&a, &b, &mut loads),
            0.5,
            &m,
            &[0., 0., 3.],
        );
        assert_relative_eq!(f[2], -6.);
        assert_relative_eq!(loads.total_force()[2], -6.);
        assert_eq!(loads.mass[0], [[0.; 3]; 3]);
    }
}
