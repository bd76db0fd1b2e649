use std::f64::consts::FRAC_PI_2;

use approx::assert_relative_eq;

use hydroaero::{
    node::{FrameReference, Node, NodeId, NodeKinematics},
    quaternion::Quaternion,
    util::{cross, dot},
};

struct Case {
    tangent: [f64; 3],
    reference: FrameReference,
    twist: f64,
    rotation: (f64, [f64; 3]),
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            tangent: [0., 0., 1.],
            reference: FrameReference::Fixed([1., 0., 0.]),
            twist: 0.,
            rotation: (0.3, [0., 1., 0.]),
        },
        Case {
            tangent: [1., 1., 0.2],
            reference: FrameReference::Fixed([0., 0., 1.]),
            twist: 0.4,
            rotation: (1.2, [1., 0.5, -0.3]),
        },
        Case {
            tangent: [0., 1., 0.],
            reference: FrameReference::Radial {
                center: [0., 0., 0.],
                axis: [0., 0., 1.],
                fallback: [0., 0., 1.],
            },
            twist: -0.2,
            rotation: (FRAC_PI_2, [0., 0., 1.]),
        },
    ]
}

#[test]
fn test_frames_stay_orthonormal() {
    for case in cases() {
        let mut node = Node::new(NodeId(0), [10., 0., -5.]);
        node.twist = case.twist;
        let q0 = node.set_frame(&case.tangent, &case.reference);
        for f in [&node.frame, &node.twisted_frame, &node.ref_frame] {
            assert!(f.orthonormality_error() < 1e-12);
        }
        // X follows the tangent
        let t = case.tangent;
        let n = dot(&t, &t).sqrt();
        assert_relative_eq!(dot(&node.frame.x, &t) / n, 1., epsilon = 1e-12);

        let (angle, axis) = case.rotation;
        let q = Quaternion::from_axis_angle(angle, &axis).compose(&q0);
        let solved = NodeKinematics::at_rest([11., 0.5, -5.], q);
        node.update_coord_sys(&solved, None);

        assert!(node.frame.orthonormality_error() < 1e-12);
        assert!(node.twisted_frame.orthonormality_error() < 1e-12);
        for (a, b) in node.frame.origin.iter().zip([11., 0.5, -5.]) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
        // Right handed
        let z = cross(&node.frame.x, &node.frame.y);
        assert_relative_eq!(dot(&z, &node.frame.z), 1., epsilon = 1e-12);
        // Twist is a rotation about the local X axis
        assert_relative_eq!(
            dot(&node.frame.y, &node.twisted_frame.y),
            case.twist.cos(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn test_update_at_rest_reproduces_initial_frame() {
    for case in cases() {
        let mut node = Node::new(NodeId(0), [10., 0., -5.]);
        node.twist = case.twist;
        let q0 = node.set_frame(&case.tangent, &case.reference);
        node.update_coord_sys(&NodeKinematics::at_rest(node.position0, q0), None);

        for (a, b) in [
            (&node.frame.origin, &node.frame0.origin),
            (&node.frame.x, &node.frame0.x),
            (&node.frame.y, &node.frame0.y),
            (&node.frame.z, &node.frame0.z),
        ] {
            for (u, v) in a.iter().zip(b) {
                assert_relative_eq!(*u, *v, epsilon = 1e-12);
            }
        }
        let t = case.tangent;
        let n = dot(&t, &t).sqrt();
        assert_relative_eq!(dot(&node.frame.x, &t) / n, 1., epsilon = 1e-12);
    }
}
