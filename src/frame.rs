use crate::{
    quaternion::Quaternion,
    util::{add, cross, dcm_from_axes, dot, norm, scale, sub, unit_vector, Mat3, Vec3},
};

/// Orthonormal coordinate system: origin plus X/Y/Z unit axes in global coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordSys {
    pub origin: Vec3,
    pub x: Vec3,
    pub y: Vec3,
    pub z: Vec3,
}

impl Default for CoordSys {
    fn default() -> Self {
        Self::global()
    }
}

impl CoordSys {
    pub fn global() -> Self {
        Self {
            origin: [0., 0., 0.],
            x: [1., 0., 0.],
            y: [0., 1., 0.],
            z: [0., 0., 1.],
        }
    }

    /// Builds a frame whose X axis follows `tangent` and whose Z axis is the part
    /// of `up` orthogonal to X. If `up` is parallel to the tangent, the global axis
    /// least aligned with the tangent is used instead.
    pub fn from_tangent(origin: Vec3, tangent: &Vec3, up: &Vec3) -> Self {
        let x = unit_vector(tangent).unwrap_or([1., 0., 0.]);
        let c = cross(up, &x);
        let y = if norm(&c) > 1e-9 * norm(up).max(1.) {
            scale(&c, 1. / norm(&c))
        } else {
            let fallback = least_aligned_axis(&x);
            unit_vector(&cross(&fallback, &x)).unwrap_or([0., 1., 0.])
        };
        let z = cross(&x, &y);
        Self { origin, x, y, z }
    }

    pub fn from_quaternion(origin: Vec3, q: &Quaternion) -> Self {
        let m = q.as_matrix();
        Self {
            origin,
            x: [m[0][0], m[1][0], m[2][0]],
            y: [m[0][1], m[1][1], m[2][1]],
            z: [m[0][2], m[1][2], m[2][2]],
        }
    }

    pub fn as_quaternion(&self) -> Quaternion {
        Quaternion::from_matrix(&self.dcm())
    }

    /// Direction cosine matrix, columns are the frame axes
    pub fn dcm(&self) -> Mat3 {
        dcm_from_axes(&self.x, &self.y, &self.z)
    }

    /// Expresses a global direction in this frame
    pub fn to_local(&self, v: &Vec3) -> Vec3 {
        [dot(v, &self.x), dot(v, &self.y), dot(v, &self.z)]
    }

    /// Expresses a local direction in global coordinates
    pub fn to_global(&self, v: &Vec3) -> Vec3 {
        add(
            &add(&scale(&self.x, v[0]), &scale(&self.y, v[1])),
            &scale(&self.z, v[2]),
        )
    }

    pub fn point_to_local(&self, p: &Vec3) -> Vec3 {
        self.to_local(&sub(p, &self.origin))
    }

    /// Rotates the Y and Z axes about the X axis by `angle` radians
    pub fn rotated_about_x(&self, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let y = add(&scale(&self.y, c), &scale(&self.z, s));
        let z = sub(&scale(&self.z, c), &scale(&self.y, s));
        Self {
            origin: self.origin,
            x: self.x,
            y,
            z,
        }
    }

    /// Flips the frame about its Z axis (X and Y reversed)
    pub fn reversed(&self) -> Self {
        Self {
            origin: self.origin,
            x: scale(&self.x, -1.),
            y: scale(&self.y, -1.),
            z: self.z,
        }
    }

    /// Applies a rigid motion: rotation `q_rel` about `pivot_from`, then translation
    /// of the pivot to `pivot_to`
    pub fn transported(&self, q_rel: &Quaternion, pivot_from: &Vec3, pivot_to: &Vec3) -> Self {
        let r = q_rel.rotate_vector(&sub(&self.origin, pivot_from));
        Self {
            origin: add(pivot_to, &r),
            x: q_rel.rotate_vector(&self.x),
            y: q_rel.rotate_vector(&self.y),
            z: q_rel.rotate_vector(&self.z),
        }
    }

    /// Largest deviation from orthonormality among the axis dot products and lengths
    pub fn orthonormality_error(&self) -> f64 {
        [
            dot(&self.x, &self.y).abs(),
            dot(&self.y, &self.z).abs(),
            dot(&self.x, &self.z).abs(),
            (norm(&self.x) - 1.).abs(),
            (norm(&self.y) - 1.).abs(),
            (norm(&self.z) - 1.).abs(),
        ]
        .into_iter()
        .fold(0., f64::max)
    }
}

fn least_aligned_axis(v: &Vec3) -> Vec3 {
    let a = [v[0].abs(), v[1].abs(), v[2].abs()];
    if a[0] <= a[1] && a[0] <= a[2] {
        [1., 0., 0.]
    } else if a[1] <= a[2] {
        [0., 1., 0.]
    } else {
        [0., 0., 1.]
    }
}
