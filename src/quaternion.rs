use crate::util::{norm, Mat3, Vec3};

#[derive(Clone, Debug, Copy, PartialEq)]
pub struct Quaternion {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn identity() -> Self {
        Quaternion {
            w: 1.,
            x: 0.,
            y: 0.,
            z: 0.,
        }
    }

    pub fn as_vec(self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    pub fn normalized(self) -> Self {
        let m = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if m < f64::EPSILON {
            return Self::identity();
        }
        Self {
            w: self.w / m,
            x: self.x / m,
            y: self.y / m,
            z: self.z / m,
        }
    }

    /// Returns `self * q2`, i.e. rotation `q2` followed by `self`
    pub fn compose(self, q2: &Quaternion) -> Quaternion {
        Quaternion {
            w: self.w * q2.w - self.x * q2.x - self.y * q2.y - self.z * q2.z,
            x: self.w * q2.x + self.x * q2.w + self.y * q2.z - self.z * q2.y,
            y: self.w * q2.y - self.x * q2.z + self.y * q2.w + self.z * q2.x,
            z: self.w * q2.z + self.x * q2.y - self.y * q2.x + self.z * q2.w,
        }
        .normalized()
    }

    /// Inverse of a unit quaternion
    pub fn inverse(self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
        .normalized()
    }

    /// Rotation taking `from` to `self`: `self * from^-1`
    pub fn relative_to(self, from: &Quaternion) -> Quaternion {
        self.compose(&from.inverse())
    }

    pub fn as_matrix(self) -> Mat3 {
        [
            [
                self.w * self.w + self.x * self.x - self.y * self.y - self.z * self.z,
                2. * (self.x * self.y - self.w * self.z),
                2. * (self.x * self.z + self.w * self.y),
            ],
            [
                2. * (self.x * self.y + self.w * self.z),
                self.w * self.w - self.x * self.x + self.y * self.y - self.z * self.z,
                2. * (self.y * self.z - self.w * self.x),
            ],
            [
                2. * (self.x * self.z - self.w * self.y),
                2. * (self.y * self.z + self.w * self.x),
                self.w * self.w - self.x * self.x - self.y * self.y + self.z * self.z,
            ],
        ]
    }

    pub fn from_matrix(m: &Mat3) -> Self {
        let m22_p_m33 = m[1][1] + m[2][2];
        let m22_m_m33 = m[1][1] - m[2][2];
        let vals = [
            m[0][0] + m22_p_m33,
            m[0][0] - m22_p_m33,
            -m[0][0] + m22_m_m33,
            -m[0][0] - m22_m_m33,
        ];
        let (max_idx, max_num) =
            vals.iter()
                .enumerate()
                .fold((0, vals[0]), |(idx_max, val_max), (idx, &val)| {
                    if val_max > val {
                        (idx_max, val_max)
                    } else {
                        (idx, val)
                    }
                });

        let half = 0.5;
        let tmp = (max_num + 1.).sqrt();
        let coef = half / tmp;

        match max_idx {
            0 => Self {
                w: half * tmp,
                x: (m[2][1] - m[1][2]) * coef,
                y: (m[0][2] - m[2][0]) * coef,
                z: (m[1][0] - m[0][1]) * coef,
            },
            1 => Self {
                w: (m[2][1] - m[1][2]) * coef,
                x: half * tmp,
                y: (m[0][1] + m[1][0]) * coef,
                z: (m[0][2] + m[2][0]) * coef,
            },
            2 => Self {
                w: (m[0][2] - m[2][0]) * coef,
                x: (m[0][1] + m[1][0]) * coef,
                y: half * tmp,
                z: (m[1][2] + m[2][1]) * coef,
            },
            _ => Self {
                w: (m[1][0] - m[0][1]) * coef,
                x: (m[0][2] + m[2][0]) * coef,
                y: (m[1][2] + m[2][1]) * coef,
                z: half * tmp,
            },
        }
        .normalized()
    }

    /// Rotation of `angle` radians about `axis` (normalized internally)
    pub fn from_axis_angle(angle: f64, axis: &Vec3) -> Self {
        let n = norm(axis);
        if angle.abs() < 1e-12 || n < f64::EPSILON {
            return Self::identity();
        }
        let (sin, cos) = (angle / 2.).sin_cos();
        Quaternion {
            w: cos,
            x: axis[0] / n * sin,
            y: axis[1] / n * sin,
            z: axis[2] / n * sin,
        }
    }

    pub fn from_rotation_vector(v: &Vec3) -> Self {
        Self::from_axis_angle(norm(v), v)
    }

    pub fn as_rotation_vector(self) -> Vec3 {
        let q = if self.w < 0. {
            Self {
                w: -self.w,
                x: -self.x,
                y: -self.y,
                z: -self.z,
            }
        } else {
            self
        };
        let s = (q.x * q.x + q.y * q.y + q.z * q.z).sqrt();
        if s < 1e-12 {
            // Small angle: rotation vector ~ 2 * vector part
            return [2. * q.x, 2. * q.y, 2. * q.z];
        }
        let angle = 2. * s.atan2(q.w);
        [q.x / s * angle, q.y / s * angle, q.z / s * angle]
    }

    pub fn rotate_vector(self, v: &Vec3) -> Vec3 {
        [
            (self.w * self.w + self.x * self.x - self.y * self.y - self.z * self.z) * v[0]
                + 2. * (self.x * self.y - self.w * self.z) * v[1]
                + 2. * (self.x * self.z + self.w * self.y) * v[2],
            2. * (self.x * self.y + self.w * self.z) * v[0]
                + (self.w * self.w - self.x * self.x + self.y * self.y - self.z * self.z) * v[1]
                + 2. * (self.y * self.z - self.w * self.x) * v[2],
            2. * (self.x * self.z - self.w * self.y) * v[0]
                + 2. * (self.y * self.z + self.w * self.x) * v[1]
                + (self.w * self.w - self.x * self.x - self.y * self.y + self.z * self.z) * v[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_axis_angle_rotation() {
        let q = Quaternion::from_axis_angle(PI / 2., &[0., 0., 2.]);
        let v = q.rotate_vector(&[1., 0., 0.]);
        assert_relative_eq!(v[0], 0., epsilon = 1e-14);
        assert_relative_eq!(v[1], 1., epsilon = 1e-14);
        assert_relative_eq!(v[2], 0., epsilon = 1e-14);
    }

    #[test]
    fn test_matrix_round_trip() {
        let q = Quaternion::from_axis_angle(0.7, &[1., 2., -0.5]);
        let q2 = Quaternion::from_matrix(&q.as_matrix());
        let (a, b) = (q.as_vec(), q2.as_vec());
        let sign = if a[0] * b[0] < 0. { -1. } else { 1. };
        for i in 0..4 {
            assert_relative_eq!(a[i], sign * b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rotation_vector() {
        let rv = [0.1, -0.4, 0.3];
        let q = Quaternion::from_rotation_vector(&rv);
        let rv2 = q.as_rotation_vector();
        for i in 0..3 {
            assert_relative_eq!(rv[i], rv2[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_relative_rotation() {
        let q1 = Quaternion::from_axis_angle(0.3, &[0., 1., 0.]);
        let q2 = Quaternion::from_axis_angle(0.8, &[0., 1., 0.]);
        let rv = q2.relative_to(&q1).as_rotation_vector();
        assert_relative_eq!(rv[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(rv[0], 0., epsilon = 1e-12);
    }
}
