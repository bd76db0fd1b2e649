use faer::prelude::*;

pub type Vec3 = [f64; 3];
pub type Mat3 = [[f64; 3]; 3];

// Returns the dot product of two vectors
#[inline]
pub fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

// Returns the L2-norm of a vector
#[inline]
pub fn norm(v: &Vec3) -> f64 {
    dot(v, v).sqrt()
}

// Returns unit vector of given vector or None
pub fn unit_vector(v: &Vec3) -> Option<Vec3> {
    let m = norm(v);
    if m < f64::EPSILON {
        None
    } else {
        Some([v[0] / m, v[1] / m, v[2] / m])
    }
}

// Returns the cross product of two vectors
#[inline]
pub fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

// Returns the distance between two points
#[inline]
pub fn dist(a: &Vec3, b: &Vec3) -> f64 {
    norm(&sub(b, a))
}

#[inline]
pub fn add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale(v: &Vec3, s: f64) -> Vec3 {
    [v[0] * s, v[1] * s, v[2] * s]
}

/// Linear blend `(1-t)*a + t*b`
#[inline]
pub fn lerp(a: &Vec3, b: &Vec3, t: f64) -> Vec3 {
    [
        (1. - t) * a[0] + t * b[0],
        (1. - t) * a[1] + t * b[1],
        (1. - t) * a[2] + t * b[2],
    ]
}

/// Component of `v` normal to the unit axis `t`
#[inline]
pub fn normal_component(v: &Vec3, t: &Vec3) -> Vec3 {
    sub(v, &scale(t, dot(v, t)))
}

pub fn is_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

//------------------------------------------------------------------------------
// 3x3 matrices (row-major arrays)
//------------------------------------------------------------------------------

pub fn mat3_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    [dot(&m[0], v), dot(&m[1], v), dot(&m[2], v)]
}

pub fn mat3_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut c = [[0.; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            c[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    c
}

pub fn mat3_transpose(a: &Mat3) -> Mat3 {
    [
        [a[0][0], a[1][0], a[2][0]],
        [a[0][1], a[1][1], a[2][1]],
        [a[0][2], a[1][2], a[2][2]],
    ]
}

pub fn mat3_add_assign(a: &mut Mat3, b: &Mat3) {
    for i in 0..3 {
        for j in 0..3 {
            a[i][j] += b[i][j];
        }
    }
}

pub fn mat3_scaled(a: &Mat3, s: f64) -> Mat3 {
    a.map(|row| row.map(|v| v * s))
}

pub fn mat3_diag(d: &Vec3) -> Mat3 {
    [[d[0], 0., 0.], [0., d[1], 0.], [0., 0., d[2]]]
}

/// Direction cosine matrix whose columns are the given axes
pub fn dcm_from_axes(x: &Vec3, y: &Vec3, z: &Vec3) -> Mat3 {
    [[x[0], y[0], z[0]], [x[1], y[1], z[1]], [x[2], y[2], z[2]]]
}

/// Rotates a matrix expressed in local axes into the global frame: `R * m * R^T`
pub fn rotate_tensor(dcm: &Mat3, m_local: &Mat3) -> Mat3 {
    mat3_mul(&mat3_mul(dcm, m_local), &mat3_transpose(dcm))
}

/// Outer product `a * b^T`
pub fn outer(a: &Vec3, b: &Vec3) -> Mat3 {
    [
        [a[0] * b[0], a[0] * b[1], a[0] * b[2]],
        [a[1] * b[0], a[1] * b[1], a[1] * b[2]],
        [a[2] * b[0], a[2] * b[1], a[2] * b[2]],
    ]
}

//------------------------------------------------------------------------------
// faer helpers
//------------------------------------------------------------------------------

pub fn vec_tilde(v: &Vec3, mut m: MatMut<f64>) {
    // [0., -v[2], v[1]]
    // [v[2], 0., -v[0]]
    // [-v[1], v[0], 0.]
    m[(0, 0)] = 0.;
    m[(1, 0)] = v[2];
    m[(2, 0)] = -v[1];
    m[(0, 1)] = -v[2];
    m[(1, 1)] = 0.;
    m[(2, 1)] = v[0];
    m[(0, 2)] = v[1];
    m[(1, 2)] = -v[0];
    m[(2, 2)] = 0.;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cross() {
        assert_eq!(cross(&[1., 0., 0.], &[0., 1., 0.]), [0., 0., 1.]);
        assert_eq!(cross(&[0., 1., 0.], &[0., 0., 1.]), [1., 0., 0.]);
        assert_eq!(cross(&[1., 2., 3.], &[1., 2., 3.]), [0., 0., 0.]);
    }

    #[test]
    fn test_unit_vector() {
        assert_eq!(unit_vector(&[0., 0., 0.]), None);
        let u = unit_vector(&[3., 0., 4.]).unwrap();
        assert_relative_eq!(u[0], 0.6);
        assert_relative_eq!(u[2], 0.8);
    }

    #[test]
    fn test_normal_component() {
        let v = normal_component(&[1., 2., 3.], &[0., 0., 1.]);
        assert_eq!(v, [1., 2., 0.]);
    }

    #[test]
    fn test_rotate_tensor() {
        // Rotation of 90 degrees about z maps local x to global y
        let dcm = dcm_from_axes(&[0., 1., 0.], &[-1., 0., 0.], &[0., 0., 1.]);
        let m = rotate_tensor(&dcm, &mat3_diag(&[1., 2., 3.]));
        assert_relative_eq!(m[0][0], 2.);
        assert_relative_eq!(m[1][1], 1.);
        assert_relative_eq!(m[2][2], 3.);
        assert_relative_eq!(m[0][1], 0.);
    }

    #[test]
    fn test_vec_tilde() {
        let mut m = Mat::<f64>::zeros(3, 3);
        vec_tilde(&[1., 2., 3.], m.as_mut());
        let v = [4., 5., 6.];
        let c = cross(&[1., 2., 3.], &v);
        for i in 0..3 {
            let mv: f64 = (0..3).map(|j| m[(i, j)] * v[j]).sum();
            assert_relative_eq!(mv, c[i]);
        }
    }
}
