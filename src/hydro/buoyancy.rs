use std::f64::consts::TAU;

use serde::Deserialize;

use crate::{
    hydro::morison::{application_length, submerged_fraction},
    util::{add, lerp, norm, scale, sub, Vec3},
};

/// Selection of the buoyancy formulation
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BuoyancyMode {
    /// Axis-aligned cylinder formula
    Analytic,
    /// Cross-section discretized into `samples` line samples
    Advanced { samples: usize },
    /// Advanced for members tilted more than 45 degrees from vertical or with a
    /// diameter above `diameter_threshold`, analytic otherwise
    Auto {
        samples: usize,
        diameter_threshold: f64,
    },
}

impl Default for BuoyancyMode {
    fn default() -> Self {
        Self::Auto {
            samples: 16,
            diameter_threshold: 6.,
        }
    }
}

impl BuoyancyMode {
    /// Number of line samples to use for a member, `None` for the analytic formula
    pub fn samples_for(&self, tangent: &Vec3, diameter: f64) -> Option<usize> {
        match *self {
            BuoyancyMode::Analytic => None,
            BuoyancyMode::Advanced { samples } => Some(samples.max(1)),
            BuoyancyMode::Auto {
                samples,
                diameter_threshold,
            } => {
                let cos_tilt = tangent[2].abs() / norm(tangent).max(f64::EPSILON);
                let tilted = cos_tilt < std::f64::consts::FRAC_1_SQRT_2;
                (tilted || diameter > diameter_threshold).then_some(samples.max(1))
            }
        }
    }
}

/// Buoyancy of an element and the centroid of its submerged volume
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuoyancyLoad {
    pub force: Vec3,
    pub centroid: Vec3,
    pub volume: f64,
    /// Submerged fraction of the element length
    pub fraction: f64,
}

/// Buoyancy of a cylinder of cross-section `area` between `pa` and `pb` below
/// the free surface at elevation `surface`
pub fn analytic_buoyancy(
    rho_g: f64,
    area: f64,
    pa: &Vec3,
    pb: &Vec3,
    surface: f64,
    tuning: f64,
) -> Option<BuoyancyLoad> {
    let fraction = submerged_fraction(surface, f64::NEG_INFINITY, pa[2], pb[2]);
    if fraction <= 0. {
        return None;
    }
    let length = norm(&sub(pb, pa));
    let volume = area * length * fraction * tuning;
    Some(BuoyancyLoad {
        force: [0., 0., rho_g * volume],
        centroid: lerp(pa, pb, application_length(fraction, pa[2], pb[2])),
        volume,
        fraction,
    })
}

/// Buoyancy from `samples` line samples parallel to the member axis, each carrying
/// an equal sector of the circular cross-section. `e1` and `e2` span the section
/// plane; `surface` returns the free surface elevation above a point.
pub fn advanced_buoyancy(
    rho_g: f64,
    diameter: f64,
    pa: &Vec3,
    pb: &Vec3,
    (e1, e2): (&Vec3, &Vec3),
    surface: &dyn Fn(&Vec3) -> f64,
    samples: usize,
    tuning: f64,
) -> Option<BuoyancyLoad> {
    let n = samples.max(1);
    let r = 0.5 * diameter;
    let area = std::f64::consts::FRAC_PI_4 * diameter * diameter;
    let length = norm(&sub(pb, pa));
    let dphi = TAU / n as f64;

    // Sector centroid radius
    let rc = if n == 1 {
        0.
    } else {
        2. * r / 3. * (dphi / 2.).sin() / (dphi / 2.)
    };

    let mut volume = 0.;
    let mut moment = [0.; 3];
    let mut wetted_length = 0.;
    for j in 0..n {
        let (s, c) = ((j as f64 + 0.5) * dphi).sin_cos();
        let offset = add(&scale(e1, rc * c), &scale(e2, rc * s));
        let (a, b) = (add(pa, &offset), add(pb, &offset));
        let top = surface(&lerp(&a, &b, 0.5));
        let f = submerged_fraction(top, f64::NEG_INFINITY, a[2], b[2]);
        if f <= 0. {
            continue;
        }
        let v = area / n as f64 * length * f * tuning;
        let centroid = lerp(&a, &b, application_length(f, a[2], b[2]));
        moment = add(&moment, &scale(&centroid, v));
        volume += v;
        wetted_length += f;
    }
    if volume <= 0. {
        return None;
    }
    Some(BuoyancyLoad {
        force: [0., 0., rho_g * volume],
        centroid: scale(&moment, 1. / volume),
        volume,
        fraction: wetted_length / n as f64,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const RHO_G: f64 = 1025. * 9.80665;

    #[test]
    fn test_submerged_cylinder() {
        let area = std::f64::consts::FRAC_PI_4;
        let b = analytic_buoyancy(RHO_G, area, &[0., 0., -20.], &[0., 0., -10.], 0., 1.).unwrap();
        assert_relative_eq!(b.force[2], 78_946.78, epsilon = 0.01);
        assert_relative_eq!(b.force[0], 0.);
        assert_relative_eq!(b.force[1], 0.);
        assert_relative_eq!(b.centroid[2], -15.);
    }

    #[test]
    fn test_surface_piercing_cylinder() {
        let area = std::f64::consts::FRAC_PI_4;
        let b = analytic_buoyancy(RHO_G, area, &[0., 0., -6.], &[0., 0., 4.], 0., 1.).unwrap();
        assert_relative_eq!(b.fraction, 0.6, epsilon = 1e-12);
        assert_relative_eq!(b.centroid[2], -3., epsilon = 1e-12);
        assert!(analytic_buoyancy(RHO_G, area, &[0., 0., 1.], &[0., 0., 4.], 0., 1.).is_none());
    }

    #[test]
    fn test_advanced_matches_analytic_for_vertical_member() {
        let area = std::f64::consts::FRAC_PI_4;
        let (pa, pb) = ([0., 0., -6.], [0., 0., 4.]);
        let analytic = analytic_buoyancy(RHO_G, area, &pa, &pb, 0., 1.).unwrap();
        let advanced = advanced_buoyancy(
            RHO_G,
            1.,
            &pa,
            &pb,
            (&[1., 0., 0.], &[0., 1., 0.]),
            &|_| 0.,
            16,
            1.,
        )
        .unwrap();
        assert_relative_eq!(advanced.force[2], analytic.force[2], epsilon = 1e-6);
        assert_relative_eq!(advanced.centroid[2], analytic.centroid[2], epsilon = 1e-9);
    }

    #[test]
    fn test_advanced_half_submerged_horizontal_member() {
        // Axis on the free surface: analytic counts the whole member, advanced half
        let d = 2.;
        let area = std::f64::consts::FRAC_PI_4 * d * d;
        let (pa, pb) = ([0., 0., 0.], [10., 0., 0.]);
        let advanced = advanced_buoyancy(
            RHO_G,
            d,
            &pa,
            &pb,
            (&[0., 1., 0.], &[0., 0., 1.]),
            &|_| 1e-9,
            32,
            1.,
        )
        .unwrap();
        assert_relative_eq!(advanced.volume, 0.5 * area * 10., epsilon = 1e-9);
        assert!(advanced.centroid[2] < 0.);
    }

    #[test]
    fn test_auto_mode() {
        let mode = BuoyancyMode::default();
        assert_eq!(mode.samples_for(&[0., 0., 1.], 1.), None);
        assert_eq!(mode.samples_for(&[1., 0., 0.2], 1.), Some(16));
        assert_eq!(mode.samples_for(&[0., 0., 1.], 10.), Some(16));
    }
}
