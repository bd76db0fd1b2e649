use std::f64::consts::{FRAC_PI_4, PI, TAU};

use crate::{
    body::{AxialCoefficients, ElementProperties},
    hydro::waves::FluidKinematics,
    util::{dot, norm, normal_component, outer, scale, sub, Mat3, Vec3},
};

/// Fraction of the vertical extent `[za, zb]` lying within `[bottom, top]`
pub fn submerged_fraction(top: f64, bottom: f64, za: f64, zb: f64) -> f64 {
    let (lo, hi) = if za <= zb { (za, zb) } else { (zb, za) };
    if hi - lo < 1e-12 {
        return if lo > bottom && lo < top { 1. } else { 0. };
    }
    let overlap = hi.min(top) - lo.max(bottom);
    (overlap / (hi - lo)).clamp(0., 1.)
}

/// Element coordinate of the centre of the wetted part: `fraction / 2` measured
/// from the lower (wetter) end
pub fn application_length(fraction: f64, za: f64, zb: f64) -> f64 {
    let half = 0.5 * fraction.clamp(0., 1.);
    if za <= zb {
        half
    } else {
        1. - half
    }
}

/// Keulegan-Carpenter number from the normal flow speed amplitude and the
/// angular frequency of the dominant wave
pub fn keulegan_carpenter(normal_speed: f64, omega: f64, diameter: f64) -> f64 {
    if omega <= 0. || diameter <= 0. {
        return 0.;
    }
    TAU * normal_speed / (omega * diameter)
}

pub fn reynolds(speed: f64, diameter: f64, viscosity: f64) -> f64 {
    speed * diameter / viscosity
}

//------------------------------------------------------------------------------
// Radial terms
//------------------------------------------------------------------------------

/// Morison force terms on the wetted part of an element, normal to its axis
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MorisonTerms {
    /// Froude-Krylov and diffraction inertia, `rho (Cp + Ca) A L f a_n`
    pub inertia: Vec3,
    /// Hydrodynamic mass force from the structural acceleration, `-M_a a_s`
    pub added_mass_force: Vec3,
    /// Hydrodynamic mass block (global axes) equivalent to `added_mass_force`
    pub added_mass: Mat3,
    /// Quadratic drag
    pub drag: Vec3,
    /// Relative velocity normal to the axis
    pub relative_normal_velocity: Vec3,
}

pub struct ElementFlow<'a> {
    pub fluid: &'a FluidKinematics,
    pub structure_velocity: Vec3,
    pub structure_acceleration: Vec3,
    /// Unit tangent of the element
    pub tangent: Vec3,
    pub length: f64,
    pub fraction: f64,
}

/// Projector onto the plane normal to the unit axis `t`
pub fn normal_projector(t: &Vec3) -> Mat3 {
    let tt = outer(t, t);
    let mut p = [[0.; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let delta = if i == j { 1. } else { 0. };
            p[i][j] = delta - tt[i][j];
        }
    }
    p
}

pub fn morison_terms(rho: f64, props: &ElementProperties, flow: &ElementFlow) -> MorisonTerms {
    let t = &flow.tangent;
    let d = props.effective_diameter();
    let wetted = flow.length * flow.fraction;
    let volume = props.area() * wetted;

    let v_rel = normal_component(&sub(&flow.fluid.velocity, &flow.structure_velocity), t);
    let a_fluid = normal_component(&flow.fluid.acceleration, t);
    let a_struct = normal_component(&flow.structure_acceleration, t);

    let m_a = rho * props.ca * volume;
    let projector = normal_projector(t);

    MorisonTerms {
        inertia: scale(&a_fluid, rho * (props.cp + props.ca) * volume),
        added_mass_force: scale(&a_struct, -m_a),
        added_mass: projector.map(|row| row.map(|v| v * m_a)),
        drag: scale(&v_rel, 0.5 * rho * props.cd * d * wetted * norm(&v_rel)),
        relative_normal_velocity: v_rel,
    }
}

//------------------------------------------------------------------------------
// Axial (end-cap) terms
//------------------------------------------------------------------------------

/// Axial terms at a node where the cross-section area changes by `delta_area`
/// (area after the node minus area before it, along `tangent`)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AxialTerms {
    /// Dynamic pressure acting on the exposed annulus
    pub pressure: Vec3,
    /// Fluid acceleration acting on the end volume
    pub inertia: Vec3,
    pub added_mass_force: Vec3,
    pub added_mass: Mat3,
    pub drag: Vec3,
}

impl AxialTerms {
    pub fn total_force(&self, include_added_mass_force: bool) -> Vec3 {
        let mut f = [0.; 3];
        for i in 0..3 {
            f[i] = self.pressure[i] + self.inertia[i] + self.drag[i];
            if include_added_mass_force {
                f[i] += self.added_mass_force[i];
            }
        }
        f
    }
}

/// Volume of fluid entrained by an end face of area `area`: a hemisphere of the
/// equivalent radius scaled by `tuning`
pub fn end_volume(area: f64, tuning: f64) -> f64 {
    let r = (area.abs() / PI).sqrt();
    2. / 3. * PI * r.powi(3) * tuning
}

pub fn axial_terms(
    rho: f64,
    coefficients: &AxialCoefficients,
    delta_area: f64,
    tangent: &Vec3,
    fluid: &FluidKinematics,
    structure_velocity: &Vec3,
    structure_acceleration: &Vec3,
    tuning: f64,
) -> AxialTerms {
    if delta_area.abs() < 1e-12 {
        return AxialTerms::default();
    }
    let volume = end_volume(delta_area, tuning);
    let m_a = rho * coefficients.ca * volume;
    let v_ax = dot(&sub(&fluid.velocity, structure_velocity), tangent);
    let a_ax = dot(&fluid.acceleration, tangent);
    let cm = coefficients.cp + coefficients.ca;

    AxialTerms {
        pressure: scale(tangent, coefficients.cp * fluid.dynamic_pressure * delta_area),
        inertia: scale(tangent, rho * cm * volume * a_ax),
        added_mass_force: scale(tangent, -m_a * dot(structure_acceleration, tangent)),
        added_mass: outer(tangent, tangent).map(|row| row.map(|v| v * m_a)),
        drag: scale(
            tangent,
            0.5 * rho * coefficients.cd * delta_area.abs() * v_ax.abs() * v_ax,
        ),
    }
}

/// Circular section area of diameter `d`
pub fn circle_area(d: f64) -> f64 {
    FRAC_PI_4 * d * d
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_submerged_fraction() {
        struct Case {
            za: f64,
            zb: f64,
            exp: f64,
        }
        let (top, bottom) = (0., -10.);
        vec![
            // Fully inside
            Case {
                za: -8.,
                zb: -2.,
                exp: 1.,
            },
            // Fully above
            Case {
                za: 1.,
                zb: 5.,
                exp: 0.,
            },
            // Fully below
            Case {
                za: -20.,
                zb: -12.,
                exp: 0.,
            },
            // Straddling the surface
            Case {
                za: -3.,
                zb: 1.,
                exp: 0.75,
            },
            // Reversed ordering
            Case {
                za: 1.,
                zb: -3.,
                exp: 0.75,
            },
            // Straddling the bottom
            Case {
                za: -12.,
                zb: -8.,
                exp: 0.5,
            },
            // Horizontal inside
            Case {
                za: -5.,
                zb: -5.,
                exp: 1.,
            },
        ]
        .iter()
        .for_each(|c| {
            let f = submerged_fraction(top, bottom, c.za, c.zb);
            assert_relative_eq!(f, c.exp, epsilon = 1e-14);
        });
    }

    #[test]
    fn test_submerged_fraction_bounds() {
        let zs = [-30., -10., -5., -0.1, 0., 0.1, 3., 50.];
        for &za in &zs {
            for &zb in &zs {
                let f = submerged_fraction(0., -10., za, zb);
                assert!((0. ..=1.).contains(&f));
            }
        }
    }

    #[test]
    fn test_application_length() {
        assert_relative_eq!(application_length(1., -5., -1.), 0.5);
        assert_relative_eq!(application_length(0.5, -1., 1.), 0.25);
        assert_relative_eq!(application_length(0.5, 1., -1.), 0.75);
    }

    #[test]
    fn test_morison_terms_normal_only() {
        let props = ElementProperties {
            diameter: 2.,
            ca: 1.,
            cd: 1.2,
            cp: 1.,
            ..Default::default()
        };
        let fluid = FluidKinematics {
            velocity: [1., 0., 3.],
            acceleration: [0.5, 0., 2.],
            wet: true,
            ..Default::default()
        };
        let flow = ElementFlow {
            fluid: &fluid,
            structure_velocity: [0., 0., 0.],
            structure_acceleration: [0.1, 0., 0.],
            tangent: [0., 0., 1.],
            length: 4.,
            fraction: 0.5,
        };
        let rho = 1000.;
        let terms = morison_terms(rho, &props, &flow);
        let volume = PI * 2.;

        // Axial flow contributes nothing
        assert_relative_eq!(terms.drag[2], 0.);
        assert_relative_eq!(terms.inertia[2], 0.);
        assert_relative_eq!(terms.drag[0], 0.5 * rho * 1.2 * 2. * 2. * 1.);
        assert_relative_eq!(terms.inertia[0], rho * 2. * volume * 0.5, epsilon = 1e-9);
        assert_relative_eq!(terms.added_mass_force[0], -rho * volume * 0.1, epsilon = 1e-9);
        assert_relative_eq!(terms.added_mass[0][0], rho * volume, epsilon = 1e-9);
        assert_relative_eq!(terms.added_mass[2][2], 0.);
    }

    #[test]
    fn test_axial_terms_cancel_without_area_change() {
        let fluid = FluidKinematics {
            dynamic_pressure: 1000.,
            wet: true,
            ..Default::default()
        };
        let terms = axial_terms(
            1025.,
            &AxialCoefficients::default(),
            0.,
            &[0., 0., 1.],
            &fluid,
            &[0.; 3],
            &[0.; 3],
            1.,
        );
        assert_eq!(terms, AxialTerms::default());

        // Bottom end of a vertical member pushed upwards
        let terms = axial_terms(
            1025.,
            &AxialCoefficients::default(),
            2.,
            &[0., 0., 1.],
            &fluid,
            &[0.; 3],
            &[0.; 3],
            1.,
        );
        assert_relative_eq!(terms.pressure[2], 2000.);
    }

    #[test]
    fn test_keulegan_carpenter() {
        // Velocity amplitude 1 m/s, period 10 s, diameter 2 m
        let kc = keulegan_carpenter(1., TAU / 10., 2.);
        assert_relative_eq!(kc, 5., epsilon = 1e-12);
    }
}
