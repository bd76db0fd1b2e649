use faer::prelude::*;
use itertools::Itertools;

use crate::{
    engine::{LinkCommand, LinkState},
    state::{NodeFreedomMap, State},
    util::{cross, dot, unit_vector, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LinkKind {
    /// Target clamped to ground (base ignored)
    Fixed,
    Rigid,
    /// Free rotation about an axis
    Bearing { axis: Vec3 },
    /// Free translation along an axis
    Slider { axis: Vec3 },
    /// Bearing whose rotation about the axis is commanded
    Motor { axis: Vec3 },
}

pub struct LinkInput {
    pub id: usize,
    pub kind: LinkKind,
    pub node_id_base: Option<usize>,
    pub node_id_target: usize,
}

/// Linear constraint rows tying a target node to a base node (or ground):
/// `B_base * u_base + B_target * u_target = value`
pub struct Link {
    pub kind: LinkKind,
    pub first_row_index: usize,
    pub n_rows: usize,
    pub node_id_base: Option<usize>,
    pub node_id_target: usize,
    /// `[n_rows][6]`
    b_base: Mat<f64>,
    /// `[n_rows][6]`
    b_target: Mat<f64>,
    /// Motor row within this link
    axial_row: Option<usize>,
    axis: Vec3,
    /// Commanded relative angle
    pub angle_command: f64,
    /// Commanded relative speed, integrated into the angle command each step
    pub speed_command: Option<f64>,
}

/// Unit vectors perpendicular to `a` and to each other
fn perpendicular_pair(a: &Vec3) -> (Vec3, Vec3) {
    let trial = if a[0].abs() < 0.9 {
        [1., 0., 0.]
    } else {
        [0., 1., 0.]
    };
    let p1 = unit_vector(&cross(a, &trial)).unwrap_or([0., 1., 0.]);
    let p2 = cross(a, &p1);
    (p1, p2)
}

const E: [Vec3; 3] = [[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];

impl Link {
    pub fn new(
        first_row_index: usize,
        input: &LinkInput,
        state: &State,
        nfm: &NodeFreedomMap,
    ) -> Self {
        let target = input.node_id_target;
        let base = match input.kind {
            LinkKind::Fixed => None,
            _ => input.node_id_base,
        };
        let has_rotation = |n: usize| nfm.node_dofs[n].active.has_rotation();
        let rotations = has_rotation(target) && base.map_or(true, has_rotation);

        // Initial offset from base to target
        let r0 = match base {
            Some(b) => crate::util::sub(&state.x0[target], &state.x0[b]),
            None => [0.; 3],
        };

        let axis = match input.kind {
            LinkKind::Bearing { axis } | LinkKind::Slider { axis } | LinkKind::Motor { axis } => {
                unit_vector(&axis).unwrap_or([1., 0., 0.])
            }
            _ => [1., 0., 0.],
        };
        let (p1, p2) = perpendicular_pair(&axis);

        //----------------------------------------------------------------------
        // Constrained directions
        //----------------------------------------------------------------------

        let translation_dirs = match input.kind {
            LinkKind::Slider { .. } => vec![p1, p2],
            _ => E.to_vec(),
        };
        let mut rotation_dirs = match input.kind {
            LinkKind::Bearing { .. } | LinkKind::Motor { .. } => vec![p1, p2],
            _ => E.to_vec(),
        };
        let mut axial_row = None;
        if let LinkKind::Motor { .. } = input.kind {
            rotation_dirs.push(axis);
        }
        if !rotations {
            rotation_dirs.clear();
        } else if let LinkKind::Motor { .. } = input.kind {
            axial_row = Some(translation_dirs.len() + rotation_dirs.len() - 1);
        }

        //----------------------------------------------------------------------
        // Constraint gradients
        //----------------------------------------------------------------------

        let n_rows = translation_dirs.len() + rotation_dirs.len();
        let mut b_base = Mat::<f64>::zeros(n_rows, 6);
        let mut b_target = Mat::<f64>::zeros(n_rows, 6);
        translation_dirs.iter().enumerate().for_each(|(i, d)| {
            // u_t - u_b - theta_b x r0
            let rd = cross(&r0, d);
            for k in 0..3 {
                b_target[(i, k)] = d[k];
                b_base[(i, k)] = -d[k];
                b_base[(i, 3 + k)] = -rd[k];
            }
        });
        rotation_dirs.iter().enumerate().for_each(|(j, d)| {
            let i = translation_dirs.len() + j;
            for k in 0..3 {
                b_target[(i, 3 + k)] = d[k];
                b_base[(i, 3 + k)] = -d[k];
            }
        });

        Self {
            kind: input.kind,
            first_row_index,
            n_rows,
            node_id_base: base,
            node_id_target: target,
            b_base,
            b_target,
            axial_row,
            axis,
            angle_command: 0.,
            speed_command: None,
        }
    }

    pub fn command(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::Angle(angle) => {
                self.angle_command = angle;
                self.speed_command = None;
            }
            LinkCommand::Speed(speed) => self.speed_command = Some(speed),
        }
    }

    /// Integrates the speed command over a step
    pub fn advance_command(&mut self, h: f64) {
        if let Some(speed) = self.speed_command {
            self.angle_command += speed * h;
        }
    }

    fn relative_about_axis(&self, m: &Mat<f64>) -> f64 {
        let t = [
            m[(3, self.node_id_target)],
            m[(4, self.node_id_target)],
            m[(5, self.node_id_target)],
        ];
        let b = self
            .node_id_base
            .map_or([0.; 3], |n| [m[(3, n)], m[(4, n)], m[(5, n)]]);
        dot(&self.axis, &t) - dot(&self.axis, &b)
    }

    pub fn link_state(&self, state: &State, lambda: ColRef<f64>) -> LinkState {
        LinkState {
            angle: self.relative_about_axis(&state.u),
            speed: self.relative_about_axis(&state.v),
            acceleration: self.relative_about_axis(&state.vd),
            reaction_torque: self
                .axial_row
                .map_or(0., |i| -lambda[self.first_row_index + i]),
        }
    }
}

pub struct Constraints {
    pub n_rows: usize,
    /// Constraint residual
    pub phi: Col<f64>,
    /// Constraint gradient `[n_rows][n_system_dofs]`
    pub b: Mat<f64>,
    pub links: Vec<Link>,
}

impl Constraints {
    pub fn new(inputs: &[LinkInput], state: &State, nfm: &NodeFreedomMap) -> Self {
        let mut n_rows = 0;
        let links = inputs
            .iter()
            .map(|inp| {
                let c = Link::new(n_rows, inp, state, nfm);
                n_rows += c.n_rows;
                c
            })
            .collect_vec();

        // Scatter gradients into the system layout
        let mut b = Mat::<f64>::zeros(n_rows, nfm.n_system_dofs);
        links.iter().for_each(|c| {
            for i in 0..c.n_rows {
                for k in 0..6 {
                    if let Some(j) = nfm.dof_index(c.node_id_target, k) {
                        b[(c.first_row_index + i, j)] += c.b_target[(i, k)];
                    }
                    if let Some(j) = c.node_id_base.and_then(|n| nfm.dof_index(n, k)) {
                        b[(c.first_row_index + i, j)] += c.b_base[(i, k)];
                    }
                }
            }
        });

        Self {
            n_rows,
            phi: Col::zeros(n_rows),
            b,
            links,
        }
    }

    /// Evaluates the constraint residual at the current state
    pub fn assemble_constraints(&mut self, state: &State) {
        self.links.iter().for_each(|c| {
            for i in 0..c.n_rows {
                let mut phi = (0..6)
                    .map(|k| c.b_target[(i, k)] * state.u[(k, c.node_id_target)])
                    .sum::<f64>();
                if let Some(n) = c.node_id_base {
                    phi += (0..6).map(|k| c.b_base[(i, k)] * state.u[(k, n)]).sum::<f64>();
                }
                if c.axial_row == Some(i) {
                    phi -= c.angle_command;
                }
                self.phi[c.first_row_index + i] = phi;
            }
        });
    }
}
