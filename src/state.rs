use faer::prelude::*;
use faer::{unzip, zip};

use crate::{
    node::{ActiveDOFs, NodeKinematics},
    quaternion::Quaternion,
    util::Vec3,
};

//------------------------------------------------------------------------------
// Node freedom map
//------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct NodeDofs {
    pub first_dof_index: usize,
    pub n_dofs: usize,
    pub active: ActiveDOFs,
}

#[derive(Clone, Debug)]
pub struct NodeFreedomMap {
    pub node_dofs: Vec<NodeDofs>,
    pub n_system_dofs: usize,
}

impl NodeFreedomMap {
    pub fn new(active: &[ActiveDOFs]) -> Self {
        let mut first_dof_index = 0;
        let node_dofs = active
            .iter()
            .map(|&active| {
                let d = NodeDofs {
                    first_dof_index,
                    n_dofs: active.n_dofs(),
                    active,
                };
                first_dof_index += d.n_dofs;
                d
            })
            .collect();
        Self {
            node_dofs,
            n_system_dofs: first_dof_index,
        }
    }

    /// System dof index of component `k` (0..6: translation, rotation) of a node
    pub fn dof_index(&self, node: usize, k: usize) -> Option<usize> {
        let d = &self.node_dofs[node];
        match (d.active, k) {
            (ActiveDOFs::All, _) => Some(d.first_dof_index + k),
            (ActiveDOFs::Translation, 0..=2) => Some(d.first_dof_index + k),
            (ActiveDOFs::Rotation, 3..=5) => Some(d.first_dof_index + k - 3),
            _ => None,
        }
    }

    /// Adds `value(k, l)` to `mat` for every active pair of node components
    pub fn add_block(
        &self,
        mut mat: MatMut<f64>,
        node_i: usize,
        node_j: usize,
        value: impl Fn(usize, usize) -> f64,
    ) {
        for k in 0..6 {
            let Some(i) = self.dof_index(node_i, k) else {
                continue;
            };
            for l in 0..6 {
                if let Some(j) = self.dof_index(node_j, l) {
                    mat[(i, j)] += value(k, l);
                }
            }
        }
    }

    /// Adds `value(k)` to `col` for every active node component
    pub fn add_vector(&self, mut col: ColMut<f64>, node: usize, value: impl Fn(usize) -> f64) {
        for k in 0..6 {
            if let Some(i) = self.dof_index(node, k) {
                col[i] += value(k);
            }
        }
    }
}

//------------------------------------------------------------------------------
// State
//------------------------------------------------------------------------------

/// Node states of the reference engine. Rotations are carried as rotation vectors
/// relative to the initial orientation.
pub struct State {
    /// Initial position of each node
    pub x0: Vec<Vec3>,
    /// Initial orientation of each node
    pub q0: Vec<Quaternion>,
    /// Displacement increment `[6][n_nodes]`
    pub u_delta: Mat<f64>,
    /// Previous displacement `[6][n_nodes]`
    u_prev: Mat<f64>,
    /// Displacement `[6][n_nodes]`
    pub u: Mat<f64>,
    /// Velocity `[6][n_nodes]`
    pub v: Mat<f64>,
    /// Acceleration `[6][n_nodes]`
    pub vd: Mat<f64>,
    /// Algorithmic acceleration `[6][n_nodes]`
    a: Mat<f64>,
    /// External loads `[6][n_nodes]`
    pub fx: Mat<f64>,
}

impl State {
    pub fn new(x0: &[Vec3], q0: &[Quaternion], v0: &[[f64; 6]]) -> Self {
        let n = x0.len();
        Self {
            x0: x0.to_vec(),
            q0: q0.to_vec(),
            u_delta: Mat::zeros(6, n),
            u_prev: Mat::zeros(6, n),
            u: Mat::zeros(6, n),
            v: Mat::from_fn(6, n, |i, j| v0.get(j).map_or(0., |v| v[i])),
            vd: Mat::zeros(6, n),
            a: Mat::zeros(6, n),
            fx: Mat::zeros(6, n),
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.x0.len()
    }

    pub fn calc_displacement(&mut self, h: f64) {
        zip!(&mut self.u, &self.u_prev, &self.u_delta)
            .for_each(|unzip!(u, u_prev, u_delta)| *u = *u_prev + *u_delta * h);
    }

    pub fn predict_next_state(
        &mut self,
        h: f64,
        beta: f64,
        gamma: f64,
        alpha_m: f64,
        alpha_f: f64,
    ) {
        self.u_prev.copy_from(&self.u);
        zip!(&mut self.u_delta, &mut self.v, &mut self.vd, &mut self.a).for_each(
            |unzip!(q_delta, v, vd, a)| {
                let (v_p, vd_p, a_p) = (*v, *vd, *a);
                *vd = 0.;
                *a = (alpha_f * vd_p - alpha_m * a_p) / (1. - alpha_m);
                *v = v_p + h * (1. - gamma) * a_p + gamma * h * *a;
                *q_delta = v_p + (0.5 - beta) * h * a_p + beta * h * *a;
            },
        );

        self.calc_displacement(h);
    }

    pub fn update_prediction(
        &mut self,
        h: f64,
        beta_prime: f64,
        gamma_prime: f64,
        x_delta: MatRef<f64>,
    ) {
        zip!(&mut self.u_delta, &mut self.v, &mut self.vd, &x_delta).for_each(
            |unzip!(q_delta, v, vd, x_delta)| {
                *q_delta += *x_delta / h;
                *v += gamma_prime * *x_delta;
                *vd += beta_prime * *x_delta;
            },
        );

        self.calc_displacement(h);
    }

    pub fn update_algorithmic_acceleration(&mut self, alpha_m: f64, alpha_f: f64) {
        let s = (1. - alpha_f) / (1. - alpha_m);
        zip!(&mut self.a, &self.vd).for_each(|unzip!(a, vd)| *a += s * *vd);
    }

    pub fn translation(&self, node: usize) -> Vec3 {
        [self.u[(0, node)], self.u[(1, node)], self.u[(2, node)]]
    }

    pub fn rotation(&self, node: usize) -> Vec3 {
        [self.u[(3, node)], self.u[(4, node)], self.u[(5, node)]]
    }

    pub fn kinematics(&self, node: usize) -> NodeKinematics {
        let col = |m: &Mat<f64>, r: usize| [m[(r, node)], m[(r + 1, node)], m[(r + 2, node)]];
        let t = self.translation(node);
        let x0 = self.x0[node];
        NodeKinematics {
            position: [x0[0] + t[0], x0[1] + t[1], x0[2] + t[2]],
            orientation: Quaternion::from_rotation_vector(&self.rotation(node))
                .compose(&self.q0[node]),
            velocity: col(&self.v, 0),
            angular_velocity: col(&self.v, 3),
            acceleration: col(&self.vd, 0),
            angular_acceleration: col(&self.vd, 3),
        }
    }

    /// Index of the first node with a non-finite state component
    pub fn first_non_finite_node(&self) -> Option<usize> {
        (0..self.n_nodes()).find(|&j| {
            (0..6).any(|i| {
                !(self.u[(i, j)].is_finite()
                    && self.v[(i, j)].is_finite()
                    && self.vd[(i, j)].is_finite())
            })
        })
    }
}
