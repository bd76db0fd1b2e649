use faer::prelude::*;
use itertools::Itertools;

use crate::{
    state::{NodeFreedomMap, State},
    util::Vec3,
};

/// Lumped 6x6 mass at a node, global axes
pub struct MassElement {
    pub id: usize,
    pub node_id: usize,
    pub m: Mat<f64>,
}

impl MassElement {
    /// Point mass with isotropic rotational inertia
    pub fn point(id: usize, node_id: usize, mass: f64, inertia: Vec3) -> Self {
        Self {
            id,
            node_id,
            m: Mat::from_fn(6, 6, |i, j| match (i == j, i) {
                (true, 0..=2) => mass,
                (true, k) => inertia[k - 3],
                _ => 0.,
            }),
        }
    }
}

pub struct Masses {
    /// Node ID for each element
    node_ids: Vec<usize>,
    /// Mass matrix of each element `[6][6]`
    m: Vec<Mat<f64>>,
    /// Gravity loads of each element `[6]`
    fg: Vec<[f64; 6]>,
}

impl Masses {
    pub fn new(elements: &[MassElement], gravity: &Vec3) -> Self {
        let fg = elements
            .iter()
            .map(|e| {
                let mut f = [0.; 6];
                for (i, fi) in f.iter_mut().enumerate() {
                    *fi = (0..3).map(|j| e.m[(i, j)] * gravity[j]).sum();
                }
                f
            })
            .collect_vec();
        Self {
            node_ids: elements.iter().map(|e| e.node_id).collect_vec(),
            m: elements.iter().map(|e| e.m.clone()).collect_vec(),
            fg,
        }
    }

    /// Adds mass elements to the mass matrix and the inertial and gravity
    /// loads to the residual
    pub fn assemble_system(
        &self,
        nfm: &NodeFreedomMap,
        state: &State,
        mut m_sys: MatMut<f64>,
        mut r: ColMut<f64>,
    ) {
        self.node_ids
            .iter()
            .zip(self.m.iter())
            .zip(self.fg.iter())
            .for_each(|((&node, m), fg)| {
                nfm.add_block(m_sys.rb_mut(), node, node, |k, l| m[(k, l)]);
                nfm.add_vector(r.rb_mut(), node, |k| {
                    (0..6).map(|l| m[(k, l)] * state.vd[(l, node)]).sum::<f64>() - fg[k]
                });
            });
    }
}
