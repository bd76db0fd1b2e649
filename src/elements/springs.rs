use faer::prelude::*;

use crate::{
    state::{NodeFreedomMap, State},
    util::{dot, norm, outer, scale, sub, Mat3, Vec3},
};

/// Attachment point of a spring
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpringEnd {
    Node(usize),
    Ground(Vec3),
}

/// Axial spring-damper definition
pub struct SpringElement {
    pub id: usize,
    pub ends: [SpringEnd; 2],
    pub stiffness: f64,
    pub damping: f64,
    pub undeformed_length: Option<f64>,
}

/// Force and linearization of one spring at the current state
struct SpringLoad {
    /// Internal force on the second end (global)
    f: Vec3,
    /// Stiffness block `[3][3]`
    a: Mat3,
    /// Damping block `[3][3]`
    c: Mat3,
}

pub struct Springs {
    ends: Vec<[SpringEnd; 2]>,
    /// Undeformed length
    l_ref: Vec<f64>,
    k: Vec<f64>,
    damping: Vec<f64>,
}

impl Springs {
    pub fn new(elements: &[SpringElement], x0: &[Vec3]) -> Self {
        let position = |e: &SpringEnd| match e {
            SpringEnd::Node(i) => x0[*i],
            SpringEnd::Ground(p) => *p,
        };
        Self {
            ends: elements.iter().map(|e| e.ends).collect(),
            l_ref: elements
                .iter()
                .map(|e| {
                    e.undeformed_length
                        .unwrap_or_else(|| norm(&sub(&position(&e.ends[1]), &position(&e.ends[0]))))
                })
                .collect(),
            k: elements.iter().map(|e| e.stiffness).collect(),
            damping: elements.iter().map(|e| e.damping).collect(),
        }
    }

    fn end_position(state: &State, end: &SpringEnd) -> Vec3 {
        match end {
            SpringEnd::Node(i) => {
                let t = state.translation(*i);
                [
                    state.x0[*i][0] + t[0],
                    state.x0[*i][1] + t[1],
                    state.x0[*i][2] + t[2],
                ]
            }
            SpringEnd::Ground(p) => *p,
        }
    }

    fn end_velocity(state: &State, end: &SpringEnd) -> Vec3 {
        match end {
            SpringEnd::Node(i) => [state.v[(0, *i)], state.v[(1, *i)], state.v[(2, *i)]],
            SpringEnd::Ground(_) => [0.; 3],
        }
    }

    fn calculate(&self, i: usize, state: &State) -> SpringLoad {
        let [e1, e2] = &self.ends[i];

        // Current difference between end positions and its length
        let r = sub(&Self::end_position(state, e2), &Self::end_position(state, e1));
        let l = norm(&r);
        if l < f64::EPSILON {
            return SpringLoad {
                f: [0.; 3],
                a: [[0.; 3]; 3],
                c: [[0.; 3]; 3],
            };
        }

        // Coefficients
        let k = self.k[i];
        let c1 = k * (1. - self.l_ref[i] / l);
        let c2 = k * self.l_ref[i] / (l * l * l);

        // Stiffness block: c1*I + c2*r*r^T
        let mut a = outer(&r, &r);
        for (j, row) in a.iter_mut().enumerate() {
            row.iter_mut().for_each(|v| *v *= c2);
            row[j] += c1;
        }

        // Damping along the spring axis
        let n = scale(&r, 1. / l);
        let v_rel = sub(&Self::end_velocity(state, e2), &Self::end_velocity(state, e1));
        let cd = self.damping[i];
        let mut c = outer(&n, &n);
        c.iter_mut()
            .for_each(|row| row.iter_mut().for_each(|v| *v *= cd));

        let f_damp = scale(&n, cd * dot(&n, &v_rel));
        SpringLoad {
            f: [
                c1 * r[0] + f_damp[0],
                c1 * r[1] + f_damp[1],
                c1 * r[2] + f_damp[2],
            ],
            a,
            c,
        }
    }

    /// Axial force of each spring (positive in tension)
    pub fn tensions(&self, state: &State) -> Vec<f64> {
        (0..self.ends.len())
            .map(|i| {
                let [e1, e2] = &self.ends[i];
                let l = norm(&sub(&Self::end_position(state, e2), &Self::end_position(state, e1)));
                self.k[i] * (l - self.l_ref[i])
            })
            .collect()
    }

    /// Adds spring elements to the stiffness and damping matrices and the residual
    pub fn assemble_system(
        &self,
        nfm: &NodeFreedomMap,
        state: &State,
        mut k_sys: MatMut<f64>,
        mut c_sys: MatMut<f64>,
        mut r: ColMut<f64>,
    ) {
        (0..self.ends.len()).for_each(|i| {
            let load = self.calculate(i, state);
            let nodes = self.ends[i].map(|e| match e {
                SpringEnd::Node(n) => Some(n),
                SpringEnd::Ground(_) => None,
            });
            let sign = [-1., 1.];
            for (a, na) in nodes.iter().enumerate() {
                let Some(na) = *na else { continue };
                nfm.add_vector(r.rb_mut(), na, |k| {
                    if k < 3 {
                        sign[a] * load.f[k]
                    } else {
                        0.
                    }
                });
                for (b, nb) in nodes.iter().enumerate() {
                    let Some(nb) = *nb else { continue };
                    let s = sign[a] * sign[b];
                    nfm.add_block(k_sys.rb_mut(), na, nb, |k, l| {
                        if k < 3 && l < 3 {
                            s * load.a[k][l]
                        } else {
                            0.
                        }
                    });
                    nfm.add_block(c_sys.rb_mut(), na, nb, |k, l| {
                        if k < 3 && l < 3 {
                            s * load.c[k][l]
                        } else {
                            0.
                        }
                    });
                }
            }
        });
    }
}
