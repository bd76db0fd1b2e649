//! Natural frequencies, damping ratios and mode shapes of the linearized
//! system exported by a dynamics engine.

use std::f64::consts::TAU;

use faer::prelude::*;
use itertools::Itertools;
use log::{debug, info, warn};
use num_complex::Complex64;
use serde::Deserialize;

use crate::{
    engine::SystemMatrices,
    error::ModalError,
    node::{ActiveDOFs, Node, NodeId},
};

/// Eigenvalues and right eigenvectors (one `Vec` per eigenvalue)
#[derive(Clone, Debug, Default)]
pub struct Eigenpairs {
    pub values: Vec<Complex64>,
    pub vectors: Vec<Vec<Complex64>>,
}

/// Standard eigenproblem solver for a dense real matrix
pub trait EigenSolver {
    fn solve(&self, a: MatRef<f64>) -> Result<Eigenpairs, ModalError>;
}

/// Dense solver backed by faer
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseEigenSolver;

impl EigenSolver for DenseEigenSolver {
    fn solve(&self, a: MatRef<f64>) -> Result<Eigenpairs, ModalError> {
        let eig = a.eigen().map_err(|_| ModalError::EigenSolveFailed)?;
        let s = eig.S().column_vector();
        let u = eig.U();
        let values = (0..s.nrows())
            .map(|i| Complex64::new(s[i].re, s[i].im))
            .collect_vec();
        let vectors = (0..u.ncols())
            .map(|j| {
                (0..u.nrows())
                    .map(|i| Complex64::new(u[(i, j)].re, u[(i, j)].im))
                    .collect_vec()
            })
            .collect_vec();
        if values.iter().any(|v| !(v.re.is_finite() && v.im.is_finite())) {
            return Err(ModalError::EigenSolveFailed);
        }
        Ok(Eigenpairs { values, vectors })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModalSettings {
    /// Modes below this frequency (Hz) are treated as rigid-body motion
    pub min_frequency: f64,
    /// Frequencies closer than this (Hz) are reported once
    pub duplicate_tolerance: f64,
    /// Keep only the lowest modes
    pub max_modes: Option<usize>,
}

impl Default for ModalSettings {
    fn default() -> Self {
        Self {
            min_frequency: 1e-4,
            duplicate_tolerance: 1e-6,
            max_modes: None,
        }
    }
}

/// Displacement of one node in a mode, in the node's local frame
#[derive(Clone, Debug, PartialEq)]
pub struct NodeModeShape {
    pub node: NodeId,
    pub translation: [Complex64; 3],
    pub rotation: [Complex64; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mode {
    /// Undamped natural frequency (Hz)
    pub frequency: f64,
    pub damping_ratio: f64,
    /// Shape over all system dofs, unit maximum magnitude
    pub shape: Vec<Complex64>,
    pub node_shapes: Vec<NodeModeShape>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModalResults {
    /// Modes in ascending frequency
    pub modes: Vec<Mode>,
}

impl ModalResults {
    pub fn frequencies(&self) -> Vec<f64> {
        self.modes.iter().map(|m| m.frequency).collect()
    }

    pub fn damping_ratios(&self) -> Vec<f64> {
        self.modes.iter().map(|m| m.damping_ratio).collect()
    }
}

/// Eigen-analysis of the system matrices. Constraint rows are eliminated via
/// the null space of the constraint gradient before forming the first-order
/// system `[0 I; -M^-1 K, -M^-1 C]`.
pub fn modal_analysis(
    matrices: &SystemMatrices,
    nodes: &[Node],
    solver: &dyn EigenSolver,
    settings: &ModalSettings,
) -> Result<ModalResults, ModalError> {
    let n = matrices.m.nrows();
    for (name, a) in [("K", &matrices.k), ("C", &matrices.c)] {
        if a.nrows() != n || a.ncols() != n {
            return Err(ModalError::Dimension(format!(
                "{name} is {}x{}, M is {n}x{n}",
                a.nrows(),
                a.ncols()
            )));
        }
    }
    if matrices.b.nrows() > 0 && matrices.b.ncols() != n {
        return Err(ModalError::Dimension(format!(
            "B has {} columns for {n} dofs",
            matrices.b.ncols()
        )));
    }

    let t = null_space(matrices.b.as_ref(), n)?;
    let r = t.ncols();
    if r == 0 {
        return Err(ModalError::NoPhysicalModes(0));
    }
    let project = |a: &Mat<f64>| t.transpose() * a * &t;
    let (mr, cr, kr) = (project(&matrices.m), project(&matrices.c), project(&matrices.k));

    let lu = mr.partial_piv_lu();
    let mk = lu.solve(&kr);
    let mc = lu.solve(&cr);
    // A singular mass leaves non-finite or inconsistent solutions
    let solved = |x: &Mat<f64>, rhs: &Mat<f64>| {
        let residual = (&mr * x - rhs).norm_l2();
        residual <= 1e-8 * (rhs.norm_l2() + mr.norm_l2())
    };
    if !solved(&mk, &kr) || !solved(&mc, &cr) {
        return Err(ModalError::SingularMass);
    }

    let a = Mat::<f64>::from_fn(2 * r, 2 * r, |i, j| match (i < r, j < r) {
        (true, true) => 0.,
        (true, false) => {
            if j - r == i {
                1.
            } else {
                0.
            }
        }
        (false, true) => -mk[(i - r, j)],
        (false, false) => -mc[(i - r, j - r)],
    });
    let pairs = solver.solve(a.as_ref())?;
    let n_eig = pairs.values.len();

    let scale = pairs
        .values
        .iter()
        .map(|l| l.norm())
        .fold(0., f64::max)
        .max(1.);
    let omega_min = settings.min_frequency * TAU;
    let mut dropped = 0;
    let mut modes = pairs
        .values
        .iter()
        .zip(&pairs.vectors)
        .filter_map(|(lambda, v)| {
            let omega = lambda.norm();
            if omega < omega_min {
                return None;
            }
            if lambda.re > 1e-8 * scale {
                dropped += 1;
                warn!("modal: dropped divergent eigenvalue {lambda:.4e}");
                return None;
            }
            // One of each conjugate pair; real roots are overdamped
            if lambda.im.abs() <= 1e-9 * scale {
                debug!("modal: skipped non-oscillatory eigenvalue {lambda:.4e}");
                return None;
            }
            if lambda.im < 0. {
                return None;
            }
            let q = (0..n)
                .map(|i| (0..r).map(|k| v[k] * t[(i, k)]).sum::<Complex64>())
                .collect_vec();
            let shape = normalize_shape(q)?;
            Some(Mode {
                frequency: omega / TAU,
                damping_ratio: (-lambda.re / omega).max(0.),
                node_shapes: local_shapes(&shape, &matrices.node_dofs, nodes),
                shape,
            })
        })
        .collect_vec();

    modes.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    modes.dedup_by(|b, a| b.frequency - a.frequency <= settings.duplicate_tolerance);
    if let Some(max) = settings.max_modes {
        modes.truncate(max);
    }

    if modes.is_empty() {
        return Err(ModalError::NoPhysicalModes(n_eig));
    }
    if dropped > 0 {
        warn!("modal: {dropped} divergent eigenvalues dropped");
    }
    info!(
        "modal: {} modes from {} eigenvalues, first {:.4} Hz",
        modes.len(),
        n_eig,
        modes[0].frequency
    );
    Ok(ModalResults { modes })
}

/// Orthonormal basis `[n][r]` of the null space of `b`
fn null_space(b: MatRef<f64>, n: usize) -> Result<Mat<f64>, ModalError> {
    if b.nrows() == 0 {
        return Ok(Mat::identity(n, n));
    }
    let svd = b.svd().map_err(|_| ModalError::EigenSolveFailed)?;
    let s = svd.S().column_vector();
    let s_max = (0..s.nrows()).map(|i| s[i]).fold(0., f64::max);
    let rank = (0..s.nrows()).filter(|&i| s[i] > 1e-10 * s_max.max(1.)).count();
    let v = svd.V();
    Ok(Mat::from_fn(n, n - rank, |i, j| v[(i, rank + j)]))
}

/// Scales to unit maximum magnitude with the largest component real and positive
fn normalize_shape(q: Vec<Complex64>) -> Option<Vec<Complex64>> {
    let pivot = *q.iter().max_by(|a, b| a.norm().total_cmp(&b.norm()))?;
    if pivot.norm() == 0. {
        return None;
    }
    Some(q.into_iter().map(|c| c / pivot).collect())
}

fn local_shapes(
    shape: &[Complex64],
    node_dofs: &[(usize, ActiveDOFs)],
    nodes: &[Node],
) -> Vec<NodeModeShape> {
    let zero = [Complex64::new(0., 0.); 3];
    let take = |first: usize| [shape[first], shape[first + 1], shape[first + 2]];
    node_dofs
        .iter()
        .zip(nodes)
        .map(|(&(first, active), node)| {
            let (translation, rotation) = match active {
                ActiveDOFs::None => (zero, zero),
                ActiveDOFs::Translation => (take(first), zero),
                ActiveDOFs::Rotation => (zero, take(first)),
                ActiveDOFs::All => (take(first), take(first + 3)),
            };
            let local = |v: [Complex64; 3]| {
                let re = node.frame.to_local(&v.map(|c| c.re));
                let im = node.frame.to_local(&v.map(|c| c.im));
                [0, 1, 2].map(|k| Complex64::new(re[k], im[k]))
            };
            NodeModeShape {
                node: node.id,
                translation: local(translation),
                rotation: local(rotation),
            }
        })
        .collect()
}
