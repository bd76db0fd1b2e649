use faer::prelude::*;
use faer::{unzip, zip};
use log::debug;

use crate::{
    constraints::Constraints,
    elements::Elements,
    engine::{DynamicsEngine, LinkCommand, LinkId, LinkState, StepResults, SystemMatrices},
    error::EngineError,
    node::{NodeId, NodeKinematics},
    state::{NodeFreedomMap, State},
    util::{Mat3, Vec3},
};

pub struct StepParameters {
    pub h: f64, // time step
    pub alpha_f: f64,
    pub alpha_m: f64,
    pub beta: f64,
    pub gamma: f64,
    pub beta_prime: f64,
    pub gamma_prime: f64,
    pub max_iter: usize,
    pub conditioner: f64,
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl StepParameters {
    pub fn new(h: f64, rho_inf: f64, atol: f64, rtol: f64, max_iter: usize) -> Self {
        let alpha_m = (2. * rho_inf - 1.) / (rho_inf + 1.);
        let alpha_f = rho_inf / (rho_inf + 1.);
        let gamma = 0.5 + alpha_f - alpha_m;
        let beta = 0.25 * (gamma + 0.5) * (gamma + 0.5);
        Self {
            max_iter,
            h,
            alpha_m,
            alpha_f,
            gamma,
            beta,
            gamma_prime: gamma / (h * beta),
            beta_prime: (1. - alpha_m) / (h * h * beta * (1. - alpha_f)),
            conditioner: beta * h * h,
            abs_tol: atol,
            rel_tol: rtol,
        }
    }
}

/// Reference lumped-mass engine: 6x6 node masses, axial spring-dampers and
/// linear links integrated with generalized-alpha. Rotations are treated as
/// small except about link axes.
pub struct LinearEngine {
    pub p: StepParameters,
    rho_inf: f64,
    pub nfm: NodeFreedomMap,
    pub elements: Elements,
    pub constraints: Constraints,
    pub state: State,
    time: f64,
    n_system: usize,
    n_lambda: usize,
    n_dofs: usize,
    m: Mat<f64>,      // Mass matrix including accrued mass
    c: Mat<f64>,      // Damping matrix
    k: Mat<f64>,      // Tangent stiffness matrix
    r: Col<f64>,      // Residual vector
    lambda: Col<f64>, // Constraint multipliers
    x: Col<f64>,      // Solution vector
    x_delta: Mat<f64>,
    accrued_mass: Vec<[[f64; 6]; 6]>,
}

impl LinearEngine {
    pub fn new(
        step_parameters: StepParameters,
        rho_inf: f64,
        nfm: NodeFreedomMap,
        elements: Elements,
        constraints: Constraints,
        state: State,
    ) -> Self {
        let n_system = nfm.n_system_dofs;
        let n_lambda = constraints.n_rows;
        let n_nodes = state.n_nodes();
        Self {
            p: step_parameters,
            rho_inf,
            nfm,
            elements,
            constraints,
            state,
            time: 0.,
            n_system,
            n_lambda,
            n_dofs: n_system + n_lambda,
            m: Mat::zeros(n_system, n_system),
            c: Mat::zeros(n_system, n_system),
            k: Mat::zeros(n_system, n_system),
            r: Col::zeros(n_system),
            lambda: Col::zeros(n_lambda),
            x: Col::zeros(n_system + n_lambda),
            x_delta: Mat::zeros(6, n_nodes),
            accrued_mass: vec![[[0.; 6]; 6]; n_nodes],
        }
    }

    fn reset_matrices(&mut self) {
        self.m.fill(0.);
        self.c.fill(0.);
        self.k.fill(0.);
        self.r.fill(0.);
    }

    /// Builds mass, damping, stiffness and residual at the current state
    fn assemble(&mut self) {
        self.reset_matrices();

        // Add elements to system
        self.elements.assemble_system(
            &self.nfm,
            &self.state,
            self.m.as_mut(),
            self.c.as_mut(),
            self.k.as_mut(),
            self.r.as_mut(),
        );

        // Add accrued mass and its inertial load
        for (node, block) in self.accrued_mass.iter().enumerate() {
            let vd = &self.state.vd;
            self.nfm.add_block(self.m.as_mut(), node, node, |k, l| block[k][l]);
            self.nfm.add_vector(self.r.as_mut(), node, |k| {
                (0..6).map(|l| block[k][l] * vd[(l, node)]).sum()
            });
        }

        // Subtract external loads from residual
        for node in 0..self.state.n_nodes() {
            let fx = &self.state.fx;
            self.nfm
                .add_vector(self.r.as_mut(), node, |k| -fx[(k, node)]);
        }

        // Add constraint forces to residual
        self.constraints.assemble_constraints(&self.state);
        if self.n_lambda > 0 {
            self.r += self.constraints.b.transpose() * &self.lambda;
        }
    }

    fn solve_system(&mut self) -> Result<(), EngineError> {
        let (ns, nl, c) = (self.n_system, self.n_lambda, self.p.conditioner);

        // Iteration matrix [c*St B^T; B 0]
        let mut st = Mat::<f64>::zeros(self.n_dofs, self.n_dofs);
        zip!(
            &mut st.submatrix_mut(0, 0, ns, ns),
            &self.k,
            &self.c,
            &self.m
        )
        .for_each(|unzip!(st, k, cd, m)| {
            *st = c * (*k + self.p.gamma_prime * *cd + self.p.beta_prime * *m)
        });
        if nl > 0 {
            st.submatrix_mut(ns, 0, nl, ns).copy_from(&self.constraints.b);
            st.submatrix_mut(0, ns, ns, nl)
                .copy_from(self.constraints.b.transpose());
        }

        // Conditioned right-hand side
        let mut rhs = Col::<f64>::zeros(self.n_dofs);
        zip!(&mut rhs.subrows_mut(0, ns), &self.r).for_each(|unzip!(rhs, r)| *rhs = -c * *r);
        zip!(&mut rhs.subrows_mut(ns, nl), &self.constraints.phi)
            .for_each(|unzip!(rhs, phi)| *rhs = -*phi);

        // Solve system
        let lu = st.partial_piv_lu();
        let x = lu.solve(&rhs);
        if !x.iter().all(|v| v.is_finite()) {
            return Err(EngineError::Singular { time: self.time });
        }
        self.x.copy_from(&x);

        // Remove conditioning from multiplier increments
        zip!(&mut self.x.subrows_mut(ns, nl)).for_each(|unzip!(v)| *v /= c);
        Ok(())
    }

    // Function to update the x_delta matrix based on the current x vector
    fn update_x_delta(&mut self) {
        self.x_delta.fill(0.);
        for node in 0..self.state.n_nodes() {
            for k in 0..6 {
                if let Some(i) = self.nfm.dof_index(node, k) {
                    self.x_delta[(k, node)] = self.x[i];
                }
            }
        }
    }

    // Calculate convergence error (https://doi.org/10.1115/1.4033441)
    fn calculate_convergence_error(&self) -> f64 {
        let sys_sum_err_squared: f64 = (0..self.state.n_nodes())
            .flat_map(|j| (0..6).map(move |i| (i, j)))
            .map(|(i, j)| {
                let (pi, xi) = (self.x_delta[(i, j)], self.state.u_delta[(i, j)]);
                (pi / (self.p.abs_tol + (xi * self.p.h * self.p.rel_tol).abs())).powi(2)
            })
            .sum();

        let const_sum_err_squared: f64 = (0..self.n_lambda)
            .map(|i| {
                let (pi, xi) = (self.x[self.n_system + i], self.lambda[i]);
                (pi / (self.p.abs_tol + (xi * self.p.rel_tol).abs())).powi(2)
            })
            .sum();

        ((sys_sum_err_squared + const_sum_err_squared) / self.n_dofs.max(1) as f64).sqrt()
    }

    fn update_lambda(&mut self) {
        zip!(&mut self.lambda, &self.x.subrows(self.n_system, self.n_lambda))
            .for_each(|unzip!(lambda, dl)| *lambda += *dl);
    }

    fn link(&self, link: LinkId) -> Result<&crate::constraints::Link, EngineError> {
        self.constraints
            .links
            .get(link.0)
            .ok_or(EngineError::UnknownLink(link.0))
    }

    pub fn rho_inf(&self) -> f64 {
        self.rho_inf
    }
}

impl DynamicsEngine for LinearEngine {
    fn n_nodes(&self) -> usize {
        self.state.n_nodes()
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn node_state(&self, node: NodeId) -> NodeKinematics {
        self.state.kinematics(node.0)
    }

    fn add_force(&mut self, node: NodeId, f: &Vec3) {
        (0..3).for_each(|i| self.state.fx[(i, node.0)] += f[i]);
    }

    fn add_torque(&mut self, node: NodeId, t: &Vec3) {
        (0..3).for_each(|i| self.state.fx[(3 + i, node.0)] += t[i]);
    }

    fn add_mass(&mut self, node: NodeId, m: &Mat3) {
        let block = &mut self.accrued_mass[node.0];
        for i in 0..3 {
            for j in 0..3 {
                block[i][j] += m[i][j];
            }
        }
    }

    fn add_mass_6x6(&mut self, node: NodeId, m: &[[f64; 6]; 6]) {
        let block = &mut self.accrued_mass[node.0];
        for i in 0..6 {
            for j in 0..6 {
                block[i][j] += m[i][j];
            }
        }
    }

    fn clear_loads(&mut self) {
        self.state.fx.fill(0.);
        self.accrued_mass
            .iter_mut()
            .for_each(|m| *m = [[0.; 6]; 6]);
    }

    fn command_link(&mut self, link: LinkId, command: LinkCommand) -> Result<(), EngineError> {
        let l = self
            .constraints
            .links
            .get_mut(link.0)
            .ok_or(EngineError::UnknownLink(link.0))?;
        l.command(command);
        Ok(())
    }

    fn link_state(&self, link: LinkId) -> Result<LinkState, EngineError> {
        Ok(self.link(link)?.link_state(&self.state, self.lambda.as_ref()))
    }

    fn step(&mut self, h: f64) -> Result<StepResults, EngineError> {
        if (h - self.p.h).abs() > 1e-12 * self.p.h.abs().max(1.) {
            self.p = StepParameters::new(
                h,
                self.rho_inf,
                self.p.abs_tol,
                self.p.rel_tol,
                self.p.max_iter,
            );
        }

        // Advance motor commands to the end of the step
        self.constraints
            .links
            .iter_mut()
            .for_each(|l| l.advance_command(h));

        self.state.predict_next_state(
            self.p.h,
            self.p.beta,
            self.p.gamma,
            self.p.alpha_m,
            self.p.alpha_f,
        );

        // Create step results
        let mut res = StepResults {
            err: 1000.,
            iter: 0,
            converged: false,
        };

        // Loop until converged or max iteration limit reached
        while res.err > 1. {
            if res.iter >= self.p.max_iter {
                return Err(EngineError::NotConverged {
                    iterations: res.iter,
                    err: res.err,
                });
            }

            self.assemble();

            self.solve_system()?;

            // Convert solution vector to match state node layout
            self.update_x_delta();

            // Calculate convergence error
            res.err = self.calculate_convergence_error();

            // Update state prediction and multipliers
            self.state.update_prediction(
                self.p.h,
                self.p.beta_prime,
                self.p.gamma_prime,
                self.x_delta.as_ref(),
            );
            self.update_lambda();

            res.iter += 1;
        }
        debug!(
            "t={:.4} converged in {} iterations (err={:.2e})",
            self.time + h,
            res.iter,
            res.err
        );

        // Converged, update algorithmic acceleration
        self.state
            .update_algorithmic_acceleration(self.p.alpha_m, self.p.alpha_f);

        self.time += h;
        self.clear_loads();

        if let Some(node) = self.state.first_non_finite_node() {
            return Err(EngineError::NonFinite { node });
        }

        res.converged = true;
        Ok(res)
    }

    fn system_matrices(&self) -> SystemMatrices {
        let ns = self.n_system;
        let mut m = Mat::<f64>::zeros(ns, ns);
        let mut c = Mat::<f64>::zeros(ns, ns);
        let mut k = Mat::<f64>::zeros(ns, ns);
        let mut r = Col::<f64>::zeros(ns);
        self.elements.assemble_system(
            &self.nfm,
            &self.state,
            m.as_mut(),
            c.as_mut(),
            k.as_mut(),
            r.as_mut(),
        );
        for (node, block) in self.accrued_mass.iter().enumerate() {
            self.nfm.add_block(m.as_mut(), node, node, |i, j| block[i][j]);
        }
        SystemMatrices {
            m,
            c,
            k,
            b: self.constraints.b.clone(),
            node_dofs: self
                .nfm
                .node_dofs
                .iter()
                .map(|d| (d.first_dof_index, d.active))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        constraints::{LinkInput, LinkKind},
        elements::{
            masses::{MassElement, Masses},
            springs::{SpringElement, SpringEnd, Springs},
        },
        node::ActiveDOFs,
        quaternion::Quaternion,
    };

    fn oscillator(m: f64, k: f64, rho_inf: f64, h: f64) -> LinearEngine {
        let x0 = [[0., 0., 0.]];
        let nfm = NodeFreedomMap::new(&[ActiveDOFs::Translation]);
        let state = State::new(&x0, &[Quaternion::identity()], &[]);
        let elements = Elements::new(
            Masses::new(&[MassElement::point(0, 0, m, [0.; 3])], &[0., 0., 0.]),
            Springs::new(
                &[SpringElement {
                    id: 0,
                    ends: [SpringEnd::Ground([0., 0., -1.]), SpringEnd::Node(0)],
                    stiffness: k,
                    damping: 0.,
                    undeformed_length: None,
                }],
                &x0,
            ),
        );
        let constraints = Constraints::new(&[], &state, &nfm);
        LinearEngine::new(
            StepParameters::new(h, rho_inf, 1e-7, 1e-5, 10),
            rho_inf,
            nfm,
            elements,
            constraints,
            state,
        )
    }

    #[test]
    fn test_step_parameters() {
        let p = StepParameters::new(0.1, 1., 1e-5, 1e-3, 5);
        assert_relative_eq!(p.alpha_m, 0.5);
        assert_relative_eq!(p.alpha_f, 0.5);
        assert_relative_eq!(p.gamma, 0.5);
        assert_relative_eq!(p.beta, 0.25);
    }

    #[test]
    fn test_free_vibration_period() {
        // m = 1, k = 4 pi^2 gives a 1 s period
        let k = 4. * std::f64::consts::PI.powi(2);
        let h = 0.001;
        let mut engine = oscillator(1., k, 1., h);
        engine.state.u[(2, 0)] = 0.01;
        for _ in 0..1000 {
            engine.step(h).unwrap();
        }
        assert_relative_eq!(engine.state.u[(2, 0)], 0.01, epsilon = 1e-4);
    }

    #[test]
    fn test_static_force_balance() {
        // Damped by numerical dissipation towards the static deflection F/k
        let mut engine = oscillator(1., 100., 0., 0.05);
        for _ in 0..400 {
            engine.add_force(NodeId(0), &[0., 0., 10.]);
            engine.step(0.05).unwrap();
        }
        assert_relative_eq!(engine.state.u[(2, 0)], 0.1, epsilon = 1e-3);
    }

    #[test]
    fn test_fixed_link_holds_node() {
        let x0 = [[0., 0., 0.]];
        let nfm = NodeFreedomMap::new(&[ActiveDOFs::All]);
        let state = State::new(&x0, &[Quaternion::identity()], &[]);
        let elements = Elements::new(
            Masses::new(&[MassElement::point(0, 0, 2., [1.; 3])], &[0., 0., -9.81]),
            Springs::new(&[], &x0),
        );
        let constraints = Constraints::new(
            &[LinkInput {
                id: 0,
                kind: LinkKind::Fixed,
                node_id_base: None,
                node_id_target: 0,
            }],
            &state,
            &nfm,
        );
        let mut engine = LinearEngine::new(
            StepParameters::new(0.01, 0.9, 1e-7, 1e-5, 10),
            0.9,
            nfm,
            elements,
            constraints,
            state,
        );
        for _ in 0..10 {
            engine.step(0.01).unwrap();
        }
        assert_relative_eq!(engine.state.u[(2, 0)], 0., epsilon = 1e-10);
        // Multiplier carries the weight
        assert_relative_eq!(engine.lambda[2], -2. * 9.81, epsilon = 1e-6);
    }

    #[test]
    fn test_motor_speed_tracking() {
        let x0 = [[0., 0., 0.], [0., 0., 0.]];
        let q0 = [Quaternion::identity(); 2];
        let nfm = NodeFreedomMap::new(&[ActiveDOFs::All, ActiveDOFs::All]);
        let state = State::new(&x0, &q0, &[]);
        let elements = Elements::new(
            Masses::new(
                &[
                    MassElement::point(0, 0, 1., [1.; 3]),
                    MassElement::point(1, 1, 1., [1.; 3]),
                ],
                &[0., 0., 0.],
            ),
            Springs::new(&[], &x0),
        );
        let constraints = Constraints::new(
            &[
                LinkInput {
                    id: 0,
                    kind: LinkKind::Fixed,
                    node_id_base: None,
                    node_id_target: 0,
                },
                LinkInput {
                    id: 1,
                    kind: LinkKind::Motor { axis: [1., 0., 0.] },
                    node_id_base: Some(0),
                    node_id_target: 1,
                },
            ],
            &state,
            &nfm,
        );
        let mut engine = LinearEngine::new(
            StepParameters::new(0.01, 0.9, 1e-7, 1e-5, 10),
            0.9,
            nfm,
            elements,
            constraints,
            state,
        );
        engine.command_link(LinkId(1), LinkCommand::Speed(1.)).unwrap();
        for _ in 0..100 {
            engine.step(0.01).unwrap();
        }
        let s = engine.link_state(LinkId(1)).unwrap();
        assert_relative_eq!(s.angle, 1., epsilon = 1e-8);
        assert_relative_eq!(s.speed, 1., epsilon = 1e-3);
        assert!(engine.link_state(LinkId(5)).is_err());
    }
}
