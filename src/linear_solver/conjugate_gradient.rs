use rayon::prelude::*;

use crate::device::Device;
use crate::rigid_body::{RigidBody, RigidBodyType};

use super::{Data, LinearSolver, Parameters, Preconditioner, Reduce, Stencil};

/// Preconditioned conjugate gradient. Strong rigid bodies add their
/// `J M⁻¹ Jᵀ` term to every matrix product, which keeps the coupled system
/// symmetric positive definite.
pub struct ConjugateGradient<P> {
    reduce: Reduce,
    preconditioner: P,
    pub z: Vec<f32>,
    pub r: Vec<f32>,
    pub s: Vec<f32>,
}

impl<P: Preconditioner> ConjugateGradient<P> {
    pub fn new(device: Device, preconditioner: P) -> Self {
        Self {
            reduce: Reduce::new(device),
            preconditioner,
            z: vec![],
            r: vec![],
            s: vec![],
        }
    }
    pub fn preconditioner(&self) -> &P {
        &self.preconditioner
    }
    pub fn preconditioner_mut(&mut self) -> &mut P {
        &mut self.preconditioner
    }
    fn apply_A(&mut self, A: &Stencil, rigid_bodies: &[&RigidBody]) {
        A.multiply(&self.s, &mut self.z);
        for body in rigid_bodies
            .iter()
            .filter(|b| b.body_type() == RigidBodyType::Strong)
        {
            body.pressure(&self.s, &mut self.z);
        }
    }
    fn apply_preconditioner(&mut self, A: &Stencil) {
        self.z.par_iter_mut().for_each(|z| *z = 0.0);
        self.preconditioner.apply(A, &self.r, &mut self.z);
    }
}

fn add_scaled(k: f32, x: &[f32], out: &mut [f32]) {
    out.par_iter_mut().zip(x.par_iter()).for_each(|(o, x)| *o += k * x);
}

impl<P: Preconditioner> LinearSolver for ConjugateGradient<P> {
    fn solve(&mut self, data: &mut Data, params: &mut Parameters, rigid_bodies: &[&RigidBody]) {
        params.reset();
        let n = data.len();
        self.z.resize(n, 0.0);
        self.r.resize(n, 0.0);
        self.s.resize(n, 0.0);
        let (A, b, x) = data.split_mut();
        x.par_iter_mut().for_each(|x| *x = 0.0);
        self.r.copy_from_slice(b);
        let initial_error = self.reduce.max(&self.r);
        params.out_error = initial_error;
        if initial_error == 0.0 {
            return;
        }
        self.apply_preconditioner(&A);
        let mut rho = self.reduce.dot(&self.z, &self.r);
        if rho == 0.0 || rho.is_nan() {
            return;
        }
        self.s.copy_from_slice(&self.z);
        while !params.is_finished(initial_error) {
            self.apply_A(&A, rigid_bodies);
            let sigma = self.reduce.dot(&self.z, &self.s);
            if sigma == 0.0 || sigma.is_nan() {
                log::warn!("conjugate gradient broke down after {} iterations", params.out_iterations);
                break;
            }
            let alpha = rho / sigma;
            add_scaled(alpha, &self.s, x);
            add_scaled(-alpha, &self.z, &mut self.r);
            params.out_iterations += 1;
            params.out_error = self.reduce.max(&self.r);
            if params.is_finished(initial_error) {
                break;
            }
            self.apply_preconditioner(&A);
            let rho_new = self.reduce.dot(&self.z, &self.r);
            let beta = rho_new / rho;
            rho = rho_new;
            self.s
                .par_iter_mut()
                .zip(self.z.par_iter())
                .for_each(|(s, z)| *s = z + beta * *s);
        }
        if params.solver_type == super::SolverType::Iterative
            && params.out_iterations >= params.max_iterations
            && params.max_iterations > 0
        {
            log::warn!(
                "pressure solve hit the iteration cap ({}), error {}",
                params.max_iterations,
                params.out_error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_solver::tests::{poisson, random_rhs};
    use crate::linear_solver::{Diagonal, Identity, IncompletePoisson};

    fn solve_with<P: Preconditioner>(p: P) -> (Data, Parameters) {
        let device = Device::cpu().unwrap();
        let mut data = poisson([32, 32]);
        random_rhs(&mut data, 7);
        let mut params = Parameters::iterative(1e-5);
        let mut cg = ConjugateGradient::new(device, p);
        cg.solve(&mut data, &mut params, &[]);
        (data, params)
    }

    #[test]
    fn converges_with_every_preconditioner() {
        for (data, params) in [
            solve_with(Identity),
            solve_with(Diagonal),
            solve_with(IncompletePoisson::new()),
        ] {
            let initial = data.b.iter().fold(0.0f32, |m, b| m.max(b.abs()));
            assert!(params.out_iterations > 0);
            assert!(params.out_iterations < 1000);
            assert!(params.out_error <= 1e-5 * initial);
            assert!(data.stencil().error(&data.x, &data.b) <= 1e-4 * initial);
        }
    }

    #[test]
    fn incomplete_poisson_needs_fewer_iterations() {
        let (_, plain) = solve_with(Identity);
        let (_, ip) = solve_with(IncompletePoisson::new());
        assert!(ip.out_iterations < plain.out_iterations);
    }

    #[test]
    fn empty_system_short_circuits() {
        let device = Device::cpu().unwrap();
        let mut data = poisson([8, 8]);
        let mut params = Parameters::iterative(1e-5);
        ConjugateGradient::new(device, Diagonal).solve(&mut data, &mut params, &[]);
        assert_eq!(params.out_iterations, 0);
        assert!(data.x.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn fixed_runs_exact_count() {
        let device = Device::cpu().unwrap();
        let mut data = poisson([16, 16]);
        random_rhs(&mut data, 5);
        let mut params = Parameters::fixed(4);
        ConjugateGradient::new(device, Diagonal).solve(&mut data, &mut params, &[]);
        assert_eq!(params.out_iterations, 4);
    }
}
