use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rigid_body::{RigidBody, RigidBodyType};

pub mod conjugate_gradient;
pub mod diagonal;
pub mod gauss_seidel;
pub mod incomplete_poisson;
pub mod jacobi;
pub mod multigrid;
pub mod reduce;
pub mod transfer;

pub use conjugate_gradient::ConjugateGradient;
pub use diagonal::{Diagonal, Identity};
pub use gauss_seidel::GaussSeidel;
pub use incomplete_poisson::IncompletePoisson;
pub use jacobi::Jacobi;
pub use multigrid::Multigrid;
pub use reduce::Reduce;

/// The pressure system of a grid: a symmetric 5-point stencil stored as the
/// diagonal plus the left/bottom off-diagonal coefficients of every cell.
/// `lower[c][0]` couples `c` with `c - 1`, `lower[c][1]` couples `c` with
/// `c - nx`. Cells with a zero diagonal do not take part in the system.
#[derive(Clone, Debug, Default)]
pub struct Data {
    pub size: [usize; 2],
    pub diagonal: Vec<f32>,
    pub lower: Vec<[f32; 2]>,
    pub b: Vec<f32>,
    pub x: Vec<f32>,
}

impl Data {
    pub fn new(size: [usize; 2]) -> Result<Self> {
        if size[0] == 0 || size[1] == 0 {
            return Err(Error::InvalidSize(size[0], size[1]));
        }
        let n = size[0] * size[1];
        Ok(Self {
            size,
            diagonal: vec![0.0; n],
            lower: vec![[0.0; 2]; n],
            b: vec![0.0; n],
            x: vec![0.0; n],
        })
    }
    pub fn len(&self) -> usize {
        self.diagonal.len()
    }
    pub fn is_empty(&self) -> bool {
        self.diagonal.is_empty()
    }
    pub fn stencil(&self) -> Stencil<'_> {
        Stencil {
            size: self.size,
            diagonal: &self.diagonal,
            lower: &self.lower,
        }
    }
    /// Borrows the matrix and right-hand side while handing out the solution.
    pub fn split_mut(&mut self) -> (Stencil<'_>, &[f32], &mut [f32]) {
        let Data {
            size,
            diagonal,
            lower,
            b,
            x,
        } = self;
        (
            Stencil {
                size: *size,
                diagonal: diagonal.as_slice(),
                lower: lower.as_slice(),
            },
            b.as_slice(),
            x.as_mut_slice(),
        )
    }
}

/// Read-only view of the matrix part of [`Data`].
#[derive(Clone, Copy)]
pub struct Stencil<'a> {
    pub size: [usize; 2],
    pub diagonal: &'a [f32],
    pub lower: &'a [[f32; 2]],
}

impl<'a> Stencil<'a> {
    pub fn len(&self) -> usize {
        self.diagonal.len()
    }
    pub fn is_empty(&self) -> bool {
        self.diagonal.is_empty()
    }
    /// Sum of `A(c, n) * x[n]` over the four neighbours of `c`.
    #[inline]
    pub fn off_diagonal(&self, x: &[f32], c: usize) -> f32 {
        let nx = self.size[0];
        let i = c % nx;
        let mut sum = 0.0;
        if i > 0 {
            sum += self.lower[c][0] * x[c - 1];
        }
        if c >= nx {
            sum += self.lower[c][1] * x[c - nx];
        }
        if i + 1 < nx {
            sum += self.lower[c + 1][0] * x[c + 1];
        }
        if c + nx < self.len() {
            sum += self.lower[c + nx][1] * x[c + nx];
        }
        sum
    }
    /// `out = A x`
    pub fn multiply(&self, x: &[f32], out: &mut [f32]) {
        out.par_iter_mut().enumerate().for_each(|(c, out)| {
            *out = self.diagonal[c] * x[c] + self.off_diagonal(x, c);
        });
    }
    /// `out = b - A x`
    pub fn residual(&self, x: &[f32], b: &[f32], out: &mut [f32]) {
        out.par_iter_mut().enumerate().for_each(|(c, out)| {
            *out = if self.diagonal[c] == 0.0 {
                0.0
            } else {
                b[c] - (self.diagonal[c] * x[c] + self.off_diagonal(x, c))
            };
        });
    }
    /// Max-norm of `b - A x` over the active cells.
    pub fn error(&self, x: &[f32], b: &[f32]) -> f32 {
        (0..self.len())
            .into_par_iter()
            .filter(|&c| self.diagonal[c] != 0.0)
            .map(|c| (b[c] - (self.diagonal[c] * x[c] + self.off_diagonal(x, c))).abs())
            .reduce(|| 0.0, f32::max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverType {
    Fixed,
    Iterative,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Parameters {
    pub solver_type: SolverType,
    pub max_iterations: u32,
    pub tolerance: f32,
    #[serde(skip)]
    pub out_iterations: u32,
    #[serde(skip)]
    pub out_error: f32,
}

impl Parameters {
    pub fn fixed(iterations: u32) -> Self {
        Self {
            solver_type: SolverType::Fixed,
            max_iterations: iterations,
            tolerance: 0.0,
            out_iterations: 0,
            out_error: 0.0,
        }
    }
    pub fn iterative(tolerance: f32) -> Self {
        Self {
            solver_type: SolverType::Iterative,
            max_iterations: 1000,
            tolerance,
            out_iterations: 0,
            out_error: 0.0,
        }
    }
    pub fn is_finished(&self, initial_error: f32) -> bool {
        match self.solver_type {
            SolverType::Fixed => self.out_iterations >= self.max_iterations,
            SolverType::Iterative if self.max_iterations > 0 => {
                self.out_iterations >= self.max_iterations
                    || self.out_error <= self.tolerance * initial_error
            }
            SolverType::Iterative => self.out_error <= self.tolerance,
        }
    }
    pub fn reset(&mut self) {
        self.out_error = 0.0;
        self.out_iterations = 0;
    }
}

/// Approximate inverse used by the Krylov solver, also the smoothing
/// interface of the multigrid levels. Implementations improve `x` towards
/// `A⁻¹ b`; callers clear `x` first when a fresh estimate is wanted.
pub trait Preconditioner: Send {
    fn apply(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]);
}

pub trait LinearSolver {
    /// Checks that a rigid body of this type can be coupled with the solver.
    fn bind_rigid_body(&self, _body_type: RigidBodyType) -> Result<()> {
        Ok(())
    }
    fn solve(&mut self, data: &mut Data, params: &mut Parameters, rigid_bodies: &[&RigidBody]);
    fn error(&self, data: &Data) -> f32 {
        data.stencil().error(&data.x, &data.b)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionerKind {
    Identity,
    Diagonal,
    IncompletePoisson,
    Jacobi,
    GaussSeidel,
    Multigrid,
}

pub enum AnyPreconditioner {
    Identity(Identity),
    Diagonal(Diagonal),
    IncompletePoisson(IncompletePoisson),
    Jacobi(Jacobi),
    GaussSeidel(GaussSeidel),
    Multigrid(Box<Multigrid>),
}

impl AnyPreconditioner {
    pub fn multigrid_mut(&mut self) -> Option<&mut Multigrid> {
        match self {
            AnyPreconditioner::Multigrid(mg) => Some(&mut **mg),
            _ => None,
        }
    }
    pub fn kind(&self) -> PreconditionerKind {
        match self {
            AnyPreconditioner::Identity(_) => PreconditionerKind::Identity,
            AnyPreconditioner::Diagonal(_) => PreconditionerKind::Diagonal,
            AnyPreconditioner::IncompletePoisson(_) => PreconditionerKind::IncompletePoisson,
            AnyPreconditioner::Jacobi(_) => PreconditionerKind::Jacobi,
            AnyPreconditioner::GaussSeidel(_) => PreconditionerKind::GaussSeidel,
            AnyPreconditioner::Multigrid(_) => PreconditionerKind::Multigrid,
        }
    }
}

impl Preconditioner for AnyPreconditioner {
    fn apply(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]) {
        match self {
            AnyPreconditioner::Identity(p) => p.apply(a, b, x),
            AnyPreconditioner::Diagonal(p) => p.apply(a, b, x),
            AnyPreconditioner::IncompletePoisson(p) => p.apply(a, b, x),
            AnyPreconditioner::Jacobi(p) => p.apply(a, b, x),
            AnyPreconditioner::GaussSeidel(p) => p.apply(a, b, x),
            AnyPreconditioner::Multigrid(p) => p.apply(a, b, x),
        }
    }
}

/// Copy of the system taken after a solve, for inspection.
#[derive(Clone, Debug, Default)]
pub struct DebugData {
    pub diagonal: Vec<f32>,
    pub lower: Vec<[f32; 2]>,
    pub b: Vec<f32>,
    pub x: Vec<f32>,
}

impl DebugData {
    pub fn copy(&mut self, data: &Data) {
        self.diagonal.clone_from(&data.diagonal);
        self.lower.clone_from(&data.lower);
        self.b.clone_from(&data.b);
        self.x.clone_from(&data.x);
    }
}
