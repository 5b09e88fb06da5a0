use rayon::prelude::*;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::grid::{Grid, CELL_CENTRED};
use crate::level_set::{phi_scale, FAR};
use crate::pressure::{build_matrix, FaceWeights};
use crate::rigid_body::{RigidBody, RigidBodyType};

use super::transfer::{prolongate, restrict};
use super::{Data, GaussSeidel, Jacobi, LinearSolver, Parameters, Preconditioner, Reduce, Stencil};

/// Levels are halved while both sides stay above this.
pub const MIN_LEVEL_SIZE: usize = 16;
const SMOOTHER_W: f32 = 2.0 / 3.0;
const SMOOTHER_ITERATIONS: usize = 3;
const COARSE_ITERATIONS: usize = 32;

/// One coarse level. Its matrix is rebuilt from the fine level sets by
/// [`Multigrid::build_hierarchies`].
struct Level {
    data: Data,
    liquid_phi: Grid<f32>,
    solid_phi: Grid<f32>,
    weights: FaceWeights,
}

/// Geometric multigrid on the pressure matrix. Used either as a standalone
/// solver or as the preconditioner of [`super::ConjugateGradient`].
pub struct Multigrid {
    reduce: Reduce,
    sizes: Vec<[usize; 2]>,
    levels: Vec<Level>,
    residuals: Vec<Vec<f32>>,
    smoothers: Vec<Jacobi>,
    coarse_smoother: GaussSeidel,
    delta: f32,
}

/// Sizes of every level, finest first.
pub fn level_sizes(size: [usize; 2]) -> Result<Vec<[usize; 2]>> {
    if size[0] == 0 || size[1] == 0 {
        return Err(Error::InvalidSize(size[0], size[1]));
    }
    let mut sizes = vec![size];
    let mut s = size;
    while s[0] > MIN_LEVEL_SIZE && s[1] > MIN_LEVEL_SIZE {
        if s[0] % 2 != 0 || s[1] % 2 != 0 {
            return Err(Error::InvalidMultigridSize(size[0], size[1]));
        }
        s = [s[0] / 2, s[1] / 2];
        sizes.push(s);
    }
    Ok(sizes)
}

impl Multigrid {
    pub fn new(device: Device, size: [usize; 2], delta: f32) -> Result<Self> {
        let sizes = level_sizes(size)?;
        let depth = sizes.len() - 1;
        let mut levels = Vec::with_capacity(depth);
        for s in &sizes[1..] {
            levels.push(Level {
                data: Data::new(*s)?,
                liquid_phi: Grid::new(*s, CELL_CENTRED, 1.0)?,
                solid_phi: Grid::new(*s, CELL_CENTRED, FAR)?,
                weights: FaceWeights::new(*s)?,
            });
        }
        let coarsest = sizes[depth];
        Ok(Self {
            reduce: Reduce::new(device),
            residuals: sizes[..depth].iter().map(|s| vec![0.0; s[0] * s[1]]).collect(),
            smoothers: (0..depth).map(|_| Jacobi::new(SMOOTHER_W, SMOOTHER_ITERATIONS)).collect(),
            coarse_smoother: GaussSeidel::for_size(coarsest, COARSE_ITERATIONS),
            sizes,
            levels,
            delta,
        })
    }
    /// Number of coarse levels below the finest one.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
    pub fn sizes(&self) -> &[[usize; 2]] {
        &self.sizes
    }

    /// Rebuilds the coarse matrices from the fine level sets. `dx` is the
    /// cell width of the finest level.
    pub fn build_hierarchies(&mut self, dx: f32, solid_phi: &Grid<f32>, liquid_phi: &Grid<f32>) -> Result<()> {
        let mut fine_solid = solid_phi;
        let mut fine_liquid = liquid_phi;
        let mut level_dx = dx;
        for level in self.levels.iter_mut() {
            let res = [(fine_liquid.res[0] + 1) / 2, (fine_liquid.res[1] + 1) / 2];
            if level.liquid_phi.res != res {
                level.liquid_phi = Grid::new(res, CELL_CENTRED, 1.0)?;
                level.solid_phi = Grid::new(res, CELL_CENTRED, FAR)?;
                level.weights = FaceWeights::new(res)?;
            }
            phi_scale(fine_liquid, &mut level.liquid_phi);
            phi_scale(fine_solid, &mut level.solid_phi);
            level.weights.compute(&level.solid_phi);
            level_dx *= 2.0;
            build_matrix(self.delta, level_dx, &level.liquid_phi, &level.weights, &mut level.data);
            fine_solid = &level.solid_phi;
            fine_liquid = &level.liquid_phi;
        }
        Ok(())
    }

    /// V-cycle starting at level `depth`, whose system lives in the level
    /// above it (or is passed in for the finest level).
    fn v_cycle_from(&mut self, depth: usize, fine: Option<(&Stencil, &[f32], &mut [f32])>) {
        let coarse_smoother = &mut self.coarse_smoother;
        match fine {
            Some((a, b, x)) => v_cycle(
                &mut self.levels[depth..],
                &mut self.smoothers[depth..],
                &mut self.residuals[depth..],
                coarse_smoother,
                a,
                b,
                x,
            ),
            None => {
                let (upper, lower) = self.levels.split_at_mut(depth);
                let level = &mut upper[depth - 1];
                let (a, b, x) = level.data.split_mut();
                v_cycle(
                    lower,
                    &mut self.smoothers[depth..],
                    &mut self.residuals[depth..],
                    coarse_smoother,
                    &a,
                    b,
                    x,
                );
            }
        }
    }

    /// Solves on the coarsest level, then walks up, prolongating each
    /// solution as the initial guess of a V-cycle on the next finer level.
    fn full_cycle(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]) {
        let depth = self.depth();
        if depth == 0 {
            self.coarse_smoother.apply(a, b, x);
            return;
        }
        // restrict the right-hand side all the way down
        for d in 1..=depth {
            let (upper, lower) = self.levels.split_at_mut(d - 1);
            let coarse = &mut lower[0].data;
            let (fine_size, fine_diag, fine_b): ([usize; 2], &[f32], &[f32]) = match upper.last() {
                None => (a.size, a.diagonal, b),
                Some(l) => (l.data.size, l.data.diagonal.as_slice(), l.data.b.as_slice()),
            };
            restrict(fine_size, fine_diag, fine_b, coarse.size, &coarse.diagonal, &mut coarse.b);
            coarse.x.par_iter_mut().for_each(|x| *x = 0.0);
        }
        {
            let level = &mut self.levels[depth - 1];
            let (a, b, x) = level.data.split_mut();
            self.coarse_smoother.apply(&a, b, x);
        }
        for d in (1..depth).rev() {
            let (upper, lower) = self.levels.split_at_mut(d);
            let fine = &mut upper[d - 1].data;
            let coarse = &lower[0].data;
            fine.x.par_iter_mut().for_each(|x| *x = 0.0);
            prolongate(coarse.size, &coarse.x, fine.size, &fine.diagonal, &mut fine.x);
            self.v_cycle_from(d, None);
        }
        x.par_iter_mut().for_each(|x| *x = 0.0);
        let coarse = &self.levels[0].data;
        prolongate(coarse.size, &coarse.x, a.size, a.diagonal, x);
        self.v_cycle_from(0, Some((a, b, x)));
    }
}

#[allow(clippy::too_many_arguments)]
fn v_cycle(
    levels: &mut [Level],
    smoothers: &mut [Jacobi],
    residuals: &mut [Vec<f32>],
    coarse_smoother: &mut GaussSeidel,
    a: &Stencil,
    b: &[f32],
    x: &mut [f32],
) {
    let (Some((level, levels)), Some((smoother, smoothers)), Some((residual, residuals))) = (
        levels.split_first_mut(),
        smoothers.split_first_mut(),
        residuals.split_first_mut(),
    ) else {
        coarse_smoother.apply(a, b, x);
        return;
    };
    smoother.apply(a, b, x);
    a.residual(x, b, residual);
    {
        let coarse = &mut level.data;
        let (coarse_a, coarse_b, coarse_x) = (
            Stencil {
                size: coarse.size,
                diagonal: &coarse.diagonal,
                lower: &coarse.lower,
            },
            &mut coarse.b,
            &mut coarse.x,
        );
        restrict(a.size, a.diagonal, residual, coarse_a.size, coarse_a.diagonal, coarse_b);
        coarse_x.par_iter_mut().for_each(|x| *x = 0.0);
        v_cycle(levels, smoothers, residuals, coarse_smoother, &coarse_a, coarse_b, coarse_x);
        prolongate(coarse_a.size, coarse_x, a.size, a.diagonal, x);
    }
    smoother.apply(a, b, x);
}

impl Preconditioner for Multigrid {
    fn apply(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]) {
        x.par_iter_mut().for_each(|x| *x = 0.0);
        self.v_cycle_from(0, Some((a, b, x)));
    }
}

impl LinearSolver for Multigrid {
    fn bind_rigid_body(&self, body_type: RigidBodyType) -> Result<()> {
        if body_type == RigidBodyType::Strong {
            Err(Error::StrongCouplingUnsupported)
        } else {
            Ok(())
        }
    }
    fn solve(&mut self, data: &mut Data, params: &mut Parameters, _rigid_bodies: &[&RigidBody]) {
        params.reset();
        let (a, b, x) = data.split_mut();
        x.par_iter_mut().for_each(|x| *x = 0.0);
        let initial_error = self.reduce.max(b);
        params.out_error = initial_error;
        if initial_error == 0.0 {
            return;
        }
        self.full_cycle(&a, b, x);
        params.out_error = a.error(x, b);
        while !params.is_finished(initial_error) {
            self.v_cycle_from(0, Some((&a, b, &mut *x)));
            params.out_iterations += 1;
            params.out_error = a.error(x, b);
        }
    }
}
