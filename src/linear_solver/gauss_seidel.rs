use std::f32::consts::PI;

use rayon::prelude::*;

use super::{Preconditioner, Stencil};

/// Red-black successive over-relaxation. Cells of one colour only depend on
/// cells of the other colour, so each half sweep is computed in parallel into
/// a buffer and then written back.
#[derive(Clone, Debug)]
pub struct GaussSeidel {
    pub w: f32,
    pub iterations: usize,
    tmp: Vec<f32>,
}

impl GaussSeidel {
    pub fn new(w: f32, iterations: usize) -> Self {
        Self {
            w,
            iterations,
            tmp: vec![],
        }
    }
    /// Optimal over-relaxation factor for the Poisson matrix of the given size.
    pub fn optimal_w(size: [usize; 2]) -> f32 {
        2.0 / (1.0 + (PI / ((size[0] * size[1]) as f32).sqrt()).sin())
    }
    pub fn for_size(size: [usize; 2], iterations: usize) -> Self {
        Self::new(Self::optimal_w(size), iterations)
    }

    fn half_sweep(&mut self, a: &Stencil, b: &[f32], x: &mut [f32], colour: usize) {
        let nx = a.size[0];
        let w = self.w;
        {
            let x = &*x;
            self.tmp.par_iter_mut().enumerate().for_each(|(c, out)| {
                if (c % nx + c / nx) % 2 != colour {
                    return;
                }
                let d = a.diagonal[c];
                *out = if d == 0.0 {
                    0.0
                } else {
                    (1.0 - w) * x[c] + w * (b[c] - a.off_diagonal(x, c)) / d
                };
            });
        }
        x.par_iter_mut()
            .zip(self.tmp.par_iter())
            .enumerate()
            .for_each(|(c, (x, t))| {
                if (c % nx + c / nx) % 2 == colour {
                    *x = *t;
                }
            });
    }
}

impl Preconditioner for GaussSeidel {
    fn apply(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]) {
        self.tmp.resize(x.len(), 0.0);
        for _ in 0..self.iterations {
            self.half_sweep(a, b, x, 0);
            self.half_sweep(a, b, x, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_solver::tests::{poisson, random_rhs};

    #[test]
    fn converges_on_small_poisson() {
        let mut data = poisson([8, 8]);
        random_rhs(&mut data, 11);
        let e0 = data.stencil().error(&data.x, &data.b);
        let mut gs = GaussSeidel::for_size([8, 8], 100);
        let (a, b, x) = data.split_mut();
        gs.apply(&a, b, x);
        let e1 = data.stencil().error(&data.x, &data.b);
        assert!(e1 < 1e-3 * e0, "{} !< {}", e1, e0);
    }

    #[test]
    fn optimal_w_is_over_relaxed() {
        let w = GaussSeidel::optimal_w([64, 64]);
        assert!(w > 1.0 && w < 2.0);
    }
}
