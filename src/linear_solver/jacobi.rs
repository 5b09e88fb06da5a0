use rayon::prelude::*;

use super::{Preconditioner, Stencil};

/// Damped Jacobi iterations, ping-ponging between `x` and an internal buffer.
#[derive(Clone, Debug)]
pub struct Jacobi {
    pub w: f32,
    pub iterations: usize,
    tmp: Vec<f32>,
}

impl Jacobi {
    pub fn new(w: f32, iterations: usize) -> Self {
        Self {
            w,
            iterations,
            tmp: vec![],
        }
    }
}

impl Default for Jacobi {
    fn default() -> Self {
        Self::new(1.0, 1)
    }
}

fn jacobi_step(a: &Stencil, w: f32, b: &[f32], x: &[f32], out: &mut [f32]) {
    out.par_iter_mut().enumerate().for_each(|(c, out)| {
        let d = a.diagonal[c];
        *out = if d == 0.0 {
            0.0
        } else {
            (1.0 - w) * x[c] + w * (b[c] - a.off_diagonal(x, c)) / d
        };
    });
}

impl Preconditioner for Jacobi {
    fn apply(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]) {
        self.tmp.resize(x.len(), 0.0);
        for it in 0..self.iterations {
            if it % 2 == 0 {
                jacobi_step(a, self.w, b, x, &mut self.tmp);
            } else {
                jacobi_step(a, self.w, b, &self.tmp, x);
            }
        }
        if self.iterations % 2 == 1 {
            x.copy_from_slice(&self.tmp);
        }
    }
}
