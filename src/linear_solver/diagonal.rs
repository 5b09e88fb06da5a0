use rayon::prelude::*;

use super::{Preconditioner, Stencil};

/// `x = b`
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Preconditioner for Identity {
    fn apply(&mut self, _a: &Stencil, b: &[f32], x: &mut [f32]) {
        x.par_iter_mut().zip(b.par_iter()).for_each(|(x, b)| *x = *b);
    }
}

/// `x = b / diag(A)`, cells outside the system are passed through.
#[derive(Clone, Copy, Debug, Default)]
pub struct Diagonal;

impl Preconditioner for Diagonal {
    fn apply(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]) {
        x.par_iter_mut().enumerate().for_each(|(c, x)| {
            let d = a.diagonal[c];
            *x = if d == 0.0 { b[c] } else { b[c] / d };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_solver::Data;

    #[test]
    fn divides_by_diagonal() {
        let mut data = Data::new([2, 1]).unwrap();
        data.diagonal = vec![4.0, 0.0];
        let b = [2.0, 3.0];
        let mut x = [0.0; 2];
        Diagonal.apply(&data.stencil(), &b, &mut x);
        assert_eq!(x, [0.5, 3.0]);
        Identity.apply(&data.stencil(), &b, &mut x);
        assert_eq!(x, b);
    }
}
