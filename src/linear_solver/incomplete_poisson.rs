use rayon::prelude::*;

use super::{Preconditioner, Stencil};

/// Incomplete Poisson preconditioner `M⁻¹ = (I - L D⁻¹)(I - D⁻¹ Lᵀ)` where `L`
/// is the strictly lower part of `A`. Being a product `K Kᵀ` it stays
/// symmetric positive definite, and each factor is a single gather pass.
#[derive(Clone, Debug, Default)]
pub struct IncompletePoisson {
    y: Vec<f32>,
}

impl IncompletePoisson {
    pub fn new() -> Self {
        Self::default()
    }
}

#[inline]
fn inv(d: f32) -> f32 {
    if d == 0.0 {
        0.0
    } else {
        1.0 / d
    }
}

impl Preconditioner for IncompletePoisson {
    fn apply(&mut self, a: &Stencil, b: &[f32], x: &mut [f32]) {
        let nx = a.size[0];
        let n = a.len();
        self.y.resize(n, 0.0);
        // y = (I - D⁻¹ Lᵀ) b
        self.y.par_iter_mut().enumerate().for_each(|(c, y)| {
            if a.diagonal[c] == 0.0 {
                *y = 0.0;
                return;
            }
            let mut upper = 0.0;
            if c % nx + 1 < nx {
                upper += a.lower[c + 1][0] * b[c + 1];
            }
            if c + nx < n {
                upper += a.lower[c + nx][1] * b[c + nx];
            }
            *y = b[c] - inv(a.diagonal[c]) * upper;
        });
        // x = (I - L D⁻¹) y
        let y = &self.y;
        x.par_iter_mut().enumerate().for_each(|(c, x)| {
            if a.diagonal[c] == 0.0 {
                *x = 0.0;
                return;
            }
            let mut lower = 0.0;
            if c % nx > 0 {
                lower += a.lower[c][0] * inv(a.diagonal[c - 1]) * y[c - 1];
            }
            if c >= nx {
                lower += a.lower[c][1] * inv(a.diagonal[c - nx]) * y[c - nx];
            }
            *x = y[c] - lower;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_solver::tests::poisson;

    fn column(size: [usize; 2], k: usize) -> Vec<f32> {
        let data = poisson(size);
        let mut e = vec![0.0; data.len()];
        e[k] = 1.0;
        let mut out = vec![0.0; data.len()];
        IncompletePoisson::new().apply(&data.stencil(), &e, &mut out);
        out
    }

    #[test]
    fn is_symmetric() {
        let size = [5, 4];
        let n = size[0] * size[1];
        let cols: Vec<Vec<f32>> = (0..n).map(|k| column(size, k)).collect();
        for i in 0..n {
            for j in 0..n {
                assert!((cols[i][j] - cols[j][i]).abs() < 1e-6, "({}, {})", i, j);
            }
        }
    }

    #[test]
    fn is_positive_on_unit_vectors() {
        let size = [5, 4];
        for k in 0..20 {
            assert!(column(size, k)[k] > 0.0);
        }
    }
}
