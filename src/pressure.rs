use glam::Vec2;
use rayon::prelude::*;

use crate::error::Result;
use crate::grid::{Grid, U_FACES, V_FACES};
use crate::linear_solver::Data;
use crate::velocity::{FaceMask, Velocity};

/// Fraction of the segment between two samples where `phi < 0`.
pub fn fraction_inside(phi_left: f32, phi_right: f32) -> f32 {
    if phi_left < 0.0 && phi_right < 0.0 {
        1.0
    } else if phi_left < 0.0 && phi_right >= 0.0 {
        phi_left / (phi_left - phi_right)
    } else if phi_left >= 0.0 && phi_right < 0.0 {
        phi_right / (phi_right - phi_left)
    } else {
        0.0
    }
}

const MIN_THETA: f32 = 0.01;

/// Open fraction of every face, from the solid level set sampled at the
/// face's two end corners. Faces on the border of the domain are closed.
#[derive(Clone, Debug)]
pub struct FaceWeights {
    pub u: Grid<f32>,
    pub v: Grid<f32>,
}

impl FaceWeights {
    pub fn new(res: [usize; 2]) -> Result<Self> {
        Ok(Self {
            u: Grid::new([res[0] + 1, res[1]], U_FACES, 0.0)?,
            v: Grid::new([res[0], res[1] + 1], V_FACES, 0.0)?,
        })
    }
    pub fn res(&self) -> [usize; 2] {
        [self.v.res[0], self.u.res[1]]
    }
    pub fn compute(&mut self, solid_phi: &Grid<f32>) {
        let [nx, ny] = self.res();
        // corner (i, j) of the cell grid, averaging the four cells around it
        let corner = |i: usize, j: usize| solid_phi.bilinear(Vec2::new(i as f32, j as f32));
        self.u.par_fill_with(|i, j| {
            if i == 0 || i == nx {
                0.0
            } else {
                (1.0 - fraction_inside(corner(i, j + 1), corner(i, j))).clamp(0.0, 1.0)
            }
        });
        self.v.par_fill_with(|i, j| {
            if j == 0 || j == ny {
                0.0
            } else {
                (1.0 - fraction_inside(corner(i + 1, j), corner(i, j))).clamp(0.0, 1.0)
            }
        });
    }
}

#[inline]
fn is_liquid(liquid_phi: &Grid<f32>, i: i32, j: i32) -> bool {
    !liquid_phi.oob(i, j) && liquid_phi.at_index(i as usize, j as usize) < 0.0
}

#[inline]
fn phi_or_air(liquid_phi: &Grid<f32>, i: i32, j: i32) -> f32 {
    if liquid_phi.oob(i, j) {
        1.0
    } else {
        liquid_phi.at_index(i as usize, j as usize)
    }
}

/// Fills the matrix part of `data` for the liquid cells of `liquid_phi`.
/// `data` may be larger than the domain, the extra cells stay inactive.
pub fn build_matrix(delta: f32, dx: f32, liquid_phi: &Grid<f32>, weights: &FaceWeights, data: &mut Data) {
    let nx = data.size[0];
    let term = delta / (dx * dx);
    data.diagonal
        .par_iter_mut()
        .zip(data.lower.par_iter_mut())
        .enumerate()
        .for_each(|(c, (diag, lower))| {
            let (i, j) = ((c % nx) as i32, (c / nx) as i32);
            *diag = 0.0;
            *lower = [0.0; 2];
            if !is_liquid(liquid_phi, i, j) {
                return;
            }
            let phi = liquid_phi.at_index(i as usize, j as usize);
            let (iu, ju) = (i as usize, j as usize);
            let faces = [
                (weights.u.at_index(iu + 1, ju), i + 1, j, None),
                (weights.u.at_index(iu, ju), i - 1, j, Some(0)),
                (weights.v.at_index(iu, ju + 1), i, j + 1, None),
                (weights.v.at_index(iu, ju), i, j - 1, Some(1)),
            ];
            for (w, ni, nj, slot) in faces {
                if w <= 0.0 {
                    continue;
                }
                let t = term * w;
                if is_liquid(liquid_phi, ni, nj) {
                    *diag += t;
                    if let Some(k) = slot {
                        lower[k] = -t;
                    }
                } else {
                    let theta = fraction_inside(phi, phi_or_air(liquid_phi, ni, nj)).max(MIN_THETA);
                    *diag += t / theta;
                }
            }
        });
}

/// Projection onto divergence free velocity over the liquid region.
pub struct Pressure {
    delta: f32,
    dx: f32,
    weights: FaceWeights,
}

impl Pressure {
    pub fn new(res: [usize; 2], dx: f32, delta: f32) -> Result<Self> {
        Ok(Self {
            delta,
            dx,
            weights: FaceWeights::new(res)?,
        })
    }
    pub fn delta(&self) -> f32 {
        self.delta
    }
    pub fn dx(&self) -> f32 {
        self.dx
    }
    pub fn weights(&self) -> &FaceWeights {
        &self.weights
    }

    /// Matrix and right-hand side `b = -div(u)` for the current velocity.
    pub fn build_linear_equation(
        &mut self,
        data: &mut Data,
        velocity: &Velocity,
        solid_phi: &Grid<f32>,
        liquid_phi: &Grid<f32>,
    ) {
        self.weights.compute(solid_phi);
        build_matrix(self.delta, self.dx, liquid_phi, &self.weights, data);
        let nx = data.size[0];
        let (u, v) = (velocity.u(), velocity.v());
        let weights = &self.weights;
        let dx = self.dx;
        data.b.par_iter_mut().zip(data.x.par_iter_mut()).enumerate().for_each(|(c, (b, x))| {
            let (i, j) = (c % nx, c / nx);
            *x = 0.0;
            *b = if is_liquid(liquid_phi, i as i32, j as i32) {
                -(weights.u.at_index(i + 1, j) * u.at_index(i + 1, j)
                    - weights.u.at_index(i, j) * u.at_index(i, j)
                    + weights.v.at_index(i, j + 1) * v.at_index(i, j + 1)
                    - weights.v.at_index(i, j) * v.at_index(i, j))
                    / dx
            } else {
                0.0
            };
        });
    }

    /// Subtracts the pressure gradient on faces next to liquid, zeroes the
    /// rest and records which faces now carry a valid velocity.
    pub fn apply_pressure(&self, data: &Data, velocity: &mut Velocity, liquid_phi: &Grid<f32>, valid: &mut FaceMask) {
        let nx = data.size[0];
        let p = |i: i32, j: i32| {
            if is_liquid(liquid_phi, i, j) {
                data.x[i as usize + j as usize * nx]
            } else {
                0.0
            }
        };
        let scale = self.delta / self.dx;
        let project = |w: f32, a: (i32, i32), b: (i32, i32), vel: &mut f32, valid: &mut bool| {
            let (la, lb) = (is_liquid(liquid_phi, a.0, a.1), is_liquid(liquid_phi, b.0, b.1));
            if w > 0.0 && (la || lb) {
                let theta = if la && lb {
                    1.0
                } else {
                    fraction_inside(phi_or_air(liquid_phi, a.0, a.1), phi_or_air(liquid_phi, b.0, b.1))
                        .max(MIN_THETA)
                };
                *vel -= scale * (p(b.0, b.1) - p(a.0, a.1)) / theta;
                *valid = true;
            } else {
                *vel = 0.0;
                *valid = false;
            }
        };
        let weights = &self.weights;
        let ux = weights.u.res[0];
        velocity
            .u_mut()
            .values
            .par_iter_mut()
            .zip(valid.u.values.par_iter_mut())
            .enumerate()
            .for_each(|(f, (u, ok))| {
                let (i, j) = (f % ux, f / ux);
                let w = weights.u.at_index(i, j);
                let (i, j) = (i as i32, j as i32);
                project(w, (i - 1, j), (i, j), u, ok);
            });
        let vx = weights.v.res[0];
        velocity
            .v_mut()
            .values
            .par_iter_mut()
            .zip(valid.v.values.par_iter_mut())
            .enumerate()
            .for_each(|(f, (v, ok))| {
                let (i, j) = (f % vx, f / vx);
                let w = weights.v.at_index(i, j);
                let (i, j) = (i as i32, j as i32);
                project(w, (i, j - 1), (i, j), v, ok);
            });
    }
}
