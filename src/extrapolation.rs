use glam::Vec2;

use crate::error::Result;
use crate::grid::Grid;
use crate::pressure::FaceWeights;
use crate::velocity::{sample_faces, FaceMask, InterpolationMode, Velocity};

pub const EXTRAPOLATION_ITERATIONS: usize = 10;

/// One Jacobi layer: every invalid sample with a valid 4-neighbour takes their
/// average and becomes valid.
fn extrapolate_layer(values: &Grid<f32>, valid: &Grid<bool>, out: &mut Grid<f32>, out_valid: &mut Grid<bool>) {
    out.par_fill_with(|i, j| {
        if valid.at_index(i, j) {
            return values.at_index(i, j);
        }
        let (mut sum, mut n) = (0.0, 0);
        for (di, dj) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let (x, y) = (i as i32 + di, j as i32 + dj);
            if !valid.oob(x, y) && valid.at_index(x as usize, y as usize) {
                sum += values.at_index(x as usize, y as usize);
                n += 1;
            }
        }
        if n > 0 {
            sum / n as f32
        } else {
            values.at_index(i, j)
        }
    });
    out_valid.par_fill_with(|i, j| {
        valid.at_index(i, j)
            || [(1, 0), (-1, 0), (0, 1), (0, -1)].iter().any(|(di, dj)| {
                let (x, y) = (i as i32 + di, j as i32 + dj);
                !valid.oob(x, y) && valid.at_index(x as usize, y as usize)
            })
    });
}

pub struct Extrapolation {
    iterations: usize,
    next_valid: FaceMask,
}

impl Extrapolation {
    pub fn new(res: [usize; 2], iterations: usize) -> Result<Self> {
        Ok(Self {
            iterations,
            next_valid: FaceMask::new(res)?,
        })
    }
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Spreads valid face velocities into the invalid faces, one layer of
    /// faces per iteration. `valid` is updated to the grown mask.
    pub fn extrapolate(&mut self, velocity: &mut Velocity, valid: &mut FaceMask) {
        for _ in 0..self.iterations {
            let (u, u_out) = velocity.u.split();
            extrapolate_layer(u, &valid.u, u_out, &mut self.next_valid.u);
            let (v, v_out) = velocity.v.split();
            extrapolate_layer(v, &valid.v, v_out, &mut self.next_valid.v);
            velocity.copy_back();
            std::mem::swap(valid, &mut self.next_valid);
        }
    }

    /// Removes the normal component of the velocity on closed faces, using
    /// the normal of the solid level set there. The domain walls let no
    /// flow through.
    pub fn constrain_velocity(&self, velocity: &mut Velocity, solid_phi: &Grid<f32>, weights: &FaceWeights) {
        let [nx, ny] = velocity.res();
        let (u, u_out) = velocity.u.split();
        let (v, v_out) = velocity.v.split();
        let tangential = |p: Vec2| {
            let vel = sample_faces(u, v, p, InterpolationMode::Linear);
            let n = solid_phi.gradient(p).normalize_or_zero();
            vel - vel.dot(n) * n
        };
        u_out.par_fill_with(|i, j| {
            if i == 0 || i == nx {
                0.0
            } else if weights.u.at_index(i, j) == 0.0 {
                tangential(Vec2::new(i as f32, j as f32 + 0.5)).x
            } else {
                u.at_index(i, j)
            }
        });
        v_out.par_fill_with(|i, j| {
            if j == 0 || j == ny {
                0.0
            } else if weights.v.at_index(i, j) == 0.0 {
                tangential(Vec2::new(i as f32 + 0.5, j as f32)).y
            } else {
                v.at_index(i, j)
            }
        });
        velocity.copy_back();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CELL_CENTRED;

    #[test]
    fn fills_one_layer_per_iteration() {
        let mut vel = Velocity::new([8, 8]).unwrap();
        let mut valid = FaceMask::new([8, 8]).unwrap();
        vel.u_mut().set_index(4, 4, 2.0);
        valid.u.set_index(4, 4, true);
        let mut ex = Extrapolation::new([8, 8], 1).unwrap();
        ex.extrapolate(&mut vel, &mut valid);
        assert_eq!(vel.u().at_index(5, 4), 2.0);
        assert_eq!(vel.u().at_index(4, 5), 2.0);
        assert!(valid.u.at_index(3, 4));
        assert!(!valid.u.at_index(6, 4));
        assert_eq!(vel.u().at_index(6, 4), 0.0);

        let mut ex = Extrapolation::new([8, 8], EXTRAPOLATION_ITERATIONS).unwrap();
        ex.extrapolate(&mut vel, &mut valid);
        assert!(valid.u.values.iter().all(|v| *v));
        assert!(vel.u().values.iter().all(|u| *u == 2.0));
    }

    #[test]
    fn averages_valid_neighbours() {
        let mut vel = Velocity::new([4, 4]).unwrap();
        let mut valid = FaceMask::new([4, 4]).unwrap();
        vel.v_mut().set_index(1, 2, 1.0);
        vel.v_mut().set_index(3, 2, 3.0);
        valid.v.set_index(1, 2, true);
        valid.v.set_index(3, 2, true);
        Extrapolation::new([4, 4], 1).unwrap().extrapolate(&mut vel, &mut valid);
        assert_eq!(vel.v().at_index(2, 2), 2.0);
    }

    #[test]
    fn constrain_removes_normal_component() {
        let res = [8, 8];
        let mut vel = Velocity::new(res).unwrap();
        vel.u_mut().fill(1.0);
        vel.v_mut().fill(1.0);
        // solid below y = 4, normal points up
        let mut solid = Grid::new(res, CELL_CENTRED, 0.0).unwrap();
        solid.par_fill_with(|_, j| j as f32 + 0.5 - 4.0);
        let mut weights = FaceWeights::new(res).unwrap();
        weights.compute(&solid);
        Extrapolation::new(res, 0).unwrap().constrain_velocity(&mut vel, &solid, &weights);
        // closed horizontal face inside the solid keeps no normal flow
        assert!(vel.v().at_index(3, 2).abs() < 1e-5);
        // tangential flow survives
        assert!((vel.u().at_index(3, 1) - 1.0).abs() < 1e-5);
        // open faces are untouched
        assert_eq!(vel.v().at_index(3, 6), 1.0);
    }

    #[test]
    fn walls_stop_normal_flow() {
        let res = [8, 8];
        let mut vel = Velocity::new(res).unwrap();
        vel.u_mut().fill(1.0);
        vel.v_mut().fill(-1.0);
        let solid = Grid::new(res, CELL_CENTRED, 3.0).unwrap();
        let mut weights = FaceWeights::new(res).unwrap();
        weights.compute(&solid);
        Extrapolation::new(res, 0).unwrap().constrain_velocity(&mut vel, &solid, &weights);
        for j in 0..8 {
            assert_eq!(vel.u().at_index(0, j), 0.0);
            assert_eq!(vel.u().at_index(8, j), 0.0);
            assert_eq!(vel.v().at_index(j, 0), 0.0);
            assert_eq!(vel.v().at_index(j, 8), 0.0);
        }
        // flow along the walls is kept
        assert_eq!(vel.u().at_index(4, 0), 1.0);
        assert_eq!(vel.v().at_index(0, 4), -1.0);
    }
}
