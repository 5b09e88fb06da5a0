use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::particles::Particle;
use crate::velocity::{sample, sample_faces, InterpolationMode, Velocity};

#[derive(Clone, Copy, PartialOrd, PartialEq, Debug, Serialize, Deserialize)]
pub enum VelocityIntegration {
    Euler,
    RK2,
    RK3,
}

impl VelocityIntegration {
    /// Moves `p` along `velocity` for `dt`. A negative `dt` traces backwards.
    #[inline]
    pub fn integrate(self, p: Vec2, dt: f32, velocity: impl Fn(Vec2) -> Vec2) -> Vec2 {
        match self {
            VelocityIntegration::Euler => p + velocity(p) * dt,
            VelocityIntegration::RK2 => {
                let k1 = dt * velocity(p);
                let k2 = dt * velocity(p + k1 * 0.5);
                p + k2
            }
            VelocityIntegration::RK3 => {
                let k1 = dt * velocity(p);
                let k2 = dt * velocity(p + k1 * 0.5);
                let k3 = dt * velocity(p - k1 + k2 * 2.0);
                p + (k1 + k2 * 4.0 + k3) / 6.0
            }
        }
    }
}

/// Semi-Lagrangian transport on the grid and forward transport of particles.
/// Positions are in grid space, so velocities are divided by `dx`.
#[derive(Clone, Copy, Debug)]
pub struct Advection {
    interpolation: InterpolationMode,
}

impl Advection {
    pub fn new(interpolation: InterpolationMode) -> Self {
        Self { interpolation }
    }
    pub fn interpolation(&self) -> InterpolationMode {
        self.interpolation
    }

    /// Self-advection of the velocity into its output buffers, which are then
    /// made current.
    pub fn advect_velocity(&self, velocity: &mut Velocity, dt: f32) {
        let mode = self.interpolation;
        let scale = velocity.res()[0] as f32;
        let (u, u_out) = velocity.u.split();
        let (v, v_out) = velocity.v.split();
        let field = |p: Vec2| sample_faces(u, v, p, mode) * scale;
        u_out.par_fill_with(|i, j| {
            let p = VelocityIntegration::RK2.integrate(Vec2::new(i as f32, j as f32 + 0.5), -dt, field);
            sample(u, p, mode)
        });
        v_out.par_fill_with(|i, j| {
            let p = VelocityIntegration::RK2.integrate(Vec2::new(i as f32 + 0.5, j as f32), -dt, field);
            sample(v, p, mode)
        });
        velocity.copy_back();
    }

    /// Transports a scalar field from `src` into `dst`.
    pub fn advect_scalar(&self, velocity: &Velocity, src: &Grid<f32>, dst: &mut Grid<f32>, dt: f32) {
        let mode = self.interpolation;
        let scale = velocity.res()[0] as f32;
        let field = |p: Vec2| velocity.sample(p, mode) * scale;
        let shift = src.shift;
        dst.par_fill_with(|i, j| {
            let p = VelocityIntegration::RK3.integrate(Vec2::new(i as f32, j as f32) + shift, -dt, field);
            src.cubic(p)
        });
    }

    /// Moves particles forward, keeps them inside the domain and pushes the
    /// ones that ended up in a solid back to its surface.
    pub fn advect_particles(&self, velocity: &Velocity, particles: &mut [Particle], solid_phi: &Grid<f32>, dt: f32) {
        let mode = self.interpolation;
        let res = velocity.res();
        let scale = res[0] as f32;
        let hi = Vec2::new(res[0] as f32, res[1] as f32) - 1e-3;
        let field = |p: Vec2| velocity.sample(p, mode) * scale;
        particles.par_iter_mut().for_each(|particle| {
            let mut p = VelocityIntegration::RK2.integrate(particle.position, dt, field);
            p = p.clamp(Vec2::ZERO, hi);
            let phi = solid_phi.bilinear(p);
            if phi < 0.0 {
                let n = solid_phi.gradient(p).normalize_or_zero();
                p = (p - phi * n).clamp(Vec2::ZERO, hi);
            }
            particle.position = p;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CELL_CENTRED;

    #[test]
    fn integrators_agree_on_uniform_field() {
        let v = |_: Vec2| Vec2::new(1.0, -2.0);
        for scheme in [VelocityIntegration::Euler, VelocityIntegration::RK2, VelocityIntegration::RK3] {
            let p = scheme.integrate(Vec2::new(3.0, 3.0), 0.5, v);
            assert!((p - Vec2::new(3.5, 2.0)).length() < 1e-6);
        }
    }

    #[test]
    fn rk3_follows_rotation() {
        let rot = |p: Vec2| Vec2::new(-p.y, p.x);
        let mut p = Vec2::new(1.0, 0.0);
        for _ in 0..100 {
            p = VelocityIntegration::RK3.integrate(p, 0.01, rot);
        }
        assert!((p.length() - 1.0).abs() < 1e-4);
        assert!((p - Vec2::new(1.0f32.cos(), 1.0f32.sin())).length() < 1e-4);
    }

    #[test]
    fn uniform_velocity_is_preserved() {
        let mut vel = Velocity::new([16, 16]).unwrap();
        vel.u_mut().fill(0.5);
        vel.v_mut().fill(-0.25);
        Advection::new(InterpolationMode::Cubic).advect_velocity(&mut vel, 0.1);
        assert!(vel.u().values.iter().all(|u| (u - 0.5).abs() < 1e-6));
        assert!(vel.v().values.iter().all(|v| (v + 0.25).abs() < 1e-6));
    }

    #[test]
    fn scalar_moves_with_flow() {
        let res = [32, 8];
        let mut vel = Velocity::new(res).unwrap();
        // two cells per unit time
        vel.u_mut().fill(2.0 / 32.0);
        let mut src = Grid::new(res, CELL_CENTRED, 0.0).unwrap();
        src.par_fill_with(|i, _| i as f32);
        let mut dst = src.clone();
        Advection::new(InterpolationMode::Linear).advect_scalar(&vel, &src, &mut dst, 1.0);
        assert!((dst.at_index(10, 4) - 8.0).abs() < 1e-4);
    }

    #[test]
    fn particles_stay_out_of_solids() {
        let res = [16, 16];
        let mut vel = Velocity::new(res).unwrap();
        vel.v_mut().fill(-4.0 / 16.0);
        // floor below y = 4
        let mut solid = Grid::new(res, CELL_CENTRED, 0.0).unwrap();
        solid.par_fill_with(|_, j| j as f32 + 0.5 - 4.0);
        let mut ps = vec![Particle { position: Vec2::new(8.0, 5.0), velocity: Vec2::ZERO }];
        Advection::new(InterpolationMode::Linear).advect_particles(&vel, &mut ps, &solid, 1.0);
        assert!((ps[0].position.y - 4.0).abs() < 1e-4, "{:?}", ps[0]);
        assert_eq!(ps[0].position.x, 8.0);

        let mut ps = vec![Particle { position: Vec2::new(15.9, 8.0), velocity: Vec2::ZERO }];
        vel.v_mut().fill(0.0);
        vel.u_mut().fill(1.0);
        Advection::new(InterpolationMode::Linear).advect_particles(&vel, &mut ps, &solid, 1.0);
        assert!(ps[0].position.x < 16.0);
    }
}
