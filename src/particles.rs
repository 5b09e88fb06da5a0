use std::f32::consts::FRAC_1_SQRT_2;

use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::device::{Device, DispatchParams};
use crate::error::Result;
use crate::grid::{Grid, CELL_CENTRED};
use crate::level_set::LevelSet;
use crate::prefix_scan::PrefixScan;
use crate::shapes::{Blend, Drawable, RenderCommand, RenderTarget};
use crate::velocity::{FaceMask, InterpolationMode, Velocity};

pub const PARTICLES_PER_CELL: i32 = 8;
pub const DEFAULT_PARTICLE_SIZE: f32 = FRAC_1_SQRT_2;
/// Cleared value of the particle level set, in cells.
const PHI_CLEAR: f32 = 3.0;
const PHI_RADIUS_SCALE: f32 = 1.02;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    /// Grid space.
    pub position: Vec2,
    /// Domain units per second.
    pub velocity: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParticleTransfer {
    Pic,
    Flip,
    /// PIC weight of the blend.
    PicFlip(f32),
}

impl ParticleTransfer {
    pub fn alpha(self) -> f32 {
        match self {
            ParticleTransfer::Pic => 1.0,
            ParticleTransfer::Flip => 0.0,
            ParticleTransfer::PicFlip(alpha) => alpha,
        }
    }
}

#[inline]
fn cell_of(p: Vec2, res: [usize; 2]) -> Option<usize> {
    let (i, j) = (p.x.floor(), p.y.floor());
    if i < 0.0 || j < 0.0 || i >= res[0] as f32 || j >= res[1] as f32 || !p.is_finite() {
        None
    } else {
        Some(i as usize + j as usize * res[0])
    }
}

#[inline]
fn radical_inverse_2(mut k: u32) -> f32 {
    k = k.reverse_bits();
    k as f32 / 4294967296.0
}

/// Deterministic position of the `k`-th particle spawned in cell `(i, j)`.
pub fn spawn_position(i: usize, j: usize, k: u32) -> Vec2 {
    Vec2::new(
        i as f32 + (k as f32 + 0.5) / PARTICLES_PER_CELL as f32,
        j as f32 + radical_inverse_2(k) + 0.5 / PARTICLES_PER_CELL as f32,
    )
}

/// Particles kept sorted by cell, with a per-cell count bounded by
/// [`PARTICLES_PER_CELL`]. Drawing into the count adds or removes particles,
/// which takes effect on the next [`ParticleCount::scan`].
pub struct ParticleCount {
    res: [usize; 2],
    particles: Vec<Particle>,
    scratch: Vec<Particle>,
    delta: Grid<i32>,
    count: Grid<i32>,
    index: Vec<i32>,
    params: DispatchParams,
    prefix_scan: PrefixScan,
    interpolation: InterpolationMode,
    alpha: f32,
    particle_size: f32,
}

impl ParticleCount {
    pub fn new(
        device: Device,
        res: [usize; 2],
        particles: Vec<Particle>,
        interpolation: InterpolationMode,
    ) -> Result<Self> {
        let delta = Grid::new(res, CELL_CENTRED, 0)?;
        let count = delta.clone();
        let mut particles = particles;
        particles.truncate(res[0] * res[1] * PARTICLES_PER_CELL as usize);
        let params = DispatchParams::new(particles.len() as u32);
        Ok(Self {
            res,
            particles,
            scratch: vec![],
            delta,
            count,
            index: vec![0; res[0] * res[1]],
            params,
            prefix_scan: PrefixScan::new(device),
            interpolation,
            alpha: 1.0,
            particle_size: DEFAULT_PARTICLE_SIZE,
        })
    }
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }
    pub fn with_particle_size(mut self, size: f32) -> Self {
        self.particle_size = size;
        self
    }
    pub fn alpha(&self) -> f32 {
        self.alpha
    }
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }
    /// Replaces the particle array. The new particles are grouped by cell on
    /// the next [`Self::scan`].
    pub fn set_particles(&mut self, mut particles: Vec<Particle>) {
        particles.truncate(self.res[0] * self.res[1] * PARTICLES_PER_CELL as usize);
        self.params = DispatchParams::new(particles.len() as u32);
        self.particles = particles;
    }
    pub fn count(&self) -> &Grid<i32> {
        &self.count
    }
    pub fn total_count(&self) -> usize {
        self.particles.len()
    }
    pub fn dispatch_params(&self) -> DispatchParams {
        self.params
    }
    pub fn record(&self, drawables: Vec<Drawable>) -> RenderCommand {
        RenderCommand::new(drawables, Blend::Add)
    }

    /// Applies the pending count changes and regroups the particles by cell.
    pub fn scan(&mut self) -> DispatchParams {
        let res = self.res;
        let cells: Vec<Option<usize>> = self.particles.par_iter().map(|p| cell_of(p.position, res)).collect();
        let mut live = vec![0i32; res[0] * res[1]];
        for c in cells.iter().flatten() {
            live[*c] += 1;
        }
        self.delta
            .values
            .par_iter_mut()
            .zip(live.par_iter())
            .for_each(|(d, l)| *d = (*d + l).clamp(0, PARTICLES_PER_CELL));
        let params = self.prefix_scan.scan(&self.delta.values, &mut self.index);

        // serial so that survivors keep their original order
        self.scratch.clear();
        self.scratch.resize(params.count as usize, Particle::default());
        let mut placed = vec![0i32; res[0] * res[1]];
        for (p, c) in self.particles.iter().zip(&cells) {
            if let Some(c) = *c {
                if placed[c] < self.delta.values[c] {
                    self.scratch[(self.index[c] + placed[c]) as usize] = *p;
                    placed[c] += 1;
                }
            }
        }
        // new particles take the cell slots after the survivors
        for c in 0..res[0] * res[1] {
            let (i, j) = (c % res[0], c / res[0]);
            for k in placed[c]..self.delta.values[c] {
                self.scratch[(self.index[c] + k) as usize] = Particle {
                    position: spawn_position(i, j, k as u32),
                    velocity: Vec2::ZERO,
                };
            }
        }
        std::mem::swap(&mut self.particles, &mut self.scratch);
        self.count.copy_from(&self.delta);
        self.delta.fill(0);
        self.params = params;
        params
    }

    fn range(&self, i: i32, j: i32) -> &[Particle] {
        if self.count.oob(i, j) {
            return &[];
        }
        let c = i as usize + j as usize * self.res[0];
        let start = self.index[c] as usize;
        let end = start + self.count.values[c] as usize;
        &self.particles[start.min(self.particles.len())..end.min(self.particles.len())]
    }

    /// Liquid level set from the particles, valid after [`Self::scan`].
    pub fn phi(&self, level_set: &mut LevelSet) {
        let radius = PHI_RADIUS_SCALE * self.particle_size;
        let [nx, ny] = self.res;
        level_set.phi_mut().par_fill_with(|i, j| {
            let centre = Vec2::new(i as f32 + 0.5, j as f32 + 0.5);
            let mut phi = PHI_CLEAR;
            for dj in -3..=3 {
                for di in -3..=3 {
                    for p in self.range(i as i32 + di, j as i32 + dj) {
                        let base = (p.position - 0.5).floor();
                        let bi = (base.x as i32).min(nx as i32 - 2).max(0);
                        let bj = (base.y as i32).min(ny as i32 - 2).max(0);
                        if (i as i32 - bi).abs() <= 2 && (j as i32 - bj).abs() <= 2 {
                            phi = phi.min((centre - p.position).length() - radius);
                        }
                    }
                }
            }
            phi
        });
    }

    fn splat(&self, face: Vec2, cells_x: std::ops::RangeInclusive<i32>, cells_y: std::ops::RangeInclusive<i32>, component: usize) -> Option<f32> {
        let (mut sum, mut weight) = (0.0, 0.0);
        for cj in cells_y {
            for ci in cells_x.clone() {
                for p in self.range(ci, cj) {
                    let d = (p.position - face).abs();
                    if d.x < 1.0 && d.y < 1.0 {
                        let w = (1.0 - d.x) * (1.0 - d.y);
                        sum += w * p.velocity[component];
                        weight += w;
                    }
                }
            }
        }
        (weight > 0.0).then(|| sum / weight)
    }

    /// Tent-weighted average of the particle velocities onto every face.
    pub fn transfer_to_grid(&self, velocity: &mut Velocity, valid: &mut FaceMask) {
        velocity
            .u_mut()
            .values
            .par_iter_mut()
            .zip(valid.u.values.par_iter_mut())
            .enumerate()
            .for_each(|(f, (u, ok))| {
                let (i, j) = ((f % (self.res[0] + 1)) as i32, (f / (self.res[0] + 1)) as i32);
                let face = Vec2::new(i as f32, j as f32 + 0.5);
                let v = self.splat(face, i - 1..=i, j - 1..=j + 1, 0);
                *ok = v.is_some();
                *u = v.unwrap_or(0.0);
            });
        velocity
            .v_mut()
            .values
            .par_iter_mut()
            .zip(valid.v.values.par_iter_mut())
            .enumerate()
            .for_each(|(f, (v, ok))| {
                let (i, j) = ((f % self.res[0]) as i32, (f / self.res[0]) as i32);
                let face = Vec2::new(i as f32 + 0.5, j as f32);
                let s = self.splat(face, i - 1..=i + 1, j - 1..=j, 1);
                *ok = s.is_some();
                *v = s.unwrap_or(0.0);
            });
    }

    /// PIC/FLIP update of the particle velocities.
    pub fn transfer_from_grid(&mut self, velocity: &Velocity) {
        let alpha = self.alpha;
        let mode = self.interpolation;
        self.particles.par_iter_mut().for_each(|p| {
            let grid = velocity.sample(p.position, mode);
            let diff = velocity.sample_diff(p.position, mode);
            p.velocity = alpha * grid + (1.0 - alpha) * (p.velocity + diff);
        });
    }
}

impl RenderTarget for ParticleCount {
    fn render(&mut self, command: &RenderCommand) {
        let blend = command.blend;
        command.render_coverage(&mut self.delta, |d, n| {
            *n = blend.apply(*n as f32, d.colour.x).round() as i32;
        });
    }
}
