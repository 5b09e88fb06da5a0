use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::{Grid, PingPong, U_FACES, V_FACES};
use crate::shapes::{RenderCommand, RenderTarget};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationMode {
    Linear,
    Cubic,
}

#[inline]
pub fn sample(grid: &Grid<f32>, p: Vec2, mode: InterpolationMode) -> f32 {
    match mode {
        InterpolationMode::Linear => grid.bilinear(p),
        InterpolationMode::Cubic => grid.cubic(p),
    }
}

/// Samples a MAC pair at grid-space position `p`.
#[inline]
pub fn sample_faces(u: &Grid<f32>, v: &Grid<f32>, p: Vec2, mode: InterpolationMode) -> Vec2 {
    Vec2::new(sample(u, p, mode), sample(v, p, mode))
}

/// Per-face validity flags of a MAC field.
#[derive(Clone, Debug)]
pub struct FaceMask {
    pub u: Grid<bool>,
    pub v: Grid<bool>,
}

impl FaceMask {
    pub fn new(res: [usize; 2]) -> Result<Self> {
        Ok(Self {
            u: Grid::new([res[0] + 1, res[1]], U_FACES, false)?,
            v: Grid::new([res[0], res[1] + 1], V_FACES, false)?,
        })
    }
    pub fn fill(&mut self, valid: bool) {
        self.u.fill(valid);
        self.v.fill(valid);
    }
}

/// Staggered velocity in domain units per second. `u` lives on vertical
/// faces, `v` on horizontal ones; the back buffers are the output of
/// advection. `du`/`dv` hold a saved copy, or the change since it was saved.
pub struct Velocity {
    res: [usize; 2],
    pub u: PingPong<Grid<f32>>,
    pub v: PingPong<Grid<f32>>,
    du: Grid<f32>,
    dv: Grid<f32>,
}

impl Velocity {
    pub fn new(res: [usize; 2]) -> Result<Self> {
        let u = Grid::new([res[0] + 1, res[1]], U_FACES, 0.0)?;
        let v = Grid::new([res[0], res[1] + 1], V_FACES, 0.0)?;
        Ok(Self {
            res,
            u: PingPong::new(u.clone(), u.clone()),
            v: PingPong::new(v.clone(), v.clone()),
            du: u,
            dv: v,
        })
    }
    pub fn res(&self) -> [usize; 2] {
        self.res
    }
    /// Width of a cell in domain units.
    pub fn dx(&self) -> f32 {
        1.0 / self.res[0] as f32
    }
    pub fn u(&self) -> &Grid<f32> {
        self.u.front()
    }
    pub fn v(&self) -> &Grid<f32> {
        self.v.front()
    }
    pub fn u_mut(&mut self) -> &mut Grid<f32> {
        self.u.front_mut()
    }
    pub fn v_mut(&mut self) -> &mut Grid<f32> {
        self.v.front_mut()
    }
    pub fn diff(&self) -> (&Grid<f32>, &Grid<f32>) {
        (&self.du, &self.dv)
    }
    pub fn sample(&self, p: Vec2, mode: InterpolationMode) -> Vec2 {
        sample_faces(self.u(), self.v(), p, mode)
    }
    pub fn sample_diff(&self, p: Vec2, mode: InterpolationMode) -> Vec2 {
        sample_faces(&self.du, &self.dv, p, mode)
    }
    /// Makes the output buffers current.
    pub fn copy_back(&mut self) {
        self.u.swap();
        self.v.swap();
    }
    pub fn clear(&mut self) {
        self.u.front_mut().fill(0.0);
        self.v.front_mut().fill(0.0);
    }
    pub fn save_copy(&mut self) {
        self.du.copy_from(self.u.front());
        self.dv.copy_from(self.v.front());
    }
    /// Turns the saved copy into `current - saved`.
    pub fn velocity_diff(&mut self) {
        for (d, cur) in [(&mut self.du, self.u.front()), (&mut self.dv, self.v.front())] {
            d.values
                .par_iter_mut()
                .zip(cur.values.par_iter())
                .for_each(|(d, c)| *d = c - *d);
        }
    }
}

/// Draws `colour.xy` into the faces covered by each drawable.
impl RenderTarget for Velocity {
    fn render(&mut self, command: &RenderCommand) {
        let blend = command.blend;
        command.render_coverage(self.u.front_mut(), |d, u| *u = blend.apply(*u, d.colour.x));
        command.render_coverage(self.v.front_mut(), |d, v| *v = blend.apply(*v, d.colour.y));
    }
}
