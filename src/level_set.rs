use crate::error::Result;
use crate::grid::{Grid, PingPong, CELL_CENTRED};
use crate::shapes::{Blend, Drawable, RenderCommand, RenderTarget};

/// Value a static solid level set is cleared to: "far outside any solid".
pub const FAR: f32 = 10000.0;

pub const REINITIALISE_ITERATIONS: usize = 50;
const REINITIALISE_DT: f32 = 0.1;

/// Cell centred signed distance field in grid cells, negative inside.
#[derive(Clone, Debug)]
pub struct LevelSet {
    phi: PingPong<Grid<f32>>,
    phi0: Grid<f32>,
}

impl LevelSet {
    pub fn new(res: [usize; 2]) -> Result<Self> {
        let g = Grid::new(res, CELL_CENTRED, FAR)?;
        Ok(Self {
            phi: PingPong::new(g.clone(), g.clone()),
            phi0: g,
        })
    }
    pub fn res(&self) -> [usize; 2] {
        self.phi.front().res
    }
    pub fn phi(&self) -> &Grid<f32> {
        self.phi.front()
    }
    pub fn phi_mut(&mut self) -> &mut Grid<f32> {
        self.phi.front_mut()
    }
    pub fn clear(&mut self, value: f32) {
        self.phi.front_mut().fill(value);
    }
    pub fn copy_from(&mut self, other: &LevelSet) {
        self.phi.front_mut().copy_from(other.phi());
    }
    pub fn record(&self, drawables: Vec<Drawable>) -> RenderCommand {
        RenderCommand::new(drawables, Blend::Union)
    }
    /// Buffers for passes that write a new field from the current one.
    pub fn split(&mut self) -> (&Grid<f32>, &mut Grid<f32>) {
        self.phi.split()
    }
    pub fn swap(&mut self) {
        self.phi.swap();
    }

    /// Pseudo-time iterations of `phi_t + S(phi0)(|grad phi| - 1) = 0`.
    pub fn reinitialise(&mut self, iterations: usize) {
        self.phi0.copy_from(self.phi.front());
        for _ in 0..iterations {
            let (phi, out) = self.phi.split();
            redistance_step(phi, &self.phi0, out, REINITIALISE_DT);
            self.phi.swap();
        }
    }

    /// Pulls the liquid half a cell into solids it touches, so the free surface
    /// does not detach from walls.
    pub fn extrapolate(&mut self, solid_phi: &Grid<f32>) {
        self.phi.front_mut().par_update(|i, j, phi| {
            if *phi < 0.5 && solid_phi.at_index(i, j) < 0.0 {
                *phi = -0.5;
            }
        });
    }
}

impl RenderTarget for LevelSet {
    fn render(&mut self, command: &RenderCommand) {
        command.render_distance(self.phi.front_mut());
    }
}

/// Averages each 2x2 block of `fine` into `coarse`, halving the distance
/// since a coarse cell is twice as wide. Samples past the fine grid are skipped.
pub fn phi_scale(fine: &Grid<f32>, coarse: &mut Grid<f32>) {
    coarse.par_fill_with(|i, j| {
        let mut sum = 0.0;
        let mut n = 0.0f32;
        for (di, dj) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let (fi, fj) = ((2 * i + di) as i32, (2 * j + dj) as i32);
            if !fine.oob(fi, fj) {
                sum += fine.at_index(fi as usize, fj as usize);
                n += 1.0;
            }
        }
        if n == 0.0 {
            FAR
        } else {
            0.5 * sum / n
        }
    });
}

/// Squared upwind gradient magnitude picked by the sign of the
/// characteristic speed.
#[inline]
fn godunov_gradient(phi: &Grid<f32>, i: i32, j: i32, s: f32) -> f32 {
    let c = phi.at_clamped(i, j);
    let dxm = c - phi.at_clamped(i - 1, j);
    let dxp = phi.at_clamped(i + 1, j) - c;
    let dym = c - phi.at_clamped(i, j - 1);
    let dyp = phi.at_clamped(i, j + 1) - c;
    if s > 0.0 {
        dxm.max(0.0).powi(2).max(dxp.min(0.0).powi(2)) + dym.max(0.0).powi(2).max(dyp.min(0.0).powi(2))
    } else {
        dxm.min(0.0).powi(2).max(dxp.max(0.0).powi(2)) + dym.min(0.0).powi(2).max(dyp.max(0.0).powi(2))
    }
}

#[inline]
fn one_sided_max(phi0: &Grid<f32>, i: i32, j: i32, di: i32, dj: i32) -> f32 {
    let c = phi0.at_clamped(i, j);
    let m = phi0.at_clamped(i - di, j - dj);
    let p = phi0.at_clamped(i + di, j + dj);
    (0.5 * (p - m).abs()).max((p - c).abs()).max((c - m).abs())
}

fn redistance_step(phi: &Grid<f32>, phi0: &Grid<f32>, out: &mut Grid<f32>, dt: f32) {
    out.par_fill_with(|i, j| {
        let (i, j) = (i as i32, j as i32);
        let p0 = phi0.at_clamped(i, j);
        let p = phi.at_clamped(i, j);
        let near_interface = [(1, 0), (-1, 0), (0, 1), (0, -1)].iter().any(|(di, dj)| {
            let n = phi0.at_clamped(i + di, j + dj);
            p0 * n <= 0.0
        });
        if near_interface && p0 != 0.0 {
            // subcell fix: keep the interface where phi0 puts it
            let gx = one_sided_max(phi0, i, j, 1, 0);
            let gy = one_sided_max(phi0, i, j, 0, 1);
            let grad = (gx * gx + gy * gy).sqrt().max(1e-6);
            let d = p0 / grad;
            p - dt * (p0.signum() * p.abs() - d)
        } else {
            let s = p0 / (p0 * p0 + 1.0).sqrt();
            p - dt * s * (godunov_gradient(phi, i, j, s).sqrt() - 1.0)
        }
    });
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;

    fn circle_sdf(res: [usize; 2], centre: Vec2, r: f32) -> Grid<f32> {
        let mut g = Grid::new(res, CELL_CENTRED, 0.0).unwrap();
        g.par_fill_with(|i, j| (Vec2::new(i as f32 + 0.5, j as f32 + 0.5) - centre).length() - r);
        g
    }

    #[test]
    fn record_union_of_circles() {
        let mut ls = LevelSet::new([32, 32]).unwrap();
        let cmd = ls.record(vec![
            Drawable::circle(4.0).with_position(Vec2::new(8.0, 8.0)),
            Drawable::circle(4.0).with_position(Vec2::new(20.0, 8.0)),
        ]);
        cmd.submit(&mut ls);
        assert!(ls.phi().at_index(7, 7) < 0.0);
        assert!(ls.phi().at_index(19, 7) < 0.0);
        assert!(ls.phi().at_index(14, 7) > 0.0);
        assert_eq!(ls.phi().at_index(8, 30), FAR);
    }

    #[test]
    fn reinitialise_restores_distance() {
        let res = [64, 64];
        let centre = Vec2::new(32.0, 32.0);
        let exact = circle_sdf(res, centre, 10.0);
        let mut ls = LevelSet::new(res).unwrap();
        // same zero set, wrong slope
        ls.phi_mut().par_fill_with(|i, j| {
            let d = exact.at_index(i, j);
            d * (0.5 + i as f32 / 64.0)
        });
        ls.reinitialise(500);
        for j in 0..64 {
            for i in 0..64 {
                let d = exact.at_index(i, j);
                if d.abs() < 5.0 {
                    let phi = ls.phi().at_index(i, j);
                    assert!((phi - d).abs() < 1.0, "({}, {}): {} vs {}", i, j, phi, d);
                    if d.abs() > 0.5 {
                        assert_eq!(phi.signum(), d.signum());
                    }
                }
            }
        }
    }

    #[test]
    fn extrapolate_into_solid() {
        let mut ls = LevelSet::new([4, 4]).unwrap();
        ls.clear(0.2);
        let mut solid = Grid::new([4, 4], CELL_CENTRED, 1.0).unwrap();
        solid.set_index(0, 0, -1.0);
        ls.phi_mut().set_index(1, 0, -1.0);
        solid.set_index(1, 0, -1.0);
        ls.extrapolate(&solid);
        assert_eq!(ls.phi().at_index(0, 0), -0.5);
        assert_eq!(ls.phi().at_index(1, 0), -0.5);
        assert_eq!(ls.phi().at_index(2, 0), 0.2);
    }

    #[test]
    fn phi_scale_halves_and_averages() {
        let mut fine = Grid::new([4, 3], CELL_CENTRED, 0.0).unwrap();
        fine.par_fill_with(|i, _| i as f32);
        let mut coarse = Grid::new([2, 2], CELL_CENTRED, 0.0).unwrap();
        phi_scale(&fine, &mut coarse);
        assert_eq!(coarse.at_index(0, 0), 0.25);
        assert_eq!(coarse.at_index(1, 0), 1.25);
        // only the last fine row exists under the top coarse row
        assert_eq!(coarse.at_index(1, 1), 1.25);
    }
}
