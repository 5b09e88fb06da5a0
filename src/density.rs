use crate::advection::Advection;
use crate::error::Result;
use crate::grid::{Grid, PingPong, CELL_CENTRED};
use crate::shapes::{Blend, Drawable, RenderCommand, RenderTarget};
use crate::velocity::Velocity;

/// Passive smoke density carried by the flow.
pub struct Density {
    field: PingPong<Grid<f32>>,
}

impl Density {
    pub fn new(res: [usize; 2]) -> Result<Self> {
        let g = Grid::new(res, CELL_CENTRED, 0.0)?;
        Ok(Self {
            field: PingPong::new(g.clone(), g),
        })
    }
    pub fn density(&self) -> &Grid<f32> {
        self.field.front()
    }
    pub fn density_mut(&mut self) -> &mut Grid<f32> {
        self.field.front_mut()
    }
    /// Sources are drawn with `colour.x` as the density.
    pub fn record(&self, drawables: Vec<Drawable>) -> RenderCommand {
        RenderCommand::new(drawables, Blend::Replace)
    }
    pub fn advect(&mut self, advection: &Advection, velocity: &Velocity, dt: f32) {
        let (src, dst) = self.field.split();
        advection.advect_scalar(velocity, src, dst, dt);
        self.field.swap();
    }
}

impl RenderTarget for Density {
    fn render(&mut self, command: &RenderCommand) {
        let blend = command.blend;
        command.render_coverage(self.field.front_mut(), |d, rho| *rho = blend.apply(*rho, d.colour.x));
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec4};

    use super::*;
    use crate::velocity::InterpolationMode;

    #[test]
    fn source_is_carried_up() {
        let res = [16, 16];
        let mut density = Density::new(res).unwrap();
        density
            .record(vec![Drawable::rectangle(Vec2::new(4.0, 2.0))
                .with_position(Vec2::new(6.0, 2.0))
                .with_colour(Vec4::new(1.0, 0.0, 0.0, 0.0))])
            .submit(&mut density);
        assert_eq!(density.density().at_index(7, 2), 1.0);
        let total: f32 = density.density().values.iter().sum();
        assert_eq!(total, 8.0);

        let mut vel = Velocity::new(res).unwrap();
        // four cells per unit time
        vel.v_mut().fill(4.0 / 16.0);
        density.advect(&Advection::new(InterpolationMode::Linear), &vel, 1.0);
        assert!((density.density().at_index(7, 6) - 1.0).abs() < 1e-5);
        assert!(density.density().at_index(7, 2).abs() < 1e-5);
    }
}
