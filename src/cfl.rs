use crate::device::Device;
use crate::linear_solver::Reduce;
use crate::velocity::Velocity;

/// Largest time step that moves no sample further than one cell.
pub struct Cfl {
    reduce: Reduce,
}

impl Cfl {
    pub fn new(device: Device) -> Self {
        Self {
            reduce: Reduce::new(device),
        }
    }

    /// `dx / max|vel|`, infinite for a fluid at rest.
    pub fn get_cfl(&self, velocity: &Velocity) -> f32 {
        let max = self.reduce.max(&velocity.u().values).max(self.reduce.max(&velocity.v().values));
        if max == 0.0 {
            f32::INFINITY
        } else {
            velocity.dx() / max
        }
    }
}
