use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::advection::Advection;
use crate::cfl::Cfl;
use crate::density::Density;
use crate::device::{profile, Device};
use crate::error::{Error, Result};
use crate::extrapolation::{Extrapolation, EXTRAPOLATION_ITERATIONS};
use crate::grid::Grid;
use crate::level_set::{LevelSet, FAR, REINITIALISE_ITERATIONS};
use crate::linear_solver::{
    AnyPreconditioner, ConjugateGradient, Data, DebugData, Diagonal, GaussSeidel, Identity, IncompletePoisson,
    Jacobi, LinearSolver, Multigrid, Parameters, PreconditionerKind,
};
use crate::particles::{Particle, ParticleCount, ParticleTransfer};
use crate::pressure::Pressure;
use crate::rigid_body::{RigidBody, RigidBodyHandle, RigidBodySolver};
use crate::shapes::{Blend, Drawable, RenderCommand};
use crate::velocity::{FaceMask, InterpolationMode, Velocity};

const PRECONDITIONER_ITERATIONS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldKind {
    Smoke,
    Water,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    ConjugateGradient(PreconditionerKind),
    Multigrid,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WorldSettings {
    pub size: [usize; 2],
    /// Length of one `step`.
    pub dt: f32,
    /// Smoke always runs a single substep.
    pub num_substeps: usize,
    pub interpolation: InterpolationMode,
    pub solver: SolverKind,
    pub transfer: ParticleTransfer,
    pub extrapolation_iterations: usize,
    pub reinitialise_iterations: usize,
    #[serde(default)]
    pub capture_debug_data: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            size: [128, 128],
            dt: 0.01,
            num_substeps: 1,
            interpolation: InterpolationMode::Linear,
            solver: SolverKind::ConjugateGradient(PreconditionerKind::Multigrid),
            transfer: ParticleTransfer::PicFlip(0.02),
            extrapolation_iterations: EXTRAPOLATION_ITERATIONS,
            reinitialise_iterations: REINITIALISE_ITERATIONS,
            capture_debug_data: false,
        }
    }
}

/// How a velocity drawing combines with the field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityOp {
    Add,
    Set,
}

enum PressureSolver {
    Pcg(ConjugateGradient<AnyPreconditioner>),
    Multigrid(Box<Multigrid>),
}

impl PressureSolver {
    fn new(device: &Device, kind: SolverKind, size: [usize; 2], delta: f32) -> Result<Self> {
        let preconditioner = match kind {
            SolverKind::Multigrid => {
                return Ok(PressureSolver::Multigrid(Box::new(Multigrid::new(device.clone(), size, delta)?)))
            }
            SolverKind::ConjugateGradient(p) => p,
        };
        let preconditioner = match preconditioner {
            PreconditionerKind::Identity => AnyPreconditioner::Identity(Identity),
            PreconditionerKind::Diagonal => AnyPreconditioner::Diagonal(Diagonal),
            PreconditionerKind::IncompletePoisson => AnyPreconditioner::IncompletePoisson(IncompletePoisson::new()),
            PreconditionerKind::Jacobi => AnyPreconditioner::Jacobi(Jacobi::new(2.0 / 3.0, PRECONDITIONER_ITERATIONS)),
            PreconditionerKind::GaussSeidel => {
                AnyPreconditioner::GaussSeidel(GaussSeidel::for_size(size, PRECONDITIONER_ITERATIONS))
            }
            PreconditionerKind::Multigrid => {
                AnyPreconditioner::Multigrid(Box::new(Multigrid::new(device.clone(), size, delta)?))
            }
        };
        Ok(PressureSolver::Pcg(ConjugateGradient::new(device.clone(), preconditioner)))
    }
    fn multigrid_mut(&mut self) -> Option<&mut Multigrid> {
        match self {
            PressureSolver::Pcg(cg) => cg.preconditioner_mut().multigrid_mut(),
            PressureSolver::Multigrid(mg) => Some(&mut **mg),
        }
    }
    fn solver(&self) -> &dyn LinearSolver {
        match self {
            PressureSolver::Pcg(cg) => cg,
            PressureSolver::Multigrid(mg) => &**mg,
        }
    }
    fn solver_mut(&mut self) -> &mut dyn LinearSolver {
        match self {
            PressureSolver::Pcg(cg) => cg,
            PressureSolver::Multigrid(mg) => &mut **mg,
        }
    }
}

/// State shared by both kinds of world, plus the passes their substeps have
/// in common.
pub struct WorldBase {
    device: Device,
    settings: WorldSettings,
    res: [usize; 2],
    delta: f32,
    dx: f32,
    solver: PressureSolver,
    data: Data,
    velocity: Velocity,
    liquid_phi: LevelSet,
    static_solid_phi: LevelSet,
    solid_phi: LevelSet,
    valid: FaceMask,
    advection: Advection,
    pressure: Pressure,
    extrapolation: Extrapolation,
    cfl: Cfl,
    rigid_bodies: Vec<Option<RigidBody>>,
    rigid_body_solver: Option<Box<dyn RigidBodySolver>>,
    velocity_commands: Vec<RenderCommand>,
    debug_data: Option<DebugData>,
}

impl WorldBase {
    fn new(device: Device, settings: WorldSettings) -> Result<Self> {
        let res = settings.size;
        if res[0] == 0 || res[1] == 0 {
            return Err(Error::InvalidSize(res[0], res[1]));
        }
        let delta = settings.dt / settings.num_substeps.max(1) as f32;
        let dx = 1.0 / res[0] as f32;
        let solver_size = [res[0].next_power_of_two(), res[1].next_power_of_two()];
        log::debug!(
            "world {}x{}, solver grid {}x{}, substep {}",
            res[0],
            res[1],
            solver_size[0],
            solver_size[1],
            delta
        );
        Ok(Self {
            solver: PressureSolver::new(&device, settings.solver, solver_size, delta)?,
            data: Data::new(solver_size)?,
            velocity: Velocity::new(res)?,
            liquid_phi: LevelSet::new(res)?,
            static_solid_phi: LevelSet::new(res)?,
            solid_phi: LevelSet::new(res)?,
            valid: FaceMask::new(res)?,
            advection: Advection::new(settings.interpolation),
            pressure: Pressure::new(res, dx, delta)?,
            extrapolation: Extrapolation::new(res, settings.extrapolation_iterations)?,
            cfl: Cfl::new(device.clone()),
            rigid_bodies: vec![],
            rigid_body_solver: None,
            velocity_commands: vec![],
            debug_data: settings.capture_debug_data.then(DebugData::default),
            device,
            settings,
            res,
            delta,
            dx,
        })
    }

    fn apply_velocity_commands(&mut self) {
        for command in self.velocity_commands.drain(..) {
            command.submit(&mut self.velocity);
        }
    }

    /// Static solids plus the bodies at their current position, redistanced.
    fn update_solid(&mut self) {
        self.solid_phi.copy_from(&self.static_solid_phi);
        for body in self.rigid_bodies.iter_mut().flatten() {
            body.update_position();
            body.render_phi(&mut self.solid_phi);
        }
        self.solid_phi.reinitialise(self.settings.reinitialise_iterations);
    }

    fn project(&mut self, params: &mut Parameters) -> Result<()> {
        let solid = self.solid_phi.phi();
        let liquid = self.liquid_phi.phi();
        if let Some(mg) = self.solver.multigrid_mut() {
            profile("build_hierarchies", || mg.build_hierarchies(self.dx, solid, liquid))?;
        }
        self.pressure
            .build_linear_equation(&mut self.data, &self.velocity, solid, liquid);
        for body in self.rigid_bodies.iter_mut().flatten() {
            body.div(&mut self.data);
        }
        let bodies: Vec<&RigidBody> = self.rigid_bodies.iter().flatten().collect();
        let (solver, data) = (&mut self.solver, &mut self.data);
        profile("solve_pressure", || solver.solver_mut().solve(data, params, &bodies));
        log::debug!(
            "pressure solve finished in {} iterations, error {}",
            params.out_iterations,
            params.out_error
        );
        if let Some(debug) = &mut self.debug_data {
            debug.copy(&self.data);
        }
        self.pressure
            .apply_pressure(&self.data, &mut self.velocity, liquid, &mut self.valid);
        for body in self.rigid_bodies.iter_mut().flatten() {
            body.force(&self.data);
        }
        Ok(())
    }

    fn extrapolate_and_constrain(&mut self) {
        self.extrapolation.extrapolate(&mut self.velocity, &mut self.valid);
        self.extrapolation
            .constrain_velocity(&mut self.velocity, self.solid_phi.phi(), self.pressure.weights());
        for body in self.rigid_bodies.iter().flatten() {
            body.velocity_constrain(&mut self.velocity);
        }
    }

    fn step_rigid_bodies(&mut self) {
        let Some(solver) = self.rigid_body_solver.as_mut() else {
            return;
        };
        for (i, body) in self.rigid_bodies.iter().enumerate() {
            if let Some(body) = body {
                solver.apply_forces(RigidBodyHandle(i), body);
            }
        }
        solver.step(self.delta);
        for (i, body) in self.rigid_bodies.iter_mut().enumerate() {
            if let Some(body) = body {
                solver.apply_velocities(RigidBodyHandle(i), body);
            }
        }
    }
}

pub struct SmokeState {
    density: Density,
}

impl SmokeState {
    fn substep(&mut self, world: &mut WorldBase, params: &mut Parameters) -> Result<()> {
        world.apply_velocity_commands();
        world.update_solid();
        world.project(params)?;
        world.extrapolate_and_constrain();
        profile("advect", || {
            world.advection.advect_velocity(&mut world.velocity, world.delta);
            self.density.advect(&world.advection, &world.velocity, world.delta);
        });
        world.step_rigid_bodies();
        Ok(())
    }
}

pub struct WaterState {
    particles: ParticleCount,
}

impl WaterState {
    fn substep(&mut self, world: &mut WorldBase, params: &mut Parameters) -> Result<()> {
        profile("particles_to_grid", || {
            self.particles.scan();
            self.particles.phi(&mut world.liquid_phi);
            world.liquid_phi.reinitialise(world.settings.reinitialise_iterations);
            self.particles.transfer_to_grid(&mut world.velocity, &mut world.valid);
        });
        world.extrapolation.extrapolate(&mut world.velocity, &mut world.valid);
        world.velocity.save_copy();
        world.apply_velocity_commands();
        world.update_solid();
        world.liquid_phi.extrapolate(world.solid_phi.phi());
        world.project(params)?;
        world.extrapolate_and_constrain();
        world.velocity.velocity_diff();
        profile("grid_to_particles", || {
            self.particles.transfer_from_grid(&world.velocity);
            world.advection.advect_particles(
                &world.velocity,
                self.particles.particles_mut(),
                world.solid_phi.phi(),
                world.delta,
            );
        });
        world.step_rigid_bodies();
        Ok(())
    }
}

pub enum Substep {
    Smoke(SmokeState),
    Water(WaterState),
}

/// A smoke or water simulation. Boundaries, sources and forces are drawn into
/// it with the `record_*`/`submit_*` pairs; `step` advances it by `dt`.
pub struct World {
    base: WorldBase,
    substep: Substep,
}

impl World {
    pub fn new(device: Device, settings: WorldSettings, kind: WorldKind) -> Result<Self> {
        let mut settings = settings;
        if kind == WorldKind::Smoke {
            settings.num_substeps = 1;
        }
        let mut base = WorldBase::new(device, settings)?;
        base.static_solid_phi.clear(FAR);
        let substep = match kind {
            WorldKind::Smoke => {
                // the whole domain is fluid
                base.liquid_phi.clear(-1.0);
                Substep::Smoke(SmokeState {
                    density: Density::new(base.res)?,
                })
            }
            WorldKind::Water => {
                base.liquid_phi.clear(1.0);
                let particles = ParticleCount::new(base.device.clone(), base.res, vec![], settings.interpolation)?
                    .with_alpha(settings.transfer.alpha());
                Substep::Water(WaterState { particles })
            }
        };
        Ok(Self { base, substep })
    }
    pub fn smoke(device: Device, settings: WorldSettings) -> Result<Self> {
        Self::new(device, settings, WorldKind::Smoke)
    }
    pub fn water(device: Device, settings: WorldSettings) -> Result<Self> {
        Self::new(device, settings, WorldKind::Water)
    }
    pub fn kind(&self) -> WorldKind {
        match self.substep {
            Substep::Smoke(_) => WorldKind::Smoke,
            Substep::Water(_) => WorldKind::Water,
        }
    }
    pub fn settings(&self) -> &WorldSettings {
        &self.base.settings
    }
    pub fn res(&self) -> [usize; 2] {
        self.base.res
    }
    pub fn device(&self) -> &Device {
        &self.base.device
    }

    /// Advances the world by `dt`. Every pass runs on the device's pool.
    pub fn step(&mut self, params: &mut Parameters) -> Result<()> {
        let device = self.base.device.clone();
        device.install(|| {
            for _ in 0..self.base.settings.num_substeps {
                match &mut self.substep {
                    Substep::Smoke(smoke) => smoke.substep(&mut self.base, params)?,
                    Substep::Water(water) => water.substep(&mut self.base, params)?,
                }
            }
            Ok(())
        })
    }

    /// Grid space CFL number of the current velocity.
    pub fn get_cfl(&self) -> f32 {
        self.base.cfl.get_cfl(&self.base.velocity)
    }

    /// `colour.xy` is a velocity in grid cells per second.
    pub fn record_velocity(&self, drawables: Vec<Drawable>, op: VelocityOp) -> RenderCommand {
        let dx = self.base.dx;
        let drawables = drawables
            .into_iter()
            .map(|mut d| {
                d.colour.x *= dx;
                d.colour.y *= dx;
                d
            })
            .collect();
        let blend = match op {
            VelocityOp::Add => Blend::Add,
            VelocityOp::Set => Blend::Replace,
        };
        RenderCommand::new(drawables, blend)
    }
    /// Queues a velocity drawing for the start of the next substep.
    pub fn submit_velocity(&mut self, command: RenderCommand) {
        self.base.velocity_commands.push(command);
    }
    pub fn record_liquid_phi(&self, drawables: Vec<Drawable>) -> RenderCommand {
        self.base.liquid_phi.record(drawables)
    }
    /// Water worlds rebuild the liquid from their particles every substep.
    pub fn submit_liquid_phi(&mut self, command: &RenderCommand) {
        command.submit(&mut self.base.liquid_phi);
    }
    pub fn record_static_solid_phi(&self, drawables: Vec<Drawable>) -> RenderCommand {
        self.base.static_solid_phi.record(drawables)
    }
    pub fn submit_static_solid_phi(&mut self, command: &RenderCommand) {
        command.submit(&mut self.base.static_solid_phi);
    }
    /// `colour.x` is the number of particles to add (or remove) per cell.
    pub fn record_particle_count(&self, drawables: Vec<Drawable>) -> RenderCommand {
        RenderCommand::new(drawables, Blend::Add)
    }
    pub fn submit_particle_count(&mut self, command: &RenderCommand) -> Result<()> {
        match &mut self.substep {
            Substep::Water(water) => {
                command.submit(&mut water.particles);
                Ok(())
            }
            Substep::Smoke(_) => Err(Error::Unsupported("particle count")),
        }
    }
    /// Replaces the particles of a water world, e.g. with a jittered block.
    pub fn set_particles(&mut self, particles: Vec<Particle>) -> Result<()> {
        match &mut self.substep {
            Substep::Water(water) => {
                water.particles.set_particles(particles);
                Ok(())
            }
            Substep::Smoke(_) => Err(Error::Unsupported("particles")),
        }
    }
    /// `colour.x` is the density written into covered cells.
    pub fn record_density(&self, drawables: Vec<Drawable>) -> RenderCommand {
        RenderCommand::new(drawables, Blend::Replace)
    }
    pub fn submit_density(&mut self, command: &RenderCommand) -> Result<()> {
        match &mut self.substep {
            Substep::Smoke(smoke) => {
                command.submit(&mut smoke.density);
                Ok(())
            }
            Substep::Water(_) => Err(Error::Unsupported("density")),
        }
    }

    pub fn velocity(&self) -> &Velocity {
        &self.base.velocity
    }
    /// Stops all flow, dropping queued velocity commands too.
    pub fn clear_velocity(&mut self) {
        self.base.velocity_commands.clear();
        self.base.velocity.clear();
    }
    pub fn liquid_phi(&self) -> &Grid<f32> {
        self.base.liquid_phi.phi()
    }
    /// Static solids and rigid bodies as of the last substep.
    pub fn solid_phi(&self) -> &Grid<f32> {
        self.base.solid_phi.phi()
    }
    pub fn density(&self) -> Option<&Grid<f32>> {
        match &self.substep {
            Substep::Smoke(smoke) => Some(smoke.density.density()),
            Substep::Water(_) => None,
        }
    }
    pub fn particles(&self) -> Option<&[Particle]> {
        match &self.substep {
            Substep::Water(water) => Some(water.particles.particles()),
            Substep::Smoke(_) => None,
        }
    }
    pub fn particle_count(&self) -> Option<&ParticleCount> {
        match &self.substep {
            Substep::Water(water) => Some(&water.particles),
            Substep::Smoke(_) => None,
        }
    }
    /// Snapshot of the last pressure system, when
    /// [`WorldSettings::capture_debug_data`] is set.
    pub fn debug_data(&self) -> Option<&DebugData> {
        self.base.debug_data.as_ref()
    }
    /// Residual of the last pressure solve.
    pub fn pressure_error(&self) -> f32 {
        self.base.solver.solver().error(&self.base.data)
    }

    pub fn add_rigid_body(&mut self, mut body: RigidBody) -> Result<RigidBodyHandle> {
        self.base.solver.solver().bind_rigid_body(body.body_type())?;
        if body.phi().res != self.base.res {
            return Err(Error::SizeMismatch {
                expected: self.base.res[0] * self.base.res[1],
                actual: body.phi().len(),
            });
        }
        body.bind(self.base.delta, self.base.dx);
        self.base.rigid_bodies.push(Some(body));
        Ok(RigidBodyHandle(self.base.rigid_bodies.len() - 1))
    }
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) -> Result<RigidBody> {
        self.base
            .rigid_bodies
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(Error::UnknownRigidBody(handle.0))
    }
    pub fn rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.base.rigid_bodies.get(handle.0).and_then(Option::as_ref)
    }
    pub fn rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.base.rigid_bodies.get_mut(handle.0).and_then(Option::as_mut)
    }
    pub fn attach_rigid_body_solver(&mut self, solver: Box<dyn RigidBodySolver>) {
        self.base.rigid_body_solver = Some(solver);
    }

    /// A drawable covering the whole domain, handy for uniform forces.
    pub fn domain(&self) -> Drawable {
        let [nx, ny] = self.base.res;
        Drawable::rectangle(Vec2::new(nx as f32, ny as f32))
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;
    use crate::rigid_body::{EulerRigidBodySolver, RigidBodyType};

    fn settings(size: [usize; 2]) -> WorldSettings {
        WorldSettings {
            size,
            dt: 0.01,
            reinitialise_iterations: 10,
            ..Default::default()
        }
    }

    #[test]
    fn smoke_forces_one_substep() {
        let mut s = settings([32, 32]);
        s.num_substeps = 4;
        let world = World::smoke(Device::cpu().unwrap(), s).unwrap();
        assert_eq!(world.settings().num_substeps, 1);
        assert_eq!(world.kind(), WorldKind::Smoke);
        assert!(world.particles().is_none());
        assert!(world.density().is_some());
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            World::water(Device::cpu().unwrap(), settings([0, 32])),
            Err(Error::InvalidSize(0, 32))
        ));
    }

    #[test]
    fn velocity_colour_is_in_cells() {
        let mut world = World::smoke(Device::cpu().unwrap(), settings([32, 32])).unwrap();
        let command = world.record_velocity(
            vec![world.domain().with_colour(Vec4::new(3.2, 0.0, 0.0, 0.0))],
            VelocityOp::Set,
        );
        assert!((command.drawables[0].colour.x - 0.1).abs() < 1e-6);
        world.submit_velocity(command);
        assert_eq!(world.get_cfl(), f32::INFINITY);
        world.step(&mut Parameters::iterative(1e-4)).unwrap();
        // the queue is consumed by the step
        assert!(world.base.velocity_commands.is_empty());
    }

    #[test]
    fn smoke_at_rest_stays_at_rest() {
        let mut world = World::smoke(Device::cpu().unwrap(), settings([32, 32])).unwrap();
        let mut params = Parameters::iterative(1e-5);
        world.step(&mut params).unwrap();
        assert_eq!(params.out_iterations, 0);
        assert_eq!(world.velocity().u().abs_max(), 0.0);
    }

    #[test]
    fn clear_velocity_drops_pending_commands() {
        let mut world = World::smoke(Device::cpu().unwrap(), settings([16, 16])).unwrap();
        let jet = Drawable::rectangle(Vec2::new(4.0, 2.0))
            .with_position(Vec2::new(6.0, 7.0))
            .with_colour(Vec4::new(1.0, 0.0, 0.0, 0.0));
        let push = world.record_velocity(vec![jet.clone()], VelocityOp::Set);
        world.submit_velocity(push);
        world.step(&mut Parameters::iterative(1e-5)).unwrap();
        assert!(world.velocity().u().abs_max() > 0.0);
        let push = world.record_velocity(vec![jet], VelocityOp::Set);
        world.submit_velocity(push);
        world.clear_velocity();
        assert_eq!(world.velocity().u().abs_max(), 0.0);
        assert_eq!(world.velocity().v().abs_max(), 0.0);
        world.step(&mut Parameters::iterative(1e-5)).unwrap();
        assert_eq!(world.velocity().u().abs_max(), 0.0);
    }

    #[test]
    fn walls_hold_water_back() {
        let mut world = World::water(Device::cpu().unwrap(), settings([32, 32])).unwrap();
        let pool = Drawable::rectangle(Vec2::new(32.0, 12.0)).with_colour(Vec4::new(4.0, 0.0, 0.0, 0.0));
        let command = world.record_particle_count(vec![pool]);
        world.submit_particle_count(&command).unwrap();
        let mut params = Parameters::iterative(1e-4);
        for _ in 0..5 {
            let dx = world.settings().dt * 32.0;
            let push = world.record_velocity(
                vec![world.domain().with_colour(Vec4::new(dx, -dx, 0.0, 0.0))],
                VelocityOp::Add,
            );
            world.submit_velocity(push);
            world.step(&mut params).unwrap();
        }
        let (u, v) = (world.velocity().u(), world.velocity().v());
        for j in 0..32 {
            assert_eq!(u.at_index(0, j), 0.0);
            assert_eq!(u.at_index(32, j), 0.0);
            assert_eq!(v.at_index(j, 0), 0.0);
            assert_eq!(v.at_index(j, 32), 0.0);
        }
        assert!(u.abs_max() > 0.0);
    }

    #[test]
    fn particle_count_only_for_water() {
        let mut smoke = World::smoke(Device::cpu().unwrap(), settings([16, 16])).unwrap();
        let command = smoke.record_particle_count(vec![smoke.domain()]);
        assert!(matches!(smoke.submit_particle_count(&command), Err(Error::Unsupported(_))));
        let mut water = World::water(Device::cpu().unwrap(), settings([16, 16])).unwrap();
        let density = water.record_density(vec![water.domain()]);
        assert!(matches!(water.submit_density(&density), Err(Error::Unsupported(_))));
    }

    #[test]
    fn water_spawns_particles_on_step() {
        let mut world = World::water(Device::cpu().unwrap(), settings([32, 32])).unwrap();
        let block = Drawable::rectangle(Vec2::new(8.0, 8.0))
            .with_position(Vec2::new(4.0, 4.0))
            .with_colour(Vec4::new(4.0, 0.0, 0.0, 0.0));
        let command = world.record_particle_count(vec![block]);
        world.submit_particle_count(&command).unwrap();
        world.step(&mut Parameters::iterative(1e-4)).unwrap();
        let particles = world.particle_count().unwrap();
        assert_eq!(particles.total_count(), 256);
        assert!(world.liquid_phi().at_index(8, 8) < 0.0);
        assert!(world.liquid_phi().at_index(24, 24) > 0.0);
    }

    #[test]
    fn rigid_body_registry() {
        let device = Device::cpu().unwrap();
        let mut world = World::smoke(device.clone(), settings([32, 32])).unwrap();
        let body = RigidBody::new([32, 32], Drawable::circle(3.0), RigidBodyType::Static).unwrap();
        let a = world.add_rigid_body(body).unwrap();
        let body = RigidBody::new([32, 32], Drawable::circle(2.0), RigidBodyType::Weak).unwrap();
        let b = world.add_rigid_body(body).unwrap();
        assert_ne!(a, b);
        assert!(world.remove_rigid_body(a).is_ok());
        assert!(matches!(world.remove_rigid_body(a), Err(Error::UnknownRigidBody(0))));
        assert!(world.rigid_body(b).is_some());

        let wrong = RigidBody::new([16, 16], Drawable::circle(2.0), RigidBodyType::Weak).unwrap();
        assert!(matches!(world.add_rigid_body(wrong), Err(Error::SizeMismatch { .. })));

        let mut s = settings([32, 32]);
        s.solver = SolverKind::Multigrid;
        let mut mg = World::smoke(device.clone(), s).unwrap();
        let strong = RigidBody::new([32, 32], Drawable::circle(3.0), RigidBodyType::Strong).unwrap();
        assert!(matches!(mg.add_rigid_body(strong), Err(Error::StrongCouplingUnsupported)));

        let mut s = settings([32, 32]);
        s.solver = SolverKind::ConjugateGradient(PreconditionerKind::IncompletePoisson);
        let mut cg = World::smoke(device, s).unwrap();
        let strong = RigidBody::new([32, 32], Drawable::circle(3.0), RigidBodyType::Strong).unwrap();
        assert!(cg.add_rigid_body(strong).is_ok());
    }

    #[test]
    fn static_body_moves_with_solver() {
        let mut world = World::smoke(Device::cpu().unwrap(), settings([32, 32])).unwrap();
        let mut body = RigidBody::new([32, 32], Drawable::circle(3.0), RigidBodyType::Static).unwrap();
        body.set_position(Vec2::new(16.0, 16.0), 0.0);
        // one domain width per second, 0.32 cells per step
        body.set_velocities(Vec2::new(1.0, 0.0), 0.0);
        let handle = world.add_rigid_body(body).unwrap();
        world.attach_rigid_body_solver(Box::new(EulerRigidBodySolver::new(Vec2::ZERO, 1.0 / 32.0)));
        world.step(&mut Parameters::iterative(1e-4)).unwrap();
        let body = world.rigid_body(handle).unwrap();
        assert!((body.centre().x - 16.32).abs() < 1e-4);
        assert!(world.solid_phi().at_index(16, 16) < 0.0);
        assert!(world.get_cfl().is_finite());
    }
}
