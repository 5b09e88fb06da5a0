use std::collections::HashMap;

use glam::{Vec2, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::{Grid, CELL_CENTRED};
use crate::level_set::{LevelSet, FAR};
use crate::linear_solver::Data;
use crate::pressure::fraction_inside;
use crate::shapes::{Blend, Drawable, RenderCommand};
use crate::velocity::Velocity;

/// How a body exchanges momentum with the fluid.
/// - `Static`: imposes its velocity on the fluid, feels nothing back.
/// - `Weak`: receives the pressure force after the solve.
/// - `Strong`: both, solved together with the pressure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RigidBodyType {
    Static,
    Weak,
    Strong,
}

impl RigidBodyType {
    pub fn imposes_velocity(self) -> bool {
        matches!(self, RigidBodyType::Static | RigidBodyType::Strong)
    }
    pub fn receives_force(self) -> bool {
        matches!(self, RigidBodyType::Weak | RigidBodyType::Strong)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RigidBodyHandle(pub(crate) usize);

impl RigidBodyHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocities {
    /// Domain units per second.
    pub linear: Vec2,
    /// Radians per second, counter-clockwise.
    pub angular: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Forces {
    pub force: Vec2,
    pub torque: f32,
}

/// Row of the coupling matrix for one liquid cell: the divergence a unit
/// `(vx, vy, w)` body motion adds to that cell.
#[derive(Clone, Copy, Debug)]
struct Coupling {
    cell: usize,
    j: Vec3,
}

#[inline]
fn cross(r: Vec2, n: Vec2) -> f32 {
    r.x * n.y - r.y * n.x
}

pub struct RigidBody {
    drawable: Drawable,
    body_type: RigidBodyType,
    /// Grid space.
    centre: Vec2,
    angle: f32,
    velocity: Velocities,
    mass: f32,
    inertia: f32,
    phi: Grid<f32>,
    coupling: Vec<Coupling>,
    forces: Forces,
    delta: f32,
    dx: f32,
}

impl RigidBody {
    /// The drawable describes the body around its own origin; its anchor is
    /// the point that follows the body centre.
    pub fn new(res: [usize; 2], drawable: Drawable, body_type: RigidBodyType) -> Result<Self> {
        Ok(Self {
            drawable,
            body_type,
            centre: Vec2::ZERO,
            angle: 0.0,
            velocity: Velocities::default(),
            mass: 1.0,
            inertia: 1.0,
            phi: Grid::new(res, CELL_CENTRED, FAR)?,
            coupling: vec![],
            forces: Forces::default(),
            delta: 0.0,
            dx: 1.0 / res[0] as f32,
        })
    }
    /// Called when the body joins a world.
    pub(crate) fn bind(&mut self, delta: f32, dx: f32) {
        self.delta = delta;
        self.dx = dx;
    }
    pub fn body_type(&self) -> RigidBodyType {
        self.body_type
    }
    pub fn set_type(&mut self, body_type: RigidBodyType) {
        self.body_type = body_type;
    }
    pub fn set_mass_data(&mut self, mass: f32, inertia: f32) {
        self.mass = mass;
        self.inertia = inertia;
    }
    pub fn mass(&self) -> f32 {
        self.mass
    }
    pub fn inertia(&self) -> f32 {
        self.inertia
    }
    pub fn set_velocities(&mut self, linear: Vec2, angular: f32) {
        self.velocity = Velocities { linear, angular };
    }
    pub fn velocities(&self) -> Velocities {
        self.velocity
    }
    pub fn set_position(&mut self, centre: Vec2, angle: f32) {
        self.centre = centre;
        self.angle = angle;
    }
    pub fn centre(&self) -> Vec2 {
        self.centre
    }
    pub fn angle(&self) -> f32 {
        self.angle
    }
    pub fn forces(&self) -> Forces {
        self.forces
    }
    pub fn phi(&self) -> &Grid<f32> {
        &self.phi
    }
    pub fn drawable(&self) -> &Drawable {
        &self.drawable
    }

    /// Velocity of the body's material at grid-space point `p`.
    pub fn velocity_at(&self, p: Vec2) -> Vec2 {
        let r = (p - self.centre) * self.dx;
        self.velocity.linear + self.velocity.angular * r.perp()
    }

    pub fn update_position(&mut self) {
        self.drawable.position = self.centre;
        self.drawable.rotation = self.angle;
    }

    /// Draws the body into its own level set and unions it into `solid`.
    pub fn render_phi(&mut self, solid: &mut LevelSet) {
        self.phi.fill(FAR);
        RenderCommand::new(vec![self.drawable.clone()], Blend::Union).render_distance(&mut self.phi);
        let phi = &self.phi;
        solid
            .phi_mut()
            .values
            .par_iter_mut()
            .zip(phi.values.par_iter())
            .for_each(|(s, b)| *s = s.min(*b));
    }

    fn corner(&self, i: usize, j: usize) -> f32 {
        self.phi.bilinear(Vec2::new(i as f32, j as f32))
    }

    /// Builds the coupling rows over the active cells of `data`, and moves
    /// the divergence of the body's motion into the right-hand side when the
    /// body imposes its velocity.
    pub fn div(&mut self, data: &mut Data) {
        let nx = data.size[0];
        let [px, py] = self.phi.res;
        let dx = self.dx;
        let this = &*self;
        let coupling: Vec<Coupling> = (0..data.len())
            .into_par_iter()
            .filter_map(|c| {
                let (i, j) = (c % nx, c / nx);
                if data.diagonal[c] == 0.0 || i >= px || j >= py {
                    return None;
                }
                let faces = [
                    (Vec2::new(i as f32 + 1.0, j as f32 + 0.5), Vec2::X, (i + 1, j), (i + 1, j + 1)),
                    (Vec2::new(i as f32, j as f32 + 0.5), Vec2::NEG_X, (i, j), (i, j + 1)),
                    (Vec2::new(i as f32 + 0.5, j as f32 + 1.0), Vec2::Y, (i, j + 1), (i + 1, j + 1)),
                    (Vec2::new(i as f32 + 0.5, j as f32), Vec2::NEG_Y, (i, j), (i + 1, j)),
                ];
                let mut jc = Vec3::ZERO;
                for (x, n, a, b) in faces {
                    let theta = fraction_inside(this.corner(a.0, a.1), this.corner(b.0, b.1));
                    if theta > 0.0 {
                        let r = (x - this.centre) * dx;
                        jc += theta / dx * Vec3::new(n.x, n.y, cross(r, n));
                    }
                }
                (jc != Vec3::ZERO).then_some(Coupling { cell: c, j: jc })
            })
            .collect();
        self.coupling = coupling;
        if self.body_type.imposes_velocity() {
            let v = Vec3::new(self.velocity.linear.x, self.velocity.linear.y, self.velocity.angular);
            for k in &self.coupling {
                data.b[k.cell] -= k.j.dot(v);
            }
        }
    }

    /// Pressure force and torque on the body from the solved pressure.
    pub fn force(&mut self, data: &Data) {
        if !self.body_type.receives_force() {
            self.forces = Forces::default();
            return;
        }
        let f = self
            .coupling
            .iter()
            .fold(Vec3::ZERO, |acc, k| acc + data.x[k.cell] * k.j)
            * (self.dx * self.dx);
        self.forces = Forces {
            force: Vec2::new(f.x, f.y),
            torque: f.z,
        };
    }

    /// `z += Δt dx² J M⁻¹ Jᵀ s`, the body's share of the coupled matrix.
    pub fn pressure(&self, s: &[f32], z: &mut [f32]) {
        let y = self.coupling.iter().fold(Vec3::ZERO, |acc, k| acc + s[k.cell] * k.j);
        let y = Vec3::new(y.x / self.mass, y.y / self.mass, y.z / self.inertia);
        let scale = self.delta * self.dx * self.dx;
        for k in &self.coupling {
            z[k.cell] += scale * k.j.dot(y);
        }
    }

    /// Overwrites the fluid velocity on faces inside the body.
    pub fn velocity_constrain(&self, velocity: &mut Velocity) {
        if !self.body_type.imposes_velocity() {
            return;
        }
        let phi = &self.phi;
        velocity.u_mut().par_update(|i, j, u| {
            let p = Vec2::new(i as f32, j as f32 + 0.5);
            if phi.bilinear(p) < 0.0 {
                *u = self.velocity_at(p).x;
            }
        });
        velocity.v_mut().par_update(|i, j, v| {
            let p = Vec2::new(i as f32 + 0.5, j as f32);
            if phi.bilinear(p) < 0.0 {
                *v = self.velocity_at(p).y;
            }
        });
    }
}

/// Integrates rigid body motion between fluid steps. The world hands every
/// body to `apply_forces`, calls `step` once, then reads positions and
/// velocities back through `apply_velocities`.
pub trait RigidBodySolver: Send {
    fn apply_forces(&mut self, handle: RigidBodyHandle, body: &RigidBody);
    fn step(&mut self, delta: f32);
    fn apply_velocities(&mut self, handle: RigidBodyHandle, body: &mut RigidBody);
}

#[derive(Clone, Copy, Debug)]
struct BodyState {
    centre: Vec2,
    angle: f32,
    velocity: Velocities,
    forces: Forces,
    mass: f32,
    inertia: f32,
    dynamic: bool,
}

/// Semi-implicit Euler with uniform gravity. Bodies that do not receive
/// forces keep their velocity and are only moved.
pub struct EulerRigidBodySolver {
    gravity: Vec2,
    dx: f32,
    states: HashMap<RigidBodyHandle, BodyState>,
}

impl EulerRigidBodySolver {
    pub fn new(gravity: Vec2, dx: f32) -> Self {
        Self {
            gravity,
            dx,
            states: HashMap::new(),
        }
    }
}

impl RigidBodySolver for EulerRigidBodySolver {
    fn apply_forces(&mut self, handle: RigidBodyHandle, body: &RigidBody) {
        self.states.insert(
            handle,
            BodyState {
                centre: body.centre(),
                angle: body.angle(),
                velocity: body.velocities(),
                forces: body.forces(),
                mass: body.mass(),
                inertia: body.inertia(),
                dynamic: body.body_type().receives_force(),
            },
        );
    }
    fn step(&mut self, delta: f32) {
        for state in self.states.values_mut() {
            if state.dynamic {
                state.velocity.linear += delta * (state.forces.force / state.mass + self.gravity);
                state.velocity.angular += delta * state.forces.torque / state.inertia;
            }
            state.centre += delta * state.velocity.linear / self.dx;
            state.angle += delta * state.velocity.angular;
        }
    }
    fn apply_velocities(&mut self, handle: RigidBodyHandle, body: &mut RigidBody) {
        if let Some(state) = self.states.remove(&handle) {
            body.set_position(state.centre, state.angle);
            body.set_velocities(state.velocity.linear, state.velocity.angular);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_body(body_type: RigidBodyType) -> (RigidBody, LevelSet) {
        let res = [32, 32];
        let drawable = Drawable::rectangle(Vec2::splat(6.0)).with_anchor(Vec2::splat(3.0));
        let mut body = RigidBody::new(res, drawable, body_type).unwrap();
        body.bind(0.01, 1.0 / 32.0);
        body.set_position(Vec2::new(16.0, 16.0), 0.0);
        body.update_position();
        let mut solid = LevelSet::new(res).unwrap();
        body.render_phi(&mut solid);
        (body, solid)
    }

    fn all_liquid(res: [usize; 2]) -> Data {
        let mut data = Data::new(res).unwrap();
        data.diagonal.iter_mut().for_each(|d| *d = 1.0);
        data
    }

    #[test]
    fn render_unions_into_solid() {
        let (body, solid) = square_body(RigidBodyType::Static);
        assert!(body.phi().at_index(16, 16) < 0.0);
        assert!(solid.phi().at_index(16, 16) < 0.0);
        assert!(solid.phi().at_index(2, 2) > 0.0);
    }

    #[test]
    fn div_moves_divergence_into_rhs() {
        let (mut body, _) = square_body(RigidBodyType::Static);
        body.set_velocities(Vec2::new(1.0, 0.0), 0.0);
        let mut data = all_liquid([32, 32]);
        body.div(&mut data);
        // suction behind the body, compression in front of it
        let half = |left: bool| -> f32 {
            data.b
                .iter()
                .enumerate()
                .filter(|(c, _)| (c % 32 < 16) == left)
                .map(|(_, b)| b)
                .sum()
        };
        assert!(half(true) < 0.0);
        assert!(half(false) > 0.0);
        // closed surface: a translation has no net divergence
        let total: f32 = data.b.iter().sum();
        assert!(total.abs() < 1e-2, "{}", total);
    }

    #[test]
    fn weak_body_leaves_rhs_untouched() {
        let (mut body, _) = square_body(RigidBodyType::Weak);
        body.set_velocities(Vec2::new(1.0, 0.0), 0.0);
        let mut data = all_liquid([32, 32]);
        body.div(&mut data);
        assert!(data.b.iter().all(|b| *b == 0.0));
    }

    #[test]
    fn uniform_pressure_has_no_net_force() {
        let (mut body, _) = square_body(RigidBodyType::Weak);
        let mut data = all_liquid([32, 32]);
        body.div(&mut data);
        data.x.iter_mut().for_each(|x| *x = 1.0);
        body.force(&data);
        assert!(body.forces().force.length() < 1e-4);
        assert!(body.forces().torque.abs() < 1e-4);
    }

    #[test]
    fn pressure_gradient_pushes_body() {
        let (mut body, _) = square_body(RigidBodyType::Weak);
        let mut data = all_liquid([32, 32]);
        body.div(&mut data);
        // higher pressure on the left
        for (c, x) in data.x.iter_mut().enumerate() {
            *x = (32 - c % 32) as f32;
        }
        body.force(&data);
        assert!(body.forces().force.x > 0.0);
    }

    #[test]
    fn strong_coupling_term_is_positive() {
        let (mut body, _) = square_body(RigidBodyType::Strong);
        body.set_mass_data(2.0, 0.5);
        let mut data = all_liquid([32, 32]);
        body.div(&mut data);
        let s: Vec<f32> = (0..32 * 32).map(|c| ((c * 7) % 5) as f32 - 2.0).collect();
        let mut z = vec![0.0; 32 * 32];
        body.pressure(&s, &mut z);
        let sz: f32 = s.iter().zip(&z).map(|(a, b)| a * b).sum();
        assert!(sz >= -1e-6);
    }

    #[test]
    fn velocity_constrain_writes_inside_faces() {
        let (mut body, _) = square_body(RigidBodyType::Static);
        body.set_velocities(Vec2::new(0.5, -0.25), 0.0);
        let mut vel = Velocity::new([32, 32]).unwrap();
        body.velocity_constrain(&mut vel);
        assert_eq!(vel.u().at_index(16, 16), 0.5);
        assert_eq!(vel.v().at_index(16, 16), -0.25);
        assert_eq!(vel.u().at_index(2, 2), 0.0);
    }

    #[test]
    fn euler_solver_integrates_dynamic_bodies() {
        let (mut body, _) = square_body(RigidBodyType::Weak);
        body.forces = Forces {
            force: Vec2::new(2.0, 0.0),
            torque: 0.0,
        };
        let mut solver = EulerRigidBodySolver::new(Vec2::new(0.0, -1.0), 1.0 / 32.0);
        let handle = RigidBodyHandle(0);
        solver.apply_forces(handle, &body);
        solver.step(0.5);
        solver.apply_velocities(handle, &mut body);
        assert_eq!(body.velocities().linear, Vec2::new(1.0, -0.5));
        assert_eq!(body.centre(), Vec2::new(16.0 + 16.0, 16.0 - 8.0));
    }
}
