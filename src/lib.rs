#![allow(non_snake_case)]
pub use glam;

pub mod advection;
pub mod cfl;
pub mod density;
pub mod device;
pub mod dump;
pub mod error;
pub mod extrapolation;
pub mod grid;
pub mod level_set;
pub mod linear_solver;
pub mod particles;
pub mod prefix_scan;
pub mod pressure;
pub mod rigid_body;
pub mod shapes;
pub mod velocity;
pub mod world;

pub use device::{Device, DeviceConfig, DispatchParams};
pub use error::{Error, Result};
pub use grid::{Grid, PingPong};
pub use linear_solver::{Parameters, PreconditionerKind};
pub use particles::{Particle, ParticleTransfer, PARTICLES_PER_CELL};
pub use rigid_body::{EulerRigidBodySolver, RigidBody, RigidBodyHandle, RigidBodySolver, RigidBodyType};
pub use shapes::{Blend, Drawable, RenderCommand, RenderTarget, Shape};
pub use velocity::InterpolationMode;
pub use world::{SolverKind, VelocityOp, World, WorldKind, WorldSettings};
