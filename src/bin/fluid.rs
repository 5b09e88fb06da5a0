use std::{fs, path::PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use mac_fluid::{
    dump::{dump_liquid, dump_scalar_field, dump_velocity_field},
    glam::{Vec2, Vec4},
    *,
};
use rand::{rngs::StdRng, *};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    kind: WorldKind,
    world: WorldSettings,
    solver: Parameters,
    device: DeviceConfig,
    /// Domain units per second squared, pointing down.
    gravity: f32,
    frames: usize,
    output: PathBuf,
    dump_velocity: bool,
    seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kind: WorldKind::Water,
            world: WorldSettings {
                size: [128, 128],
                dt: 1.0 / 60.0,
                num_substeps: 2,
                ..Default::default()
            },
            solver: Parameters::iterative(1e-4),
            device: DeviceConfig::default(),
            gravity: 1.0,
            frames: 240,
            output: PathBuf::from("out"),
            dump_velocity: false,
            seed: 0,
        }
    }
}

/// A column of water at the left wall, with a round rock in its way.
fn dambreak(world: &mut World, settings: &Settings) -> Result<()> {
    let [nx, ny] = world.res();
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let (w, h) = (nx * 2 / 5, ny * 3 / 5);
    let mut particles = Vec::with_capacity(w * h * 4);
    for j in 0..h {
        for i in 0..w {
            for _ in 0..4 {
                let p = Vec2::new(i as f32 + rng.gen::<f32>(), j as f32 + rng.gen::<f32>());
                particles.push(Particle {
                    position: p,
                    velocity: Vec2::ZERO,
                });
            }
        }
    }
    world.set_particles(particles)?;
    let rock = Drawable::circle(ny as f32 / 10.0).with_position(Vec2::new(nx as f32 * 0.65, ny as f32 * 0.1));
    let command = world.record_static_solid_phi(vec![rock]);
    world.submit_static_solid_phi(&command);
    Ok(())
}

fn plume_source(world: &World) -> Drawable {
    let [nx, ny] = world.res();
    Drawable::circle(nx as f32 / 16.0).with_position(Vec2::new(nx as f32 * 0.5, ny as f32 * 0.1))
}

fn plume(world: &mut World) -> Result<()> {
    let [nx, ny] = world.res();
    let obstacle = Drawable::rectangle(Vec2::new(nx as f32 / 4.0, ny as f32 / 32.0))
        .with_anchor(Vec2::new(nx as f32 / 8.0, ny as f32 / 64.0))
        .with_position(Vec2::new(nx as f32 * 0.45, ny as f32 * 0.6))
        .with_rotation(0.3);
    let command = world.record_static_solid_phi(vec![obstacle]);
    world.submit_static_solid_phi(&command);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let settings: Settings = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Settings::default(),
    };
    log::info!("{:?}", settings);
    let device = Device::new(settings.device)?;
    let mut world = World::new(device, settings.world, settings.kind)?;
    match settings.kind {
        WorldKind::Water => dambreak(&mut world, &settings)?,
        WorldKind::Smoke => plume(&mut world)?,
    }
    fs::create_dir_all(&settings.output)?;

    let ny = world.res()[1] as f32;
    let pb = ProgressBar::new(settings.frames as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let mut params = settings.solver;
    for frame in 0..settings.frames {
        match settings.kind {
            WorldKind::Water => {
                let g = -settings.gravity * settings.world.dt * world.res()[0] as f32;
                let command = world.record_velocity(
                    vec![world.domain().with_colour(Vec4::new(0.0, g, 0.0, 0.0))],
                    VelocityOp::Add,
                );
                world.submit_velocity(command);
            }
            WorldKind::Smoke => {
                let source = plume_source(&world);
                let density = world.record_density(vec![source.clone()]);
                world.submit_density(&density)?;
                let lift = world.record_velocity(
                    vec![source.with_colour(Vec4::new(0.0, ny * 0.25, 0.0, 0.0))],
                    VelocityOp::Set,
                );
                world.submit_velocity(lift);
            }
        }
        world.step(&mut params)?;
        pb.set_message(format!("cfl {:.4}, {} iterations", world.get_cfl(), params.out_iterations));

        let path = settings.output.join(format!("{:04}.png", frame));
        match world.kind() {
            WorldKind::Water => dump_liquid(world.liquid_phi(), world.solid_phi(), &path)?,
            WorldKind::Smoke => {
                if let Some(density) = world.density() {
                    dump_scalar_field(density, 0.0, 1.0, &path)?;
                }
            }
        }
        if settings.dump_velocity {
            dump_velocity_field(world.velocity(), settings.output.join(format!("{:04}.exr", frame)))?;
        }
        pb.inc(1);
    }
    pb.finish();
    Ok(())
}
