use std::path::Path;

use glam::Vec2;

use crate::error::Result;
use crate::grid::Grid;
use crate::velocity::{InterpolationMode, Velocity};

/// Velocity magnitude at the cell centres as a greyscale EXR.
pub fn dump_velocity_field(velocity: &Velocity, path: impl AsRef<Path>) -> Result<()> {
    use exr::prelude::write_rgb_file;
    let [nx, ny] = velocity.res();
    write_rgb_file(path, nx, ny, |x, y| {
        // image rows go top to bottom
        let p = Vec2::new(x as f32 + 0.5, (ny - 1 - y) as f32 + 0.5);
        let mag = velocity.sample(p, InterpolationMode::Linear).length();
        (mag, mag, mag)
    })?;
    Ok(())
}

/// Greyscale PNG of a cell centred field, mapping `lo..hi` to black..white.
pub fn dump_scalar_field(grid: &Grid<f32>, lo: f32, hi: f32, path: impl AsRef<Path>) -> Result<()> {
    let [nx, ny] = grid.res;
    let scale = if hi > lo { 255.0 / (hi - lo) } else { 0.0 };
    let img = image::GrayImage::from_fn(nx as u32, ny as u32, |x, y| {
        let v = grid.at_index(x as usize, ny - 1 - y as usize);
        image::Luma([((v - lo) * scale).clamp(0.0, 255.0) as u8])
    });
    img.save(path)?;
    Ok(())
}

/// Liquid in blue over solids in grey, the usual view of a water world.
pub fn dump_liquid(liquid_phi: &Grid<f32>, solid_phi: &Grid<f32>, path: impl AsRef<Path>) -> Result<()> {
    let [nx, ny] = liquid_phi.res;
    let img = image::RgbImage::from_fn(nx as u32, ny as u32, |x, y| {
        let (i, j) = (x as usize, ny - 1 - y as usize);
        if solid_phi.at_index(i, j) < 0.0 {
            image::Rgb([128, 128, 128])
        } else if liquid_phi.at_index(i, j) < 0.0 {
            image::Rgb([40, 90, 220])
        } else {
            image::Rgb([255, 255, 255])
        }
    });
    img.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_velocity_and_scalar_images() {
        let dir = std::env::temp_dir().join(format!("mac-fluid-dump-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut vel = Velocity::new([8, 4]).unwrap();
        vel.u_mut().fill(0.5);
        let exr = dir.join("velocity.exr");
        dump_velocity_field(&vel, &exr).unwrap();
        assert!(exr.metadata().unwrap().len() > 0);

        let phi = Grid::new([8, 4], crate::grid::CELL_CENTRED, -1.0).unwrap();
        let png = dir.join("phi.png");
        dump_scalar_field(&phi, -1.0, 1.0, &png).unwrap();
        let img = image::open(&png).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
