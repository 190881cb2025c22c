//! Equirectangular HDR environment maps.

use std::path::Path;

use glam::Vec3;

use crate::error::{AssetError, Result};

/// Linear RGBA32F equirectangular image.
#[derive(Clone, Debug, PartialEq)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` floats, row-major, top row first.
    pub pixels: Vec<f32>,
}

impl HdrImage {
    /// Procedural sky used when no environment map is available.
    ///
    /// Rows map to elevation: zenith at the top, horizon in the middle,
    /// ground below. A small warm disc stands in for the sun.
    pub fn sky_gradient(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let zenith = Vec3::new(0.18, 0.36, 0.78);
        let horizon = Vec3::new(0.75, 0.82, 0.92);
        let ground = Vec3::new(0.22, 0.2, 0.18);
        let sun_dir = Vec3::new(0.3, 0.8, 0.5).normalize();

        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            let v = (y as f32 + 0.5) / height as f32;
            let theta = v * std::f32::consts::PI;
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let phi = u * std::f32::consts::TAU - std::f32::consts::PI;
                let dir = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());

                let mut color = if dir.y >= 0.0 {
                    horizon.lerp(zenith, dir.y.powf(0.5))
                } else {
                    horizon.lerp(ground, (-dir.y).powf(0.35))
                };
                let sun = dir.dot(sun_dir).max(0.0).powf(2048.0);
                color += Vec3::new(1.0, 0.9, 0.75) * sun * 40.0;
                pixels.extend_from_slice(&[color.x, color.y, color.z, 1.0]);
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.pixels.get(i..i + 4).and_then(|p| p.try_into().ok())
    }
}

/// Load an HDR (Radiance `.hdr`, OpenEXR, or any format `image` decodes)
/// environment map as RGBA32F.
pub fn load_environment(path: impl AsRef<Path>) -> Result<HdrImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AssetError::Io {
            path: path.to_path_buf(),
            source: std::io::ErrorKind::NotFound.into(),
        });
    }
    let rgba = image::open(path)?.to_rgba32f();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(AssetError::InvalidData(format!(
            "{} has zero size",
            path.display()
        )));
    }
    tracing::info!("Loaded environment {} ({width}x{height})", path.display());
    Ok(HdrImage {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sky_gradient_is_brighter_above_the_horizon() {
        let sky = HdrImage::sky_gradient(64, 32);
        assert_eq!(sky.pixels.len(), 64 * 32 * 4);
        let top = sky.pixel(0, 0).unwrap();
        let bottom = sky.pixel(0, 31).unwrap();
        assert!(top[2] > bottom[2]);
        assert!(sky.pixels.chunks_exact(4).all(|p| p[3] == 1.0));
        assert!(sky.pixels.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn pixel_is_bounds_checked() {
        let sky = HdrImage::sky_gradient(4, 2);
        assert!(sky.pixel(3, 1).is_some());
        assert!(sky.pixel(4, 0).is_none());
    }

    #[test]
    fn zero_size_is_clamped() {
        let sky = HdrImage::sky_gradient(0, 0);
        assert_eq!((sky.width, sky.height), (1, 1));
    }

    #[test]
    fn missing_environment_is_an_io_error() {
        let err = load_environment("assets/does-not-exist.hdr").unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }
}
