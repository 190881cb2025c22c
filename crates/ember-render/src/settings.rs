//! Renderer configuration.

use std::path::PathBuf;

use ember_core::constants::MAX_SSAO_KERNEL;
use ember_core::{Error, Result};
use glam::Vec3;

/// Tonemapping operator applied by the composite pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tonemap {
    #[default]
    Aces,
    Reinhard,
    /// Clamp only.
    None,
}

impl Tonemap {
    /// Value the composite shader switches on.
    pub const fn shader_id(self) -> u32 {
        match self {
            Self::Aces => 0,
            Self::Reinhard => 1,
            Self::None => 2,
        }
    }
}

/// Screen-space ambient occlusion parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AoSettings {
    pub enabled: bool,
    /// Number of hemisphere samples, at most [`MAX_SSAO_KERNEL`].
    pub kernel_size: usize,
    /// Sample radius in view-space units.
    pub radius: f32,
    pub bias: f32,
    pub intensity: f32,
}

impl Default for AoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 32,
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
        }
    }
}

/// Everything about how a frame is shaded.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub exposure: f32,
    pub tonemap: Tonemap,
    /// Scale on image-based diffuse and specular light.
    pub ibl_intensity: f32,
    /// Direction towards the sun.
    pub sun_direction: Vec3,
    pub sun_color: Vec3,
    pub sun_intensity: f32,
    pub ao: AoSettings,
    /// Directory holding the compiled `.spv` shaders.
    pub shader_dir: PathBuf,
    /// Equirectangular environment map, replaced by a procedural sky when
    /// the file is missing.
    pub environment_map: PathBuf,
    /// Max anisotropy for material textures; 1 disables it.
    pub anisotropy: f32,
    pub frustum_culling: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            tonemap: Tonemap::Aces,
            ibl_intensity: 1.0,
            sun_direction: Vec3::new(0.3, 0.8, 0.5),
            sun_color: Vec3::new(1.0, 0.96, 0.9),
            sun_intensity: 3.0,
            ao: AoSettings::default(),
            shader_dir: PathBuf::from("shaders"),
            environment_map: PathBuf::from("assets/environment.hdr"),
            anisotropy: 8.0,
            frustum_culling: true,
        }
    }
}

impl RenderSettings {
    /// Reject values the shaders cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidData(msg));
        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            return invalid(format!("exposure must be positive, got {}", self.exposure));
        }
        if !(self.ibl_intensity.is_finite() && self.ibl_intensity >= 0.0) {
            return invalid(format!(
                "IBL intensity must be non-negative, got {}",
                self.ibl_intensity
            ));
        }
        if self.sun_direction.try_normalize().is_none() {
            return invalid("sun direction must be non-zero".to_string());
        }
        if self.sun_intensity < 0.0 || self.sun_color.min_element() < 0.0 {
            return invalid("sun colour and intensity must be non-negative".to_string());
        }
        if self.ao.kernel_size == 0 || self.ao.kernel_size > MAX_SSAO_KERNEL {
            return invalid(format!(
                "AO kernel size must be in 1..={MAX_SSAO_KERNEL}, got {}",
                self.ao.kernel_size
            ));
        }
        if !(self.ao.radius > 0.0) {
            return invalid(format!("AO radius must be positive, got {}", self.ao.radius));
        }
        if self.anisotropy < 1.0 {
            return invalid(format!(
                "anisotropy must be at least 1, got {}",
                self.anisotropy
            ));
        }
        Ok(())
    }

    /// Normalized sun direction, or straight up when degenerate.
    pub fn sun_direction(&self) -> Vec3 {
        self.sun_direction.try_normalize().unwrap_or(Vec3::Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RenderSettings::default().validate().unwrap();
    }

    #[test]
    fn oversized_kernel_is_rejected() {
        let mut settings = RenderSettings::default();
        settings.ao.kernel_size = MAX_SSAO_KERNEL + 1;
        assert!(matches!(settings.validate(), Err(Error::InvalidData(_))));
        settings.ao.kernel_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn bad_exposure_is_rejected() {
        let settings = RenderSettings {
            exposure: f32::NAN,
            ..RenderSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_sun_direction_is_rejected() {
        let settings = RenderSettings {
            sun_direction: Vec3::ZERO,
            ..RenderSettings::default()
        };
        assert!(settings.validate().is_err());
        assert_eq!(settings.sun_direction(), Vec3::Y);
    }

    #[test]
    fn tonemap_ids_are_distinct() {
        let ids = [Tonemap::Aces, Tonemap::Reinhard, Tonemap::None].map(Tonemap::shader_id);
        assert_eq!(ids, [0, 1, 2]);
    }
}
