//! Sampler presets.

use crate::error::Result;
use ash::vk;

/// Sampler configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    /// Anisotropy level; `None` disables it.
    pub anisotropy: Option<f32>,
}

impl SamplerDesc {
    /// Trilinear, wrapping. Material textures.
    pub const LINEAR_REPEAT: Self = Self {
        filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode: vk::SamplerAddressMode::REPEAT,
        anisotropy: None,
    };

    /// Trilinear, clamped. Render targets, cubemaps, LUTs.
    pub const LINEAR_CLAMP: Self = Self {
        filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        anisotropy: None,
    };

    /// Point sampling, clamped. Depth and noise lookups.
    pub const NEAREST_CLAMP: Self = Self {
        filter: vk::Filter::NEAREST,
        mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        anisotropy: None,
    };

    /// Point sampling, wrapping. Tiled noise textures.
    pub const NEAREST_REPEAT: Self = Self {
        filter: vk::Filter::NEAREST,
        mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        address_mode: vk::SamplerAddressMode::REPEAT,
        anisotropy: None,
    };

    #[must_use]
    pub fn with_anisotropy(mut self, level: f32) -> Self {
        self.anisotropy = (level > 1.0).then_some(level);
        self
    }

    fn create_info(&self) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.filter)
            .min_filter(self.filter)
            .mipmap_mode(self.mipmap_mode)
            .address_mode_u(self.address_mode)
            .address_mode_v(self.address_mode)
            .address_mode_w(self.address_mode)
            .anisotropy_enable(self.anisotropy.is_some())
            .max_anisotropy(self.anisotropy.unwrap_or(1.0))
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
    }

    /// Create the sampler.
    ///
    /// # Safety
    /// The device must be valid (and have sampler anisotropy enabled if requested).
    pub unsafe fn create(&self, device: &ash::Device) -> Result<vk::Sampler> {
        Ok(device.create_sampler(&self.create_info(), None)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_of_one_is_disabled() {
        assert_eq!(SamplerDesc::LINEAR_REPEAT.with_anisotropy(1.0).anisotropy, None);
        let info = SamplerDesc::LINEAR_REPEAT.with_anisotropy(8.0).create_info();
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 8.0);
    }

    #[test]
    fn presets_cover_all_axes() {
        let info = SamplerDesc::LINEAR_CLAMP.create_info();
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.max_lod, vk::LOD_CLAMP_NONE);
    }
}
