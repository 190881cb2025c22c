//! Screen-sized intermediate images.

use ash::vk;
use ember_gpu::{GpuContext, ImageDesc, Result, Texture};

pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const AO_FORMAT: vk::Format = vk::Format::R8_UNORM;

/// Attachments owned by the renderer, recreated on resize.
pub struct RenderTargets {
    /// Lit scene before tonemapping.
    pub hdr: Texture,
    pub ao_raw: Texture,
    pub ao_blurred: Texture,
    pub extent: vk::Extent2D,
}

impl RenderTargets {
    pub fn new(gpu: &GpuContext, extent: vk::Extent2D) -> Result<Self> {
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        let create = |format, name| {
            Texture::new(
                gpu,
                &ImageDesc::texture_2d(extent.width, extent.height, format, usage),
                name,
            )
        };

        let mut hdr = create(HDR_FORMAT, "hdr target")?;
        let mut ao_raw = match create(AO_FORMAT, "ao raw") {
            Ok(texture) => texture,
            Err(e) => {
                hdr.destroy(gpu);
                return Err(e);
            }
        };
        let ao_blurred = match create(AO_FORMAT, "ao blurred") {
            Ok(texture) => texture,
            Err(e) => {
                hdr.destroy(gpu);
                ao_raw.destroy(gpu);
                return Err(e);
            }
        };

        tracing::debug!("Render targets created: {}x{}", extent.width, extent.height);
        Ok(Self {
            hdr,
            ao_raw,
            ao_blurred,
            extent,
        })
    }

    pub fn destroy(&mut self, gpu: &GpuContext) {
        self.hdr.destroy(gpu);
        self.ao_raw.destroy(gpu);
        self.ao_blurred.destroy(gpu);
    }
}
