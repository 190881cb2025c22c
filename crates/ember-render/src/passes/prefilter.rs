//! Specular prefiltering of the environment cube.

use ash::vk;
use ember_gpu::{GpuContext, RenderInfo, Result};

use super::cubemap::{CubeFacePushConstants, CUBE_FORMAT};
use super::FacePipeline;
use crate::shaders::ShaderLibrary;

/// Roughness stored in mip `level` of a chain of `levels`.
pub fn mip_roughness(level: u32, levels: u32) -> f32 {
    if levels <= 1 {
        return 0.0;
    }
    level as f32 / (levels - 1) as f32
}

/// GGX-prefilters the environment cube, one roughness per mip.
pub struct PrefilterPass {
    face: FacePipeline,
}

impl PrefilterPass {
    pub fn new(gpu: &GpuContext, shaders: &ShaderLibrary) -> Result<Self> {
        Ok(Self {
            face: FacePipeline::new(gpu, shaders, "prefilter.frag", CUBE_FORMAT)?,
        })
    }

    /// Bind the (mipmapped) environment cube to filter.
    pub fn set_environment(&self, gpu: &GpuContext, view: vk::ImageView, sampler: vk::Sampler) {
        self.face.set_input(gpu, view, sampler);
    }

    /// Render one face of one mip. `source_resolution` is the environment
    /// cube's edge length, used to pick a source mip per sample.
    ///
    /// # Safety
    /// See [`FacePipeline::render`].
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        face: u32,
        roughness: f32,
        source_resolution: u32,
    ) {
        let push = CubeFacePushConstants {
            roughness,
            source_resolution: source_resolution as f32,
            ..CubeFacePushConstants::new(face)
        };
        self.face.render(device, cmd, info, &push);
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        self.face.destroy(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn roughness_spans_zero_to_one() {
        assert_relative_eq!(mip_roughness(0, 5), 0.0);
        assert_relative_eq!(mip_roughness(2, 5), 0.5);
        assert_relative_eq!(mip_roughness(4, 5), 1.0);
        assert_relative_eq!(mip_roughness(0, 1), 0.0);
    }
}
