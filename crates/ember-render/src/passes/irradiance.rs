//! Diffuse irradiance convolution.

use ash::vk;
use ember_gpu::{GpuContext, RenderInfo, Result};

use super::cubemap::{CubeFacePushConstants, CUBE_FORMAT};
use super::FacePipeline;
use crate::shaders::ShaderLibrary;

/// Convolves the environment cube over the hemisphere around each texel
/// direction.
pub struct IrradiancePass {
    face: FacePipeline,
}

impl IrradiancePass {
    pub fn new(gpu: &GpuContext, shaders: &ShaderLibrary) -> Result<Self> {
        Ok(Self {
            face: FacePipeline::new(gpu, shaders, "irradiance.frag", CUBE_FORMAT)?,
        })
    }

    /// Bind the environment cube to convolve.
    pub fn set_environment(&self, gpu: &GpuContext, view: vk::ImageView, sampler: vk::Sampler) {
        self.face.set_input(gpu, view, sampler);
    }

    /// # Safety
    /// See [`FacePipeline::render`].
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        face: u32,
    ) {
        self.face
            .render(device, cmd, info, &CubeFacePushConstants::new(face));
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        self.face.destroy(gpu);
    }
}
