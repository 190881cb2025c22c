//! Split-sum BRDF integration table.

use ash::vk;
use ember_gpu::{GpuContext, GraphicsPipeline, GraphicsPipelineConfig, RenderInfo, Result};

use super::draw_fullscreen;
use crate::shaders::ShaderLibrary;

/// Scale and bias for F0, indexed by (N·V, roughness).
pub const BRDF_LUT_FORMAT: vk::Format = vk::Format::R16G16_SFLOAT;

pub struct BrdfLutPass {
    pipeline: GraphicsPipeline,
}

impl BrdfLutPass {
    pub fn new(gpu: &GpuContext, shaders: &ShaderLibrary) -> Result<Self> {
        let (vertex, fragment) = shaders.load_pair("fullscreen.vert", "brdf_lut.frag")?;
        let config = GraphicsPipelineConfig::fullscreen(vertex, fragment, BRDF_LUT_FORMAT);
        let pipeline = unsafe { GraphicsPipeline::new(gpu.device(), &config, &[], &[])? };
        Ok(Self { pipeline })
    }

    /// # Safety
    /// `cmd` must be recording and the target in `COLOR_ATTACHMENT_OPTIMAL`.
    pub unsafe fn render(&self, device: &ash::Device, cmd: vk::CommandBuffer, info: &RenderInfo) {
        ember_gpu::begin_rendering(device, cmd, info);
        self.pipeline.bind(device, cmd);
        draw_fullscreen(device, cmd);
        ember_gpu::end_rendering(device, cmd);
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        unsafe { self.pipeline.destroy(gpu.device()) };
    }
}
