//! Environment background.

use ash::vk;
use ember_gpu::{GpuContext, GraphicsPipeline, GraphicsPipelineConfig, RenderInfo, Result};

use super::draw_fullscreen;
use crate::shaders::ShaderLibrary;
use crate::targets::HDR_FORMAT;

/// Fills pixels no geometry covered with the environment cube.
///
/// The fullscreen triangle sits on the far plane, so LESS_OR_EQUAL against
/// the cleared depth passes exactly where nothing was drawn.
pub struct SkyboxPass {
    pipeline: GraphicsPipeline,
}

impl SkyboxPass {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: vk::DescriptorSetLayout,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let (vertex, fragment) = shaders.load_pair("fullscreen.vert", "skybox.frag")?;
        let config = GraphicsPipelineConfig {
            depth_test: true,
            depth_write: false,
            depth_compare: vk::CompareOp::LESS_OR_EQUAL,
            depth_format: Some(depth_format),
            ..GraphicsPipelineConfig::fullscreen(vertex, fragment, HDR_FORMAT)
        };
        let pipeline = unsafe { GraphicsPipeline::new(gpu.device(), &config, &[frame_layout], &[])? };
        Ok(Self { pipeline })
    }

    /// # Safety
    /// `cmd` must be recording, the HDR target writable and depth read-only.
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        frame_set: vk::DescriptorSet,
    ) {
        ember_gpu::begin_rendering(device, cmd, info);
        self.pipeline.bind(device, cmd);
        self.pipeline.bind_sets(device, cmd, 0, &[frame_set]);
        draw_fullscreen(device, cmd);
        ember_gpu::end_rendering(device, cmd);
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        unsafe { self.pipeline.destroy(gpu.device()) };
    }
}
