//! Depth prepass.

use ash::vk;
use ember_gpu::{
    push_constant_range, GpuContext, GraphicsPipeline, GraphicsPipelineConfig, RenderInfo, Result,
};

use super::MeshBindings;
use crate::draw::{record_draws, DrawPushConstants, DrawStats, RenderObject};
use crate::shaders::ShaderLibrary;

/// Writes depth for opaque and alpha-masked surfaces.
///
/// The fragment stage only discards masked texels. `depth.vert` must compute
/// positions exactly as `mesh.vert` does, since lighting tests with EQUAL.
pub struct DepthPass {
    pipeline: GraphicsPipeline,
}

impl DepthPass {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: vk::DescriptorSetLayout,
        texture_layout: vk::DescriptorSetLayout,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let (vertex, fragment) = shaders.load_pair("depth.vert", "depth.frag")?;
        let config = GraphicsPipelineConfig {
            vertex_shader: vertex,
            fragment_shader: Some(fragment),
            dynamic_cull_mode: true,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            depth_format: Some(depth_format),
            ..GraphicsPipelineConfig::default()
        };
        let pipeline = unsafe {
            GraphicsPipeline::new(
                gpu.device(),
                &config,
                &[frame_layout, texture_layout],
                &[push_constant_range::<DrawPushConstants>(
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                )],
            )?
        };
        Ok(Self { pipeline })
    }

    /// # Safety
    /// `cmd` must be recording and the depth attachment writable.
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        bindings: &MeshBindings,
        objects: &[RenderObject],
    ) -> DrawStats {
        ember_gpu::begin_rendering(device, cmd, info);
        self.pipeline.bind(device, cmd);
        self.pipeline
            .bind_sets(device, cmd, 0, &[bindings.frame_set, bindings.texture_set]);
        let stats = record_draws(
            device,
            cmd,
            self.pipeline.layout,
            objects,
            bindings.material_buffer,
        );
        ember_gpu::end_rendering(device, cmd);
        stats
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        unsafe { self.pipeline.destroy(gpu.device()) };
    }
}
