//! PBR shading into the HDR target.

use ash::vk;
use ember_gpu::{
    push_constant_range, BlendMode, GpuContext, GraphicsPipeline, GraphicsPipelineConfig,
    RenderInfo, Result,
};

use super::MeshBindings;
use crate::draw::{record_draws, DrawContext, DrawPushConstants, DrawStats};
use crate::shaders::ShaderLibrary;
use crate::targets::HDR_FORMAT;

/// Shades opaque surfaces against the prepass depth, then blends
/// transparent surfaces on top.
pub struct LightingPass {
    opaque: GraphicsPipeline,
    transparent: GraphicsPipeline,
}

impl LightingPass {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: vk::DescriptorSetLayout,
        texture_layout: vk::DescriptorSetLayout,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let device = gpu.device();
        let (vertex, fragment) = shaders.load_pair("mesh.vert", "lighting.frag")?;
        let opaque_config = GraphicsPipelineConfig {
            vertex_shader: vertex,
            fragment_shader: Some(fragment),
            dynamic_cull_mode: true,
            depth_test: true,
            depth_write: false,
            depth_compare: vk::CompareOp::EQUAL,
            color_formats: vec![HDR_FORMAT],
            depth_format: Some(depth_format),
            ..GraphicsPipelineConfig::default()
        };
        let transparent_config = GraphicsPipelineConfig {
            depth_compare: vk::CompareOp::LESS_OR_EQUAL,
            blend: BlendMode::Alpha,
            ..opaque_config.clone()
        };

        let set_layouts = [frame_layout, texture_layout];
        let push = [push_constant_range::<DrawPushConstants>(
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )];
        let opaque = unsafe { GraphicsPipeline::new(device, &opaque_config, &set_layouts, &push)? };
        let transparent =
            match unsafe { GraphicsPipeline::new(device, &transparent_config, &set_layouts, &push) } {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    unsafe { opaque.destroy(device) };
                    return Err(e);
                }
            };
        Ok(Self {
            opaque,
            transparent,
        })
    }

    /// # Safety
    /// `cmd` must be recording, the HDR target writable and depth read-only.
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        bindings: &MeshBindings,
        draws: &DrawContext,
    ) -> DrawStats {
        let sets = [bindings.frame_set, bindings.texture_set];
        let mut stats = DrawStats::default();
        ember_gpu::begin_rendering(device, cmd, info);

        self.opaque.bind(device, cmd);
        self.opaque.bind_sets(device, cmd, 0, &sets);
        stats += record_draws(
            device,
            cmd,
            self.opaque.layout,
            &draws.opaque,
            bindings.material_buffer,
        );

        if !draws.transparent.is_empty() {
            self.transparent.bind(device, cmd);
            self.transparent.bind_sets(device, cmd, 0, &sets);
            stats += record_draws(
                device,
                cmd,
                self.transparent.layout,
                &draws.transparent,
                bindings.material_buffer,
            );
        }

        ember_gpu::end_rendering(device, cmd);
        stats
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        let device = gpu.device();
        unsafe {
            self.opaque.destroy(device);
            self.transparent.destroy(device);
        }
    }
}
