//! Graphics pipeline creation (dynamic rendering only).

use crate::error::{GpuError, Result};
use ash::vk;

/// Colour blending for every colour attachment of a pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite.
    #[default]
    Opaque,
    /// Straight alpha: `src * a + dst * (1 - a)`.
    Alpha,
    /// `src + dst`.
    Additive,
}

impl BlendMode {
    fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            Self::Opaque => state.blend_enable(false),
            Self::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD),
            Self::Additive => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Graphics pipeline configuration.
///
/// Vertices are fetched through buffer device addresses, so there is no
/// vertex input state. Viewport and scissor are always dynamic.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    /// `None` for depth-only pipelines.
    pub fragment_shader: Option<Vec<u32>>,
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    /// Make cull mode dynamic state (set per draw with `cmd_set_cull_mode`).
    pub dynamic_cull_mode: bool,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub blend: BlendMode,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: None,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            dynamic_cull_mode: false,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            blend: BlendMode::Opaque,
            color_formats: Vec::new(),
            depth_format: None,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Fullscreen-triangle pass writing one colour target, no depth.
    pub fn fullscreen(vertex: Vec<u32>, fragment: Vec<u32>, color_format: vk::Format) -> Self {
        Self {
            vertex_shader: vertex,
            fragment_shader: Some(fragment),
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: false,
            depth_write: false,
            color_formats: vec![color_format],
            ..Self::default()
        }
    }
}

/// Graphics pipeline wrapper.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline using dynamic rendering (Vulkan 1.3).
    ///
    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let vert_module = create_shader_module(device, &config.vertex_shader, "vertex")?;
        let frag_module = match &config.fragment_shader {
            Some(code) => match create_shader_module(device, code, "fragment") {
                Ok(module) => Some(module),
                Err(e) => {
                    device.destroy_shader_module(vert_module, None);
                    return Err(e);
                }
            },
            None => None,
        };

        let result = Self::build(
            device,
            config,
            vert_module,
            frag_module,
            descriptor_set_layouts,
            push_constant_ranges,
        );

        device.destroy_shader_module(vert_module, None);
        if let Some(frag) = frag_module {
            device.destroy_shader_module(frag, None);
        }
        result
    }

    unsafe fn build(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        vert_module: vk::ShaderModule,
        frag_module: Option<vk::ShaderModule>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let mut shader_stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main")];
        if let Some(frag) = frag_module {
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(frag)
                    .name(c"main"),
            );
        }

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments: Vec<_> = config
            .color_formats
            .iter()
            .map(|_| config.blend.attachment_state())
            .collect();
        let color_blending =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        if config.dynamic_cull_mode {
            dynamic_states.push(vk::DynamicState::CULL_MODE);
        }
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&config.color_formats);
        if let Some(depth_format) = config.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = match device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        ) {
            Ok(pipelines) => pipelines,
            Err((_, e)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        Ok(Self {
            pipeline: pipelines[0],
            layout,
        })
    }

    /// Bind the pipeline for graphics.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn bind(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
    }

    /// Bind descriptor sets starting at `first_set`.
    ///
    /// # Safety
    /// The command buffer must be recording and the sets compatible.
    pub unsafe fn bind_sets(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.layout,
            first_set,
            sets,
            &[],
        );
    }

    /// Push a plain-old-data block to `stages` at offset 0.
    ///
    /// # Safety
    /// The command buffer must be recording and the range declared in the layout.
    pub unsafe fn push<T: bytemuck::Pod>(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        stages: vk::ShaderStageFlags,
        data: &T,
    ) {
        device.cmd_push_constants(cmd, self.layout, stages, 0, bytemuck::bytes_of(data));
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

/// Push constant range of `size_of::<T>()` bytes at offset 0.
pub fn push_constant_range<T>(stages: vk::ShaderStageFlags) -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(stages)
        .offset(0)
        .size(std::mem::size_of::<T>() as u32)
}

unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
    stage: &str,
) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&info, None)
        .map_err(|e| GpuError::ShaderModule(format!("{stage}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_blend_uses_source_alpha() {
        let state = BlendMode::Alpha.attachment_state();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(BlendMode::Opaque.attachment_state().blend_enable, vk::FALSE);
    }

    #[test]
    fn fullscreen_config_disables_depth() {
        let config = GraphicsPipelineConfig::fullscreen(
            vec![0x0723_0203],
            vec![0x0723_0203],
            vk::Format::R16G16B16A16_SFLOAT,
        );
        assert!(!config.depth_test && !config.depth_write);
        assert!(config.depth_format.is_none());
        assert_eq!(config.cull_mode, vk::CullModeFlags::NONE);
    }

    #[test]
    fn push_range_matches_type_size() {
        let range = push_constant_range::<[f32; 22]>(vk::ShaderStageFlags::VERTEX);
        assert_eq!(range.size, 88);
        assert_eq!(range.offset, 0);
    }
}
