//! AO denoise.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{
    push_constant_range, GpuContext, GraphicsPipeline, GraphicsPipelineConfig, RenderInfo, Result,
};

use super::{draw_fullscreen, pipeline_with_descriptors, PassDescriptors};
use crate::shaders::ShaderLibrary;
use crate::targets::AO_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BlurPushConstants {
    texel_size: [f32; 2],
}

/// 4x4 box blur matching the SSAO noise tile, raw AO into blurred AO.
pub struct BlurPass {
    pipeline: GraphicsPipeline,
    descriptors: PassDescriptors,
}

impl BlurPass {
    pub fn new(gpu: &GpuContext, shaders: &ShaderLibrary) -> Result<Self> {
        let (vertex, fragment) = shaders.load_pair("fullscreen.vert", "blur.frag")?;
        let descriptors = PassDescriptors::sampled(gpu, 1)?;
        let config = GraphicsPipelineConfig::fullscreen(vertex, fragment, AO_FORMAT);
        let pipeline = pipeline_with_descriptors(
            gpu,
            &config,
            &descriptors,
            &[descriptors.layout],
            &[push_constant_range::<BlurPushConstants>(
                vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        Ok(Self {
            pipeline,
            descriptors,
        })
    }

    /// Bind the raw AO image. The set must not be in use.
    pub fn set_input(&self, gpu: &GpuContext, view: vk::ImageView, sampler: vk::Sampler) {
        self.descriptors.write_sampled(gpu, 0, view, sampler);
    }

    /// # Safety
    /// `cmd` must be recording, the target writable and the input sampled.
    pub unsafe fn render(&self, device: &ash::Device, cmd: vk::CommandBuffer, info: &RenderInfo) {
        let push = BlurPushConstants {
            texel_size: [
                1.0 / info.extent.width.max(1) as f32,
                1.0 / info.extent.height.max(1) as f32,
            ],
        };
        ember_gpu::begin_rendering(device, cmd, info);
        self.pipeline.bind(device, cmd);
        self.pipeline
            .bind_sets(device, cmd, 0, &[self.descriptors.set]);
        self.pipeline
            .push(device, cmd, vk::ShaderStageFlags::FRAGMENT, &push);
        draw_fullscreen(device, cmd);
        ember_gpu::end_rendering(device, cmd);
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        unsafe { self.pipeline.destroy(gpu.device()) };
        self.descriptors.destroy(gpu);
    }
}
