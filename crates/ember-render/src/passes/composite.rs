//! Tonemapping into the swapchain image.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{
    push_constant_range, GpuContext, GraphicsPipeline, GraphicsPipelineConfig, RenderInfo, Result,
};

use super::{draw_fullscreen, PassDescriptors};
use crate::settings::{RenderSettings, Tonemap};
use crate::shaders::ShaderLibrary;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CompositePushConstants {
    pub exposure: f32,
    /// [`Tonemap::shader_id`]
    pub tonemap: u32,
    /// 1 when the target is UNORM and the shader must apply the sRGB curve.
    pub encode_srgb: u32,
    pub _pad: u32,
}

impl CompositePushConstants {
    pub fn new(exposure: f32, tonemap: Tonemap, target: vk::Format) -> Self {
        Self {
            exposure,
            tonemap: tonemap.shader_id(),
            encode_srgb: u32::from(!is_srgb(target)),
            _pad: 0,
        }
    }
}

/// Whether writes to `format` are sRGB-encoded by the hardware.
pub fn is_srgb(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::B8G8R8A8_SRGB
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::A8B8G8R8_SRGB_PACK32
            | vk::Format::R8G8B8_SRGB
            | vk::Format::B8G8R8_SRGB
    )
}

/// Applies exposure and a tonemap operator to the HDR target.
pub struct CompositePass {
    pipeline: GraphicsPipeline,
    descriptors: PassDescriptors,
    format: vk::Format,
}

impl CompositePass {
    pub fn new(gpu: &GpuContext, shaders: &ShaderLibrary, format: vk::Format) -> Result<Self> {
        let descriptors = PassDescriptors::sampled(gpu, 1)?;
        let pipeline = match Self::create_pipeline(gpu, shaders, descriptors.layout, format) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                descriptors.destroy(gpu);
                return Err(e);
            }
        };
        Ok(Self {
            pipeline,
            descriptors,
            format,
        })
    }

    fn create_pipeline(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        layout: vk::DescriptorSetLayout,
        format: vk::Format,
    ) -> Result<GraphicsPipeline> {
        let (vertex, fragment) = shaders.load_pair("fullscreen.vert", "composite.frag")?;
        let config = GraphicsPipelineConfig::fullscreen(vertex, fragment, format);
        unsafe {
            GraphicsPipeline::new(
                gpu.device(),
                &config,
                &[layout],
                &[push_constant_range::<CompositePushConstants>(
                    vk::ShaderStageFlags::FRAGMENT,
                )],
            )
        }
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Rebuild for a new swapchain format. The device must be idle.
    pub fn recreate_pipeline(
        &mut self,
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        format: vk::Format,
    ) -> Result<()> {
        let pipeline = Self::create_pipeline(gpu, shaders, self.descriptors.layout, format)?;
        let old = std::mem::replace(&mut self.pipeline, pipeline);
        unsafe { old.destroy(gpu.device()) };
        tracing::info!("Composite pipeline rebuilt for {format:?}");
        self.format = format;
        Ok(())
    }

    /// Bind the HDR image. The set must not be in use.
    pub fn set_input(&self, gpu: &GpuContext, view: vk::ImageView, sampler: vk::Sampler) {
        self.descriptors.write_sampled(gpu, 0, view, sampler);
    }

    /// # Safety
    /// `cmd` must be recording, the swapchain image writable and HDR sampled.
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        settings: &RenderSettings,
    ) {
        let push = CompositePushConstants::new(settings.exposure, settings.tonemap, self.format);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unorm_targets_need_shader_encoding() {
        let srgb = CompositePushConstants::new(1.0, Tonemap::Aces, vk::Format::B8G8R8A8_SRGB);
        let unorm = CompositePushConstants::new(1.0, Tonemap::Aces, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(srgb.encode_srgb, 0);
        assert_eq!(unorm.encode_srgb, 1);
    }

    #[test]
    fn push_block_is_16_bytes() {
        assert_eq!(std::mem::size_of::<CompositePushConstants>(), 16);
    }
}
