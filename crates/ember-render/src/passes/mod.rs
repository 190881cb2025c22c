//! Render passes.
//!
//! Each pass owns its pipeline (and pass-local descriptor set, if any) and
//! records one dynamic-rendering scope over the attachments in the
//! [`RenderInfo`](ember_gpu::RenderInfo) it is given. Passes never issue
//! barriers; the [`RenderGraph`](crate::graph::RenderGraph) does.

pub mod ao;
pub mod blur;
pub mod brdf_lut;
pub mod composite;
pub mod cubemap;
pub mod depth;
pub mod irradiance;
pub mod lighting;
pub mod prefilter;
pub mod skybox;

pub use ao::{ssao_kernel, ssao_noise, AoKernel, AoPass};
pub use blur::BlurPass;
pub use brdf_lut::BrdfLutPass;
pub use composite::{CompositePass, CompositePushConstants};
pub use cubemap::{cube_face_view_projection, CubeFacePushConstants, CubemapPass};
pub use depth::DepthPass;
pub use irradiance::IrradiancePass;
pub use lighting::LightingPass;
pub use prefilter::PrefilterPass;
pub use skybox::SkyboxPass;

use ash::vk;
use ember_gpu::{
    push_constant_range, DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter,
    GpuContext, GraphicsPipeline, GraphicsPipelineConfig, Result, SamplerDesc,
};

use crate::shaders::ShaderLibrary;

/// Sets shared by the mesh passes.
#[derive(Clone, Copy, Debug)]
pub struct MeshBindings {
    /// Set 0: scene uniforms and lighting inputs.
    pub frame_set: vk::DescriptorSet,
    /// Set 1: bindless textures.
    pub texture_set: vk::DescriptorSet,
    pub material_buffer: vk::DeviceAddress,
}

/// A pass-local descriptor set with its own layout and pool.
pub struct PassDescriptors {
    pub layout: vk::DescriptorSetLayout,
    pool: DescriptorPool,
    pub set: vk::DescriptorSet,
}

impl PassDescriptors {
    pub fn new(
        gpu: &GpuContext,
        builder: DescriptorSetLayoutBuilder<'_>,
        sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let device = gpu.device();
        unsafe {
            let layout = builder.build(device)?;
            let pool = match DescriptorPool::new(device, 1, sizes, false) {
                Ok(pool) => pool,
                Err(e) => {
                    device.destroy_descriptor_set_layout(layout, None);
                    return Err(e);
                }
            };
            let set = match pool.allocate_one(device, layout) {
                Ok(set) => set,
                Err(e) => {
                    pool.destroy(device);
                    device.destroy_descriptor_set_layout(layout, None);
                    return Err(e);
                }
            };
            Ok(Self { layout, pool, set })
        }
    }

    /// `count` combined image samplers at bindings `0..count`, fragment stage.
    pub fn sampled(gpu: &GpuContext, count: u32) -> Result<Self> {
        let builder = (0..count).fold(DescriptorSetLayoutBuilder::new(), |b, binding| {
            b.sampled_image(binding, vk::ShaderStageFlags::FRAGMENT)
        });
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: count,
        }];
        Self::new(gpu, builder, &sizes)
    }

    /// Point `binding` at a shader-readable image. The set must not be in use.
    pub fn write_sampled(
        &self,
        gpu: &GpuContext,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) {
        unsafe {
            DescriptorWriter::new()
                .sampled(self.set, binding, view, sampler)
                .flush(gpu.device());
        }
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        let device = gpu.device();
        unsafe {
            self.pool.destroy(device);
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Build a pipeline, destroying `descriptors` if that fails.
fn pipeline_with_descriptors(
    gpu: &GpuContext,
    config: &GraphicsPipelineConfig,
    descriptors: &PassDescriptors,
    set_layouts: &[vk::DescriptorSetLayout],
    push_ranges: &[vk::PushConstantRange],
) -> Result<GraphicsPipeline> {
    let result = unsafe { GraphicsPipeline::new(gpu.device(), config, set_layouts, push_ranges) };
    if result.is_err() {
        descriptors.destroy(gpu);
    }
    result
}

/// Samplers shared between passes.
pub struct Samplers {
    pub linear_clamp: vk::Sampler,
    pub nearest_clamp: vk::Sampler,
    pub nearest_repeat: vk::Sampler,
}

impl Samplers {
    pub fn new(gpu: &GpuContext) -> Result<Self> {
        let device = gpu.device();
        let mut created = Vec::with_capacity(3);
        for desc in [
            SamplerDesc::LINEAR_CLAMP,
            SamplerDesc::NEAREST_CLAMP,
            SamplerDesc::NEAREST_REPEAT,
        ] {
            match unsafe { desc.create(device) } {
                Ok(sampler) => created.push(sampler),
                Err(e) => {
                    for sampler in created {
                        unsafe { device.destroy_sampler(sampler, None) };
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            linear_clamp: created[0],
            nearest_clamp: created[1],
            nearest_repeat: created[2],
        })
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        let device = gpu.device();
        unsafe {
            device.destroy_sampler(self.linear_clamp, None);
            device.destroy_sampler(self.nearest_clamp, None);
            device.destroy_sampler(self.nearest_repeat, None);
        }
    }
}

/// Cube-geometry pipeline that renders one cubemap face from a single
/// sampled input (set 0, binding 0).
pub struct FacePipeline {
    pipeline: GraphicsPipeline,
    descriptors: PassDescriptors,
}

impl FacePipeline {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        fragment: &str,
        format: vk::Format,
    ) -> Result<Self> {
        let (vertex, fragment) = shaders.load_pair("cube.vert", fragment)?;
        let descriptors = PassDescriptors::sampled(gpu, 1)?;
        let config = GraphicsPipelineConfig {
            vertex_shader: vertex,
            fragment_shader: Some(fragment),
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: false,
            depth_write: false,
            color_formats: vec![format],
            ..GraphicsPipelineConfig::default()
        };
        let pipeline = pipeline_with_descriptors(
            gpu,
            &config,
            &descriptors,
            &[descriptors.layout],
            &[push_constant_range::<CubeFacePushConstants>(
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        Ok(Self {
            pipeline,
            descriptors,
        })
    }

    pub fn set_input(&self, gpu: &GpuContext, view: vk::ImageView, sampler: vk::Sampler) {
        self.descriptors.write_sampled(gpu, 0, view, sampler);
    }

    /// # Safety
    /// `cmd` must be recording, the target in `COLOR_ATTACHMENT_OPTIMAL` and
    /// the input shader-readable.
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &ember_gpu::RenderInfo,
        push: &CubeFacePushConstants,
    ) {
        ember_gpu::begin_rendering(device, cmd, info);
        self.pipeline.bind(device, cmd);
        self.pipeline.bind_sets(device, cmd, 0, &[self.descriptors.set]);
        self.pipeline.push(
            device,
            cmd,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            push,
        );
        // Unit cube generated in the vertex shader.
        device.cmd_draw(cmd, 36, 1, 0, 0);
        ember_gpu::end_rendering(device, cmd);
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        unsafe { self.pipeline.destroy(gpu.device()) };
        self.descriptors.destroy(gpu);
    }
}

/// Draw the fullscreen triangle generated by `fullscreen.vert`.
///
/// # Safety
/// A rendering scope must be open with a fullscreen pipeline bound.
unsafe fn draw_fullscreen(device: &ash::Device, cmd: vk::CommandBuffer) {
    device.cmd_draw(cmd, 3, 1, 0, 0);
}
