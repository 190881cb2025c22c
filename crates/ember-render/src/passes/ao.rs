//! Screen-space ambient occlusion.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_core::constants::{MAX_SSAO_KERNEL, SSAO_NOISE_SIZE};
use ember_gpu::{
    DescriptorSetLayoutBuilder, DescriptorWriter, GpuBuffer, GpuContext, GraphicsPipeline,
    GraphicsPipelineConfig, RenderInfo, Result, Texture,
};
use glam::{Vec3, Vec4};
use gpu_allocator::MemoryLocation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{draw_fullscreen, pipeline_with_descriptors, PassDescriptors, Samplers};
use crate::settings::AoSettings;
use crate::shaders::ShaderLibrary;
use crate::targets::AO_FORMAT;

const KERNEL_SEED: u64 = 0x5ca1_ab1e;
const NOISE_SEED: u64 = 0xa0_5eed;
/// Edge length of the tiled rotation texture.
const NOISE_DIM: u32 = 4;

/// Tangent-space hemisphere samples (+Z up), denser near the origin.
pub fn ssao_kernel(count: usize, seed: u64) -> Vec<Vec4> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let direction = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..1.0),
            )
            .try_normalize()
            .unwrap_or(Vec3::Z);
            let t = i as f32 / count as f32;
            let scale = 0.1 + 0.9 * t * t;
            (direction * rng.gen_range(0.0..1.0) * scale).extend(0.0)
        })
        .collect()
}

/// Random rotations around +Z, encoded as RGBA8 (`v * 0.5 + 0.5`).
pub fn ssao_noise(seed: u64) -> Vec<[u8; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let encode = |v: f32| ((v * 0.5 + 0.5) * 255.0).round() as u8;
    (0..SSAO_NOISE_SIZE)
        .map(|_| {
            let x: f32 = rng.gen_range(-1.0..1.0);
            let y: f32 = rng.gen_range(-1.0..1.0);
            [encode(x), encode(y), encode(0.0), 255]
        })
        .collect()
}

/// AO uniform block (AO set, binding 2).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct AoKernel {
    pub samples: [[f32; 4]; MAX_SSAO_KERNEL],
    /// radius, bias, intensity, sample count
    pub params: [f32; 4],
    /// Screen size over noise tile size.
    pub noise_scale: [f32; 4],
}

impl AoKernel {
    pub fn new(settings: &AoSettings, extent: vk::Extent2D) -> Self {
        let count = settings.kernel_size.min(MAX_SSAO_KERNEL);
        let mut samples = [[0.0; 4]; MAX_SSAO_KERNEL];
        for (slot, sample) in samples.iter_mut().zip(ssao_kernel(count, KERNEL_SEED)) {
            *slot = sample.to_array();
        }
        Self {
            samples,
            params: [
                settings.radius,
                settings.bias,
                settings.intensity,
                count as f32,
            ],
            noise_scale: [
                extent.width as f32 / NOISE_DIM as f32,
                extent.height as f32 / NOISE_DIM as f32,
                0.0,
                0.0,
            ],
        }
    }
}

/// Estimates occlusion from the prepass depth into the raw AO target.
///
/// Set 0 is the frame set (for the projection matrices); set 1 holds depth,
/// noise and the kernel.
pub struct AoPass {
    pipeline: GraphicsPipeline,
    descriptors: PassDescriptors,
    noise: Texture,
    kernel: GpuBuffer,
}

impl AoPass {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: vk::DescriptorSetLayout,
        samplers: &Samplers,
        settings: &AoSettings,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let (vertex, fragment) = shaders.load_pair("fullscreen.vert", "ssao.frag")?;

        let noise_pixels: Vec<u8> = ssao_noise(NOISE_SEED).concat();
        let mut noise =
            Texture::upload_rgba8(gpu, NOISE_DIM, NOISE_DIM, &noise_pixels, false, "ssao noise")?;
        let mut kernel = match gpu.allocator().lock().create_buffer(
            std::mem::size_of::<AoKernel>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "ssao kernel",
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                noise.destroy(gpu);
                return Err(e);
            }
        };

        let free = |noise: &mut Texture, kernel: &mut GpuBuffer| {
            noise.destroy(gpu);
            if let Err(e) = gpu.allocator().lock().free_buffer(kernel) {
                tracing::warn!("Failed to free SSAO kernel: {e}");
            }
        };

        if let Err(e) = kernel.write_value(0, &AoKernel::new(settings, extent)) {
            free(&mut noise, &mut kernel);
            return Err(e);
        }

        let stage = vk::ShaderStageFlags::FRAGMENT;
        let builder = DescriptorSetLayoutBuilder::new()
            .sampled_image(0, stage)
            .sampled_image(1, stage)
            .uniform_buffer(2, stage);
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            },
        ];
        let descriptors = match PassDescriptors::new(gpu, builder, &sizes) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                free(&mut noise, &mut kernel);
                return Err(e);
            }
        };

        let config = GraphicsPipelineConfig::fullscreen(vertex, fragment, AO_FORMAT);
        let pipeline = match pipeline_with_descriptors(
            gpu,
            &config,
            &descriptors,
            &[frame_layout, descriptors.layout],
            &[],
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                free(&mut noise, &mut kernel);
                return Err(e);
            }
        };

        unsafe {
            DescriptorWriter::new()
                .sampled(descriptors.set, 1, noise.view, samplers.nearest_repeat)
                .uniform_buffer(
                    descriptors.set,
                    2,
                    kernel.buffer,
                    0,
                    std::mem::size_of::<AoKernel>() as u64,
                )
                .flush(gpu.device());
        }

        Ok(Self {
            pipeline,
            descriptors,
            noise,
            kernel,
        })
    }

    /// Bind the depth image sampled in `DEPTH_STENCIL_READ_ONLY_OPTIMAL`.
    /// The set must not be in use.
    pub fn set_depth(&self, gpu: &GpuContext, depth_view: vk::ImageView, sampler: vk::Sampler) {
        unsafe {
            DescriptorWriter::new()
                .image(
                    self.descriptors.set,
                    0,
                    0,
                    depth_view,
                    sampler,
                    vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                )
                .flush(gpu.device());
        }
    }

    /// Rewrite the kernel for new settings or a new screen size. The device
    /// must be idle.
    pub fn update(&self, settings: &AoSettings, extent: vk::Extent2D) -> Result<()> {
        self.kernel.write_value(0, &AoKernel::new(settings, extent))
    }

    /// # Safety
    /// `cmd` must be recording, the AO target writable and depth sampled.
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        frame_set: vk::DescriptorSet,
    ) {
        ember_gpu::begin_rendering(device, cmd, info);
        self.pipeline.bind(device, cmd);
        self.pipeline
            .bind_sets(device, cmd, 0, &[frame_set, self.descriptors.set]);
        draw_fullscreen(device, cmd);
        ember_gpu::end_rendering(device, cmd);
    }

    pub fn destroy(&mut self, gpu: &GpuContext) {
        unsafe { self.pipeline.destroy(gpu.device()) };
        self.descriptors.destroy(gpu);
        self.noise.destroy(gpu);
        if let Err(e) = gpu.allocator().lock().free_buffer(&mut self.kernel) {
            tracing::warn!("Failed to free SSAO kernel: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_lies_in_unit_hemisphere() {
        let kernel = ssao_kernel(MAX_SSAO_KERNEL, 7);
        assert_eq!(kernel.len(), MAX_SSAO_KERNEL);
        for (i, sample) in kernel.iter().enumerate() {
            let t = i as f32 / MAX_SSAO_KERNEL as f32;
            assert!(sample.z >= 0.0);
            assert!(sample.truncate().length() <= 0.1 + 0.9 * t * t + 1e-5);
            assert_eq!(sample.w, 0.0);
        }
    }

    #[test]
    fn kernel_is_deterministic_per_seed() {
        assert_eq!(ssao_kernel(16, 3), ssao_kernel(16, 3));
        assert_ne!(ssao_kernel(16, 3), ssao_kernel(16, 4));
    }

    #[test]
    fn noise_rotates_around_z() {
        let noise = ssao_noise(1);
        assert_eq!(noise.len(), SSAO_NOISE_SIZE);
        assert!(noise.iter().all(|texel| texel[2] == 128 && texel[3] == 255));
    }

    #[test]
    fn uniform_block_carries_settings() {
        let settings = AoSettings {
            kernel_size: 8,
            ..AoSettings::default()
        };
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let block = AoKernel::new(&settings, extent);
        assert_eq!(block.params[3], 8.0);
        assert_eq!(block.params[0], settings.radius);
        assert_eq!(block.noise_scale[0], 320.0);
        assert_eq!(block.samples[8], [0.0; 4]);
        assert_ne!(block.samples[7], [0.0; 4]);
        assert_eq!(std::mem::size_of::<AoKernel>() % 16, 0);
    }
}
