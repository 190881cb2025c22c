//! Frame orchestration.

use std::cell::Cell;

use ash::vk;
use ember_asset::HdrImage;
use ember_core::constants::FRAMES_IN_FLIGHT;
use ember_gpu::{
    AttachmentTarget, DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter, FrameContext,
    GpuBuffer, GpuContext, GpuError, LoadOp, RenderInfo, Result, Viewport,
};
use gpu_allocator::MemoryLocation;

use crate::camera::{Camera, SceneUniforms};
use crate::draw::{DrawContext, DrawStats};
use crate::graph::{Access, GraphImage, RenderGraph};
use crate::ibl::EnvironmentMaps;
use crate::passes::{
    AoPass, BlurPass, CompositePass, DepthPass, LightingPass, MeshBindings, Samplers, SkyboxPass,
};
use crate::resources::{default_material, MaterialManager, MeshManager, TextureManager};
use crate::scene::GpuScene;
use crate::settings::RenderSettings;
use crate::shaders::ShaderLibrary;
use crate::targets::RenderTargets;

/// Per-frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Objects collected before culling.
    pub objects: usize,
    pub culled: usize,
    pub draws: DrawStats,
}

/// The swapchain-dependent attachments the renderer is built against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputTarget {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub depth_view: vk::ImageView,
}

impl OutputTarget {
    pub fn of_viewport(viewport: &Viewport) -> Self {
        Self {
            extent: viewport.extent(),
            format: viewport.format(),
            depth_view: viewport.depth_view(),
        }
    }

    pub fn of_frame(frame: &FrameContext<'_>) -> Self {
        Self {
            extent: frame.extent,
            format: frame.swapchain_format,
            depth_view: frame.depth_view,
        }
    }

    /// Names of the attachments that differ between `self` and `other`.
    pub fn mismatches(&self, other: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.extent != other.extent {
            changed.push("extent");
        }
        if self.format != other.format {
            changed.push("format");
        }
        if self.depth_view != other.depth_view {
            changed.push("depth view");
        }
        changed
    }
}

/// Set 0 bindings.
mod binding {
    pub const SCENE: u32 = 0;
    pub const IRRADIANCE: u32 = 1;
    pub const PREFILTERED: u32 = 2;
    pub const BRDF_LUT: u32 = 3;
    pub const AO: u32 = 4;
    pub const ENVIRONMENT: u32 = 5;
}

struct FrameResources {
    uniforms: GpuBuffer,
    set: vk::DescriptorSet,
}

/// Set 0 for every frame in flight: scene uniforms plus lighting inputs.
struct FrameDescriptors {
    layout: vk::DescriptorSetLayout,
    pool: DescriptorPool,
    frames: Vec<FrameResources>,
}

impl FrameDescriptors {
    fn new(gpu: &GpuContext) -> Result<Self> {
        let device = gpu.device();
        let fragment = vk::ShaderStageFlags::FRAGMENT;
        let layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .uniform_buffer(
                    binding::SCENE,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                )
                .sampled_image(binding::IRRADIANCE, fragment)
                .sampled_image(binding::PREFILTERED, fragment)
                .sampled_image(binding::BRDF_LUT, fragment)
                .sampled_image(binding::AO, fragment)
                .sampled_image(binding::ENVIRONMENT, fragment)
                .build(device)?
        };
        let frames = FRAMES_IN_FLIGHT as u32;
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frames,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: frames * 5,
            },
        ];
        let pool = unsafe { DescriptorPool::new(device, frames, &sizes, false)? };

        let mut descriptors = Self {
            layout,
            pool,
            frames: Vec::with_capacity(FRAMES_IN_FLIGHT),
        };
        for index in 0..FRAMES_IN_FLIGHT {
            if let Err(e) = descriptors.add_frame(gpu, index) {
                descriptors.destroy(gpu);
                return Err(e);
            }
        }
        Ok(descriptors)
    }

    fn add_frame(&mut self, gpu: &GpuContext, index: usize) -> Result<()> {
        let size = std::mem::size_of::<SceneUniforms>() as u64;
        let mut uniforms = gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            &format!("scene uniforms frame {index}"),
        )?;
        let set = match unsafe { self.pool.allocate_one(gpu.device(), self.layout) } {
            Ok(set) => set,
            Err(e) => {
                gpu.allocator().lock().free_buffer(&mut uniforms)?;
                return Err(e);
            }
        };
        unsafe {
            DescriptorWriter::new()
                .uniform_buffer(set, binding::SCENE, uniforms.buffer, 0, size)
                .flush(gpu.device());
        }
        self.frames.push(FrameResources { uniforms, set });
        Ok(())
    }

    /// Point every frame's image bindings at the current maps and targets.
    /// No frame may be in flight.
    fn write_images(
        &self,
        gpu: &GpuContext,
        environment: &EnvironmentMaps,
        targets: &RenderTargets,
        samplers: &Samplers,
    ) {
        let sampler = samplers.linear_clamp;
        let mut writer = DescriptorWriter::new();
        for frame in &self.frames {
            writer
                .sampled(frame.set, binding::IRRADIANCE, environment.irradiance.view, sampler)
                .sampled(frame.set, binding::PREFILTERED, environment.prefiltered.view, sampler)
                .sampled(frame.set, binding::BRDF_LUT, environment.brdf_lut.view, sampler)
                .sampled(frame.set, binding::AO, targets.ao_blurred.view, sampler)
                .sampled(frame.set, binding::ENVIRONMENT, environment.environment.view, sampler);
        }
        unsafe { writer.flush(gpu.device()) };
    }

    fn destroy(&mut self, gpu: &GpuContext) {
        {
            let mut allocator = gpu.allocator().lock();
            for frame in &mut self.frames {
                if let Err(e) = allocator.free_buffer(&mut frame.uniforms) {
                    tracing::warn!("Failed to free scene uniforms: {e}");
                }
            }
        }
        self.frames.clear();
        let device = gpu.device();
        unsafe {
            self.pool.destroy(device);
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// The per-frame passes.
struct Passes {
    depth: DepthPass,
    ao: AoPass,
    blur: BlurPass,
    lighting: LightingPass,
    skybox: SkyboxPass,
    composite: CompositePass,
}

impl Passes {
    #[allow(clippy::too_many_arguments)]
    fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: vk::DescriptorSetLayout,
        texture_layout: vk::DescriptorSetLayout,
        depth_format: vk::Format,
        swapchain_format: vk::Format,
        samplers: &Samplers,
        settings: &RenderSettings,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let depth = DepthPass::new(gpu, shaders, frame_layout, texture_layout, depth_format)?;
        let mut ao = AoPass::new(gpu, shaders, frame_layout, samplers, &settings.ao, extent)
            .inspect_err(|_| depth.destroy(gpu))?;
        let blur = BlurPass::new(gpu, shaders).inspect_err(|_| {
            depth.destroy(gpu);
            ao.destroy(gpu);
        })?;
        let lighting = LightingPass::new(gpu, shaders, frame_layout, texture_layout, depth_format)
            .inspect_err(|_| {
                depth.destroy(gpu);
                ao.destroy(gpu);
                blur.destroy(gpu);
            })?;
        let skybox =
            SkyboxPass::new(gpu, shaders, frame_layout, depth_format).inspect_err(|_| {
                depth.destroy(gpu);
                ao.destroy(gpu);
                blur.destroy(gpu);
                lighting.destroy(gpu);
            })?;
        let composite = CompositePass::new(gpu, shaders, swapchain_format).inspect_err(|_| {
            depth.destroy(gpu);
            ao.destroy(gpu);
            blur.destroy(gpu);
            lighting.destroy(gpu);
            skybox.destroy(gpu);
        })?;
        Ok(Self {
            depth,
            ao,
            blur,
            lighting,
            skybox,
            composite,
        })
    }

    fn destroy(&mut self, gpu: &GpuContext) {
        self.depth.destroy(gpu);
        self.ao.destroy(gpu);
        self.blur.destroy(gpu);
        self.lighting.destroy(gpu);
        self.skybox.destroy(gpu);
        self.composite.destroy(gpu);
    }
}

/// Owns every GPU resource needed to draw a scene into a viewport.
///
/// Frame order: depth, AO, AO blur, lighting, skybox, composite. Barriers
/// between them come from a [`RenderGraph`] rebuilt each frame.
pub struct Renderer {
    settings: RenderSettings,
    shaders: ShaderLibrary,
    pub(crate) textures: TextureManager,
    pub(crate) materials: MaterialManager,
    pub(crate) meshes: MeshManager,
    samplers: Samplers,
    frames: FrameDescriptors,
    targets: RenderTargets,
    environment: EnvironmentMaps,
    passes: Passes,
    draws: DrawContext,
    /// Attachments the size-dependent state was last built for.
    output: OutputTarget,
    stats: FrameStats,
}

impl Renderer {
    /// Build the renderer for `viewport` and bake IBL from `environment`.
    pub fn new(
        gpu: &GpuContext,
        viewport: &Viewport,
        settings: RenderSettings,
        environment: &HdrImage,
    ) -> Result<Self> {
        settings.validate()?;
        let output = OutputTarget::of_viewport(viewport);
        let (extent, swapchain_format) = (output.extent, output.format);
        let shaders = ShaderLibrary::new(&settings.shader_dir);
        tracing::info!("Loading shaders from {}", shaders.dir().display());

        let samplers = Samplers::new(gpu)?;
        let mut textures =
            TextureManager::new(gpu, settings.anisotropy).inspect_err(|_| samplers.destroy(gpu))?;
        let default = default_material(textures.white(), textures.flat_normal(), textures.black());
        let mut materials = MaterialManager::new(gpu, default).inspect_err(|_| {
            textures.destroy(gpu);
            samplers.destroy(gpu);
        })?;
        let mut frames = FrameDescriptors::new(gpu).inspect_err(|_| {
            materials.destroy(gpu);
            textures.destroy(gpu);
            samplers.destroy(gpu);
        })?;
        let mut targets = RenderTargets::new(gpu, extent).inspect_err(|_| {
            frames.destroy(gpu);
            materials.destroy(gpu);
            textures.destroy(gpu);
            samplers.destroy(gpu);
        })?;
        let mut maps = EnvironmentMaps::bake(gpu, &shaders, environment, &samplers)
            .inspect_err(|_| {
                targets.destroy(gpu);
                frames.destroy(gpu);
                materials.destroy(gpu);
                textures.destroy(gpu);
                samplers.destroy(gpu);
            })?;
        let passes = Passes::new(
            gpu,
            &shaders,
            frames.layout,
            textures.layout(),
            viewport.depth_format(),
            swapchain_format,
            &samplers,
            &settings,
            extent,
        )
        .inspect_err(|_| {
            maps.destroy(gpu);
            targets.destroy(gpu);
            frames.destroy(gpu);
            materials.destroy(gpu);
            textures.destroy(gpu);
            samplers.destroy(gpu);
        })?;

        let renderer = Self {
            settings,
            shaders,
            textures,
            materials,
            meshes: MeshManager::new(),
            samplers,
            frames,
            targets,
            environment: maps,
            passes,
            draws: DrawContext::new(),
            output,
            stats: FrameStats::default(),
        };
        renderer.write_target_descriptors(gpu);
        renderer.write_depth_descriptor(gpu);
        tracing::info!(
            "Renderer ready: {}x{}, output {swapchain_format:?}",
            extent.width,
            extent.height
        );
        Ok(renderer)
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Apply new settings. Waits for idle when the AO kernel changes.
    pub fn set_settings(&mut self, gpu: &GpuContext, settings: RenderSettings) -> Result<()> {
        settings.validate()?;
        if settings.ao != self.settings.ao {
            gpu.wait_idle()?;
            self.passes.ao.update(&settings.ao, self.targets.extent)?;
        }
        self.settings = settings;
        Ok(())
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn materials(&self) -> &MaterialManager {
        &self.materials
    }

    pub fn meshes(&self) -> &MeshManager {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut MeshManager {
        &mut self.meshes
    }

    pub fn last_stats(&self) -> FrameStats {
        self.stats
    }

    /// Recreate the screen-sized targets and rewrite what samples them.
    pub fn resize(&mut self, gpu: &GpuContext, extent: vk::Extent2D) -> Result<()> {
        if extent.width == 0 || extent.height == 0 || extent == self.targets.extent {
            return Ok(());
        }
        gpu.wait_idle()?;
        let targets = RenderTargets::new(gpu, extent)?;
        let mut old = std::mem::replace(&mut self.targets, targets);
        old.destroy(gpu);
        self.passes.ao.update(&self.settings.ao, extent)?;
        self.write_target_descriptors(gpu);
        tracing::debug!("Renderer resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Follow a swapchain rebuild. Call whenever the viewport reports
    /// [`ember_gpu::FrameOutcome::Recreated`]; waits for the device to idle.
    ///
    /// The depth descriptor is always rewritten since a new view may reuse
    /// the old handle value.
    pub fn on_viewport_recreated(&mut self, gpu: &GpuContext, viewport: &Viewport) -> Result<()> {
        let output = OutputTarget::of_viewport(viewport);
        gpu.wait_idle()?;
        self.resize(gpu, output.extent)?;
        if output.format != self.passes.composite.format() {
            self.passes
                .composite
                .recreate_pipeline(gpu, &self.shaders, output.format)?;
        }
        self.output = output;
        self.write_depth_descriptor(gpu);
        Ok(())
    }

    fn write_depth_descriptor(&self, gpu: &GpuContext) {
        self.passes
            .ao
            .set_depth(gpu, self.output.depth_view, self.samplers.nearest_clamp);
    }

    fn write_target_descriptors(&self, gpu: &GpuContext) {
        self.frames
            .write_images(gpu, &self.environment, &self.targets, &self.samplers);
        self.passes
            .blur
            .set_input(gpu, self.targets.ao_raw.view, self.samplers.linear_clamp);
        self.passes
            .composite
            .set_input(gpu, self.targets.hdr.view, self.samplers.linear_clamp);
    }

    /// Frames must target the attachments the renderer was last synced to.
    fn check_output(&self, frame: &FrameContext<'_>) -> Result<()> {
        let changed = self.output.mismatches(&OutputTarget::of_frame(frame));
        if changed.is_empty() {
            return Ok(());
        }
        Err(GpuError::InvalidState(format!(
            "viewport {} changed without Renderer::on_viewport_recreated",
            changed.join(", ")
        )))
    }

    /// Record one frame of `scene` seen from `camera` into `frame`.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        frame: &FrameContext<'_>,
        camera: &Camera,
        scene: &GpuScene,
    ) -> Result<()> {
        self.check_output(frame)?;

        // The frame's fence has been waited, so its buffers are free to write.
        let frame_index = frame.frame_index;
        self.materials.sync(frame_index)?;
        self.meshes.collect_garbage(gpu, frame.frame_number);

        let mut camera = camera.clone();
        camera.set_aspect(frame.extent.width as f32 / frame.extent.height.max(1) as f32);
        let uniforms = self.scene_uniforms(&camera, frame.extent);
        self.frames.frames[frame_index]
            .uniforms
            .write_value(0, &uniforms)?;

        self.draws.clear();
        scene.collect_draws(&self.meshes, &mut self.draws);
        let objects = self.draws.len();
        let culled = if self.settings.frustum_culling {
            self.draws.cull(&camera.frustum())
        } else {
            0
        };
        self.draws.sort(camera.position);

        let draws = self.record_frame(frame)?;
        self.stats = FrameStats {
            objects,
            culled,
            draws,
        };
        Ok(())
    }

    fn scene_uniforms(&self, camera: &Camera, extent: vk::Extent2D) -> SceneUniforms {
        let settings = &self.settings;
        let mut uniforms = SceneUniforms::from_camera(camera, extent.width, extent.height);
        uniforms.sun_direction = settings
            .sun_direction()
            .extend(settings.sun_intensity)
            .to_array();
        uniforms.sun_color = settings.sun_color.extend(1.0).to_array();
        uniforms.ibl = [
            settings.ibl_intensity,
            self.environment.prefilter_max_mip(),
            if settings.ao.enabled { 1.0 } else { 0.0 },
            0.0,
        ];
        uniforms
    }

    fn record_frame(&self, frame: &FrameContext<'_>) -> Result<DrawStats> {
        let extent = frame.extent;
        let frame_set = self.frames.frames[frame.frame_index].set;
        let bindings = MeshBindings {
            frame_set,
            texture_set: self.textures.set(),
            material_buffer: self.materials.buffer_address(frame.frame_index),
        };
        let stats = Cell::new(DrawStats::default());
        let add_stats = |more: DrawStats| {
            let mut total = stats.get();
            total += more;
            stats.set(total);
        };
        let passes = &self.passes;
        let draws = &self.draws;
        let targets = &self.targets;
        let settings = &self.settings;

        let color = vk::ImageAspectFlags::COLOR;
        let mut graph = RenderGraph::new();
        let depth = graph.import(GraphImage::new(
            "depth",
            frame.depth_image,
            vk::ImageAspectFlags::DEPTH,
        ));
        let hdr = graph.import(GraphImage::new("hdr", targets.hdr.handle(), color));
        let ao_raw = graph.import(GraphImage::new("ao raw", targets.ao_raw.handle(), color));
        let ao_blurred =
            graph.import(GraphImage::new("ao blurred", targets.ao_blurred.handle(), color));
        let swapchain = graph.import(
            GraphImage::new("swapchain", frame.swapchain_image, color)
                .final_access(Access::Present),
        );

        let depth_info = RenderInfo::new(extent).with_depth(AttachmentTarget::depth(
            frame.depth_view,
            LoadOp::ClearDepth(1.0),
        ));
        graph.add_pass(
            "depth",
            &[(depth, Access::DepthAttachmentWrite)],
            move |device, cmd| {
                add_stats(unsafe {
                    passes
                        .depth
                        .render(device, cmd, &depth_info, &bindings, &draws.opaque)
                });
                Ok(())
            },
        );

        if settings.ao.enabled {
            let ao_info = RenderInfo::new(extent).with_color(AttachmentTarget::color(
                targets.ao_raw.view,
                LoadOp::DontCare,
            ));
            graph.add_pass(
                "ao",
                &[
                    (depth, Access::DepthSampled),
                    (ao_raw, Access::ColorAttachment),
                ],
                move |device, cmd| {
                    unsafe { passes.ao.render(device, cmd, &ao_info, frame_set) };
                    Ok(())
                },
            );
            let blur_info = RenderInfo::new(extent).with_color(AttachmentTarget::color(
                targets.ao_blurred.view,
                LoadOp::DontCare,
            ));
            graph.add_pass(
                "ao blur",
                &[
                    (ao_raw, Access::Sampled),
                    (ao_blurred, Access::ColorAttachment),
                ],
                move |device, cmd| {
                    unsafe { passes.blur.render(device, cmd, &blur_info) };
                    Ok(())
                },
            );
        } else {
            // Unoccluded.
            let clear_info = RenderInfo::new(extent).with_color(AttachmentTarget::color(
                targets.ao_blurred.view,
                LoadOp::ClearColor([1.0; 4]),
            ));
            graph.add_pass(
                "ao clear",
                &[(ao_blurred, Access::ColorAttachment)],
                move |device, cmd| {
                    unsafe {
                        ember_gpu::begin_rendering(device, cmd, &clear_info);
                        ember_gpu::end_rendering(device, cmd);
                    }
                    Ok(())
                },
            );
        }

        let lighting_info = RenderInfo::new(extent)
            .with_color(AttachmentTarget::color(
                targets.hdr.view,
                LoadOp::ClearColor([0.0, 0.0, 0.0, 1.0]),
            ))
            .with_depth(AttachmentTarget::depth_read_only(frame.depth_view));
        graph.add_pass(
            "lighting",
            &[
                (depth, Access::DepthAttachmentRead),
                (ao_blurred, Access::Sampled),
                (hdr, Access::ColorAttachment),
            ],
            move |device, cmd| {
                add_stats(unsafe {
                    passes
                        .lighting
                        .render(device, cmd, &lighting_info, &bindings, draws)
                });
                Ok(())
            },
        );

        let skybox_info = RenderInfo::new(extent)
            .with_color(AttachmentTarget::color(targets.hdr.view, LoadOp::Load))
            .with_depth(AttachmentTarget::depth_read_only(frame.depth_view));
        graph.add_pass(
            "skybox",
            &[
                (depth, Access::DepthAttachmentRead),
                (hdr, Access::ColorAttachment),
            ],
            move |device, cmd| {
                unsafe { passes.skybox.render(device, cmd, &skybox_info, frame_set) };
                Ok(())
            },
        );

        let composite_info = RenderInfo::new(extent).with_color(AttachmentTarget::color(
            frame.swapchain_view,
            LoadOp::DontCare,
        ));
        graph.add_pass(
            "composite",
            &[(hdr, Access::Sampled), (swapchain, Access::ColorAttachment)],
            move |device, cmd| {
                unsafe {
                    passes
                        .composite
                        .render(device, cmd, &composite_info, settings);
                };
                Ok(())
            },
        );

        graph.execute(frame.device, frame.command_buffer)?;
        Ok(stats.get())
    }

    /// Destroy everything. Waits for the device to go idle first.
    pub fn destroy(&mut self, gpu: &GpuContext) {
        if let Err(e) = gpu.wait_idle() {
            tracing::error!("wait_idle before renderer teardown failed: {e}");
        }
        self.passes.destroy(gpu);
        self.environment.destroy(gpu);
        self.targets.destroy(gpu);
        self.frames.destroy(gpu);
        self.meshes.destroy(gpu);
        self.materials.destroy(gpu);
        self.textures.destroy(gpu);
        self.samplers.destroy(gpu);
        tracing::info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn output(width: u32, format: vk::Format, depth_view: u64) -> OutputTarget {
        OutputTarget {
            extent: vk::Extent2D { width, height: 720 },
            format,
            depth_view: vk::ImageView::from_raw(depth_view),
        }
    }

    #[test]
    fn matching_output_has_no_mismatches() {
        let a = output(1280, vk::Format::B8G8R8A8_SRGB, 7);
        assert!(a.mismatches(&a).is_empty());
    }

    #[test]
    fn reused_depth_handle_still_reports_resize() {
        let before = output(1280, vk::Format::B8G8R8A8_SRGB, 7);
        let after = output(1920, vk::Format::B8G8R8A8_SRGB, 7);
        assert_eq!(before.mismatches(&after), ["extent"]);
    }

    #[test]
    fn every_changed_attachment_is_named() {
        let before = output(1280, vk::Format::B8G8R8A8_SRGB, 7);
        let after = output(1280, vk::Format::B8G8R8A8_UNORM, 8);
        assert_eq!(before.mismatches(&after), ["format", "depth view"]);
    }
}
