//! Image-based lighting maps, baked once at load time.

use std::time::Instant;

use ash::vk;
use ember_asset::HdrImage;
use ember_core::constants::{
    BRDF_LUT_SIZE, ENVIRONMENT_CUBE_SIZE, IRRADIANCE_CUBE_SIZE, PREFILTER_CUBE_SIZE,
    PREFILTER_MIP_LEVELS,
};
use ember_gpu::{
    mip_extent, AttachmentTarget, GpuContext, GpuError, ImageDesc, LoadOp, RenderInfo, Result,
    Texture,
};

use crate::graph::{Access, GraphImage, RenderGraph};
use crate::passes::brdf_lut::BRDF_LUT_FORMAT;
use crate::passes::cubemap::CUBE_FORMAT;
use crate::passes::prefilter::mip_roughness;
use crate::passes::{BrdfLutPass, CubemapPass, IrradiancePass, PrefilterPass, Samplers};
use crate::shaders::ShaderLibrary;

/// The cubemaps and lookup table the lighting and skybox passes sample.
pub struct EnvironmentMaps {
    /// Radiance cube, also drawn as the sky.
    pub environment: Texture,
    /// Cosine-convolved diffuse irradiance.
    pub irradiance: Texture,
    /// GGX-prefiltered radiance, roughness rising with mip level.
    pub prefiltered: Texture,
    /// Split-sum BRDF scale and bias.
    pub brdf_lut: Texture,
}

/// Pipelines used only while baking.
struct BakePasses {
    cubemap: CubemapPass,
    irradiance: IrradiancePass,
    prefilter: PrefilterPass,
    brdf_lut: BrdfLutPass,
}

impl BakePasses {
    fn new(gpu: &GpuContext, shaders: &ShaderLibrary) -> Result<Self> {
        let cubemap = CubemapPass::new(gpu, shaders)?;
        let irradiance = match IrradiancePass::new(gpu, shaders) {
            Ok(pass) => pass,
            Err(e) => {
                cubemap.destroy(gpu);
                return Err(e);
            }
        };
        let prefilter = match PrefilterPass::new(gpu, shaders) {
            Ok(pass) => pass,
            Err(e) => {
                cubemap.destroy(gpu);
                irradiance.destroy(gpu);
                return Err(e);
            }
        };
        let brdf_lut = match BrdfLutPass::new(gpu, shaders) {
            Ok(pass) => pass,
            Err(e) => {
                cubemap.destroy(gpu);
                irradiance.destroy(gpu);
                prefilter.destroy(gpu);
                return Err(e);
            }
        };
        Ok(Self {
            cubemap,
            irradiance,
            prefilter,
            brdf_lut,
        })
    }

    fn destroy(&self, gpu: &GpuContext) {
        self.cubemap.destroy(gpu);
        self.irradiance.destroy(gpu);
        self.prefilter.destroy(gpu);
        self.brdf_lut.destroy(gpu);
    }
}

fn square(size: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: size,
        height: size,
    }
}

fn face_target(view: vk::ImageView, extent: vk::Extent2D) -> RenderInfo {
    RenderInfo::new(extent).with_color(AttachmentTarget::color(view, LoadOp::DontCare))
}

impl EnvironmentMaps {
    /// Bake every map from an equirectangular HDR image in one blocking
    /// submission. All maps end shader-readable.
    pub fn bake(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        source: &HdrImage,
        samplers: &Samplers,
    ) -> Result<Self> {
        let started = Instant::now();
        let mut equirect = Texture::upload_rgba32f(
            gpu,
            source.width,
            source.height,
            &source.pixels,
            "environment equirect",
        )?;

        let result = Self::bake_from(gpu, shaders, &equirect, samplers);
        equirect.destroy(gpu);
        if result.is_ok() {
            tracing::info!(
                "Baked IBL maps from {}x{} environment in {:.1?}",
                source.width,
                source.height,
                started.elapsed()
            );
        }
        result
    }

    fn bake_from(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        equirect: &Texture,
        samplers: &Samplers,
    ) -> Result<Self> {
        let mut maps = Self::allocate(gpu)?;
        let passes = match BakePasses::new(gpu, shaders) {
            Ok(passes) => passes,
            Err(e) => {
                maps.destroy(gpu);
                return Err(e);
            }
        };

        // RGBA32F is not guaranteed to support linear filtering.
        let equirect_sampler = if gpu.supports_format_feature(
            equirect.format,
            vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
        ) {
            samplers.linear_clamp
        } else {
            samplers.nearest_clamp
        };
        passes.cubemap.set_source(gpu, equirect.view, equirect_sampler);
        passes
            .irradiance
            .set_environment(gpu, maps.environment.view, samplers.linear_clamp);
        passes
            .prefilter
            .set_environment(gpu, maps.environment.view, samplers.linear_clamp);

        let mut views = Vec::new();
        let result = maps.render(gpu, &passes, &mut views);
        for view in views {
            unsafe { gpu.device().destroy_image_view(view, None) };
        }
        passes.destroy(gpu);

        match result {
            Ok(()) => Ok(maps),
            Err(e) => {
                maps.destroy(gpu);
                Err(e)
            }
        }
    }

    fn allocate(gpu: &GpuContext) -> Result<Self> {
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        let descs = [
            (
                ImageDesc::cube(ENVIRONMENT_CUBE_SIZE, CUBE_FORMAT, usage),
                "environment cube",
            ),
            (
                ImageDesc::cube(IRRADIANCE_CUBE_SIZE, CUBE_FORMAT, usage),
                "irradiance cube",
            ),
            (
                ImageDesc::cube(PREFILTER_CUBE_SIZE, CUBE_FORMAT, usage)
                    .with_mips(PREFILTER_MIP_LEVELS),
                "prefiltered cube",
            ),
            (
                ImageDesc::texture_2d(BRDF_LUT_SIZE, BRDF_LUT_SIZE, BRDF_LUT_FORMAT, usage),
                "brdf lut",
            ),
        ];

        let mut created = Vec::with_capacity(descs.len());
        for (desc, name) in &descs {
            match Texture::new(gpu, desc, name) {
                Ok(texture) => created.push(texture),
                Err(e) => {
                    for mut texture in created {
                        texture.destroy(gpu);
                    }
                    return Err(e);
                }
            }
        }
        let [environment, irradiance, prefiltered, brdf_lut]: [Texture; 4] = created
            .try_into()
            .map_err(|_| GpuError::InvalidState("IBL image count mismatch".to_string()))?;
        Ok(Self {
            environment,
            irradiance,
            prefiltered,
            brdf_lut,
        })
    }

    /// Record and submit the bake. Views created for face targets are
    /// pushed to `views` for the caller to destroy.
    fn render(
        &self,
        gpu: &GpuContext,
        passes: &BakePasses,
        views: &mut Vec<vk::ImageView>,
    ) -> Result<()> {
        let device = gpu.device();
        let mut face_view = |texture: &Texture, face: u32, mip: u32| -> Result<vk::ImageView> {
            let view = texture.subresource_view(device, face, mip)?;
            views.push(view);
            Ok(view)
        };

        let mut environment_faces = Vec::with_capacity(6);
        let mut irradiance_faces = Vec::with_capacity(6);
        for face in 0..6 {
            environment_faces.push(face_view(&self.environment, face, 0)?);
            irradiance_faces.push(face_view(&self.irradiance, face, 0)?);
        }
        let mut prefilter_faces = Vec::with_capacity((PREFILTER_MIP_LEVELS * 6) as usize);
        for mip in 0..self.prefiltered.mip_levels {
            for face in 0..6 {
                prefilter_faces.push((mip, face, face_view(&self.prefiltered, face, mip)?));
            }
        }

        gpu.immediate_submit(|device, cmd| {
            let mut graph = RenderGraph::new();
            let color = vk::ImageAspectFlags::COLOR;
            let environment = graph.import(
                GraphImage::new("environment", self.environment.handle(), color)
                    .final_access(Access::Sampled),
            );
            let irradiance = graph.import(
                GraphImage::new("irradiance", self.irradiance.handle(), color)
                    .final_access(Access::Sampled),
            );
            let prefiltered = graph.import(
                GraphImage::new("prefiltered", self.prefiltered.handle(), color)
                    .final_access(Access::Sampled),
            );
            let brdf_lut = graph.import(
                GraphImage::new("brdf lut", self.brdf_lut.handle(), color)
                    .final_access(Access::Sampled),
            );

            for (face, &view) in (0u32..).zip(&environment_faces) {
                let info = face_target(view, self.environment.extent);
                graph.add_pass(
                    "environment face",
                    &[(environment, Access::ColorAttachment)],
                    move |device, cmd| {
                        unsafe { passes.cubemap.render(device, cmd, &info, face) };
                        Ok(())
                    },
                );
            }

            for (face, &view) in (0u32..).zip(&irradiance_faces) {
                let info = face_target(view, self.irradiance.extent);
                graph.add_pass(
                    "irradiance face",
                    &[
                        (environment, Access::Sampled),
                        (irradiance, Access::ColorAttachment),
                    ],
                    move |device, cmd| {
                        unsafe { passes.irradiance.render(device, cmd, &info, face) };
                        Ok(())
                    },
                );
            }

            let mip_levels = self.prefiltered.mip_levels;
            let source_resolution = self.environment.extent.width;
            for &(mip, face, view) in &prefilter_faces {
                let info = face_target(view, mip_extent(self.prefiltered.extent, mip));
                let roughness = mip_roughness(mip, mip_levels);
                graph.add_pass(
                    "prefilter face",
                    &[
                        (environment, Access::Sampled),
                        (prefiltered, Access::ColorAttachment),
                    ],
                    move |device, cmd| {
                        unsafe {
                            passes.prefilter.render(
                                device,
                                cmd,
                                &info,
                                face,
                                roughness,
                                source_resolution,
                            );
                        };
                        Ok(())
                    },
                );
            }

            let lut_info = RenderInfo::new(square(BRDF_LUT_SIZE)).with_color(
                AttachmentTarget::color(self.brdf_lut.view, LoadOp::DontCare),
            );
            graph.add_pass(
                "brdf lut",
                &[(brdf_lut, Access::ColorAttachment)],
                move |device, cmd| {
                    unsafe { passes.brdf_lut.render(device, cmd, &lut_info) };
                    Ok(())
                },
            );

            tracing::debug!("IBL bake graph: {} passes", graph.pass_count());
            graph.execute(device, cmd)
        })
    }

    /// Highest mip of the prefiltered cube, for roughness-to-LOD mapping.
    pub fn prefilter_max_mip(&self) -> f32 {
        self.prefiltered.mip_levels.saturating_sub(1) as f32
    }

    pub fn destroy(&mut self, gpu: &GpuContext) {
        self.environment.destroy(gpu);
        self.irradiance.destroy(gpu);
        self.prefiltered.destroy(gpu);
        self.brdf_lut.destroy(gpu);
    }
}
