//! Sampled/attachment images with their default view, plus uploads.

use crate::barrier::{cmd_image_barriers, image_barrier, ImageState};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::upload::create_staging_buffer;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Number of mips in a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Extent of `level` in a chain starting at `base`, clamped to 1.
pub fn mip_extent(base: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: (base.width >> level).max(1),
        height: (base.height >> level).max(1),
    }
}

/// 2D texture or six-layer cubemap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    D2,
    Cube,
}

impl ImageKind {
    pub const fn layers(self) -> u32 {
        match self {
            Self::D2 => 1,
            Self::Cube => 6,
        }
    }

    pub const fn view_type(self) -> vk::ImageViewType {
        match self {
            Self::D2 => vk::ImageViewType::TYPE_2D,
            Self::Cube => vk::ImageViewType::CUBE,
        }
    }
}

/// Description of an image to create.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub kind: ImageKind,
}

impl ImageDesc {
    pub fn texture_2d(
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            format,
            usage,
            mip_levels: 1,
            kind: ImageKind::D2,
        }
    }

    pub fn cube(size: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent: vk::Extent2D {
                width: size,
                height: size,
            },
            format,
            usage,
            mip_levels: 1,
            kind: ImageKind::Cube,
        }
    }

    #[must_use]
    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    /// Aspect implied by the format.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        format_aspect(self.format)
    }
}

/// Aspect mask for a format.
pub fn format_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// An image, its allocation and a view over every mip and layer.
pub struct Texture {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub kind: ImageKind,
    pub aspect: vk::ImageAspectFlags,
}

impl Texture {
    /// Allocate a device-local image described by `desc`.
    pub fn new(gpu: &GpuContext, desc: &ImageDesc, name: &str) -> Result<Self> {
        let mut flags = vk::ImageCreateFlags::empty();
        if desc.kind == ImageKind::Cube {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }
        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.kind.layers())
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image =
            gpu.allocator()
                .lock()
                .create_image(&create_info, MemoryLocation::GpuOnly, name)?;

        let aspect = desc.aspect();
        let view = match unsafe {
            create_view(
                gpu.device(),
                image.image,
                desc.format,
                desc.kind.view_type(),
                aspect,
                0,
                desc.mip_levels,
                0,
                desc.kind.layers(),
            )
        } {
            Ok(view) => view,
            Err(e) => {
                gpu.allocator().lock().free_image(&mut image)?;
                return Err(e);
            }
        };

        Ok(Self {
            image,
            view,
            format: desc.format,
            extent: desc.extent,
            mip_levels: desc.mip_levels,
            kind: desc.kind,
            aspect,
        })
    }

    pub fn handle(&self) -> vk::Image {
        self.image.image
    }

    pub fn layers(&self) -> u32 {
        self.kind.layers()
    }

    /// Whole-image subresource range.
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect)
            .base_mip_level(0)
            .level_count(self.mip_levels)
            .base_array_layer(0)
            .layer_count(self.layers())
    }

    /// A 2D view of one layer at one mip, for rendering into a cube face.
    /// The caller owns (and destroys) the returned view.
    pub fn subresource_view(
        &self,
        device: &ash::Device,
        layer: u32,
        mip: u32,
    ) -> Result<vk::ImageView> {
        unsafe {
            create_view(
                device,
                self.image.image,
                self.format,
                vk::ImageViewType::TYPE_2D,
                self.aspect,
                mip,
                1,
                layer,
                1,
            )
        }
    }

    /// Create a sampled RGBA8 texture from tightly packed pixels.
    ///
    /// When the format supports linear blits the full mip chain is
    /// generated on the GPU; otherwise only mip 0 is filled. The texture
    /// ends in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_rgba8(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        pixels: &[u8],
        srgb: bool,
        name: &str,
    ) -> Result<Self> {
        let format = if srgb {
            vk::Format::R8G8B8A8_SRGB
        } else {
            vk::Format::R8G8B8A8_UNORM
        };
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(GpuError::InvalidState(format!(
                "{name}: expected {expected} bytes for {width}x{height} RGBA8, got {}",
                pixels.len()
            )));
        }

        let can_blit = gpu.supports_format_feature(
            format,
            vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
        );
        let mip_levels = if can_blit {
            mip_level_count(width, height)
        } else {
            1
        };

        let desc = ImageDesc::texture_2d(
            width,
            height,
            format,
            vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
        )
        .with_mips(mip_levels);

        Self::upload(gpu, &desc, pixels, name)
    }

    /// Create a single-mip RGBA32F texture (HDR environment source).
    pub fn upload_rgba32f(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        pixels: &[f32],
        name: &str,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(GpuError::InvalidState(format!(
                "{name}: expected {expected} floats for {width}x{height} RGBA32F, got {}",
                pixels.len()
            )));
        }
        let desc = ImageDesc::texture_2d(
            width,
            height,
            vk::Format::R32G32B32A32_SFLOAT,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        );
        Self::upload(gpu, &desc, bytemuck::cast_slice(pixels), name)
    }

    fn upload(gpu: &GpuContext, desc: &ImageDesc, bytes: &[u8], name: &str) -> Result<Self> {
        let mut texture = Self::new(gpu, desc, name)?;
        let mut staging = create_staging_buffer(gpu, bytes, name)?;

        let result = gpu.immediate_submit(|device, cmd| {
            unsafe { texture.record_upload(device, cmd, staging.buffer) };
            Ok(())
        });

        gpu.allocator().lock().free_buffer(&mut staging)?;
        if let Err(e) = result {
            texture.destroy(gpu);
            return Err(e);
        }

        tracing::debug!(
            "Uploaded {name} ({}x{}, {:?}, {} mips)",
            texture.extent.width,
            texture.extent.height,
            texture.format,
            texture.mip_levels
        );
        Ok(texture)
    }

    /// Copy mip 0 from `staging`, blit the rest, leave everything shader-readable.
    unsafe fn record_upload(&self, device: &ash::Device, cmd: vk::CommandBuffer, staging: vk::Buffer) {
        let image = self.image.image;
        cmd_image_barriers(
            device,
            cmd,
            &[image_barrier(
                image,
                self.full_range(),
                ImageState::UNDEFINED,
                ImageState::TRANSFER_DST,
            )],
        );

        let copy = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            });
        device.cmd_copy_buffer_to_image(
            cmd,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy],
        );

        let level_range = |level: u32| {
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(level)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1)
        };

        for level in 1..self.mip_levels {
            let src = mip_extent(self.extent, level - 1);
            let dst = mip_extent(self.extent, level);

            cmd_image_barriers(
                device,
                cmd,
                &[image_barrier(
                    image,
                    level_range(level - 1),
                    ImageState::TRANSFER_DST,
                    ImageState::TRANSFER_SRC,
                )],
            );

            let blit = vk::ImageBlit::default()
                .src_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level - 1)
                        .layer_count(1),
                )
                .src_offsets([
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: src.width as i32,
                        y: src.height as i32,
                        z: 1,
                    },
                ])
                .dst_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level)
                        .layer_count(1),
                )
                .dst_offsets([
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: dst.width as i32,
                        y: dst.height as i32,
                        z: 1,
                    },
                ]);
            device.cmd_blit_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );

            cmd_image_barriers(
                device,
                cmd,
                &[image_barrier(
                    image,
                    level_range(level - 1),
                    ImageState::TRANSFER_SRC,
                    ImageState::SHADER_READ,
                )],
            );
        }

        cmd_image_barriers(
            device,
            cmd,
            &[image_barrier(
                image,
                level_range(self.mip_levels - 1),
                ImageState::TRANSFER_DST,
                ImageState::SHADER_READ,
            )],
        );
    }

    /// Free the view, image and memory. Safe to call twice.
    pub fn destroy(&mut self, gpu: &GpuContext) {
        unsafe {
            if self.view != vk::ImageView::null() {
                gpu.device().destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
        }
        if let Err(e) = gpu.allocator().lock().free_image(&mut self.image) {
            tracing::warn!("Failed to free image: {e}");
        }
    }
}

/// # Safety
/// The device and image must be valid.
#[allow(clippy::too_many_arguments)]
unsafe fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    view_type: vk::ImageViewType,
    aspect: vk::ImageAspectFlags,
    base_mip: u32,
    mip_count: u32,
    base_layer: u32,
    layer_count: u32,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(base_mip)
                .level_count(mip_count)
                .base_array_layer(base_layer)
                .layer_count(layer_count),
        );
    Ok(device.create_image_view(&info, None)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_for_common_sizes() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(300, 17), 9);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn mip_extent_halves_and_clamps() {
        let base = vk::Extent2D {
            width: 512,
            height: 128,
        };
        assert_eq!(mip_extent(base, 0), base);
        assert_eq!(
            mip_extent(base, 2),
            vk::Extent2D {
                width: 128,
                height: 32
            }
        );
        assert_eq!(
            mip_extent(base, 8),
            vk::Extent2D {
                width: 2,
                height: 1
            }
        );
        assert_eq!(
            mip_extent(base, 20),
            vk::Extent2D {
                width: 1,
                height: 1
            }
        );
    }

    #[test]
    fn depth_formats_use_depth_aspect() {
        assert_eq!(
            format_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            format_aspect(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(ImageKind::Cube.layers(), 6);
    }
}
