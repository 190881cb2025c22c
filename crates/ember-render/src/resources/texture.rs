//! Bindless texture array.

use ash::vk;
use ember_core::constants::MAX_BINDLESS_TEXTURES;
use ember_core::{HandleAllocator, ResourceHandle, TextureHandle};
use ember_gpu::{
    DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter, GpuContext, GpuError, Result,
    SamplerDesc, Texture,
};

/// Texture slots behind one update-after-bind descriptor set (binding 0).
///
/// Handles come from a monotonic allocator, so a freshly added texture never
/// lands in a slot an in-flight frame could be sampling. Slots are never
/// freed individually; everything is released in [`TextureManager::destroy`].
pub struct TextureManager {
    layout: vk::DescriptorSetLayout,
    pool: DescriptorPool,
    set: vk::DescriptorSet,
    sampler: vk::Sampler,
    handles: HandleAllocator<TextureHandle>,
    textures: Vec<Option<Texture>>,
    white: TextureHandle,
    flat_normal: TextureHandle,
    black: TextureHandle,
}

/// Number of slots given the device's update-after-bind limit.
pub fn texture_capacity(device_limit: u32) -> u32 {
    MAX_BINDLESS_TEXTURES.min(device_limit).max(3)
}

impl TextureManager {
    /// Create the descriptor set and the three default textures.
    pub fn new(gpu: &GpuContext, anisotropy: f32) -> Result<Self> {
        let device = gpu.device();
        let caps = gpu.capabilities();
        let capacity = texture_capacity(caps.max_update_after_bind_sampled_images);
        let anisotropy = if caps.features.sampler_anisotropy {
            anisotropy.min(caps.max_sampler_anisotropy)
        } else {
            1.0
        };

        let layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .bindless_array(0, capacity, vk::ShaderStageFlags::FRAGMENT)
                .build(device)?
        };
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: capacity,
        }];
        let pool = unsafe { DescriptorPool::new(device, 1, &sizes, true)? };
        let set = unsafe { pool.allocate_one(device, layout)? };
        let sampler = unsafe {
            SamplerDesc::LINEAR_REPEAT
                .with_anisotropy(anisotropy)
                .create(device)?
        };

        let mut manager = Self {
            layout,
            pool,
            set,
            sampler,
            handles: HandleAllocator::new(capacity),
            textures: Vec::new(),
            white: TextureHandle::INVALID,
            flat_normal: TextureHandle::INVALID,
            black: TextureHandle::INVALID,
        };
        manager.white = manager.add_rgba8(gpu, 1, 1, &[255; 4], true, "default white")?;
        manager.flat_normal =
            manager.add_rgba8(gpu, 1, 1, &[128, 128, 255, 255], false, "default normal")?;
        manager.black = manager.add_rgba8(gpu, 1, 1, &[0, 0, 0, 255], true, "default black")?;

        tracing::info!("Texture manager ready with {capacity} bindless slots");
        Ok(manager)
    }

    /// Take ownership of `texture` and write its descriptor into a new slot.
    ///
    /// The texture must already be in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn add(&mut self, gpu: &GpuContext, mut texture: Texture) -> Result<TextureHandle> {
        let Some(handle) = self.handles.allocate() else {
            texture.destroy(gpu);
            return Err(GpuError::CapacityExceeded(format!(
                "bindless texture array is full ({} slots)",
                self.handles.capacity()
            )));
        };
        self.write_slot(gpu.device(), handle, texture.view);

        let index = handle.index() as usize;
        if self.textures.len() <= index {
            self.textures.resize_with(index + 1, || None);
        }
        self.textures[index] = Some(texture);
        Ok(handle)
    }

    /// Upload tightly packed RGBA8 pixels and add them.
    pub fn add_rgba8(
        &mut self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        pixels: &[u8],
        srgb: bool,
        name: &str,
    ) -> Result<TextureHandle> {
        if self.handles.remaining() == 0 {
            return Err(GpuError::CapacityExceeded(format!(
                "bindless texture array is full ({} slots), dropping {name}",
                self.handles.capacity()
            )));
        }
        let texture = Texture::upload_rgba8(gpu, width, height, pixels, srgb, name)?;
        self.add(gpu, texture)
    }

    /// Swap the texture behind a live handle.
    ///
    /// Waits for the device to go idle first, since any in-flight frame may
    /// sample the old image.
    pub fn replace(
        &mut self,
        gpu: &GpuContext,
        handle: TextureHandle,
        mut texture: Texture,
    ) -> Result<()> {
        if !self.contains(handle) {
            texture.destroy(gpu);
            return Err(ember_core::Error::InvalidHandle(handle.to_string()).into());
        }
        gpu.wait_idle()?;
        self.write_slot(gpu.device(), handle, texture.view);
        if let Some(mut old) = self.textures[handle.index() as usize].replace(texture) {
            old.destroy(gpu);
        }
        Ok(())
    }

    fn write_slot(&self, device: &ash::Device, handle: TextureHandle, view: vk::ImageView) {
        unsafe {
            DescriptorWriter::new()
                .image(
                    self.set,
                    0,
                    handle.index(),
                    view,
                    self.sampler,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
                .flush(device);
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle.index() as usize)?.as_ref()
    }

    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn white(&self) -> TextureHandle {
        self.white
    }

    pub fn flat_normal(&self) -> TextureHandle {
        self.flat_normal
    }

    pub fn black(&self) -> TextureHandle {
        self.black
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Slots in use, defaults included.
    pub fn len(&self) -> usize {
        self.handles.allocated() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u32 {
        self.handles.capacity()
    }

    /// Free every texture and the descriptor objects. The device must be idle.
    pub fn destroy(&mut self, gpu: &GpuContext) {
        for mut texture in self.textures.drain(..).flatten() {
            texture.destroy(gpu);
        }
        let device = gpu.device();
        unsafe {
            device.destroy_sampler(self.sampler, None);
            self.pool.destroy(device);
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_clamped_to_device_limit() {
        assert_eq!(texture_capacity(u32::MAX), MAX_BINDLESS_TEXTURES);
        assert_eq!(texture_capacity(1000), 1000);
        // Room for the defaults even on a degenerate limit.
        assert_eq!(texture_capacity(0), 3);
    }
}
