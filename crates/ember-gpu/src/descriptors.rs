//! Descriptor set layouts, pools and batched writes.

use crate::error::Result;
use ash::vk;

/// Descriptor set layout builder.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
    flags: Vec<vk::DescriptorBindingFlags>,
    update_after_bind: bool,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding with explicit per-binding flags.
    #[must_use]
    pub fn binding_with_flags(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        if flags.contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND) {
            self.update_after_bind = true;
        }
        self.flags.push(flags);
        self
    }

    /// Add a binding.
    #[must_use]
    pub fn binding(
        self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.binding_with_flags(
            binding,
            descriptor_type,
            count,
            stage_flags,
            vk::DescriptorBindingFlags::empty(),
        )
    }

    /// Add a uniform buffer binding.
    #[must_use]
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a storage buffer binding.
    #[must_use]
    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags)
    }

    /// Add a combined image sampler binding.
    #[must_use]
    pub fn sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stage_flags,
        )
    }

    /// Add a sparsely populated combined-image-sampler array that may be
    /// written while sets using it are bound or pending.
    #[must_use]
    pub fn bindless_array(
        self,
        binding: u32,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.binding_with_flags(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count,
            stage_flags,
            bindless_binding_flags(),
        )
    }

    /// Whether any binding needs an update-after-bind pool.
    pub fn is_update_after_bind(&self) -> bool {
        self.update_after_bind
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let mut binding_flags =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&self.flags);
        let mut layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings)
            .push_next(&mut binding_flags);
        if self.update_after_bind {
            layout_info =
                layout_info.flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL);
        }

        Ok(device.create_descriptor_set_layout(&layout_info, None)?)
    }
}

/// Binding flags for a bindless texture array.
pub fn bindless_binding_flags() -> vk::DescriptorBindingFlags {
    vk::DescriptorBindingFlags::PARTIALLY_BOUND
        | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
        | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING
}

/// Descriptor pool for allocating descriptor sets.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        update_after_bind: bool,
    ) -> Result<Self> {
        let mut flags = vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        if update_after_bind {
            flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(flags);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        Ok(Self { pool })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one set per layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        Ok(device.allocate_descriptor_sets(&alloc_info)?)
    }

    /// Allocate a single set.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_one(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        Ok(self.allocate(device, &[layout])?[0])
    }

    /// Destroy the pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

enum PendingWrite {
    Image {
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    },
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
}

/// Collects descriptor writes and flushes them in one update call.
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a combined image sampler write at `array_element`.
    pub fn image(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) -> &mut Self {
        self.writes.push(PendingWrite::Image {
            set,
            binding,
            array_element,
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            info: vk::DescriptorImageInfo::default()
                .image_view(view)
                .sampler(sampler)
                .image_layout(layout),
        });
        self
    }

    /// Queue a shader-read-only sampled image write at element 0.
    pub fn sampled(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> &mut Self {
        self.image(
            set,
            binding,
            0,
            view,
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    /// Queue a uniform buffer write covering `range` bytes from `offset`.
    pub fn uniform_buffer(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    ) -> &mut Self {
        self.writes.push(PendingWrite::Buffer {
            set,
            binding,
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            info: vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset)
                .range(range),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every queued write and clear the batch.
    ///
    /// # Safety
    /// The device, sets and resources must be valid. Sets that are bound
    /// or pending may only be written through update-after-bind bindings.
    pub unsafe fn flush(&mut self, device: &ash::Device) {
        if self.writes.is_empty() {
            return;
        }
        let writes: Vec<vk::WriteDescriptorSet<'_>> = self
            .writes
            .iter()
            .map(|w| match w {
                PendingWrite::Image {
                    set,
                    binding,
                    array_element,
                    ty,
                    info,
                } => vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(*array_element)
                    .descriptor_type(*ty)
                    .image_info(std::slice::from_ref(info)),
                PendingWrite::Buffer {
                    set,
                    binding,
                    ty,
                    info,
                } => vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .buffer_info(std::slice::from_ref(info)),
            })
            .collect();
        device.update_descriptor_sets(&writes, &[]);
        self.writes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindless_array_marks_layout_update_after_bind() {
        let plain = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .sampled_image(1, vk::ShaderStageFlags::FRAGMENT);
        assert!(!plain.is_update_after_bind());

        let bindless =
            DescriptorSetLayoutBuilder::new().bindless_array(0, 4096, vk::ShaderStageFlags::FRAGMENT);
        assert!(bindless.is_update_after_bind());
        assert_eq!(bindless.bindings[0].descriptor_count, 4096);
        assert!(bindless.flags[0].contains(vk::DescriptorBindingFlags::PARTIALLY_BOUND));
        assert!(bindless.flags[0]
            .contains(vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING));
    }

    #[test]
    fn writer_batches_until_flush() {
        let mut writer = DescriptorWriter::new();
        writer
            .sampled(
                vk::DescriptorSet::null(),
                0,
                vk::ImageView::null(),
                vk::Sampler::null(),
            )
            .uniform_buffer(vk::DescriptorSet::null(), 1, vk::Buffer::null(), 0, 64);
        assert_eq!(writer.len(), 2);
    }
}
