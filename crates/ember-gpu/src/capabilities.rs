//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Feature bits the renderer cares about, flattened out of the
/// Vulkan 1.2/1.3 feature structs.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    pub buffer_device_address: bool,
    pub descriptor_indexing: bool,
    pub runtime_descriptor_array: bool,
    pub descriptor_binding_partially_bound: bool,
    pub descriptor_binding_sampled_image_update_after_bind: bool,
    pub descriptor_binding_update_unused_while_pending: bool,
    pub shader_sampled_image_array_non_uniform_indexing: bool,
    pub scalar_block_layout: bool,
    pub shader_int64: bool,
    pub sampler_anisotropy: bool,
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type (discrete, integrated, ...)
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Supported features
    pub features: DeviceFeatures,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Largest sampled-image array usable with update-after-bind
    pub max_update_after_bind_sampled_images: u32,
    /// Maximum sampler anisotropy
    pub max_sampler_anisotropy: f32,
    /// Whether the swapchain extension is present
    pub supports_swapchain: bool,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let mut vk12_props = vk::PhysicalDeviceDescriptorIndexingProperties::default();
        let mut props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut vk12_props);
        instance.get_physical_device_properties2(physical_device, &mut props2);
        let max_update_after_bind_sampled_images =
            vk12_props.max_descriptor_set_update_after_bind_sampled_images;

        let mut vk12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut vk13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut vk12)
            .push_next(&mut vk13);
        instance.get_physical_device_features2(physical_device, &mut features2);
        let base = features2.features;

        let features = DeviceFeatures {
            dynamic_rendering: vk13.dynamic_rendering == vk::TRUE,
            synchronization2: vk13.synchronization2 == vk::TRUE,
            buffer_device_address: vk12.buffer_device_address == vk::TRUE,
            descriptor_indexing: vk12.descriptor_indexing == vk::TRUE,
            runtime_descriptor_array: vk12.runtime_descriptor_array == vk::TRUE,
            descriptor_binding_partially_bound: vk12.descriptor_binding_partially_bound
                == vk::TRUE,
            descriptor_binding_sampled_image_update_after_bind: vk12
                .descriptor_binding_sampled_image_update_after_bind
                == vk::TRUE,
            descriptor_binding_update_unused_while_pending: vk12
                .descriptor_binding_update_unused_while_pending
                == vk::TRUE,
            shader_sampled_image_array_non_uniform_indexing: vk12
                .shader_sampled_image_array_non_uniform_indexing
                == vk::TRUE,
            scalar_block_layout: vk12.scalar_block_layout == vk::TRUE,
            shader_int64: base.shader_int64 == vk::TRUE,
            sampler_anisotropy: base.sampler_anisotropy == vk::TRUE,
        };

        let supports_swapchain = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
            .iter()
            .any(|ext| CStr::from_ptr(ext.extension_name.as_ptr()) == ash::khr::swapchain::NAME);

        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            features,
            device_local_memory_mb,
            max_update_after_bind_sampled_images,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            supports_swapchain,
        }
    }

    /// Names of every requirement this device fails. Empty means usable.
    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let f = &self.features;
        let checks = [
            (
                vk::api_version_major(self.api_version) > 1
                    || (vk::api_version_major(self.api_version) == 1
                        && vk::api_version_minor(self.api_version) >= 3),
                "Vulkan 1.3",
            ),
            (self.supports_swapchain, "VK_KHR_swapchain"),
            (f.dynamic_rendering, "dynamicRendering"),
            (f.synchronization2, "synchronization2"),
            (f.buffer_device_address, "bufferDeviceAddress"),
            (f.descriptor_indexing, "descriptorIndexing"),
            (f.runtime_descriptor_array, "runtimeDescriptorArray"),
            (
                f.descriptor_binding_partially_bound,
                "descriptorBindingPartiallyBound",
            ),
            (
                f.descriptor_binding_sampled_image_update_after_bind,
                "descriptorBindingSampledImageUpdateAfterBind",
            ),
            (
                f.descriptor_binding_update_unused_while_pending,
                "descriptorBindingUpdateUnusedWhilePending",
            ),
            (
                f.shader_sampled_image_array_non_uniform_indexing,
                "shaderSampledImageArrayNonUniformIndexing",
            ),
            (f.scalar_block_layout, "scalarBlockLayout"),
            (f.shader_int64, "shaderInt64"),
        ];
        checks
            .into_iter()
            .filter_map(|(ok, name)| (!ok).then_some(name))
            .collect()
    }

    /// Check if the GPU meets minimum requirements for the renderer.
    pub fn meets_requirements(&self) -> bool {
        self.missing_requirements().is_empty()
    }

    /// Selection score among suitable devices: discrete first, then VRAM.
    pub fn score(&self) -> u64 {
        let type_score = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 3,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
            _ => 0,
        };
        (type_score << 48) + self.device_local_memory_mb
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_features() -> DeviceFeatures {
        DeviceFeatures {
            dynamic_rendering: true,
            synchronization2: true,
            buffer_device_address: true,
            descriptor_indexing: true,
            runtime_descriptor_array: true,
            descriptor_binding_partially_bound: true,
            descriptor_binding_sampled_image_update_after_bind: true,
            descriptor_binding_update_unused_while_pending: true,
            shader_sampled_image_array_non_uniform_indexing: true,
            scalar_block_layout: true,
            shader_int64: true,
            sampler_anisotropy: true,
        }
    }

    fn caps(device_type: vk::PhysicalDeviceType, vram: u64) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Other(0),
            device_name: "test".into(),
            device_type,
            api_version: vk::API_VERSION_1_3,
            driver_version: 0,
            features: full_features(),
            device_local_memory_mb: vram,
            max_update_after_bind_sampled_images: 500_000,
            max_sampler_anisotropy: 16.0,
            supports_swapchain: true,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn complete_device_has_no_missing_requirements() {
        let c = caps(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        assert!(c.missing_requirements().is_empty());
        assert!(c.meets_requirements());
    }

    #[test]
    fn missing_features_are_named() {
        let mut c = caps(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        c.features.dynamic_rendering = false;
        c.features.descriptor_binding_partially_bound = false;
        assert_eq!(
            c.missing_requirements(),
            vec!["dynamicRendering", "descriptorBindingPartiallyBound"]
        );
    }

    #[test]
    fn old_api_version_is_rejected() {
        let mut c = caps(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        c.api_version = vk::API_VERSION_1_2;
        assert_eq!(c.missing_requirements(), vec!["Vulkan 1.3"]);
    }

    #[test]
    fn discrete_beats_integrated_regardless_of_vram() {
        let discrete = caps(vk::PhysicalDeviceType::DISCRETE_GPU, 2048);
        let integrated = caps(vk::PhysicalDeviceType::INTEGRATED_GPU, 32_768);
        assert!(discrete.score() > integrated.score());

        let bigger = caps(vk::PhysicalDeviceType::DISCRETE_GPU, 16_384);
        assert!(bigger.score() > discrete.score());
    }
}
