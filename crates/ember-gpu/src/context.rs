//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::command::ImmediateSubmit;
use crate::error::{GpuError, Result};
use crate::instance::{
    create_instance, find_graphics_queue_family, select_physical_device, DebugMessenger,
};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;
use std::ffi::c_char;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,
    immediate: Mutex<ImmediateSubmit>,

    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Record commands with `f`, submit them and block until they finish.
    ///
    /// Meant for load-time work such as uploads and IBL baking; never call
    /// this from inside a frame's recording callback.
    pub fn immediate_submit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let immediate = self.immediate.lock();
        unsafe { immediate.submit(&self.device, self.graphics_queue, f) }
    }

    /// Format properties for `format` on the selected device.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// Whether optimal-tiling images of `format` support `feature`.
    pub fn supports_format_feature(
        &self,
        format: vk::Format,
        feature: vk::FormatFeatureFlags,
    ) -> bool {
        self.format_properties(format)
            .optimal_tiling_features
            .contains(feature)
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::warn!("device_wait_idle before context teardown failed: {e}");
            }

            self.immediate.lock().destroy(&self.device);

            // Frees all VkDeviceMemory; must precede device destruction.
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    display: Option<RawDisplayHandle>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_string(),
            enable_validation: cfg!(debug_assertions),
            display: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Enable the surface extensions needed to present on `display`.
    /// Without one the context is headless.
    #[must_use]
    pub fn display(mut self, display: RawDisplayHandle) -> Self {
        self.display = Some(display);
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let (instance, debug_messenger) = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.enable_validation,
                self.display,
            )
        }?;

        let selected = unsafe { select_physical_device(&instance) };
        let (physical_device, capabilities) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                unsafe {
                    if let Some(m) = &debug_messenger {
                        m.destroy();
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let graphics_queue_family =
            unsafe { find_graphics_queue_family(&instance, physical_device) }
                .ok_or(GpuError::NoSuitableDevice)?;

        let device = unsafe { create_device(&instance, physical_device, graphics_queue_family)? };
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let device = Arc::new(device);

        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;
        let immediate = unsafe { ImmediateSubmit::new(&device, graphics_queue_family) }?;

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            immediate: Mutex::new(immediate),
            graphics_queue_family,
            graphics_queue,
        })
    }
}

/// Create the logical device with the bindless / dynamic-rendering feature set.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let queue_priority = [1.0_f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&queue_priority)];

    let extension_names: [*const c_char; 1] = [ash::khr::swapchain::NAME.as_ptr()];

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default()
        .buffer_device_address(true)
        .descriptor_indexing(true)
        .scalar_block_layout(true)
        .runtime_descriptor_array(true)
        .descriptor_binding_partially_bound(true)
        .descriptor_binding_sampled_image_update_after_bind(true)
        .descriptor_binding_update_unused_while_pending(true)
        .descriptor_binding_variable_descriptor_count(false)
        .shader_sampled_image_array_non_uniform_indexing(true);

    let supports_anisotropy = instance
        .get_physical_device_features(physical_device)
        .sampler_anisotropy
        == vk::TRUE;
    let features = vk::PhysicalDeviceFeatures::default()
        .shader_int64(true)
        .sampler_anisotropy(supports_anisotropy);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    Ok(instance.create_device(physical_device, &device_create_info, None)?)
}
