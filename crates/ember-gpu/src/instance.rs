//! Vulkan instance creation and physical device selection.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, c_void, CStr, CString};

/// Name of the Khronos validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance extensions for presenting to windows on `display`.
///
/// The surface extensions come from `ash-window`, so only the platform's
/// own window system is requested. Without a display no surface extension
/// is enabled at all.
pub fn required_instance_extensions(
    display: Option<RawDisplayHandle>,
) -> Result<Vec<&'static CStr>> {
    let mut extensions = Vec::new();
    if let Some(display) = display {
        let names = ash_window::enumerate_required_extensions(display)?;
        // SAFETY: ash-window hands out pointers to static NUL-terminated names.
        extensions.extend(names.iter().map(|&name| unsafe { CStr::from_ptr(name) }));
    }
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME);
    Ok(extensions)
}

/// Debug-utils messenger forwarding validation output to `tracing`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Destroy the messenger.
    ///
    /// # Safety
    /// Must be called before the owning instance is destroyed.
    pub unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback struct for the duration of the call.
    let data = unsafe { &*data };
    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        // SAFETY: non-null p_message is a NUL-terminated string owned by the loader.
        unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "[{ty:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "[{ty:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!(target: "vulkan", "[{ty:?}] {message}");
    } else {
        tracing::trace!(target: "vulkan", "[{ty:?}] {message}");
    }
    vk::FALSE
}

/// Whether `layer` is installed on this system.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
unsafe fn layer_available(entry: &ash::Entry, layer: &CStr) -> Result<bool> {
    let available = entry.enumerate_instance_layer_properties()?;
    Ok(available
        .iter()
        .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == layer))
}

/// Create a Vulkan 1.3 instance, plus a debug messenger when validating.
///
/// Requesting validation without the layer installed is an error.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    display: Option<RawDisplayHandle>,
) -> Result<(ash::Instance, Option<DebugMessenger>)> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::InvalidState(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Ember")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extensions = required_instance_extensions(display)?;
    let mut layers = Vec::new();
    if enable_validation {
        if !layer_available(entry, VALIDATION_LAYER)? {
            return Err(GpuError::ValidationLayerMissing(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ));
        }
        layers.push(VALIDATION_LAYER);
        extensions.push(ash::ext::debug_utils::NAME);
    }

    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    // Also chained into instance creation so create/destroy are covered.
    let mut debug_info = messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);
    if enable_validation {
        create_info = create_info.push_next(&mut debug_info);
    }

    let instance = entry.create_instance(&create_info, None)?;

    let messenger = if enable_validation {
        let loader = ash::ext::debug_utils::Instance::new(entry, &instance);
        match loader.create_debug_utils_messenger(&messenger_create_info(), None) {
            Ok(messenger) => Some(DebugMessenger { loader, messenger }),
            Err(e) => {
                instance.destroy_instance(None);
                return Err(e.into());
            }
        }
    } else {
        None
    };

    tracing::debug!(validation = enable_validation, "Vulkan instance created");
    Ok((instance, messenger))
}

/// Select the best physical device that satisfies every requirement.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, GpuCapabilities)> {
    let devices = instance.enumerate_physical_devices()?;

    let mut best: Option<(vk::PhysicalDevice, GpuCapabilities)> = None;
    for device in devices {
        let caps = GpuCapabilities::query(instance, device);
        let missing = caps.missing_requirements();
        if !missing.is_empty() {
            tracing::info!(
                "Skipping {}: missing {}",
                caps.device_name,
                missing.join(", ")
            );
            continue;
        }
        if find_graphics_queue_family(instance, device).is_none() {
            tracing::info!("Skipping {}: no graphics queue", caps.device_name);
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |(_, current)| caps.score() > current.score())
        {
            best = Some((device, caps));
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

/// Index of the first queue family supporting graphics.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<u32> {
    instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, XlibDisplayHandle};
    use std::ptr::NonNull;

    #[test]
    fn xlib_display_enables_only_xlib_surface() {
        let display = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
        let extensions = required_instance_extensions(Some(display)).unwrap();
        assert!(extensions.contains(&ash::khr::surface::NAME));
        assert!(extensions.contains(&ash::khr::xlib_surface::NAME));
        assert!(!extensions.contains(&ash::khr::wayland_surface::NAME));
        assert!(!extensions.contains(&ash::khr::xcb_surface::NAME));
    }

    #[test]
    fn wayland_display_skips_x11_surfaces() {
        let mut dummy = 0u8;
        let display = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(
            NonNull::from(&mut dummy).cast(),
        ));
        let extensions = required_instance_extensions(Some(display)).unwrap();
        assert!(extensions.contains(&ash::khr::wayland_surface::NAME));
        assert!(!extensions.contains(&ash::khr::xlib_surface::NAME));
    }

    #[test]
    fn headless_needs_no_surface_extension() {
        let extensions = required_instance_extensions(None).unwrap();
        assert!(!extensions.contains(&ash::khr::surface::NAME));
    }
}
