//! Window surface and swapchain creation.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{calculate_extent, select_present_mode, select_surface_format, Swapchain};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Vulkan surface for a window plus the loaders that operate on it.
pub struct SurfaceContext {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Create a surface for `window`.
    ///
    /// # Safety
    /// The window must outlive the surface.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("window handle: {e}")))?;

        let surface = ash_window::create_surface(
            gpu.entry(),
            gpu.instance(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());

        let supported = surface_loader.get_physical_device_surface_support(
            gpu.physical_device(),
            gpu.graphics_queue_family(),
            surface,
        )?;
        if !supported {
            surface_loader.destroy_surface(surface, None);
            return Err(GpuError::SurfaceCreation(
                "graphics queue cannot present to this surface".to_string(),
            ));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader,
        })
    }

    /// Current surface capabilities.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<vk::SurfaceCapabilitiesKHR> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?
        })
    }

    /// Create a swapchain for this surface, retiring `old_swapchain` if given.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Swapchain> {
        let physical = gpu.physical_device();
        let caps = self.capabilities(gpu)?;
        let formats = self
            .surface_loader
            .get_physical_device_surface_formats(physical, self.surface)?;
        let present_modes = self
            .surface_loader
            .get_physical_device_surface_present_modes(physical, self.surface)?;

        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            self.surface,
            &caps,
            select_surface_format(&formats)?,
            select_present_mode(&present_modes, vsync),
            calculate_extent(&caps, width, height),
            old_swapchain,
        )
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}
