//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use ember_gpu::{GpuContext, Viewport};
use winit::window::{CursorGrabMode, Window};

/// Resources shared by every [`EmberApp`](crate::EmberApp) callback.
pub struct AppContext {
    /// Dropped after `viewport` is destroyed.
    pub window: Arc<Window>,
    pub gpu: GpuContext,
    pub viewport: Viewport,
    /// Frames presented so far.
    pub frame_count: u64,
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let viewport = unsafe {
            Viewport::new(
                &gpu,
                window.as_ref(),
                size.width.max(1),
                size.height.max(1),
                vsync,
            )?
        };
        let extent = viewport.extent();
        tracing::info!(
            "Viewport created: {}x{} ({:?})",
            extent.width,
            extent.height,
            viewport.format()
        );

        Ok(Self {
            window,
            gpu,
            viewport,
            frame_count: 0,
            last_frame_time: Instant::now(),
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.viewport.extent()
    }

    pub fn width(&self) -> u32 {
        self.viewport.extent().width
    }

    pub fn height(&self) -> u32 {
        self.viewport.extent().height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.viewport.aspect_ratio()
    }

    /// Lock and hide the cursor, or release it.
    pub fn set_cursor_locked(&self, locked: bool) {
        let result = if locked {
            self.window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            self.window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(e) = result {
            tracing::warn!("Cursor grab failed: {e}");
        }
        self.window.set_cursor_visible(!locked);
    }

    /// Destroy the viewport.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn cleanup(&mut self) {
        unsafe { self.viewport.destroy(&self.gpu) };
    }
}
