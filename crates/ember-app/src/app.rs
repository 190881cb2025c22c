//! `EmberApp` trait definition.

use ember_gpu::{FrameContext, GpuContext};
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

use crate::context::AppContext;

/// An application driven by [`run_app`](crate::run_app).
///
/// The framework owns the window, GPU context and viewport. Construction
/// happens in the `init` closure handed to `run_app`, once the window and
/// GPU exist.
pub trait EmberApp: Sized {
    /// Advance application state by `dt` seconds. Called before rendering.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record the frame into `frame.command_buffer`.
    ///
    /// Acquire, submit and present are handled by the viewport. The
    /// swapchain image must end in the present layout.
    fn render(&mut self, gpu: &GpuContext, frame: &FrameContext<'_>) -> ember_gpu::Result<()>;

    /// The viewport rebuilt its swapchain and depth image.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return `true` to stop the framework from handling `event` itself.
    #[allow(unused_variables)]
    fn on_event(&mut self, ctx: &AppContext, event: &WindowEvent) -> bool {
        false
    }

    /// Raw input, e.g. mouse motion while the cursor is locked.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Whether the application asked to quit.
    fn should_exit(&self) -> bool {
        false
    }

    /// Release GPU resources. The device is idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
