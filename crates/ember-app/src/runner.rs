//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ember_gpu::{FrameOutcome, GpuContextBuilder};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::raw_window_handle::HasDisplayHandle;
use winit::window::{Window, WindowId};

use crate::app::EmberApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    #[must_use]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` filter. Does nothing if a subscriber is already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already installed");
    }
}

/// Run an application until its window closes.
///
/// Initializes logging, creates the window, GPU context and viewport, then
/// builds the app with `init`. An error from `init` is returned once the
/// event loop has shut down.
pub fn run_app<A, F>(config: AppConfig, init: F) -> anyhow::Result<()>
where
    A: EmberApp + 'static,
    F: FnOnce(&mut AppContext) -> anyhow::Result<A>,
{
    init_logging();
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        target_frame_time: config.target_frame_time(),
        config,
        init: Some(init),
        state: None,
        error: None,
    };
    event_loop.run_app(&mut runner)?;

    match runner.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Implements winit's `ApplicationHandler`.
struct AppRunner<A: EmberApp, F> {
    config: AppConfig,
    target_frame_time: Option<Duration>,
    init: Option<F>,
    state: Option<AppState<A>>,
    error: Option<anyhow::Error>,
}

struct AppState<A: EmberApp> {
    ctx: AppContext,
    app: A,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    fps_samples: u64,
}

impl<A, F> ApplicationHandler for AppRunner<A, F>
where
    A: EmberApp + 'static,
    F: FnOnce(&mut AppContext) -> anyhow::Result<A>,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(init) = self.init.take() else {
            return;
        };

        info!("Creating application state...");
        match self.create_state(event_loop, init) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&state.ctx, &event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let exit = self.state.as_mut().is_some_and(|state| {
                    if let Err(e) = state.render_frame(self.target_frame_time) {
                        error!("Render error: {e:#}");
                    }
                    state.app.should_exit()
                });
                if exit {
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.ctx.viewport.resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A, F> AppRunner<A, F>
where
    A: EmberApp + 'static,
    F: FnOnce(&mut AppContext) -> anyhow::Result<A>,
{
    fn create_state(&self, event_loop: &ActiveEventLoop, init: F) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let display = window.display_handle()?.as_raw();
        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .display(display)
            .build()?;
        info!("GPU: {}", gpu.capabilities().summary());

        let mut ctx = unsafe { AppContext::new(window, gpu, self.config.vsync)? };
        let app = match init(&mut ctx) {
            Ok(app) => app,
            Err(e) => {
                unsafe {
                    if let Err(idle) = ctx.gpu.wait_idle() {
                        error!("Failed to wait idle: {idle}");
                    }
                    ctx.cleanup();
                }
                return Err(e);
            }
        };

        Ok(AppState {
            ctx,
            app,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            fps_samples: 0,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: EmberApp> AppState<A> {
    fn render_frame(&mut self, target_frame_time: Option<Duration>) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;
        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
            self.fps_samples += 1;
        }

        self.app.update(&self.ctx, dt);

        let app = &mut self.app;
        let gpu = &self.ctx.gpu;
        let outcome = self
            .ctx
            .viewport
            .do_frame(gpu, |frame| app.render(gpu, frame))?;

        match outcome {
            FrameOutcome::Presented => self.ctx.frame_count += 1,
            FrameOutcome::Recreated => {
                let extent = self.ctx.viewport.extent();
                self.app
                    .on_resize(&mut self.ctx, extent.width, extent.height)?;
                info!("Resized to {}x{}", extent.width, extent.height);
            }
            FrameOutcome::Skipped => {}
        }

        if let Some(target) = target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.fps_samples > 0 {
            let avg_fps = self.fps_sum / self.fps_samples as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", self.ctx.frame_count);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }
        self.app.cleanup(&mut self.ctx);
        unsafe { self.ctx.cleanup() };
        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AppConfig::new("viewer")
            .with_size(800, 600)
            .with_vsync(false)
            .with_target_fps(144)
            .with_validation(true);
        assert_eq!(config.title, "viewer");
        assert_eq!((config.width, config.height), (800, 600));
        assert!(!config.vsync);
        assert!(config.validation);
        assert_eq!(config.target_fps, Some(144));
    }

    #[test]
    fn logging_can_be_initialized_twice() {
        init_logging();
        init_logging();
        tracing::info!("still logging");
    }

    #[test]
    fn frame_time_from_target_fps() {
        let config = AppConfig::default().with_target_fps(50);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
        assert_eq!(AppConfig::default().target_frame_time(), None);
        // Zero means unlimited.
        assert_eq!(
            AppConfig::default().with_target_fps(0).target_frame_time(),
            None
        );
    }
}
