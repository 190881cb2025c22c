//! Application framework for the Ember renderer.
//!
//! Handles window creation, GPU context initialization, the [`Viewport`]
//! and the winit event loop, so applications only implement [`EmberApp`].
//!
//! # Example
//!
//! ```no_run
//! use ember_app::{run_app, AppConfig, AppContext, EmberApp, FrameContext, GpuContext};
//!
//! struct MyApp;
//!
//! impl EmberApp for MyApp {
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//!
//!     fn render(&mut self, gpu: &GpuContext, frame: &FrameContext<'_>) -> ember_gpu::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app(AppConfig::new("My App"), |_ctx: &mut AppContext| Ok(MyApp))
//! }
//! ```
//!
//! [`Viewport`]: ember_gpu::Viewport

mod app;
mod context;
mod runner;

pub use app::EmberApp;
pub use context::AppContext;
pub use runner::{init_logging, run_app, AppConfig};

pub use ember_gpu::{FrameContext, FrameOutcome, GpuContext, GpuContextBuilder};
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
