//! Viewer application.

use std::path::{Path, PathBuf};

use anyhow::Context;
use ember_app::{
    AppContext, DeviceEvent, DeviceId, EmberApp, FrameContext, GpuContext, WindowEvent,
};
use ember_asset::HdrImage;
use ember_render::{Camera, FlyCamera, GpuScene, RenderSettings, Renderer};
use tracing::{debug, info, warn};

use crate::input::InputState;

/// Resolution of the procedural sky used without an environment map.
const FALLBACK_SKY_SIZE: (u32, u32) = (512, 256);

/// Frames between stats log lines.
const STATS_INTERVAL: u64 = 600;

pub struct Viewer {
    path: PathBuf,
    renderer: Renderer,
    scene: GpuScene,
    camera: Camera,
    fly: FlyCamera,
    input: InputState,
    frames: u64,
}

impl Viewer {
    pub fn new(ctx: &mut AppContext, path: &Path) -> anyhow::Result<Self> {
        let scene = load_scene(path)?;

        let settings = RenderSettings::default();
        let environment = match ember_asset::load_environment(&settings.environment_map) {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    "No environment map at {} ({e}), using procedural sky",
                    settings.environment_map.display()
                );
                HdrImage::sky_gradient(FALLBACK_SKY_SIZE.0, FALLBACK_SKY_SIZE.1)
            }
        };

        let mut renderer = Renderer::new(&ctx.gpu, &ctx.viewport, settings, &environment)
            .context("failed to create renderer")?;

        let gpu_scene = match GpuScene::upload(&ctx.gpu, &mut renderer, &scene) {
            Ok(uploaded) => uploaded,
            Err(e) => {
                renderer.destroy(&ctx.gpu);
                return Err(anyhow::Error::new(e).context("failed to upload scene"));
            }
        };

        let mut camera = Camera {
            aspect: ctx.aspect_ratio(),
            ..Camera::default()
        };
        let bounds = gpu_scene.bounds();
        if !bounds.is_empty() {
            camera.far = camera.far.max(bounds.half_extents().length() * 20.0);
        }
        let fly = FlyCamera::framing(&bounds, camera.fov);
        fly.apply(&mut camera);

        info!("Viewer ready");
        Ok(Self {
            path: path.to_path_buf(),
            renderer,
            scene: gpu_scene,
            camera,
            fly,
            input: InputState::new(true),
            frames: 0,
        })
    }

    /// Upload the scene file again and retire the old meshes once no frame
    /// in flight draws them.
    fn reload(&mut self, ctx: &AppContext) -> anyhow::Result<()> {
        let scene = load_scene(&self.path)?;
        let uploaded = GpuScene::upload(&ctx.gpu, &mut self.renderer, &scene)
            .context("failed to upload scene")?;
        let old = std::mem::replace(&mut self.scene, uploaded);
        // The next frame to record is the first one that no longer draws `old`.
        let last_frame = ctx.viewport.frame_number().saturating_sub(1);
        let released = old.release(&mut self.renderer, last_frame);
        info!(
            "Reloaded {}: {released} meshes queued for release",
            self.path.display()
        );
        Ok(())
    }
}

fn load_scene(path: &Path) -> anyhow::Result<ember_asset::SceneData> {
    let scene = ember_asset::load_gltf(path)
        .with_context(|| format!("failed to load scene {}", path.display()))?;
    info!(
        "Loaded {}: {} meshes, {} primitives, {} triangles",
        path.display(),
        scene.meshes.len(),
        scene.primitive_count(),
        scene.triangle_count()
    );
    Ok(scene)
}

impl EmberApp for Viewer {
    fn update(&mut self, ctx: &AppContext, dt: f32) {
        if let Some(locked) = self.input.take_lock_change() {
            ctx.set_cursor_locked(locked);
        }

        if self.input.take_reload_request() {
            if let Err(e) = self.reload(ctx) {
                warn!("Reload failed, keeping the current scene: {e:#}");
            }
        }

        let delta = self.input.take_mouse_delta();
        if self.input.cursor_locked() {
            self.fly.look(delta.x, delta.y);
        }
        self.fly.update(self.input.move_input(), dt);
        self.fly.apply(&mut self.camera);
    }

    fn render(&mut self, gpu: &GpuContext, frame: &FrameContext<'_>) -> ember_gpu::Result<()> {
        self.renderer.render(gpu, frame, &self.camera, &self.scene)?;

        self.frames += 1;
        if self.frames % STATS_INTERVAL == 0 {
            let stats = self.renderer.last_stats();
            debug!(
                "Frame {}: {} objects, {} culled, {} draws, {} triangles",
                frame.frame_number,
                stats.objects,
                stats.culled,
                stats.draws.draws,
                stats.draws.triangles
            );
        }
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        self.renderer
            .on_viewport_recreated(&ctx.gpu, &ctx.viewport)
            .context("failed to follow swapchain rebuild")?;
        self.camera.set_aspect(width as f32 / height.max(1) as f32);
        Ok(())
    }

    fn on_event(&mut self, _ctx: &AppContext, event: &WindowEvent) -> bool {
        self.input.process_window_event(event)
    }

    fn on_device_event(&mut self, _device_id: DeviceId, event: &DeviceEvent) {
        self.input.process_device_event(event);
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        info!(
            "Shutting down: {} instances, {} materials, {} textures",
            self.scene.instance_count(),
            self.scene.material_count(),
            self.scene.texture_count()
        );
        self.renderer.destroy(&ctx.gpu);
    }
}
