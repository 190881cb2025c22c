//! Swapchain-backed render target with frames in flight.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::frame::{FrameContext, FrameData, FrameRing};
use crate::image::{ImageDesc, Texture};
use crate::surface::SurfaceContext;
use crate::swapchain::Swapchain;
use crate::sync::{
    create_semaphores, destroy_semaphores, reset_fence, submit_with_fence, wait_for_fence,
};
use ash::vk;
use ember_core::constants::FRAMES_IN_FLIGHT;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Depth attachment format. Sampled by ambient occlusion.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// What happened during [`Viewport::do_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Presented,
    /// The swapchain was rebuilt; size-dependent resources must follow.
    Recreated,
    /// Nothing was rendered (minimized window).
    Skipped,
}

/// Window surface, swapchain, depth buffer and the frame ring.
pub struct Viewport {
    surface: SurfaceContext,
    swapchain: Swapchain,
    depth: Texture,
    frames: FrameRing<FrameData>,
    /// One per swapchain image: a semaphore may only be reused once the
    /// presentation that waited on it is done, which is tracked per image.
    render_finished: Vec<vk::Semaphore>,
    desired_extent: vk::Extent2D,
    vsync: bool,
    needs_recreate: bool,
}

impl Viewport {
    /// Create a viewport for `window`.
    ///
    /// # Safety
    /// The window must outlive the viewport.
    pub unsafe fn new<W>(
        gpu: &GpuContext,
        window: &W,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        if !gpu.supports_format_feature(
            DEPTH_FORMAT,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::FormatFeatureFlags::SAMPLED_IMAGE,
        ) {
            return Err(GpuError::UnsupportedFormat {
                format: DEPTH_FORMAT,
                feature: "sampled depth attachment".to_string(),
            });
        }

        let surface = SurfaceContext::from_window(gpu, window)?;
        let swapchain = surface.create_swapchain(
            gpu,
            width.max(1),
            height.max(1),
            vsync,
            vk::SwapchainKHR::null(),
        )?;
        let depth = create_depth(gpu, swapchain.extent)?;
        let render_finished = create_semaphores(gpu.device(), swapchain.image_count())?;

        let mut frames = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            frames.push(FrameData::new(gpu.device(), gpu.graphics_queue_family())?);
        }

        tracing::info!(
            "Viewport ready: {}x{}, {:?}, {} swapchain images, {} frames in flight",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.format,
            swapchain.image_count(),
            FRAMES_IN_FLIGHT
        );

        Ok(Self {
            desired_extent: swapchain.extent,
            surface,
            swapchain,
            depth,
            frames: FrameRing::new(frames),
            render_finished,
            vsync,
            needs_recreate: false,
        })
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Swapchain image format.
    pub fn format(&self) -> vk::Format {
        self.swapchain.format
    }

    /// Depth image format.
    pub fn depth_format(&self) -> vk::Format {
        DEPTH_FORMAT
    }

    /// View of the depth image shared by all frames.
    pub fn depth_view(&self) -> vk::ImageView {
        self.depth.view
    }

    /// Width / height of the swapchain.
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height.max(1) as f32
    }

    /// Total frames submitted.
    pub fn frame_number(&self) -> u64 {
        self.frames.number()
    }

    /// Request a swapchain rebuild at the new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.desired_extent = vk::Extent2D { width, height };
        self.needs_recreate = true;
    }

    /// Enable or disable vsync (takes effect on the next recreation).
    pub fn set_vsync(&mut self, vsync: bool) {
        if self.vsync != vsync {
            self.vsync = vsync;
            self.needs_recreate = true;
        }
    }

    /// Run one frame: wait, acquire, record with `record`, submit, present.
    pub fn do_frame<F>(&mut self, gpu: &GpuContext, record: F) -> Result<FrameOutcome>
    where
        F: FnOnce(&FrameContext<'_>) -> Result<()>,
    {
        if self.desired_extent.width == 0 || self.desired_extent.height == 0 {
            return Ok(FrameOutcome::Skipped);
        }
        if self.needs_recreate {
            self.recreate(gpu)?;
            return Ok(FrameOutcome::Recreated);
        }

        let device = gpu.device();
        let frame = self.frames.current();

        unsafe {
            // Retires the submission made FRAMES_IN_FLIGHT frames ago.
            wait_for_fence(device, frame.in_flight, u64::MAX)?;
        }

        let acquired = unsafe {
            self.swapchain.acquire_next_image(
                &self.surface.swapchain_loader,
                frame.image_available,
                u64::MAX,
            )
        };
        let (image_index, suboptimal) = match acquired {
            Ok(acquired) => acquired,
            Err(e) if e.is_out_of_date() => {
                // Fence is still signaled, so the next attempt will not block.
                self.recreate(gpu)?;
                return Ok(FrameOutcome::Recreated);
            }
            Err(e) => return Err(e),
        };
        if suboptimal {
            self.needs_recreate = true;
        }

        let cmd = frame.command_buffer;
        let image = image_index as usize;
        let ctx = FrameContext {
            device,
            command_buffer: cmd,
            frame_index: self.frames.index(),
            frame_number: self.frames.number(),
            swapchain_image: self.swapchain.images[image],
            swapchain_view: self.swapchain.image_views[image],
            swapchain_format: self.swapchain.format,
            depth_image: self.depth.handle(),
            depth_view: self.depth.view,
            depth_format: DEPTH_FORMAT,
            extent: self.swapchain.extent,
        };

        let queue = gpu.graphics_queue();
        let render_finished = self.render_finished[image];
        let submitted = submit_with_fence(
            || unsafe {
                device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
                let begin_info = vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                device.begin_command_buffer(cmd, &begin_info)?;
                record(&ctx)?;
                device.end_command_buffer(cmd)?;
                Ok(())
            },
            || unsafe {
                reset_fence(device, frame.in_flight)?;
                let wait = [vk::SemaphoreSubmitInfo::default()
                    .semaphore(frame.image_available)
                    .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
                let signal = [vk::SemaphoreSubmitInfo::default()
                    .semaphore(render_finished)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
                let cmds = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];
                let submit = vk::SubmitInfo2::default()
                    .wait_semaphore_infos(&wait)
                    .command_buffer_infos(&cmds)
                    .signal_semaphore_infos(&signal);
                device.queue_submit2(queue, &[submit], frame.in_flight)?;
                Ok(())
            },
            // Consume the acquire semaphore and signal the fence.
            || unsafe {
                reset_fence(device, frame.in_flight)?;
                let wait = [vk::SemaphoreSubmitInfo::default()
                    .semaphore(frame.image_available)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
                let submit = vk::SubmitInfo2::default().wait_semaphore_infos(&wait);
                device.queue_submit2(queue, &[submit], frame.in_flight)?;
                Ok(())
            },
        );
        if let Err(e) = submitted {
            self.needs_recreate = true;
            return Err(e);
        }

        let present_stale = unsafe {
            self.swapchain.present(
                &self.surface.swapchain_loader,
                gpu.graphics_queue(),
                image_index,
                &[render_finished],
            )?
        };
        self.frames.advance();

        if present_stale || self.needs_recreate {
            self.recreate(gpu)?;
            return Ok(FrameOutcome::Recreated);
        }
        Ok(FrameOutcome::Presented)
    }

    /// Rebuild the swapchain, its views, the depth image and per-image semaphores.
    fn recreate(&mut self, gpu: &GpuContext) -> Result<()> {
        let caps = self.surface.capabilities(gpu)?;
        if caps.current_extent.width == 0 || caps.current_extent.height == 0 {
            // Minimized; try again after the next resize.
            self.desired_extent = caps.current_extent;
            self.needs_recreate = true;
            return Ok(());
        }

        gpu.wait_idle()?;
        let device = gpu.device();

        let swapchain = unsafe {
            self.surface.create_swapchain(
                gpu,
                self.desired_extent.width,
                self.desired_extent.height,
                self.vsync,
                self.swapchain.swapchain,
            )?
        };
        let old = std::mem::replace(&mut self.swapchain, swapchain);
        unsafe { old.destroy(device, &self.surface.swapchain_loader) };

        self.depth.destroy(gpu);
        self.depth = create_depth(gpu, self.swapchain.extent)?;

        unsafe {
            destroy_semaphores(device, &self.render_finished);
            self.render_finished = create_semaphores(device, self.swapchain.image_count())?;
        }

        self.desired_extent = self.swapchain.extent;
        self.needs_recreate = false;
        tracing::info!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );
        Ok(())
    }

    /// Destroy everything the viewport owns.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) {
        let device = gpu.device();
        for frame in self.frames.iter() {
            frame.destroy(device);
        }
        destroy_semaphores(device, &self.render_finished);
        self.render_finished.clear();
        self.depth.destroy(gpu);
        self.swapchain
            .destroy(device, &self.surface.swapchain_loader);
        self.surface.destroy();
    }
}

fn create_depth(gpu: &GpuContext, extent: vk::Extent2D) -> Result<Texture> {
    Texture::new(
        gpu,
        &ImageDesc::texture_2d(
            extent.width,
            extent.height,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        ),
        "viewport depth",
    )
}
