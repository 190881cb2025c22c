//! Command pools and one-shot submission.

use crate::error::Result;
use crate::sync::{create_fence, reset_fence, submit_with_fence, wait_for_fence};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = device.create_command_pool(&create_info, None)?;
        Ok(Self { pool })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = device.allocate_command_buffers(&alloc_info)?;
        Ok(buffers[0])
    }

    /// Destroy the command pool (and every buffer allocated from it).
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Reset and begin recording a command buffer for a single submission.
///
/// # Safety
/// The device and command buffer must be valid and not pending.
pub unsafe fn begin_one_time(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// Blocking command submission for load-time work (uploads, baking).
///
/// Owns its own pool, command buffer and fence so it never contends with
/// the per-frame resources.
pub struct ImmediateSubmit {
    pool: CommandPool,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ImmediateSubmit {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let pool = CommandPool::new(device, queue_family)?;
        let cmd = pool.allocate(device)?;
        let fence = create_fence(device, true)?;
        Ok(Self { pool, cmd, fence })
    }

    /// Record with `f`, submit to `queue` and wait for completion.
    ///
    /// # Safety
    /// The device and queue must be valid; the closure must only record
    /// commands into the buffer it is given.
    pub unsafe fn submit<F>(&self, device: &ash::Device, queue: vk::Queue, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        wait_for_fence(device, self.fence, u64::MAX)?;

        let cmd = self.cmd;
        submit_with_fence(
            || {
                begin_one_time(device, cmd)?;
                f(device, cmd)?;
                device.end_command_buffer(cmd)?;
                Ok(())
            },
            || {
                reset_fence(device, self.fence)?;
                let cmd_info = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];
                let submit = vk::SubmitInfo2::default().command_buffer_infos(&cmd_info);
                device.queue_submit2(queue, &[submit], self.fence)?;
                Ok(())
            },
            || {
                reset_fence(device, self.fence)?;
                device.queue_submit2(queue, &[], self.fence)?;
                Ok(())
            },
        )?;
        wait_for_fence(device, self.fence, u64::MAX)
    }

    /// # Safety
    /// The device must be valid and no submission may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.fence, None);
        self.pool.destroy(device);
    }
}
