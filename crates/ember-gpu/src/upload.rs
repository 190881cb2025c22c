//! Staged uploads into device-local buffers.

use crate::context::GpuContext;
use crate::error::Result;
use crate::memory::GpuBuffer;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Host-visible buffer pre-filled with `bytes`.
pub fn create_staging_buffer(gpu: &GpuContext, bytes: &[u8], name: &str) -> Result<GpuBuffer> {
    let mut allocator = gpu.allocator().lock();
    let mut staging = allocator.create_buffer(
        bytes.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        &format!("{name} staging"),
    )?;
    if let Err(e) = staging.write_bytes(0, bytes) {
        allocator.free_buffer(&mut staging)?;
        return Err(e);
    }
    Ok(staging)
}

/// Copy `bytes` into a new device-local buffer with `usage` (plus
/// `TRANSFER_DST`). Blocks until the copy completes.
pub fn upload_buffer(
    gpu: &GpuContext,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<GpuBuffer> {
    let mut buffer = gpu.allocator().lock().create_buffer(
        bytes.len() as u64,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        name,
    )?;
    if bytes.is_empty() {
        return Ok(buffer);
    }

    let mut staging = match create_staging_buffer(gpu, bytes, name) {
        Ok(staging) => staging,
        Err(e) => {
            gpu.allocator().lock().free_buffer(&mut buffer)?;
            return Err(e);
        }
    };

    let size = bytes.len() as u64;
    let result = gpu.immediate_submit(|device, cmd| {
        let region = vk::BufferCopy::default().size(size);
        unsafe { device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]) };
        Ok(())
    });

    let mut allocator = gpu.allocator().lock();
    allocator.free_buffer(&mut staging)?;
    if let Err(e) = result {
        allocator.free_buffer(&mut buffer)?;
        return Err(e);
    }
    Ok(buffer)
}
