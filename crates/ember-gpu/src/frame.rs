//! Per-frame resources for frames in flight.

use crate::command::CommandPool;
use crate::error::Result;
use crate::sync::{create_fence, create_semaphore};
use ash::vk;

/// Command recording and sync objects owned by one slot of the ring.
pub struct FrameData {
    pub command_pool: CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by acquire, waited by the frame's submit.
    pub image_available: vk::Semaphore,
    /// Signaled when the frame's submission retires.
    pub in_flight: vk::Fence,
}

impl FrameData {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let command_pool = CommandPool::new(device, queue_family)?;
        let command_buffer = command_pool.allocate(device)?;
        Ok(Self {
            command_pool,
            command_buffer,
            image_available: create_semaphore(device)?,
            in_flight: create_fence(device, true)?,
        })
    }

    /// # Safety
    /// The device must be valid and the frame idle.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_fence(self.in_flight, None);
        self.command_pool.destroy(device);
    }
}

/// Fixed ring of per-frame slots.
///
/// `index` selects the slot being recorded; `number` counts frames since
/// start and is what deferred deletion keys on.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    index: usize,
    number: u64,
}

impl<T> FrameRing<T> {
    /// Wrap an already-created set of slots. `slots` must be non-empty.
    pub fn new(slots: Vec<T>) -> Self {
        debug_assert!(!slots.is_empty());
        Self {
            slots,
            index: 0,
            number: 0,
        }
    }

    /// Slot for the frame being recorded.
    pub fn current(&self) -> &T {
        &self.slots[self.index]
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.index]
    }

    /// Index of the current slot.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Monotonic frame counter.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Move to the next slot.
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.slots.len();
        self.number += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}

/// Everything a recording callback needs for one frame.
pub struct FrameContext<'a> {
    pub device: &'a ash::Device,
    pub command_buffer: vk::CommandBuffer,
    /// Slot index in the ring (`0..FRAMES_IN_FLIGHT`).
    pub frame_index: usize,
    /// Monotonic frame counter.
    pub frame_number: u64,
    pub swapchain_image: vk::Image,
    pub swapchain_view: vk::ImageView,
    pub swapchain_format: vk::Format,
    pub depth_image: vk::Image,
    pub depth_view: vk::ImageView,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_and_counts() {
        let mut ring = FrameRing::new(vec!['a', 'b']);
        assert_eq!((*ring.current(), ring.index(), ring.number()), ('a', 0, 0));
        ring.advance();
        assert_eq!((*ring.current(), ring.index(), ring.number()), ('b', 1, 1));
        ring.advance();
        assert_eq!((*ring.current(), ring.index(), ring.number()), ('a', 0, 2));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn slot_reused_every_ring_length_frames() {
        let mut ring = FrameRing::new(vec![0u32; ember_core::constants::FRAMES_IN_FLIGHT]);
        for _ in 0..10 {
            *ring.current_mut() += 1;
            ring.advance();
        }
        assert!(ring.iter().all(|&uses| uses == 5));
    }
}
