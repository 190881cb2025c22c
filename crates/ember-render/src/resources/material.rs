//! Material table read by shaders through a buffer device address.

use ash::vk;
use ember_core::constants::{FRAMES_IN_FLIGHT, MAX_MATERIALS};
use ember_core::{GpuMaterial, HandleAllocator, MaterialHandle, ResourceHandle, TextureHandle};
use ember_gpu::{GpuBuffer, GpuContext, GpuError, Result};
use gpu_allocator::MemoryLocation;
use hashbrown::HashSet;

/// Slots written on the CPU that a frame's buffer copy has not seen yet.
///
/// Every change is queued once per frame in flight; each frame drains its
/// own queue after its fence has been waited, so no buffer is written while
/// the GPU may read it.
#[derive(Debug)]
pub struct DirtyTracker {
    per_frame: Vec<HashSet<u32>>,
}

impl DirtyTracker {
    pub fn new(frames: usize) -> Self {
        Self {
            per_frame: (0..frames).map(|_| HashSet::new()).collect(),
        }
    }

    pub fn mark(&mut self, slot: u32) {
        for pending in &mut self.per_frame {
            pending.insert(slot);
        }
    }

    /// Slots pending for `frame`, ascending. Clears that frame's queue.
    pub fn take(&mut self, frame: usize) -> Vec<u32> {
        let mut slots: Vec<u32> = self.per_frame[frame].drain().collect();
        slots.sort_unstable();
        slots
    }

    pub fn pending(&self, frame: usize) -> usize {
        self.per_frame[frame].len()
    }
}

/// Check that every texture a material samples is live.
pub fn validate_material(
    material: &GpuMaterial,
    is_live: impl Fn(TextureHandle) -> bool,
) -> ember_core::Result<()> {
    match material.textures().into_iter().find(|&t| !is_live(t)) {
        Some(texture) => Err(ember_core::Error::InvalidHandle(format!(
            "material references {texture}, which is not loaded"
        ))),
        None => Ok(()),
    }
}

/// Neutral material: white base colour, fully rough dielectric.
pub fn default_material(
    white: TextureHandle,
    flat_normal: TextureHandle,
    black: TextureHandle,
) -> GpuMaterial {
    GpuMaterial {
        base_color_factor: [1.0; 4],
        emissive_factor: [0.0, 0.0, 0.0, 1.0],
        metallic_factor: 0.0,
        roughness_factor: 1.0,
        alpha_cutoff: 0.5,
        flags: 0,
        base_color_texture: white.index(),
        metallic_roughness_texture: white.index(),
        normal_texture: flat_normal.index(),
        occlusion_texture: white.index(),
        emissive_texture: black.index(),
        _pad: [0; 3],
    }
}

/// Fixed-capacity material table, one host-visible buffer per frame in flight.
pub struct MaterialManager {
    buffers: Vec<GpuBuffer>,
    materials: Vec<GpuMaterial>,
    handles: HandleAllocator<MaterialHandle>,
    dirty: DirtyTracker,
    default: MaterialHandle,
}

impl MaterialManager {
    /// Create the per-frame buffers and register `default` at handle 0.
    pub fn new(gpu: &GpuContext, default: GpuMaterial) -> Result<Self> {
        let size = u64::from(MAX_MATERIALS) * GpuMaterial::SIZE;
        let mut buffers = Vec::with_capacity(FRAMES_IN_FLIGHT);
        {
            let mut allocator = gpu.allocator().lock();
            for frame in 0..FRAMES_IN_FLIGHT {
                match allocator.create_buffer(
                    size,
                    vk::BufferUsageFlags::STORAGE_BUFFER
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    MemoryLocation::CpuToGpu,
                    &format!("materials frame {frame}"),
                ) {
                    Ok(buffer) => buffers.push(buffer),
                    Err(e) => {
                        for mut buffer in buffers {
                            allocator.free_buffer(&mut buffer)?;
                        }
                        return Err(e);
                    }
                }
            }
        }

        let mut manager = Self {
            buffers,
            materials: Vec::new(),
            handles: HandleAllocator::new(MAX_MATERIALS),
            dirty: DirtyTracker::new(FRAMES_IN_FLIGHT),
            default: MaterialHandle::INVALID,
        };
        manager.default = manager.insert(default)?;
        Ok(manager)
    }

    fn insert(&mut self, material: GpuMaterial) -> Result<MaterialHandle> {
        let handle = self.handles.allocate().ok_or_else(|| {
            GpuError::CapacityExceeded(format!("material table is full ({MAX_MATERIALS} slots)"))
        })?;
        self.materials.push(material);
        self.dirty.mark(handle.index());
        Ok(handle)
    }

    /// Add a material after checking its textures with `is_live`.
    pub fn add(
        &mut self,
        material: GpuMaterial,
        is_live: impl Fn(TextureHandle) -> bool,
    ) -> Result<MaterialHandle> {
        validate_material(&material, is_live)?;
        self.insert(material)
    }

    /// Overwrite a live material. Frames pick it up on their next `sync`.
    pub fn update(
        &mut self,
        handle: MaterialHandle,
        material: GpuMaterial,
        is_live: impl Fn(TextureHandle) -> bool,
    ) -> Result<()> {
        validate_material(&material, is_live)?;
        let slot = self
            .materials
            .get_mut(handle.index() as usize)
            .ok_or_else(|| ember_core::Error::InvalidHandle(handle.to_string()))?;
        *slot = material;
        self.dirty.mark(handle.index());
        Ok(())
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&GpuMaterial> {
        self.materials.get(handle.index() as usize)
    }

    pub fn default_material(&self) -> MaterialHandle {
        self.default
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Copy pending changes into `frame_index`'s buffer. Call only after
    /// that frame's fence has been waited. Returns the number of slots written.
    pub fn sync(&mut self, frame_index: usize) -> Result<usize> {
        let slots = self.dirty.take(frame_index);
        let buffer = &self.buffers[frame_index];
        for &slot in &slots {
            let material = &self.materials[slot as usize];
            buffer.write_value(u64::from(slot) * GpuMaterial::SIZE, material)?;
        }
        if !slots.is_empty() {
            tracing::trace!("Synced {} materials for frame {frame_index}", slots.len());
        }
        Ok(slots.len())
    }

    /// Device address of `frame_index`'s material buffer.
    pub fn buffer_address(&self, frame_index: usize) -> vk::DeviceAddress {
        self.buffers[frame_index].device_address()
    }

    /// Free the buffers. The device must be idle.
    pub fn destroy(&mut self, gpu: &GpuContext) {
        let mut allocator = gpu.allocator().lock();
        for buffer in &mut self.buffers {
            if let Err(e) = allocator.free_buffer(buffer) {
                tracing::warn!("Failed to free material buffer: {e}");
            }
        }
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32) -> TextureHandle {
        TextureHandle::from_index(index)
    }

    #[test]
    fn changes_reach_every_frame_once() {
        let mut dirty = DirtyTracker::new(2);
        dirty.mark(3);
        dirty.mark(1);
        dirty.mark(3);
        assert_eq!(dirty.take(0), vec![1, 3]);
        assert!(dirty.take(0).is_empty());
        assert_eq!(dirty.pending(1), 2);

        dirty.mark(7);
        assert_eq!(dirty.take(1), vec![1, 3, 7]);
        assert_eq!(dirty.take(0), vec![7]);
    }

    #[test]
    fn default_material_uses_neutral_textures() {
        let material = default_material(handle(0), handle(1), handle(2));
        assert_eq!(material.base_color_texture, 0);
        assert_eq!(material.normal_texture, 1);
        assert_eq!(material.emissive_texture, 2);
        assert_eq!(material.occlusion_texture, 0);
    }

    #[test]
    fn validation_rejects_unknown_textures() {
        let material = GpuMaterial {
            normal_texture: 9,
            ..default_material(handle(0), handle(1), handle(2))
        };
        let live = |t: TextureHandle| t.index() < 3;
        let err = validate_material(&material, live).unwrap_err();
        assert!(matches!(err, ember_core::Error::InvalidHandle(_)));
        assert!(err.to_string().contains("texture#9"));

        let ok = default_material(handle(0), handle(1), handle(2));
        validate_material(&ok, live).unwrap();
    }
}
