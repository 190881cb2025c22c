//! GPU mesh storage.

use ash::vk;
use ember_core::constants::FRAMES_IN_FLIGHT;
use ember_core::{Aabb, AlphaMode, HandleAllocator, MaterialHandle, MeshHandle, Vertex};
use ember_gpu::{upload_buffer, DeferredQueue, GpuBuffer, GpuContext, GpuError, Result};
use hashbrown::HashMap;

/// A range of a mesh's index buffer drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Surface {
    pub first_index: u32,
    pub index_count: u32,
    pub material: MaterialHandle,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    /// Object-space bounds.
    pub bounds: Aabb,
}

/// Vertex and index buffers plus the surfaces that index them.
pub struct GpuMesh {
    pub name: String,
    /// Read by shaders through its device address.
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub surfaces: Vec<Surface>,
    pub bounds: Aabb,
}

impl GpuMesh {
    pub fn vertex_address(&self) -> vk::DeviceAddress {
        self.vertex_buffer.device_address()
    }

    fn free(&mut self, gpu: &GpuContext) {
        let mut allocator = gpu.allocator().lock();
        for buffer in [&mut self.vertex_buffer, &mut self.index_buffer] {
            if let Err(e) = allocator.free_buffer(buffer) {
                tracing::warn!("Failed to free buffer of mesh {}: {e}", self.name);
            }
        }
    }
}

/// Check that every surface range lies inside an index buffer of `index_count`.
pub fn validate_surfaces(surfaces: &[Surface], index_count: usize) -> ember_core::Result<()> {
    for surface in surfaces {
        let end = surface.first_index as usize + surface.index_count as usize;
        if end > index_count {
            return Err(ember_core::Error::InvalidData(format!(
                "surface indices {}..{end} exceed index buffer of {index_count}",
                surface.first_index
            )));
        }
    }
    Ok(())
}

/// Resident meshes by handle, plus removed ones waiting for their frame
/// to retire.
pub(crate) struct MeshTable<T> {
    resident: HashMap<MeshHandle, T>,
    handles: HandleAllocator<MeshHandle>,
    garbage: DeferredQueue<T>,
}

impl<T> MeshTable<T> {
    pub(crate) fn new(frames_in_flight: usize) -> Self {
        Self {
            resident: HashMap::new(),
            handles: HandleAllocator::new(u32::MAX),
            garbage: DeferredQueue::new(frames_in_flight),
        }
    }

    /// Reserve the next handle; `None` once the handle space is exhausted.
    pub(crate) fn reserve(&mut self) -> Option<MeshHandle> {
        self.handles.allocate()
    }

    pub(crate) fn insert(&mut self, handle: MeshHandle, mesh: T) {
        self.resident.insert(handle, mesh);
    }

    pub(crate) fn get(&self, handle: MeshHandle) -> Option<&T> {
        self.resident.get(&handle)
    }

    /// Move `handle` to the garbage queue, stamped with `frame_number`.
    pub(crate) fn remove(&mut self, handle: MeshHandle, frame_number: u64) -> bool {
        match self.resident.remove(&handle) {
            Some(mesh) => {
                self.garbage.push(mesh, frame_number);
                true
            }
            None => false,
        }
    }

    /// Removed meshes that no frame in flight can still draw.
    pub(crate) fn retired(&mut self, frame_number: u64) -> Vec<T> {
        self.garbage.drain_ready(frame_number)
    }

    pub(crate) fn pending(&self) -> usize {
        self.garbage.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.resident.len()
    }

    /// Everything, resident and pending.
    pub(crate) fn drain_all(&mut self) -> Vec<T> {
        let mut all = self.garbage.drain_all();
        all.extend(self.resident.drain().map(|(_, mesh)| mesh));
        all
    }
}

/// Owns every uploaded mesh. Removal is deferred until frames that may
/// still draw the mesh have retired.
pub struct MeshManager {
    table: MeshTable<GpuMesh>,
}

impl Default for MeshManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshManager {
    pub fn new() -> Self {
        Self {
            table: MeshTable::new(FRAMES_IN_FLIGHT),
        }
    }

    /// Upload a mesh. Blocks until the copies complete.
    pub fn upload(
        &mut self,
        gpu: &GpuContext,
        name: &str,
        vertices: &[Vertex],
        indices: &[u32],
        surfaces: Vec<Surface>,
    ) -> Result<MeshHandle> {
        validate_surfaces(&surfaces, indices.len())?;
        let handle = self
            .table
            .reserve()
            .ok_or_else(|| GpuError::CapacityExceeded("mesh handles exhausted".to_string()))?;

        let mut vertex_buffer = upload_buffer(
            gpu,
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            &format!("{name} vertices"),
        )?;
        let index_buffer = match upload_buffer(
            gpu,
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
            &format!("{name} indices"),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                gpu.allocator().lock().free_buffer(&mut vertex_buffer)?;
                return Err(e);
            }
        };

        let bounds = surfaces
            .iter()
            .fold(Aabb::EMPTY, |acc, surface| acc.merge(&surface.bounds));
        tracing::debug!(
            "Uploaded mesh {name}: {} vertices, {} indices, {} surfaces",
            vertices.len(),
            indices.len(),
            surfaces.len()
        );
        self.table.insert(
            handle,
            GpuMesh {
                name: name.to_string(),
                vertex_buffer,
                index_buffer,
                surfaces,
                bounds,
            },
        );
        Ok(handle)
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.table.get(handle)
    }

    /// Stop drawing `handle`; its buffers are freed once `frame_number`
    /// has retired.
    pub fn remove(&mut self, handle: MeshHandle, frame_number: u64) -> bool {
        self.table.remove(handle, frame_number)
    }

    /// Free meshes whose removal frame is no longer in flight.
    pub fn collect_garbage(&mut self, gpu: &GpuContext, frame_number: u64) -> usize {
        let ready = self.table.retired(frame_number);
        let count = ready.len();
        for mut mesh in ready {
            mesh.free(gpu);
        }
        count
    }

    /// Meshes removed but not yet freed.
    pub fn pending_frees(&self) -> usize {
        self.table.pending()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free everything, pending garbage included. The device must be idle.
    pub fn destroy(&mut self, gpu: &GpuContext) {
        for mut mesh in self.table.drain_all() {
            mesh.free(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::ResourceHandle;
    use glam::Vec3;

    fn surface(first_index: u32, index_count: u32) -> Surface {
        Surface {
            first_index,
            index_count,
            material: MaterialHandle::from_index(0),
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
            bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
        }
    }

    #[test]
    fn surfaces_must_fit_index_buffer() {
        validate_surfaces(&[surface(0, 6), surface(6, 3)], 9).unwrap();
        let err = validate_surfaces(&[surface(6, 6)], 9).unwrap_err();
        assert!(matches!(err, ember_core::Error::InvalidData(_)));
    }

    #[test]
    fn removed_meshes_wait_for_their_frame_to_retire() {
        let mut table = MeshTable::new(FRAMES_IN_FLIGHT);
        let a = table.reserve().unwrap();
        let b = table.reserve().unwrap();
        table.insert(a, "a");
        table.insert(b, "b");

        assert!(table.remove(a, 10));
        assert!(!table.remove(a, 10));
        assert_eq!(table.get(a), None);
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!((table.len(), table.pending()), (1, 1));

        let retire_at = 10 + FRAMES_IN_FLIGHT as u64;
        for frame in 10..retire_at {
            assert!(table.retired(frame).is_empty());
            assert_eq!(table.pending(), 1);
        }
        assert_eq!(table.retired(retire_at), vec!["a"]);
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn handles_are_not_reused_after_removal() {
        let mut table = MeshTable::new(FRAMES_IN_FLIGHT);
        let first = table.reserve().unwrap();
        table.insert(first, 1u32);
        table.remove(first, 0);
        assert_eq!(table.retired(100), vec![1]);

        let second = table.reserve().unwrap();
        assert_ne!(first, second);
        assert!(second.is_valid());
        assert_eq!(table.get(first), None);
    }

    #[test]
    fn drain_all_includes_pending_garbage() {
        let mut table = MeshTable::new(FRAMES_IN_FLIGHT);
        for value in 0..3u32 {
            let handle = table.reserve().unwrap();
            table.insert(handle, value);
        }
        table.remove(MeshHandle::from_index(1), 5);

        let mut all = table.drain_all();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2]);
        assert_eq!((table.len(), table.pending()), (0, 0));
    }
}
