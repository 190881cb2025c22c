//! A loaded glTF scene living on the GPU.

use std::time::Instant;

use ember_asset::{MaterialData, MeshData, MeshInstance, SceneData};
use ember_core::{
    Aabb, GpuMaterial, MaterialFlags, MaterialHandle, MeshHandle, ResourceHandle, TextureHandle,
    Vertex,
};
use ember_gpu::{GpuContext, Result};

use crate::draw::{DrawContext, RenderObject};
use crate::renderer::Renderer;
use crate::resources::{MeshManager, Surface};

/// Fallback textures for material slots a glTF file leaves empty.
#[derive(Clone, Copy, Debug)]
pub struct DefaultTextures {
    pub white: TextureHandle,
    pub flat_normal: TextureHandle,
}

/// Translate a glTF material into its GPU form.
///
/// `images` maps glTF image indices to uploaded textures; indices that are
/// missing or failed to upload fall back to the defaults.
pub fn gpu_material(
    material: &MaterialData,
    images: &[Option<TextureHandle>],
    defaults: DefaultTextures,
) -> GpuMaterial {
    let texture = |index: Option<usize>, fallback: TextureHandle| {
        index
            .and_then(|i| images.get(i).copied().flatten())
            .unwrap_or(fallback)
            .index()
    };
    let mut flags = MaterialFlags::from_alpha_mode(material.alpha_mode);
    if material.double_sided {
        flags |= MaterialFlags::DOUBLE_SIDED;
    }
    GpuMaterial {
        base_color_factor: material.base_color_factor.to_array(),
        emissive_factor: material.emissive_factor.extend(1.0).to_array(),
        metallic_factor: material.metallic_factor,
        roughness_factor: material.roughness_factor,
        alpha_cutoff: material.alpha_cutoff,
        flags: flags.bits(),
        base_color_texture: texture(material.base_color_texture, defaults.white),
        metallic_roughness_texture: texture(material.metallic_roughness_texture, defaults.white),
        normal_texture: texture(material.normal_texture, defaults.flat_normal),
        occlusion_texture: texture(material.occlusion_texture, defaults.white),
        // Emission is factor times texture, so an absent texture must not zero it.
        emissive_texture: texture(material.emissive_texture, defaults.white),
        _pad: [0; 3],
    }
}

/// One glTF mesh flattened into a single vertex and index stream.
#[derive(Debug, Default)]
pub struct MergedMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub surfaces: Vec<Surface>,
}

/// Concatenate a mesh's primitives, rebasing indices onto the merged
/// vertex buffer. `material` resolves glTF material indices.
pub fn merge_primitives(
    mesh: &MeshData,
    materials: &[MaterialData],
    material: impl Fn(Option<usize>) -> MaterialHandle,
) -> MergedMesh {
    let mut merged = MergedMesh::default();
    for primitive in mesh.primitives.iter().filter(|p| !p.indices.is_empty()) {
        let base = merged.vertices.len() as u32;
        let first_index = merged.indices.len() as u32;
        merged.vertices.extend_from_slice(&primitive.vertices);
        merged
            .indices
            .extend(primitive.indices.iter().map(|&i| i + base));

        let data = primitive.material.and_then(|i| materials.get(i));
        merged.surfaces.push(Surface {
            first_index,
            index_count: primitive.indices.len() as u32,
            material: material(primitive.material),
            alpha_mode: data.map(|m| m.alpha_mode).unwrap_or_default(),
            double_sided: data.is_some_and(|m| m.double_sided),
            bounds: primitive.bounds,
        });
    }
    merged
}

/// GPU handles for everything a [`SceneData`] references.
pub struct GpuScene {
    /// Indexed like `SceneData::meshes`; `None` for meshes without geometry.
    meshes: Vec<Option<MeshHandle>>,
    instances: Vec<MeshInstance>,
    textures: Vec<Option<TextureHandle>>,
    materials: Vec<MaterialHandle>,
    bounds: Aabb,
}

impl GpuScene {
    /// Upload images, materials and meshes through the renderer's managers.
    ///
    /// Images that do not fit in the bindless array are dropped with a
    /// warning and their materials fall back to default textures.
    pub fn upload(gpu: &GpuContext, renderer: &mut Renderer, scene: &SceneData) -> Result<Self> {
        let started = Instant::now();

        let mut textures = Vec::with_capacity(scene.images.len());
        for (index, image) in scene.images.iter().enumerate() {
            let handle = match image {
                Some(image) => match renderer.textures.add_rgba8(
                    gpu,
                    image.width,
                    image.height,
                    &image.pixels,
                    image.srgb,
                    &format!("image {index}"),
                ) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::warn!("Skipping image {index}: {e}");
                        None
                    }
                },
                None => None,
            };
            textures.push(handle);
        }

        let defaults = DefaultTextures {
            white: renderer.textures.white(),
            flat_normal: renderer.textures.flat_normal(),
        };
        let mut materials = Vec::with_capacity(scene.materials.len());
        for data in &scene.materials {
            let material = gpu_material(data, &textures, defaults);
            let live = |texture| renderer.textures.contains(texture);
            let handle = match renderer.materials.add(material, live) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(
                        "Material {} uses the default: {e}",
                        data.name.as_deref().unwrap_or("<unnamed>")
                    );
                    renderer.materials.default_material()
                }
            };
            materials.push(handle);
        }

        let default_material = renderer.materials.default_material();
        let resolve = |index: Option<usize>| {
            index
                .and_then(|i| materials.get(i).copied())
                .unwrap_or(default_material)
        };
        let mut meshes = Vec::with_capacity(scene.meshes.len());
        for (index, mesh) in scene.meshes.iter().enumerate() {
            let merged = merge_primitives(mesh, &scene.materials, resolve);
            if merged.surfaces.is_empty() {
                meshes.push(None);
                continue;
            }
            let name = mesh
                .name
                .clone()
                .unwrap_or_else(|| format!("mesh {index}"));
            let handle = renderer.meshes.upload(
                gpu,
                &name,
                &merged.vertices,
                &merged.indices,
                merged.surfaces,
            )?;
            meshes.push(Some(handle));
        }

        let instances = scene.instances();
        tracing::info!(
            "Uploaded scene: {} meshes, {} instances, {} materials, {} textures in {:.1?}",
            meshes.iter().flatten().count(),
            instances.len(),
            materials.len(),
            textures.iter().flatten().count(),
            started.elapsed()
        );
        Ok(Self {
            meshes,
            instances,
            textures,
            materials,
            bounds: scene.bounds(),
        })
    }

    /// World-space bounds of every instance.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    /// Push one render object per surface of every instance.
    pub fn collect_draws(&self, meshes: &MeshManager, draws: &mut DrawContext) {
        for instance in &self.instances {
            let Some(mesh) = self
                .meshes
                .get(instance.mesh)
                .copied()
                .flatten()
                .and_then(|handle| meshes.get(handle))
            else {
                continue;
            };
            for surface in &mesh.surfaces {
                draws.push(RenderObject {
                    index_buffer: mesh.index_buffer.buffer,
                    first_index: surface.first_index,
                    index_count: surface.index_count,
                    vertex_buffer_address: mesh.vertex_address(),
                    material: surface.material,
                    alpha_mode: surface.alpha_mode,
                    double_sided: surface.double_sided,
                    transform: instance.transform,
                    bounds: surface.bounds.transformed(instance.transform),
                });
            }
        }
    }

    /// Hand the meshes back for deferred destruction once `frame_number`,
    /// the last frame that may draw them, has retired. Textures and
    /// materials keep their slots. Returns the number of meshes queued.
    pub fn release(self, renderer: &mut Renderer, frame_number: u64) -> usize {
        self.meshes
            .into_iter()
            .flatten()
            .filter(|&handle| renderer.meshes.remove(handle, frame_number))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_asset::PrimitiveData;
    use ember_core::AlphaMode;
    use glam::{Vec3, Vec4};

    fn defaults() -> DefaultTextures {
        DefaultTextures {
            white: TextureHandle::from_index(0),
            flat_normal: TextureHandle::from_index(1),
        }
    }

    fn primitive(vertex_count: usize, indices: Vec<u32>, material: Option<usize>) -> PrimitiveData {
        PrimitiveData {
            vertices: vec![Vertex::default(); vertex_count],
            indices,
            bounds: Aabb::from_points([Vec3::ZERO, Vec3::ONE]),
            material,
        }
    }

    #[test]
    fn material_falls_back_to_defaults() {
        let data = MaterialData {
            base_color_texture: Some(0),
            normal_texture: Some(5),
            ..MaterialData::default()
        };
        let images = [Some(TextureHandle::from_index(7))];
        let material = gpu_material(&data, &images, defaults());
        assert_eq!(material.base_color_texture, 7);
        // Out of range index.
        assert_eq!(material.normal_texture, 1);
        assert_eq!(material.metallic_roughness_texture, 0);
        assert_eq!(material.emissive_texture, 0);
    }

    #[test]
    fn failed_image_uses_default() {
        let data = MaterialData {
            base_color_texture: Some(0),
            ..MaterialData::default()
        };
        let material = gpu_material(&data, &[None], defaults());
        assert_eq!(material.base_color_texture, 0);
    }

    #[test]
    fn material_flags_and_factors() {
        let data = MaterialData {
            base_color_factor: Vec4::new(0.5, 0.25, 1.0, 0.8),
            alpha_mode: AlphaMode::Blend,
            double_sided: true,
            emissive_factor: Vec3::new(2.0, 0.0, 0.0),
            ..MaterialData::default()
        };
        let material = gpu_material(&data, &[], defaults());
        assert_eq!(material.base_color_factor, [0.5, 0.25, 1.0, 0.8]);
        assert_eq!(material.emissive_factor, [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(
            material.flags(),
            MaterialFlags::ALPHA_BLEND | MaterialFlags::DOUBLE_SIDED
        );
    }

    #[test]
    fn primitives_merge_with_rebased_indices() {
        let mesh = MeshData {
            name: None,
            primitives: vec![
                primitive(3, vec![0, 1, 2], Some(0)),
                primitive(0, Vec::new(), None),
                primitive(4, vec![0, 1, 2, 2, 3, 0], None),
            ],
        };
        let materials = [MaterialData {
            alpha_mode: AlphaMode::Mask,
            double_sided: true,
            ..MaterialData::default()
        }];
        let merged = merge_primitives(&mesh, &materials, |index| {
            MaterialHandle::from_index(index.map_or(0, |i| i as u32 + 10))
        });

        assert_eq!(merged.vertices.len(), 7);
        assert_eq!(merged.indices, vec![0, 1, 2, 3, 4, 5, 5, 6, 3]);
        assert_eq!(merged.surfaces.len(), 2);

        let first = merged.surfaces[0];
        assert_eq!((first.first_index, first.index_count), (0, 3));
        assert_eq!(first.material.index(), 10);
        assert_eq!(first.alpha_mode, AlphaMode::Mask);
        assert!(first.double_sided);

        let second = merged.surfaces[1];
        assert_eq!((second.first_index, second.index_count), (3, 6));
        assert_eq!(second.material.index(), 0);
        assert_eq!(second.alpha_mode, AlphaMode::Opaque);
    }
}
