//! glTF 2.0 import into CPU-side [`SceneData`].
//!
//! Only what the GPU upload needs is extracted: triangle primitives with
//! their vertex attributes, metallic-roughness materials, images (decoded
//! to RGBA8 in parallel) and the node hierarchy.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use base64::prelude::{Engine as _, BASE64_STANDARD};
use ember_core::{Aabb, AlphaMode, Vertex};
use glam::{Mat4, Vec3, Vec4};

use crate::decode::{decode_images, ImageData, ImageSource};
use crate::error::{AssetError, Result};

/// A loaded glTF scene.
#[derive(Clone, Debug, Default)]
pub struct SceneData {
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    /// Indexed like the glTF `images` array. `None` marks an image that
    /// could not be decoded.
    pub images: Vec<Option<ImageData>>,
    pub nodes: Vec<NodeData>,
    /// Root nodes of the scene that is drawn.
    pub roots: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: Option<String>,
    pub primitives: Vec<PrimitiveData>,
}

/// One indexed triangle list.
#[derive(Clone, Debug)]
pub struct PrimitiveData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Object-space bounds.
    pub bounds: Aabb,
    /// Index into [`SceneData::materials`].
    pub material: Option<usize>,
}

/// Metallic-roughness material. Texture fields index [`SceneData::images`].
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData {
    pub name: Option<String>,
    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emissive_factor: Vec3,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub base_color_texture: Option<usize>,
    pub metallic_roughness_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub occlusion_texture: Option<usize>,
    pub emissive_texture: Option<usize>,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: None,
            base_color_factor: Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            emissive_factor: Vec3::ZERO,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeData {
    pub name: Option<String>,
    /// Local transform relative to the parent.
    pub transform: Mat4,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

/// A mesh placed in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshInstance {
    pub mesh: usize,
    pub transform: Mat4,
}

impl SceneData {
    /// Flatten the node hierarchy into world-space mesh instances.
    pub fn instances(&self) -> Vec<MeshInstance> {
        let mut instances = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(usize, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|&root| (root, Mat4::IDENTITY))
            .collect();

        while let Some((index, parent)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            // Malformed files can reference a node twice.
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            let world = parent * node.transform;
            if let Some(mesh) = node.mesh {
                instances.push(MeshInstance {
                    mesh,
                    transform: world,
                });
            }
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
        instances
    }

    /// World-space bounds of every instance.
    pub fn bounds(&self) -> Aabb {
        self.instances()
            .iter()
            .filter_map(|instance| {
                self.meshes
                    .get(instance.mesh)
                    .map(|mesh| (mesh, instance.transform))
            })
            .flat_map(|(mesh, transform)| {
                mesh.primitives
                    .iter()
                    .map(move |p| p.bounds.transformed(transform))
            })
            .fold(Aabb::EMPTY, |acc, b| acc.merge(&b))
    }

    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(|m| m.primitives.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes
            .iter()
            .flat_map(|m| &m.primitives)
            .map(|p| p.indices.len() / 3)
            .sum()
    }
}

/// Load a `.gltf` or `.glb` file. External buffers and images are resolved
/// relative to the file's directory.
pub fn load_gltf(path: impl AsRef<Path>) -> Result<SceneData> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let scene = load_gltf_slice(&bytes, base_dir)?;
    tracing::info!(
        "Loaded {}: {} meshes, {} primitives, {} triangles, {} materials, {} images",
        path.display(),
        scene.meshes.len(),
        scene.primitive_count(),
        scene.triangle_count(),
        scene.materials.len(),
        scene.images.len()
    );
    Ok(scene)
}

/// Load glTF or GLB bytes already in memory.
pub fn load_gltf_slice(bytes: &[u8], base_dir: &Path) -> Result<SceneData> {
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)?;
    let buffers = gltf::import_buffers(&document, Some(base_dir), blob)?;

    let materials: Vec<MaterialData> = document.materials().map(read_material).collect();

    let mut meshes = Vec::with_capacity(document.meshes().len());
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            if let Some(data) = read_primitive(&primitive, &buffers, mesh.index())? {
                primitives.push(data);
            }
        }
        meshes.push(MeshData {
            name: mesh.name().map(str::to_owned),
            primitives,
        });
    }

    let sources: Vec<ImageSource<'_>> = document
        .images()
        .map(|image| image_source(&image, &buffers, base_dir))
        .collect();
    let srgb = image_color_spaces(&materials, sources.len());
    let images = decode_images(&sources, &srgb);

    let nodes: Vec<NodeData> = document
        .nodes()
        .map(|node| NodeData {
            name: node.name().map(str::to_owned),
            transform: Mat4::from_cols_array_2d(&node.transform().matrix()),
            mesh: node.mesh().map(|m| m.index()),
            children: node.children().map(|c| c.index()).collect(),
        })
        .collect();

    let roots = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .map_or_else(
            || parentless_nodes(&nodes),
            |scene| scene.nodes().map(|n| n.index()).collect(),
        );

    Ok(SceneData {
        meshes,
        materials,
        images,
        nodes,
        roots,
    })
}

fn texture_image(info: Option<gltf::texture::Info<'_>>) -> Option<usize> {
    info.map(|info| info.texture().source().index())
}

fn read_material(material: gltf::Material<'_>) -> MaterialData {
    let pbr = material.pbr_metallic_roughness();
    MaterialData {
        name: material.name().map(str::to_owned),
        base_color_factor: Vec4::from_array(pbr.base_color_factor()),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        emissive_factor: Vec3::from_array(material.emissive_factor()),
        alpha_mode: match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        },
        alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
        double_sided: material.double_sided(),
        base_color_texture: texture_image(pbr.base_color_texture()),
        metallic_roughness_texture: texture_image(pbr.metallic_roughness_texture()),
        normal_texture: material
            .normal_texture()
            .map(|t| t.texture().source().index()),
        occlusion_texture: material
            .occlusion_texture()
            .map(|t| t.texture().source().index()),
        emissive_texture: texture_image(material.emissive_texture()),
    }
}

fn read_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
    mesh_index: usize,
) -> Result<Option<PrimitiveData>> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        tracing::warn!(
            "Mesh {mesh_index} primitive {}: {:?} topology skipped",
            primitive.index(),
            primitive.mode()
        );
        return Ok(None);
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
    let Some(positions) = reader.read_positions() else {
        return Err(AssetError::InvalidData(format!(
            "mesh {mesh_index} primitive {} has no POSITION attribute",
            primitive.index()
        )));
    };
    let mut vertices: Vec<Vertex> = positions
        .map(|p| Vertex::new(Vec3::from_array(p)))
        .collect();
    if vertices.is_empty() {
        return Ok(None);
    }

    let normals = reader.read_normals();
    let has_normals = normals.is_some();
    if let Some(normals) = normals {
        for (vertex, normal) in vertices.iter_mut().zip(normals) {
            vertex.normal = normal;
        }
    }
    if let Some(uvs) = reader.read_tex_coords(0) {
        for (vertex, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
            vertex.uv_x = uv[0];
            vertex.uv_y = uv[1];
        }
    }
    if let Some(colors) = reader.read_colors(0) {
        for (vertex, color) in vertices.iter_mut().zip(colors.into_rgba_f32()) {
            vertex.color = color;
        }
    }
    if let Some(tangents) = reader.read_tangents() {
        for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
            vertex.tangent = tangent;
        }
    }

    let indices: Vec<u32> = reader.read_indices().map_or_else(
        || (0..vertices.len() as u32).collect(),
        |indices| indices.into_u32().collect(),
    );
    if indices.len() % 3 != 0 {
        return Err(AssetError::InvalidData(format!(
            "mesh {mesh_index}: index count {} is not a multiple of 3",
            indices.len()
        )));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        return Err(AssetError::InvalidData(format!(
            "mesh {mesh_index}: index {bad} out of range for {} vertices",
            vertices.len()
        )));
    }

    if !has_normals {
        compute_normals(&mut vertices, &indices);
    }

    let bounds = Aabb::from_points(vertices.iter().map(Vertex::position));
    Ok(Some(PrimitiveData {
        vertices,
        indices,
        bounds,
        material: primitive.material().index(),
    }))
}

/// Area-weighted smooth normals.
fn compute_normals(vertices: &mut [Vertex], indices: &[u32]) {
    let mut accum = vec![Vec3::ZERO; vertices.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (pa, pb, pc) = (
            vertices[a].position(),
            vertices[b].position(),
            vertices[c].position(),
        );
        let face = (pb - pa).cross(pc - pa);
        accum[a] += face;
        accum[b] += face;
        accum[c] += face;
    }
    for (vertex, normal) in vertices.iter_mut().zip(accum) {
        vertex.normal = normal.try_normalize().unwrap_or(Vec3::Y).to_array();
    }
}

fn image_source<'a>(
    image: &gltf::Image<'a>,
    buffers: &'a [gltf::buffer::Data],
    base_dir: &Path,
) -> ImageSource<'a> {
    match image.source() {
        gltf::image::Source::View { view, mime_type } => {
            let start = view.offset();
            let end = start + view.length();
            buffers
                .get(view.buffer().index())
                .and_then(|data| data.0.get(start..end))
                .map_or_else(
                    || {
                        ImageSource::Unsupported(format!(
                            "buffer view {} is out of range",
                            view.index()
                        ))
                    },
                    |bytes| ImageSource::Bytes {
                        bytes: Cow::Borrowed(bytes),
                        mime_type: Some(mime_type),
                    },
                )
        }
        gltf::image::Source::Uri { uri, mime_type } if uri.starts_with("data:") => {
            match decode_data_uri(uri) {
                Ok((uri_mime_type, bytes)) => ImageSource::Bytes {
                    bytes: Cow::Owned(bytes),
                    mime_type: uri_mime_type.or(mime_type),
                },
                Err(reason) => ImageSource::Unsupported(reason),
            }
        }
        gltf::image::Source::Uri { uri, .. } => ImageSource::File(resolve_uri(base_dir, uri)),
    }
}

/// Split `data:[<media type>];base64,<payload>` and decode the payload.
fn decode_data_uri(uri: &str) -> std::result::Result<(Option<&str>, Vec<u8>), String> {
    let rest = uri.strip_prefix("data:").ok_or("not a data URI")?;
    let (header, payload) = rest.split_once(',').ok_or("data URI has no payload")?;
    let Some(media_type) = header.strip_suffix(";base64") else {
        return Err(format!("data URI encoding `{header}` is not base64"));
    };
    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| format!("invalid base64 in data URI: {e}"))?;
    let media_type = media_type.split(';').next().filter(|m| !m.is_empty());
    Ok((media_type, bytes))
}

fn resolve_uri(base_dir: &Path, uri: &str) -> PathBuf {
    base_dir.join(percent_decode(uri))
}

/// Decode `%XX` escapes in a relative URI. Malformed escapes are kept as-is.
fn percent_decode(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Base colour and emissive maps hold colour and are sampled as sRGB;
/// every other use is linear data. Colour use wins when an image is shared.
/// Unreferenced images default to sRGB.
fn image_color_spaces(materials: &[MaterialData], image_count: usize) -> Vec<bool> {
    let mut usage: Vec<Option<bool>> = vec![None; image_count];
    let mut mark = |image: Option<usize>, srgb: bool| {
        if let Some(slot) = image.and_then(|i| usage.get_mut(i)) {
            *slot = Some(slot.unwrap_or(false) || srgb);
        }
    };
    for material in materials {
        mark(material.base_color_texture, true);
        mark(material.emissive_texture, true);
        mark(material.metallic_roughness_texture, false);
        mark(material.normal_texture, false);
        mark(material.occlusion_texture, false);
    }
    usage.into_iter().map(|u| u.unwrap_or(true)).collect()
}

fn parentless_nodes(nodes: &[NodeData]) -> Vec<usize> {
    let mut has_parent = vec![false; nodes.len()];
    for child in nodes.iter().flat_map(|n| &n.children) {
        if let Some(flag) = has_parent.get_mut(*child) {
            *flag = true;
        }
    }
    (0..nodes.len()).filter(|&i| !has_parent[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use base64::prelude::{Engine as _, BASE64_STANDARD};
    use std::io::Cursor;

    fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    fn triangle_positions() -> Vec<u8> {
        [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
            .iter()
            .flatten()
            .flat_map(|f| f.to_le_bytes())
            .collect()
    }

    const TRIANGLE_SCENE: &str = r#"{
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": 36 }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [0, 0, 0], "max": [1, 1, 0]
        }],
        "materials": [{
            "pbrMetallicRoughness": { "baseColorFactor": [1, 0, 0, 0.5], "metallicFactor": 0.25 },
            "alphaMode": "BLEND",
            "doubleSided": true
        }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
        "nodes": [
            { "translation": [0, 0, -5], "children": [1] },
            { "mesh": 0, "scale": [2, 2, 2] }
        ],
        "scenes": [{ "nodes": [0] }],
        "scene": 0
    }"#;

    fn load_triangle() -> SceneData {
        let bytes = glb(TRIANGLE_SCENE, &triangle_positions());
        load_gltf_slice(&bytes, Path::new(".")).unwrap()
    }

    #[test]
    fn loads_geometry_with_generated_indices_and_normals() {
        let scene = load_triangle();
        assert_eq!(scene.meshes.len(), 1);
        let primitive = &scene.meshes[0].primitives[0];
        assert_eq!(primitive.vertices.len(), 3);
        assert_eq!(primitive.indices, vec![0, 1, 2]);
        assert_eq!(primitive.material, Some(0));
        for vertex in &primitive.vertices {
            assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
            assert_eq!(vertex.color, [1.0; 4]);
        }
        assert_eq!(primitive.bounds.max, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(scene.triangle_count(), 1);
    }

    #[test]
    fn reads_material_factors_with_defaults() {
        let scene = load_triangle();
        let material = &scene.materials[0];
        assert_eq!(material.alpha_mode, AlphaMode::Blend);
        assert!(material.double_sided);
        assert_relative_eq!(material.metallic_factor, 0.25);
        assert_relative_eq!(material.roughness_factor, 1.0);
        assert_relative_eq!(material.alpha_cutoff, 0.5);
        assert_relative_eq!(material.base_color_factor.w, 0.5);
        assert_eq!(material.base_color_texture, None);
    }

    #[test]
    fn instances_compose_parent_transforms() {
        let scene = load_triangle();
        let instances = scene.instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].mesh, 0);

        let corner = instances[0].transform.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(corner.x, 2.0);
        assert_relative_eq!(corner.y, 2.0);
        assert_relative_eq!(corner.z, -5.0);

        let bounds = scene.bounds();
        assert_relative_eq!(bounds.max.x, 2.0);
        assert_relative_eq!(bounds.min.z, -5.0);
    }

    #[test]
    fn embedded_images_decode_with_usage_color_space() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([128, 128, 255, 255]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let mut bin = triangle_positions();
        bin.extend_from_slice(&png);

        let json = r#"{
            "asset": { "version": "2.0" },
            "buffers": [{ "byteLength": BUF_LEN }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": PNG_LEN }
            ],
            "accessors": [{
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0, 0, 0], "max": [1, 1, 0]
            }],
            "images": [{ "bufferView": 1, "mimeType": "image/png" }],
            "textures": [{ "source": 0 }],
            "materials": [{ "normalTexture": { "index": 0 } }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
            "nodes": [{ "mesh": 0 }]
        }"#
        .replace("BUF_LEN", &bin.len().to_string())
        .replace("PNG_LEN", &png.len().to_string());

        let scene = load_gltf_slice(&glb(&json, &bin), Path::new(".")).unwrap();
        assert_eq!(scene.materials[0].normal_texture, Some(0));
        let image = scene.images[0].as_ref().unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert!(!image.srgb);
        assert_eq!(&image.pixels[..4], &[128, 128, 255, 255]);
        // No scene declared: parentless nodes become roots.
        assert_eq!(scene.roots, vec![0]);
        assert_eq!(scene.instances().len(), 1);
    }

    #[test]
    fn data_uri_images_decode() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let uri = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(&png));

        let json = r#"{
            "asset": { "version": "2.0" },
            "buffers": [{ "byteLength": 36 }],
            "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
            "accessors": [{
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0, 0, 0], "max": [1, 1, 0]
            }],
            "images": [{ "uri": "IMAGE_URI" }, { "uri": "data:image/png,not-base64" }],
            "textures": [{ "source": 0 }, { "source": 1 }],
            "materials": [{
                "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } },
                "occlusionTexture": { "index": 1 }
            }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
            "nodes": [{ "mesh": 0 }]
        }"#
        .replace("IMAGE_URI", &uri);

        let scene = load_gltf_slice(&glb(&json, &triangle_positions()), Path::new(".")).unwrap();
        assert_eq!(scene.images.len(), 2);
        let image = scene.images[0].as_ref().unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert!(image.srgb);
        assert_eq!(&image.pixels[..4], &[10, 20, 30, 255]);
        assert!(scene.images[1].is_none());
    }

    #[test]
    fn data_uri_header_parsing() {
        let (mime, bytes) = decode_data_uri("data:image/png;base64,AAEC").unwrap();
        assert_eq!(mime, Some("image/png"));
        assert_eq!(bytes, vec![0, 1, 2]);

        let (mime, _) = decode_data_uri("data:;base64,AAEC").unwrap();
        assert_eq!(mime, None);

        assert!(decode_data_uri("data:image/png,AAEC").is_err());
        assert!(decode_data_uri("data:image/png;base64").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn color_use_wins_over_linear_use() {
        let materials = [
            MaterialData {
                normal_texture: Some(0),
                ..MaterialData::default()
            },
            MaterialData {
                base_color_texture: Some(0),
                occlusion_texture: Some(1),
                ..MaterialData::default()
            },
        ];
        assert_eq!(image_color_spaces(&materials, 3), vec![true, false, true]);
    }

    #[test]
    fn smooth_normals_average_adjacent_faces() {
        let mut vertices = vec![
            Vertex::new(Vec3::ZERO),
            Vertex::new(Vec3::X),
            Vertex::new(Vec3::Y),
            Vertex::new(Vec3::Z),
        ];
        // Two faces sharing the edge 0-1: one in XY, one in XZ.
        compute_normals(&mut vertices, &[0, 1, 2, 0, 3, 1]);
        let shared = Vec3::from_array(vertices[0].normal);
        assert_relative_eq!(shared.length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(shared.y, shared.z, epsilon = 1e-6);
        assert!(shared.y > 0.0);
    }

    #[test]
    fn uri_escapes_are_decoded() {
        assert_eq!(percent_decode("my%20texture.png"), "my texture.png");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_gltf("no/such/scene.gltf").unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
        assert!(err.to_string().contains("scene.gltf"));
    }
}
