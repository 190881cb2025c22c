//! Data layouts shared between the CPU and shaders.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::handle::{ResourceHandle, TextureHandle};

/// Mesh vertex as read by shaders through a buffer device address.
///
/// UVs are split across the padding slots so the struct packs to 64 bytes
/// under scalar layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv_x: f32,
    pub normal: [f32; 3],
    pub uv_y: f32,
    pub color: [f32; 4],
    pub tangent: [f32; 4],
}

impl Vertex {
    /// Vertex at `position` with white colour and +Y normal.
    pub fn new(position: Vec3) -> Self {
        Self {
            position: position.to_array(),
            uv_x: 0.0,
            normal: [0.0, 1.0, 0.0],
            uv_y: 0.0,
            color: [1.0; 4],
            tangent: [1.0, 0.0, 0.0, 1.0],
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// How a material's alpha channel is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    /// Alpha is ignored.
    #[default]
    Opaque,
    /// Fragments below the cutoff are discarded.
    Mask,
    /// Alpha-blended; drawn after opaque geometry, back to front.
    Blend,
}

impl AlphaMode {
    /// Whether surfaces using this mode belong in the transparent list.
    #[inline]
    pub const fn is_transparent(self) -> bool {
        matches!(self, Self::Blend)
    }
}

bitflags! {
    /// Per-material shading switches, read by shaders from [`GpuMaterial::flags`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        const DOUBLE_SIDED = 1 << 0;
        const ALPHA_MASK = 1 << 1;
        const ALPHA_BLEND = 1 << 2;
        const UNLIT = 1 << 3;
    }
}

impl MaterialFlags {
    /// Flags implied by an alpha mode.
    pub const fn from_alpha_mode(mode: AlphaMode) -> Self {
        match mode {
            AlphaMode::Opaque => Self::empty(),
            AlphaMode::Mask => Self::ALPHA_MASK,
            AlphaMode::Blend => Self::ALPHA_BLEND,
        }
    }
}

/// One entry of the material buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub base_color_factor: [f32; 4],
    /// xyz = emissive colour, w = emissive strength
    pub emissive_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub alpha_cutoff: f32,
    pub flags: u32,
    pub base_color_texture: u32,
    pub metallic_roughness_texture: u32,
    pub normal_texture: u32,
    pub occlusion_texture: u32,
    pub emissive_texture: u32,
    pub _pad: [u32; 3],
}

impl GpuMaterial {
    /// Size in bytes of one material slot.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Texture handles referenced by this material.
    pub fn textures(&self) -> [TextureHandle; 5] {
        [
            self.base_color_texture,
            self.metallic_roughness_texture,
            self.normal_texture,
            self.occlusion_texture,
            self.emissive_texture,
        ]
        .map(TextureHandle::from_index)
    }

    pub fn flags(&self) -> MaterialFlags {
        MaterialFlags::from_bits_truncate(self.flags)
    }

    pub fn base_color(&self) -> Vec4 {
        Vec4::from_array(self.base_color_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layout_sizes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 64);
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 80);
        assert_eq!(GpuMaterial::SIZE % 16, 0);
    }

    #[test]
    fn alpha_mode_flags() {
        assert_eq!(
            MaterialFlags::from_alpha_mode(AlphaMode::Mask),
            MaterialFlags::ALPHA_MASK
        );
        assert!(MaterialFlags::from_alpha_mode(AlphaMode::Opaque).is_empty());
        assert!(AlphaMode::Blend.is_transparent());
        assert!(!AlphaMode::Mask.is_transparent());
    }

    #[test]
    fn material_texture_handles_round_trip() {
        let material = GpuMaterial {
            base_color_factor: [1.0; 4],
            emissive_factor: [0.0; 4],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            alpha_cutoff: 0.5,
            flags: (MaterialFlags::DOUBLE_SIDED | MaterialFlags::ALPHA_MASK).bits(),
            base_color_texture: 3,
            metallic_roughness_texture: 0,
            normal_texture: 1,
            occlusion_texture: 0,
            emissive_texture: 2,
            _pad: [0; 3],
        };
        let textures = material.textures();
        assert_eq!(textures[0].index(), 3);
        assert_eq!(textures[4].index(), 2);
        assert!(material.flags().contains(MaterialFlags::DOUBLE_SIDED));
    }
}
