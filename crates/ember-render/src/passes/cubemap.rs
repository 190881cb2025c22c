//! Equirectangular environment to cubemap.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{GpuContext, RenderInfo, Result};
use glam::{Mat4, Vec3};

use super::FacePipeline;
use crate::shaders::ShaderLibrary;

/// Format of every cubemap the IBL bake renders.
pub const CUBE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Push block of the cube-face passes (cubemap, irradiance, prefilter).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CubeFacePushConstants {
    pub view_projection: [[f32; 4]; 4],
    /// Prefilter only.
    pub roughness: f32,
    /// Edge length of the sampled source cube, prefilter only.
    pub source_resolution: f32,
    pub _pad: [f32; 2],
}

impl CubeFacePushConstants {
    pub fn new(face: u32) -> Self {
        Self {
            view_projection: cube_face_view_projection(face).to_cols_array_2d(),
            roughness: 0.0,
            source_resolution: 0.0,
            _pad: [0.0; 2],
        }
    }
}

/// Look direction and up vector per layer, in Vulkan cube layer order.
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// View-projection that renders cube layer `face` (0..6) from the origin.
///
/// No Y flip: the resulting image rows match how samplers address cube
/// faces.
pub fn cube_face_view_projection(face: u32) -> Mat4 {
    let (direction, up) = CUBE_FACES[face as usize % 6];
    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 10.0);
    projection * Mat4::look_to_rh(Vec3::ZERO, direction, up)
}

/// Projects an equirectangular map onto cube faces.
pub struct CubemapPass {
    face: FacePipeline,
}

impl CubemapPass {
    pub fn new(gpu: &GpuContext, shaders: &ShaderLibrary) -> Result<Self> {
        Ok(Self {
            face: FacePipeline::new(gpu, shaders, "equirect_to_cube.frag", CUBE_FORMAT)?,
        })
    }

    /// Bind the equirectangular source.
    pub fn set_source(&self, gpu: &GpuContext, view: vk::ImageView, sampler: vk::Sampler) {
        self.face.set_input(gpu, view, sampler);
    }

    /// # Safety
    /// See [`FacePipeline::render`].
    pub unsafe fn render(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        info: &RenderInfo,
        face: u32,
    ) {
        self.face
            .render(device, cmd, info, &CubeFacePushConstants::new(face));
    }

    pub fn destroy(&self, gpu: &GpuContext) {
        self.face.destroy(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ndc(face: u32, point: Vec3) -> Vec3 {
        let clip = cube_face_view_projection(face) * point.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn push_block_is_80_bytes() {
        assert_eq!(std::mem::size_of::<CubeFacePushConstants>(), 80);
    }

    #[test]
    fn each_face_looks_down_its_axis() {
        for (face, (direction, _)) in CUBE_FACES.iter().enumerate() {
            let p = ndc(face as u32, *direction);
            assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
            assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
            assert!((0.0..=1.0).contains(&p.z));
        }
    }

    #[test]
    fn positive_x_face_matches_cube_addressing() {
        // On +X, texel rows run towards -Y and columns towards -Z.
        let up = ndc(0, Vec3::new(1.0, 0.5, 0.0));
        assert!(up.y < 0.0);
        let towards_neg_z = ndc(0, Vec3::new(1.0, 0.0, -0.5));
        assert!(towards_neg_z.x > 0.0);
    }

    #[test]
    fn positive_y_face_matches_cube_addressing() {
        // On +Y, columns run towards +X and rows towards +Z.
        let p = ndc(2, Vec3::new(0.5, 1.0, 0.5));
        assert!(p.x > 0.0);
        assert!(p.y > 0.0);
    }

    #[test]
    fn faces_cover_ninety_degrees() {
        let edge = ndc(4, Vec3::new(1.0, 0.0, 1.0));
        assert_relative_eq!(edge.x.abs(), 1.0, epsilon = 1e-5);
    }
}
