//! Per-frame draw lists.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_core::{Aabb, AlphaMode, Frustum, MaterialHandle, ResourceHandle};
use glam::{Mat4, Vec3};

/// One indexed draw of a mesh surface.
#[derive(Clone, Copy, Debug)]
pub struct RenderObject {
    pub index_buffer: vk::Buffer,
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_buffer_address: vk::DeviceAddress,
    pub material: MaterialHandle,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    pub transform: Mat4,
    /// World-space bounds.
    pub bounds: Aabb,
}

/// Push constants shared by every mesh pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub model: [[f32; 4]; 4],
    pub vertex_buffer: u64,
    pub material_buffer: u64,
    pub material_index: u32,
    pub _pad: u32,
}

impl DrawPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(object: &RenderObject, material_buffer: vk::DeviceAddress) -> Self {
        Self {
            model: object.transform.to_cols_array_2d(),
            vertex_buffer: object.vertex_buffer_address,
            material_buffer,
            material_index: object.material.index(),
            _pad: 0,
        }
    }
}

/// Counters from recording a draw list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draws: u32,
    pub triangles: u64,
    pub index_buffer_binds: u32,
}

impl std::ops::AddAssign for DrawStats {
    fn add_assign(&mut self, rhs: Self) {
        self.draws += rhs.draws;
        self.triangles += rhs.triangles;
        self.index_buffer_binds += rhs.index_buffer_binds;
    }
}

/// The frame's draws, split by blending.
#[derive(Debug, Default)]
pub struct DrawContext {
    pub opaque: Vec<RenderObject>,
    pub transparent: Vec<RenderObject>,
}

impl DrawContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `object` by its alpha mode. Masked surfaces count as opaque.
    pub fn push(&mut self, object: RenderObject) {
        if object.alpha_mode.is_transparent() {
            self.transparent.push(object);
        } else {
            self.opaque.push(object);
        }
    }

    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }

    /// Drop objects outside `frustum`. Returns how many were culled.
    pub fn cull(&mut self, frustum: &Frustum) -> usize {
        let before = self.len();
        self.opaque.retain(|o| frustum.test_aabb(&o.bounds));
        self.transparent.retain(|o| frustum.test_aabb(&o.bounds));
        before - self.len()
    }

    /// Opaque draws grouped by material then index buffer; transparent
    /// draws back to front from `camera_position`.
    pub fn sort(&mut self, camera_position: Vec3) {
        self.opaque
            .sort_by_key(|o| (o.material.index(), vk::Handle::as_raw(o.index_buffer)));
        self.transparent.sort_by(|a, b| {
            let da = a.bounds.center().distance_squared(camera_position);
            let db = b.bounds.center().distance_squared(camera_position);
            db.total_cmp(&da)
        });
    }
}

/// State change needed before one draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawStep<'a> {
    /// Index buffer to bind, when it differs from the previous draw's.
    pub bind_index_buffer: Option<vk::Buffer>,
    /// Cull mode to set, when it differs from the previous draw's.
    pub set_cull_mode: Option<vk::CullModeFlags>,
    pub object: &'a RenderObject,
}

/// Walk `objects`, emitting only the state changes each draw needs.
pub fn draw_steps(objects: &[RenderObject]) -> impl Iterator<Item = DrawStep<'_>> {
    let mut bound_buffer = None;
    let mut cull_mode = None;
    objects.iter().map(move |object| {
        let bind_index_buffer = (bound_buffer != Some(object.index_buffer)).then(|| {
            bound_buffer = Some(object.index_buffer);
            object.index_buffer
        });
        let wanted = if object.double_sided {
            vk::CullModeFlags::NONE
        } else {
            vk::CullModeFlags::BACK
        };
        let set_cull_mode = (cull_mode != Some(wanted)).then(|| {
            cull_mode = Some(wanted);
            wanted
        });
        DrawStep {
            bind_index_buffer,
            set_cull_mode,
            object,
        }
    })
}

/// Record push constants and indexed draws for `objects`.
///
/// # Safety
/// A rendering scope must be open with a mesh pipeline bound whose layout is
/// `layout` and whose cull mode is dynamic.
pub unsafe fn record_draws(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    layout: vk::PipelineLayout,
    objects: &[RenderObject],
    material_buffer: vk::DeviceAddress,
) -> DrawStats {
    let mut stats = DrawStats::default();
    for step in draw_steps(objects) {
        if let Some(buffer) = step.bind_index_buffer {
            device.cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32);
            stats.index_buffer_binds += 1;
        }
        if let Some(mode) = step.set_cull_mode {
            device.cmd_set_cull_mode(cmd, mode);
        }
        let push = DrawPushConstants::new(step.object, material_buffer);
        device.cmd_push_constants(
            cmd,
            layout,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            0,
            bytemuck::bytes_of(&push),
        );
        device.cmd_draw_indexed(cmd, step.object.index_count, 1, step.object.first_index, 0, 0);
        stats.draws += 1;
        stats.triangles += u64::from(step.object.index_count / 3);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn object(buffer: u64, material: u32, center: Vec3) -> RenderObject {
        RenderObject {
            index_buffer: vk::Buffer::from_raw(buffer),
            first_index: 0,
            index_count: 6,
            vertex_buffer_address: 0x1000,
            material: MaterialHandle::from_index(material),
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
            transform: Mat4::from_translation(center),
            bounds: Aabb::new(center - Vec3::splat(0.5), center + Vec3::splat(0.5)),
        }
    }

    #[test]
    fn push_constants_are_88_bytes() {
        assert_eq!(DrawPushConstants::SIZE, 88);
    }

    #[test]
    fn push_partitions_by_alpha_mode() {
        let mut ctx = DrawContext::new();
        ctx.push(object(1, 0, Vec3::ZERO));
        ctx.push(RenderObject {
            alpha_mode: AlphaMode::Mask,
            ..object(1, 0, Vec3::ZERO)
        });
        ctx.push(RenderObject {
            alpha_mode: AlphaMode::Blend,
            ..object(1, 0, Vec3::ZERO)
        });
        assert_eq!(ctx.opaque.len(), 2);
        assert_eq!(ctx.transparent.len(), 1);
        ctx.clear();
        assert!(ctx.is_empty());
    }

    #[test]
    fn opaque_sorted_by_material_then_buffer() {
        let mut ctx = DrawContext::new();
        ctx.push(object(2, 1, Vec3::ZERO));
        ctx.push(object(1, 1, Vec3::ZERO));
        ctx.push(object(3, 0, Vec3::ZERO));
        ctx.sort(Vec3::ZERO);
        let order: Vec<_> = ctx
            .opaque
            .iter()
            .map(|o| (o.material.index(), o.index_buffer.as_raw()))
            .collect();
        assert_eq!(order, vec![(0, 3), (1, 1), (1, 2)]);
    }

    #[test]
    fn transparent_sorted_back_to_front() {
        let mut ctx = DrawContext::new();
        for z in [-1.0, -10.0, -5.0] {
            ctx.push(RenderObject {
                alpha_mode: AlphaMode::Blend,
                ..object(1, 0, Vec3::new(0.0, 0.0, z))
            });
        }
        ctx.sort(Vec3::ZERO);
        let depths: Vec<_> = ctx.transparent.iter().map(|o| o.bounds.center().z).collect();
        assert_eq!(depths, vec![-10.0, -5.0, -1.0]);
    }

    #[test]
    fn cull_removes_objects_outside_frustum() {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let frustum = Frustum::from_view_projection(proj * view);

        let mut ctx = DrawContext::new();
        ctx.push(object(1, 0, Vec3::new(0.0, 0.0, -5.0)));
        ctx.push(object(1, 0, Vec3::new(0.0, 0.0, 5.0)));
        ctx.push(RenderObject {
            alpha_mode: AlphaMode::Blend,
            ..object(1, 0, Vec3::new(0.0, 0.0, 500.0))
        });
        assert_eq!(ctx.cull(&frustum), 2);
        assert_eq!(ctx.opaque.len(), 1);
        assert!(ctx.transparent.is_empty());
    }

    #[test]
    fn steps_rebind_only_on_change() {
        let objects = [
            object(1, 0, Vec3::ZERO),
            object(1, 1, Vec3::ZERO),
            RenderObject {
                double_sided: true,
                ..object(2, 1, Vec3::ZERO)
            },
            object(2, 2, Vec3::ZERO),
        ];
        let steps: Vec<_> = draw_steps(&objects).collect();
        let binds: Vec<_> = steps
            .iter()
            .map(|s| s.bind_index_buffer.map(|b| b.as_raw()))
            .collect();
        assert_eq!(binds, vec![Some(1), None, Some(2), None]);

        let culls: Vec<_> = steps.iter().map(|s| s.set_cull_mode).collect();
        assert_eq!(
            culls,
            vec![
                Some(vk::CullModeFlags::BACK),
                None,
                Some(vk::CullModeFlags::NONE),
                Some(vk::CullModeFlags::BACK),
            ]
        );
    }

    #[test]
    fn push_constants_carry_material_and_addresses() {
        let obj = object(1, 7, Vec3::X);
        let push = DrawPushConstants::new(&obj, 0xABC0);
        assert_eq!(push.material_index, 7);
        assert_eq!(push.vertex_buffer, 0x1000);
        assert_eq!(push.material_buffer, 0xABC0);
        assert_eq!(push.model[3][0], 1.0);
    }
}
