//! Bounding volumes and culling helpers.

use glam::{Mat4, Vec3, Vec4};

/// Axis-Aligned Bounding Box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// Inverted box that any point expands; merging with it is a no-op.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.expand_to_include(p);
        }
        aabb
    }

    /// True when no point has been added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the AABB
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get the half-extents of the AABB
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Check if a point is inside the AABB
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Expand AABB to include a point
    #[inline]
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Merge two AABBs
    #[inline]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds of this box after an affine transform (all 8 corners).
    pub fn transformed(&self, matrix: Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let corners = (0..8).map(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        Self::from_points(corners.map(|c| matrix.transform_point3(c)))
    }
}

/// Frustum for culling operations.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    /// Six frustum planes (left, right, bottom, top, near, far)
    /// Each plane is (nx, ny, nz, d) where n is normal and d is distance
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a Vulkan-style (depth 0..1) view-projection.
    pub fn from_view_projection(vp: Mat4) -> Self {
        let row0 = vp.row(0);
        let row1 = vp.row(1);
        let row2 = vp.row(2);
        let row3 = vp.row(3);

        let planes = [
            normalize_plane(row3 + row0), // Left
            normalize_plane(row3 - row0), // Right
            normalize_plane(row3 + row1), // Bottom
            normalize_plane(row3 - row1), // Top
            normalize_plane(row2),        // Near (z >= 0)
            normalize_plane(row3 - row2), // Far
        ];

        Self { planes }
    }

    /// Test if an AABB is inside or intersects the frustum
    pub fn test_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            // Positive vertex: the corner furthest along the plane normal
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            normal.dot(p) + plane.w >= 0.0
        })
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 {
        plane / len
    } else {
        plane
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aabb_from_points() {
        let aabb = Aabb::from_points([
            Vec3::new(1.0, -2.0, 0.0),
            Vec3::new(-1.0, 3.0, 0.5),
            Vec3::new(0.0, 0.0, -4.0),
        ]);
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, -4.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 3.0, 0.5));
        assert!(!aabb.is_empty());
        assert!(Aabb::from_points(std::iter::empty()).is_empty());
    }

    #[test]
    fn aabb_contains_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(aabb.contains_point(Vec3::ZERO));
        assert!(aabb.contains_point(Vec3::ONE));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn aabb_transform_translates_and_rotates() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = aabb.transformed(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_relative_eq!(moved.center().x, 10.0);

        let rotated = aabb.transformed(Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let expected = 2.0_f32.sqrt();
        assert_relative_eq!(rotated.max.x, expected, epsilon = 1e-5);
        assert_relative_eq!(rotated.max.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.merge(&Aabb::EMPTY), aabb);
    }

    #[test]
    fn frustum_culls_boxes_behind_camera() {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let frustum = Frustum::from_view_projection(proj * view);

        let in_front = Aabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        let beyond_far = Aabb::new(Vec3::new(-1.0, -1.0, -300.0), Vec3::new(1.0, 1.0, -200.0));
        let off_side = Aabb::new(Vec3::new(50.0, -1.0, -11.0), Vec3::new(52.0, 1.0, -9.0));

        assert!(frustum.test_aabb(&in_front));
        assert!(!frustum.test_aabb(&behind));
        assert!(!frustum.test_aabb(&beyond_far));
        assert!(!frustum.test_aabb(&off_side));
    }
}
