//! Typed integer handles for bindless resources.
//!
//! Handles index directly into GPU-side arrays (descriptor arrays, material
//! buffers), so they are plain `u32`s wrapped per resource kind.
//!
//! Allocation is monotonic: an index is never handed out twice. Writing a
//! fresh slot therefore never aliases a slot an in-flight frame may read.
//! The cost is that freed slots are not recycled.

use std::fmt;
use std::marker::PhantomData;

/// Common behavior of all resource handles.
pub trait ResourceHandle: Copy + Eq + fmt::Debug {
    /// Human-readable kind, used in error messages.
    const KIND: &'static str;

    /// Build a handle from a raw slot index.
    fn from_index(index: u32) -> Self;

    /// Raw slot index (what shaders see).
    fn index(self) -> u32;
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel that never refers to a resource.
            pub const INVALID: Self = Self(u32::MAX);

            /// Returns true unless this is [`Self::INVALID`].
            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl ResourceHandle for $name {
            const KIND: &'static str = $kind;

            #[inline]
            fn from_index(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

define_handle!(
    /// Slot in the bindless texture array.
    TextureHandle,
    "texture"
);
define_handle!(
    /// Slot in the material buffer.
    MaterialHandle,
    "material"
);
define_handle!(
    /// Entry in the mesh table.
    MeshHandle,
    "mesh"
);

/// Fixed-capacity, monotonic handle allocator.
#[derive(Debug)]
pub struct HandleAllocator<H> {
    next: u32,
    capacity: u32,
    _marker: PhantomData<fn() -> H>,
}

impl<H: ResourceHandle> HandleAllocator<H> {
    /// Create an allocator with room for `capacity` handles.
    pub const fn new(capacity: u32) -> Self {
        Self {
            next: 0,
            capacity,
            _marker: PhantomData,
        }
    }

    /// Hand out the next unused index, or `None` once capacity is reached.
    pub fn allocate(&mut self) -> Option<H> {
        if self.next >= self.capacity {
            return None;
        }
        let handle = H::from_index(self.next);
        self.next += 1;
        Some(handle)
    }

    /// Whether `handle` was produced by this allocator.
    pub fn contains(&self, handle: H) -> bool {
        handle.index() < self.next
    }

    /// Number of handles handed out so far.
    pub const fn allocated(&self) -> u32 {
        self.next
    }

    /// Total capacity.
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Handles still available.
    pub const fn remaining(&self) -> u32 {
        self.capacity - self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_monotonic() {
        let mut alloc = HandleAllocator::<TextureHandle>::new(8);
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        let c = alloc.allocate().unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        assert_eq!(alloc.allocated(), 3);
        assert_eq!(alloc.remaining(), 5);
    }

    #[test]
    fn allocation_stops_at_capacity() {
        let mut alloc = HandleAllocator::<MaterialHandle>::new(2);
        assert!(alloc.allocate().is_some());
        assert!(alloc.allocate().is_some());
        assert!(alloc.allocate().is_none());
        assert!(alloc.allocate().is_none());
        assert_eq!(alloc.allocated(), 2);
    }

    #[test]
    fn contains_only_issued_handles() {
        let mut alloc = HandleAllocator::<MeshHandle>::new(4);
        let first = alloc.allocate().unwrap();
        assert!(alloc.contains(first));
        assert!(!alloc.contains(MeshHandle::from_index(1)));
        assert!(!alloc.contains(MeshHandle::INVALID));
    }

    #[test]
    fn full_range_allocator_never_issues_the_sentinel() {
        let mut alloc = HandleAllocator::<MeshHandle>::new(u32::MAX);
        alloc.next = u32::MAX - 1;
        let last = alloc.allocate().unwrap();
        assert_eq!(last.index(), u32::MAX - 1);
        assert!(last.is_valid());
        assert!(alloc.allocate().is_none());
        assert_eq!(alloc.remaining(), 0);
    }

    #[test]
    fn invalid_handle_sentinel() {
        assert!(!TextureHandle::INVALID.is_valid());
        assert!(TextureHandle::from_index(0).is_valid());
        assert_eq!(TextureHandle::from_index(7).to_string(), "texture#7");
    }
}
