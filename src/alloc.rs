//! ## Raw Memory Seam for the Slot Allocators
//! The allocators only need three operations from their memory collaborator;
//! this trait is that seam. [`Global`] (backed by [`std::alloc`]) is the
//! default, tests inject failing implementations to exercise out-of-memory
//! paths.

use std::{alloc::Layout, ptr::NonNull};

/// A simple interface for the raw memory underneath a slot buffer.
///
/// Failure is a value: every operation reports out-of-memory with `None` and
/// must leave any existing block untouched.
pub trait RawAlloc {
    /// Allocate `layout.size()` bytes at `layout.align()`.
    ///  - `layout.size()` is never zero.
    fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>>;

    /// Grow a block to `new_size` bytes, preserving the first
    /// `old_layout.size()` bytes. The returned block honours
    /// `old_layout.align()`. On failure the original block is untouched and
    /// still owned by the caller.
    ///
    /// # Safety
    /// `ptr` must have been returned by [`RawAlloc::alloc`] or
    /// [`RawAlloc::grow`] on this allocator with layout `old_layout`, and
    /// `new_size >= old_layout.size()`.
    unsafe fn grow(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator with layout `layout`
    /// (for grown blocks: the grown size, original alignment).
    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-global allocator.
#[derive(Clone, Copy, Default)]
pub struct Global;

impl RawAlloc for Global {
    fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn grow(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        debug_assert!(new_size >= old_layout.size());
        // std's realloc preserves the layout's alignment and leaves the block
        // untouched on failure.
        NonNull::new(unsafe { std::alloc::realloc(ptr.as_ptr(), old_layout, new_size) })
    }

    unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}
