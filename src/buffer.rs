//! ## Raw Slot Storage
//! One contiguous, growable allocation holding fixed-stride slots. Shared by
//! both allocator variants; all pointer arithmetic for the crate lives here.
//!
//! Growth factor is ~1.5x: `new = 3 * (cap + 2) / 2`, which behaves like
//! "+3, then x1.5" for small capacities. Growth reallocates in place
//! (preserving the first `len * stride` bytes), so slot addresses move but
//! slot indices do not.

use crate::alloc::RawAlloc;
use std::{alloc::Layout, ptr, ptr::NonNull};

/// Rounds `n` up to a multiple of `align` (a power of two).
#[inline(always)]
pub(crate) fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

pub(crate) struct SlotBuffer<A: RawAlloc> {
    /// Null iff `capacity == 0`.
    data: *mut u8,
    /// Slot high-water mark: slots ever handed out, not the live count.
    len: u32,
    /// Slots the current allocation can hold.
    capacity: u32,
    stride: usize,
    align: usize,
    /// Hard ceiling on `capacity` (handle index space for the generational
    /// variant).
    max_capacity: u32,
    alloc: A,
}

// JUSTIFY: The buffer exclusively owns its allocation; nothing is shared or
//          interiorly mutable, so ownership can move between threads.
unsafe impl<A: RawAlloc + Send> Send for SlotBuffer<A> {}

impl<A: RawAlloc> SlotBuffer<A> {
    /// A buffer of `initial_capacity` slots (0 = allocate lazily on first
    /// [`SlotBuffer::grow`]). If the initial allocation fails the buffer is
    /// left at zero capacity rather than panicking.
    pub(crate) fn new(
        initial_capacity: u32,
        stride: usize,
        align: usize,
        max_capacity: u32,
        mut alloc: A,
    ) -> Self {
        debug_assert!(align.is_power_of_two());
        debug_assert!(stride > 0 && stride % align == 0);

        let want = initial_capacity.min(max_capacity);
        let mut data = ptr::null_mut();
        let mut capacity = 0;
        if want > 0 {
            if let Some(layout) = layout_for(want, stride, align) {
                if let Some(p) = alloc.alloc(layout) {
                    data = p.as_ptr();
                    capacity = want;
                }
            }
        }
        SlotBuffer {
            data,
            len: 0,
            capacity,
            stride,
            align,
            max_capacity,
            alloc,
        }
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> u32 {
        self.len
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline(always)]
    pub(crate) fn is_allocated(&self) -> bool {
        !self.data.is_null()
    }

    /// Marks one more slot as initialised.
    #[inline(always)]
    pub(crate) fn bump_len(&mut self) {
        debug_assert!(self.len < self.capacity);
        self.len += 1;
    }

    /// Pointer to the start of slot `idx`.
    ///
    /// # Safety
    /// `idx < self.capacity()`. The pointer is invalidated by any later
    /// [`SlotBuffer::grow`].
    #[inline(always)]
    pub(crate) unsafe fn slot_ptr(&self, idx: u32) -> *mut u8 {
        debug_assert!(idx < self.capacity);
        unsafe { self.data.add(idx as usize * self.stride) }
    }

    /// Enlarges the buffer by the growth factor, preserving the first
    /// `len * stride` bytes. Returns `false` (leaving capacity unchanged) on
    /// out-of-memory, byte-size overflow, or an exhausted index space.
    pub(crate) fn grow(&mut self) -> bool {
        if self.capacity >= self.max_capacity {
            return false;
        }
        let target =
            (3 * (self.capacity as u64 + 2) / 2).min(self.max_capacity as u64) as u32;
        let Some(new_layout) = layout_for(target, self.stride, self.align) else {
            return false;
        };

        let grown = if self.data.is_null() {
            self.alloc.alloc(new_layout)
        } else {
            // capacity > 0, so this layout was already validated at
            // allocation time
            let Some(old_layout) = layout_for(self.capacity, self.stride, self.align) else {
                return false;
            };
            unsafe {
                self.alloc
                    .grow(NonNull::new_unchecked(self.data), old_layout, new_layout.size())
            }
        };

        match grown {
            Some(p) => {
                self.data = p.as_ptr();
                self.capacity = target;
                true
            }
            None => false,
        }
    }
}

impl<A: RawAlloc> Drop for SlotBuffer<A> {
    fn drop(&mut self) {
        if let Some(ptr) = NonNull::new(self.data) {
            if let Some(layout) = layout_for(self.capacity, self.stride, self.align) {
                unsafe { self.alloc.dealloc(ptr, layout) };
            }
        }
    }
}

fn layout_for(slots: u32, stride: usize, align: usize) -> Option<Layout> {
    let bytes = (slots as usize).checked_mul(stride)?;
    Layout::from_size_align(bytes, align).ok()
}
