//! ## Plain Recyclable-Id Allocator
//! The cheap sibling of [`crate::generational`]: hands out 1-based `u32` ids
//! over fixed-size slots, recycling freed slots through a free list threaded
//! through the slots' own storage.
//!
//! There is no occupancy tracking: a stale or double-freed id is *not*
//! detected, and there is no iteration. Use this where a recyclable index is
//! all that is needed and safety is handled a layer up; prefer
//! [`crate::generational::GenerationalIdAllocator`] for anything exposed as a
//! public resource handle.

use crate::{
    alloc::{Global, RawAlloc},
    buffer::{align_up, SlotBuffer},
};
use assume::assume;
use std::ptr::NonNull;

/// Width of one free-list link, the minimum usable element size.
const LINK_SIZE: usize = std::mem::size_of::<u32>();

/// The next free slot to reuse.
/// Note: cannot be `u32::MAX`
struct NextFree(Option<u32>);
type EncodedNextFree = u32;

impl NextFree {
    #[inline(always)]
    fn encode(&self) -> EncodedNextFree {
        if let Some(index) = self.0 {
            assume!(unsafe: index != EncodedNextFree::MAX, "index is invalid");
            index
        } else {
            EncodedNextFree::MAX
        }
    }

    #[inline(always)]
    fn decode(val: EncodedNextFree) -> Self {
        NextFree(if val == EncodedNextFree::MAX {
            None
        } else {
            Some(val)
        })
    }
}

/// A free-list slot allocator handing out recyclable 1-based ids.
///
/// `0` is never a valid id, so callers can use it as their own "no id"
/// sentinel. Element storage starts at byte 0 of each slot (no header);
/// while a slot is free its first four bytes hold the free-list link instead.
pub struct IdAllocator<A: RawAlloc = Global> {
    buf: SlotBuffer<A>,
    next_free: NextFree,
}

impl IdAllocator<Global> {
    /// An allocator of `element_size`-byte slots at `element_align`
    /// (clamped up to the link width, 4 bytes).
    ///
    /// `initial_capacity` of 0 allocates lazily on the first
    /// [`IdAllocator::create`]. A failed initial allocation leaves the
    /// allocator at zero capacity; it will retry on first create.
    pub fn new(initial_capacity: u32, element_size: usize, element_align: usize) -> Self {
        Self::with_alloc(initial_capacity, element_size, element_align, Global)
    }
}

impl<A: RawAlloc> IdAllocator<A> {
    /// [`IdAllocator::new`] with an explicit memory collaborator.
    pub fn with_alloc(
        initial_capacity: u32,
        element_size: usize,
        element_align: usize,
        alloc: A,
    ) -> Self {
        debug_assert!(element_align.is_power_of_two());
        debug_assert!(
            element_size >= LINK_SIZE,
            "elements must be able to hold a free-list link"
        );
        let align = element_align.max(LINK_SIZE);
        let stride = align_up(element_size.max(LINK_SIZE), align);
        IdAllocator {
            // capacity u32::MAX keeps every index below the link sentinel
            buf: SlotBuffer::new(initial_capacity, stride, align, u32::MAX, alloc),
            next_free: NextFree(None),
        }
    }

    /// Allocates a slot and returns its id, recycling a freed slot when one
    /// is available. `None` on out-of-memory; no partial state change.
    pub fn create(&mut self) -> Option<u32> {
        if let NextFree(Some(index)) = self.next_free {
            let link = unsafe { self.buf.slot_ptr(index).cast::<u32>().read() };
            self.next_free = NextFree::decode(link);
            return Some(index + 1);
        }
        if self.buf.len() == self.buf.capacity() && !self.buf.grow() {
            return None;
        }
        let index = self.buf.len();
        self.buf.bump_len();
        Some(index + 1)
    }

    /// Returns the slot behind `id` to the free list.
    ///
    /// A no-op for `0` and out-of-range ids. Double frees are *not* detected:
    /// freeing the same live id twice corrupts the free list.
    pub fn destroy(&mut self, id: u32) {
        if id == 0 || id > self.buf.len() {
            return;
        }
        let index = id - 1;
        unsafe {
            self.buf
                .slot_ptr(index)
                .cast::<u32>()
                .write(self.next_free.encode());
        }
        self.next_free = NextFree(Some(index));
    }

    /// Pointer to the slot behind `id`, or `None` for `0` and out-of-range
    /// ids.
    ///
    /// The pointer is short-lived: any later [`IdAllocator::create`] may grow
    /// the buffer and move every slot. Only ids are stable.
    pub fn lookup(&self, id: u32) -> Option<NonNull<u8>> {
        if id == 0 || id > self.buf.len() {
            return None;
        }
        unsafe { Some(NonNull::new_unchecked(self.buf.slot_ptr(id - 1))) }
    }

    /// True iff the allocator has backing storage and consistent bookkeeping.
    pub fn is_valid(&self) -> bool {
        self.buf.is_allocated() && self.buf.len() <= self.buf.capacity()
    }

    /// Slots the current allocation can hold.
    pub fn capacity(&self) -> u32 {
        self.buf.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::testing::FailAfter;

    #[test]
    fn ids_are_one_based_and_distinct() {
        let mut alloc = IdAllocator::new(4, 8, 8);
        let a = alloc.create().unwrap();
        let b = alloc.create().unwrap();
        let c = alloc.create().unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn freed_ids_are_recycled_lifo() {
        let mut alloc = IdAllocator::new(4, 8, 8);
        let a = alloc.create().unwrap();
        let b = alloc.create().unwrap();
        alloc.destroy(a);
        alloc.destroy(b);
        // most recently freed comes back first
        assert_eq!(alloc.create().unwrap(), b);
        assert_eq!(alloc.create().unwrap(), a);
    }

    #[test]
    fn lookup_rejects_null_and_out_of_range() {
        let mut alloc = IdAllocator::new(2, 8, 8);
        assert!(alloc.lookup(0).is_none());
        assert!(alloc.lookup(1).is_none());
        let id = alloc.create().unwrap();
        assert!(alloc.lookup(id).is_some());
        assert!(alloc.lookup(id + 1).is_none());
    }

    #[test]
    fn destroy_of_invalid_id_is_noop() {
        let mut alloc = IdAllocator::new(2, 8, 8);
        let id = alloc.create().unwrap();
        alloc.destroy(0);
        alloc.destroy(99);
        unsafe { alloc.lookup(id).unwrap().cast::<u64>().write(7) };
        assert_eq!(unsafe { alloc.lookup(id).unwrap().cast::<u64>().read() }, 7);
    }

    #[test]
    fn elements_survive_growth() {
        let mut alloc = IdAllocator::new(2, 8, 8);
        let a = alloc.create().unwrap();
        let b = alloc.create().unwrap();
        unsafe {
            alloc.lookup(a).unwrap().cast::<u64>().write(111);
            alloc.lookup(b).unwrap().cast::<u64>().write(222);
        }
        // capacity 2 exhausted: this create grows the buffer
        let c = alloc.create().unwrap();
        assert!(alloc.capacity() > 2);
        unsafe {
            assert_eq!(alloc.lookup(a).unwrap().cast::<u64>().read(), 111);
            assert_eq!(alloc.lookup(b).unwrap().cast::<u64>().read(), 222);
            alloc.lookup(c).unwrap().cast::<u64>().write(333);
        }
    }

    #[test]
    fn out_of_memory_reports_none() {
        let mut alloc = IdAllocator::with_alloc(0, 8, 8, FailAfter { remaining: 0 });
        assert!(!alloc.is_valid());
        assert!(alloc.create().is_none());
        assert!(!alloc.is_valid());
    }

    #[test]
    fn small_elements_are_padded_to_link_width() {
        let mut alloc = IdAllocator::new(1, 4, 4);
        let a = alloc.create().unwrap();
        alloc.destroy(a);
        assert_eq!(alloc.create().unwrap(), a);
    }
}
