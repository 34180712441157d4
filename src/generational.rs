//! ## Generational Slot Allocator
//! The core of the crate: a growable buffer of fixed-size slots handing out
//! [`Handle`]s that detect their own staleness.
//!
//! Each slot begins with a 4 byte header holding the slot's own handle while
//! occupied (validation is one word compare) or the free-list link while
//! free. The element body follows the header, padded to the element's
//! alignment. Freeing a slot bumps its generation, so every handle minted
//! before the free stops resolving, even after the slot is reused.
//!
//! Growth moves the buffer, so pointers out of [`GenerationalIdAllocator::lookup`]
//! are short-lived; handles encode indices and stay valid for the life of the
//! slot's generation.

use crate::{
    alloc::{Global, RawAlloc},
    buffer::{align_up, SlotBuffer},
    handle::{Handle, MAX_SLOTS},
};
use assume::assume;
use std::ptr::NonNull;

const HEADER_SIZE: usize = std::mem::size_of::<u32>();

/// A free-list slot allocator with stale-handle detection.
///
/// Not internally thread-safe: wrap in external locking for shared use.
/// Stores raw bytes; element destructors are never run.
pub struct GenerationalIdAllocator<A: RawAlloc = Global> {
    buf: SlotBuffer<A>,
    /// Offset of the element body within a slot.
    body_offset: usize,
    /// 1-based index of the first free slot, 0 = none.
    free_head: u32,
    /// Currently occupied slots.
    occupied: u32,
}

impl GenerationalIdAllocator<Global> {
    /// An allocator of `element_size`-byte elements at `element_align`
    /// (a power of two; the slot alignment is clamped up to the 4 byte
    /// header width).
    ///
    /// `initial_capacity` of 0 allocates lazily on the first
    /// [`GenerationalIdAllocator::create`]. A failed initial allocation
    /// leaves the allocator at zero capacity; it will retry on first create.
    pub fn new(initial_capacity: u32, element_size: usize, element_align: usize) -> Self {
        Self::with_alloc(initial_capacity, element_size, element_align, Global)
    }
}

impl<A: RawAlloc> GenerationalIdAllocator<A> {
    /// [`GenerationalIdAllocator::new`] with an explicit memory collaborator.
    pub fn with_alloc(
        initial_capacity: u32,
        element_size: usize,
        element_align: usize,
        alloc: A,
    ) -> Self {
        debug_assert!(element_align.is_power_of_two());
        let align = element_align.max(HEADER_SIZE);
        let body_offset = align_up(HEADER_SIZE, element_align.max(1));
        let stride = align_up(body_offset + element_size, align);
        GenerationalIdAllocator {
            buf: SlotBuffer::new(initial_capacity, stride, align, MAX_SLOTS, alloc),
            body_offset,
            free_head: 0,
            occupied: 0,
        }
    }

    /// The stored header of slot `index`.
    ///  - Only meaningful for `index < self.buf.len()`.
    #[inline(always)]
    fn header(&self, index: u32) -> Handle {
        unsafe { Handle::from_bits(self.buf.slot_ptr(index).cast::<u32>().read()) }
    }

    #[inline(always)]
    fn set_header(&mut self, index: u32, header: Handle) {
        unsafe { self.buf.slot_ptr(index).cast::<u32>().write(header.bits()) }
    }

    /// # Safety
    /// `index < self.buf.capacity()`.
    #[inline(always)]
    unsafe fn body_ptr(&self, index: u32) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.buf.slot_ptr(index).add(self.body_offset)) }
    }

    /// Allocates a slot and returns its handle.
    ///
    /// Reuses the most recently freed slot when one is available (no new
    /// storage); otherwise appends, growing the buffer by ~1.5x when full.
    /// `None` on out-of-memory or an exhausted index space
    /// ([`MAX_SLOTS`]); either way the allocator is unchanged and
    /// outstanding handles are unaffected.
    ///
    /// The element body starts uninitialised (for a recycled slot: whatever
    /// the previous occupant left behind past the free-list link).
    pub fn create(&mut self) -> Option<Handle> {
        self.create_raw().map(|(handle, _)| handle)
    }

    /// [`GenerationalIdAllocator::create`], also returning the body pointer
    /// so callers can initialise the slot without a second header compare.
    pub(crate) fn create_raw(&mut self) -> Option<(Handle, NonNull<u8>)> {
        if self.free_head != 0 {
            let index = self.free_head - 1;
            let stored = self.header(index);
            assume!(unsafe: !stored.occupied(), "free-list entries are free slots");
            self.free_head = stored.link();
            // destroy already advanced the generation; adopt it
            let handle = Handle::pack(stored.generation(), index);
            self.set_header(index, handle);
            self.occupied += 1;
            return Some((handle, unsafe { self.body_ptr(index) }));
        }
        if self.buf.len() == self.buf.capacity() && !self.buf.grow() {
            return None;
        }
        let index = self.buf.len();
        self.buf.bump_len();
        let handle = Handle::pack(0, index);
        self.set_header(index, handle);
        self.occupied += 1;
        Some((handle, unsafe { self.body_ptr(index) }))
    }

    /// Frees the slot behind `handle` and advances its generation, so every
    /// copy of `handle` stops resolving.
    ///
    /// A silent no-op unless `handle` currently resolves: stale handles,
    /// double frees, and handles from other allocators are all safely
    /// ignored. Never shrinks the buffer or moves other elements.
    pub fn destroy(&mut self, handle: Handle) {
        let index = handle.index();
        if !handle.occupied() || index >= self.buf.len() || self.header(index) != handle {
            return;
        }
        let next_generation = handle.generation().wrapping_add(1);
        self.set_header(index, Handle::pack_free(next_generation, self.free_head));
        self.free_head = index + 1;
        self.occupied -= 1;
    }

    /// Pointer to the element body behind `handle`, or `None` if the handle
    /// is stale, freed, or from another allocator.
    ///
    /// The pointer is short-lived: any later
    /// [`GenerationalIdAllocator::create`] may grow the buffer and move every
    /// element. Only handles are stable storage.
    pub fn lookup(&self, handle: Handle) -> Option<NonNull<u8>> {
        let index = handle.index();
        if !handle.occupied() || index >= self.buf.len() || self.header(index) != handle {
            return None;
        }
        Some(unsafe { self.body_ptr(index) })
    }

    /// True iff the allocator has backing storage and consistent bookkeeping.
    /// False for a freshly constructed zero-capacity allocator.
    pub fn is_valid(&self) -> bool {
        self.buf.is_allocated() && self.buf.len() <= self.buf.capacity()
    }

    /// Currently occupied slots.
    pub fn count(&self) -> u32 {
        self.occupied
    }

    /// Slots the current allocation can hold.
    pub fn capacity(&self) -> u32 {
        self.buf.capacity()
    }

    /// Iterates the occupied slots in ascending index order, yielding each
    /// slot's handle and body pointer.
    ///
    /// The iterator borrows the allocator, so a growth-triggering `create`
    /// cannot invalidate it; `destroy` through separate access never moves
    /// memory, preserving positions of the remaining slots.
    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            alloc: self,
            index: 0,
        }
    }
}

/// Forward iterator over occupied slots, from [`GenerationalIdAllocator::iter`].
pub struct Iter<'a, A: RawAlloc = Global> {
    alloc: &'a GenerationalIdAllocator<A>,
    index: u32,
}

impl<'a, A: RawAlloc> Iterator for Iter<'a, A> {
    type Item = (Handle, NonNull<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.alloc.buf.len() {
            let index = self.index;
            self.index += 1;
            let header = self.alloc.header(index);
            if header.occupied() {
                return Some((header, unsafe { self.alloc.body_ptr(index) }));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::testing::FailAfter;
    use rustc_hash::FxHashSet;

    fn write_u64<A: RawAlloc>(alloc: &GenerationalIdAllocator<A>, handle: Handle, val: u64) {
        unsafe { alloc.lookup(handle).unwrap().cast::<u64>().as_ptr().write(val) }
    }

    fn read_u64<A: RawAlloc>(alloc: &GenerationalIdAllocator<A>, handle: Handle) -> u64 {
        unsafe { alloc.lookup(handle).unwrap().cast::<u64>().as_ptr().read() }
    }

    #[test]
    fn growth_keeps_handles_and_data() {
        let mut alloc = GenerationalIdAllocator::new(2, 8, 8);
        assert_eq!(alloc.capacity(), 2);
        let h1 = alloc.create().unwrap();
        let h2 = alloc.create().unwrap();
        write_u64(&alloc, h1, 0xAAAA);
        write_u64(&alloc, h2, 0xBBBB);

        // third create exceeds capacity 2: buffer grows, addresses move
        let h3 = alloc.create().unwrap();
        assert!(alloc.capacity() >= 3);
        write_u64(&alloc, h3, 0xCCCC);

        assert_eq!(read_u64(&alloc, h1), 0xAAAA);
        assert_eq!(read_u64(&alloc, h2), 0xBBBB);
        assert_eq!(read_u64(&alloc, h3), 0xCCCC);

        let ptrs: FxHashSet<_> = [h1, h2, h3]
            .iter()
            .map(|h| alloc.lookup(*h).unwrap().as_ptr() as usize)
            .collect();
        assert_eq!(ptrs.len(), 3, "handles address distinct storage");
    }

    #[test]
    fn stale_handle_rejected() {
        let mut alloc = GenerationalIdAllocator::new(4, 8, 8);
        let h1 = alloc.create().unwrap();
        let h2 = alloc.create().unwrap();
        let h3 = alloc.create().unwrap();
        write_u64(&alloc, h1, 1);
        write_u64(&alloc, h3, 3);

        alloc.destroy(h2);
        assert!(alloc.lookup(h2).is_none());

        // double destroy is a no-op: neighbours unharmed, count unchanged
        let count = alloc.count();
        alloc.destroy(h2);
        assert_eq!(alloc.count(), count);
        assert_eq!(read_u64(&alloc, h1), 1);
        assert_eq!(read_u64(&alloc, h3), 3);
    }

    #[test]
    fn reuse_same_index_fresh_generation() {
        let mut alloc = GenerationalIdAllocator::new(4, 8, 8);
        let old = alloc.create().unwrap();
        alloc.destroy(old);

        let new = alloc.create().unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_ne!(new, old);

        assert!(alloc.lookup(old).is_none());
        assert!(alloc.lookup(new).is_some());
    }

    #[test]
    fn free_list_reuse_does_not_grow() {
        let mut alloc = GenerationalIdAllocator::new(2, 8, 8);
        let h1 = alloc.create().unwrap();
        let _h2 = alloc.create().unwrap();
        let cap = alloc.capacity();
        alloc.destroy(h1);
        let _h3 = alloc.create().unwrap();
        assert_eq!(alloc.capacity(), cap);
    }

    #[test]
    fn iteration_visits_occupied_ascending() {
        let mut alloc = GenerationalIdAllocator::new(8, 8, 8);
        let handles: Vec<_> = (0..5).map(|_| alloc.create().unwrap()).collect();
        alloc.destroy(handles[1]);
        alloc.destroy(handles[3]);

        let visited: Vec<Handle> = alloc.iter().map(|(h, _)| h).collect();
        assert_eq!(visited, vec![handles[0], handles[2], handles[4]]);

        let indices: Vec<u32> = visited.iter().map(|h| h.index()).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted);
    }

    #[test]
    fn iteration_yields_body_pointers() {
        let mut alloc = GenerationalIdAllocator::new(4, 8, 8);
        let h1 = alloc.create().unwrap();
        let h2 = alloc.create().unwrap();
        write_u64(&alloc, h1, 10);
        write_u64(&alloc, h2, 20);

        let total: u64 = alloc
            .iter()
            .map(|(_, p)| unsafe { p.cast::<u64>().as_ptr().read() })
            .sum();
        assert_eq!(total, 30);
    }

    #[test]
    fn foreign_and_null_handles_are_noops() {
        let mut a = GenerationalIdAllocator::new(4, 8, 8);
        let mut b = GenerationalIdAllocator::new(4, 8, 8);

        // same index, different generation history: a's handle is foreign to b
        let first = a.create().unwrap();
        a.destroy(first);
        let foreign = a.create().unwrap();
        let local = b.create().unwrap();
        write_u64(&b, local, 42);

        assert!(b.lookup(foreign).is_none());
        b.destroy(foreign);
        b.destroy(Handle::from_bits(0));
        assert_eq!(read_u64(&b, local), 42);
        assert_eq!(b.count(), 1);

        let next = b.create().unwrap();
        assert!(b.lookup(next).is_some());
    }

    #[test]
    fn capacity_never_decreases() {
        let mut alloc = GenerationalIdAllocator::new(0, 16, 8);
        let mut max_cap = 0;
        let mut live = Vec::new();
        for round in 0..200 {
            if round % 3 == 2 {
                if let Some(h) = live.pop() {
                    alloc.destroy(h);
                }
            } else {
                live.push(alloc.create().unwrap());
            }
            assert!(alloc.capacity() >= max_cap);
            max_cap = alloc.capacity();
        }
    }

    #[test]
    fn handles_unique_while_live() {
        let mut alloc = GenerationalIdAllocator::new(0, 16, 8);
        let mut live: Vec<Handle> = Vec::new();
        let mut bits: FxHashSet<u32> = FxHashSet::default();
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;

        for _ in 0..10_000 {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            if live.is_empty() || state % 3 != 0 {
                let h = alloc.create().unwrap();
                assert!(bits.insert(h.bits()), "duplicate live handle");
                live.push(h);
            } else {
                let pick = (state % live.len() as u64) as usize;
                let h = live.swap_remove(pick);
                assert!(bits.remove(&h.bits()));
                alloc.destroy(h);
                assert!(alloc.lookup(h).is_none());
            }
        }
        assert_eq!(alloc.count() as usize, live.len());
        for h in &live {
            assert!(alloc.lookup(*h).is_some());
        }
    }

    #[test]
    fn generation_wraps_after_256_cycles() {
        let mut alloc = GenerationalIdAllocator::new(1, 8, 8);
        let first = alloc.create().unwrap();
        let mut h = first;
        for _ in 0..256 {
            alloc.destroy(h);
            h = alloc.create().unwrap();
        }
        // 8 bit counter: one increment per free wraps back around
        assert_eq!(h, first);
    }

    #[test]
    fn zero_capacity_until_first_create() {
        let mut alloc = GenerationalIdAllocator::new(0, 8, 8);
        assert!(!alloc.is_valid());
        let h = alloc.create().unwrap();
        assert!(alloc.is_valid());
        assert!(alloc.lookup(h).is_some());
    }

    #[test]
    fn out_of_memory_reports_none() {
        let mut alloc = GenerationalIdAllocator::with_alloc(0, 8, 8, FailAfter { remaining: 0 });
        assert!(!alloc.is_valid());
        assert!(alloc.create().is_none());
        assert_eq!(alloc.count(), 0);
        assert!(!alloc.is_valid());
    }

    #[test]
    fn failed_growth_keeps_existing_slots() {
        let mut alloc = GenerationalIdAllocator::with_alloc(0, 8, 8, FailAfter { remaining: 1 });
        let handles: Vec<_> = (0..3).map(|_| alloc.create().unwrap()).collect();
        for (i, h) in handles.iter().enumerate() {
            write_u64(&alloc, *h, i as u64);
        }
        // initial allocation used the budget: the next growth fails
        assert_eq!(alloc.capacity(), 3);
        assert!(alloc.create().is_none());
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(read_u64(&alloc, *h), i as u64);
        }
    }

    #[test]
    fn oversized_alignment_is_honoured() {
        let mut alloc = GenerationalIdAllocator::new(2, 32, 32);
        let h1 = alloc.create().unwrap();
        let h2 = alloc.create().unwrap();
        for h in [h1, h2] {
            let p = alloc.lookup(h).unwrap().as_ptr() as usize;
            assert_eq!(p % 32, 0);
        }
    }
}

#[cfg(kani)]
mod kani_verif {
    use super::*;

    /// Destroying any handle other than the live one leaves the live slot
    /// resolvable: arbitrary bit patterns cannot corrupt allocator state.
    #[kani::proof]
    #[kani::unwind(4)]
    fn arbitrary_destroy_is_harmless() {
        let mut alloc = GenerationalIdAllocator::new(2, 8, 8);
        let live = match alloc.create() {
            Some(h) => h,
            None => return,
        };
        let any: Handle = kani::any();
        kani::assume(any != live);

        assert!(alloc.lookup(any).is_none());
        alloc.destroy(any);
        assert!(alloc.lookup(live).is_some());
        assert_eq!(alloc.count(), 1);
    }
}
