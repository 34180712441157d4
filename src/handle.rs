//! # Generational Handles
//! Bit-packed slot handles for [`crate::generational::GenerationalIdAllocator`].
//!
//! A handle is a single `u32`:
//!
//! | bits    | field      |
//! |---------|------------|
//! | `31..24`| generation |
//! | `23`    | occupied   |
//! | `22..0` | slot index |
//!
//! The same packing doubles as the per-slot header: an occupied slot stores
//! its own handle (so validation is a single word compare), a free slot clears
//! the occupied bit and reuses the index field as a 1-based free-list link
//! (`0` = end of list).

const INDEX_BITS: u32 = 23;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const OCCUPIED_BIT: u32 = 1 << INDEX_BITS;
const GENERATION_SHIFT: u32 = 24;

/// The largest number of slots one generational allocator can address.
///
/// One below `2^23`: free-list links are stored 1-based in the 23 bit index
/// field, so index `2^23 - 1` would have no representable link.
pub const MAX_SLOTS: u32 = INDEX_MASK;

/// An opaque, generation-tagged reference to a slot.
///
/// Handles stay valid across buffer growth (they encode an index, not an
/// address) and go stale on [`destroy`](crate::generational::GenerationalIdAllocator::destroy):
/// the slot's generation moves on, so lookups with the old handle fail.
///
/// The generation counter is 8 bits wide and wraps. After 256 reuse cycles of
/// one slot a sufficiently old handle can alias a fresh occupant; accepted as
/// a probabilistic tradeoff.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// The raw packed word. `from_bits(h.bits()) == h`.
    #[inline(always)]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Reconstructs a handle from [`Handle::bits`].
    ///
    /// Any bit pattern is accepted: patterns that do not correspond to a live
    /// slot are rejected by lookup/destroy, never dereferenced.
    #[inline(always)]
    pub fn from_bits(bits: u32) -> Self {
        Handle(bits)
    }

    #[inline(always)]
    pub fn generation(self) -> u8 {
        (self.0 >> GENERATION_SHIFT) as u8
    }

    #[inline(always)]
    pub fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    #[inline(always)]
    pub fn occupied(self) -> bool {
        self.0 & OCCUPIED_BIT != 0
    }

    /// Header word for an occupied slot, which is also the handle handed out
    /// for it.
    #[inline(always)]
    pub(crate) fn pack(generation: u8, index: u32) -> Self {
        debug_assert!(index < MAX_SLOTS);
        Handle(((generation as u32) << GENERATION_SHIFT) | OCCUPIED_BIT | index)
    }

    /// Header word for a free slot: occupied clear, index field holds the
    /// 1-based link to the next free slot (`0` = end of list).
    #[inline(always)]
    pub(crate) fn pack_free(generation: u8, link: u32) -> Self {
        debug_assert!(link <= MAX_SLOTS);
        Handle(((generation as u32) << GENERATION_SHIFT) | link)
    }

    /// The free-list link of a free slot's header.
    #[inline(always)]
    pub(crate) fn link(self) -> u32 {
        debug_assert!(!self.occupied());
        self.0 & INDEX_MASK
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index())
            .field("generation", &self.generation())
            .field("occupied", &self.occupied())
            .finish()
    }
}

#[cfg(kani)]
impl kani::Arbitrary for Handle {
    fn any() -> Self {
        Handle(kani::any())
    }
}

#[cfg(kani)]
mod kani_verif {
    use super::*;

    #[kani::proof]
    fn pack_extracts_fields() {
        let generation: u8 = kani::any();
        let index: u32 = kani::any();
        kani::assume(index < MAX_SLOTS);
        let h = Handle::pack(generation, index);
        assert_eq!(h.generation(), generation);
        assert_eq!(h.index(), index);
        assert!(h.occupied());
    }
}
