//! ## Typed Wrapper over the Generational Core
//! [`TypedIdAllocator`] pairs [`crate::generational::GenerationalIdAllocator`]
//! with an element type, exchanging raw body pointers for references.
//!
//! The `Copy` bound encodes the storage contract in the type system: the
//! core stores raw bytes and never runs destructors, so elements must be
//! plain data.

use crate::{
    alloc::{Global, RawAlloc},
    generational::GenerationalIdAllocator,
    handle::Handle,
};
use std::marker::PhantomData;

/// A generational slot allocator for `T` values.
pub struct TypedIdAllocator<T: Copy, A: RawAlloc = Global> {
    raw: GenerationalIdAllocator<A>,
    _phantom: PhantomData<T>,
}

impl<T: Copy> TypedIdAllocator<T, Global> {
    /// An allocator with room for `initial_capacity` values (0 = allocate
    /// lazily on first [`TypedIdAllocator::create`]).
    pub fn new(initial_capacity: u32) -> Self {
        Self::with_alloc(initial_capacity, Global)
    }
}

impl<T: Copy, A: RawAlloc> TypedIdAllocator<T, A> {
    pub fn with_alloc(initial_capacity: u32, alloc: A) -> Self {
        TypedIdAllocator {
            raw: GenerationalIdAllocator::with_alloc(
                initial_capacity,
                std::mem::size_of::<T>(),
                std::mem::align_of::<T>(),
                alloc,
            ),
            _phantom: PhantomData,
        }
    }

    /// Stores `value` in a fresh slot and returns its handle, or `None` on
    /// out-of-memory.
    pub fn create(&mut self, value: T) -> Option<Handle> {
        let (handle, body) = self.raw.create_raw()?;
        // JUSTIFY: Writing before any reference is produced.
        //           - The slot body is uninitialised (or holds a previous
        //             occupant's bytes) until this write.
        //           - `get`/`iter` only reach slots that `create` has
        //             initialised, as lookup requires an occupied header.
        unsafe { body.as_ptr().cast::<T>().write(value) };
        Some(handle)
    }

    /// The value behind `handle`, or `None` if the handle is stale, freed,
    /// or from another allocator.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.raw
            .lookup(handle)
            .map(|p| unsafe { &*p.as_ptr().cast::<T>() })
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.raw
            .lookup(handle)
            .map(|p| unsafe { &mut *p.as_ptr().cast::<T>() })
    }

    /// Frees the slot behind `handle`; a silent no-op for handles that no
    /// longer resolve.
    pub fn destroy(&mut self, handle: Handle) {
        self.raw.destroy(handle);
    }

    /// Currently stored values.
    pub fn count(&self) -> u32 {
        self.raw.count()
    }

    pub fn capacity(&self) -> u32 {
        self.raw.capacity()
    }

    pub fn is_valid(&self) -> bool {
        self.raw.is_valid()
    }

    /// Iterates stored values in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.raw
            .iter()
            .map(|(handle, p)| (handle, unsafe { &*p.as_ptr().cast::<T>() }))
    }
}
