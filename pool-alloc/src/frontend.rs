// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};

use crate::arena::with_local_arena;
use crate::error::AllocError;
use crate::size_class::ALIGNMENT;

/// A typed handle to the thread-local arena.
///
/// `PoolAlloc<T>` hands out uninitialized storage for arrays of `T`, counted in elements. It is a
/// zero-sized value; all state lives in the arena of the current thread (see
/// `with_local_arena`), which is why any two `PoolAlloc`s compare equal regardless of their
/// element types, and why the handle is neither `Send` nor `Sync`.
pub struct PoolAlloc<T> {
    _marker: PhantomData<*const T>,
}

impl<T> PoolAlloc<T> {
    pub const fn new() -> PoolAlloc<T> {
        PoolAlloc {
            _marker: PhantomData,
        }
    }

    /// Allocates uninitialized storage for `n` values of `T`.
    ///
    /// `n == 0` returns a null pointer without touching the arena. A zero-sized `T` gets a
    /// dangling, well-aligned pointer.
    pub fn allocate(&self, n: usize) -> Result<*mut T, AllocError> {
        if n == 0 {
            return Ok(ptr::null_mut());
        }
        let size = mem::size_of::<T>();
        if size == 0 {
            return Ok(NonNull::dangling().as_ptr());
        }
        let align = mem::align_of::<T>();
        if align > ALIGNMENT {
            return Err(AllocError::UnsupportedAlignment { align });
        }
        let bytes = n.checked_mul(size).ok_or(AllocError::CapacityOverflow)?;
        let ptr = with_local_arena(|arena| arena.alloc_bytes(bytes))??;
        Ok(ptr.as_ptr().cast())
    }

    /// Returns storage obtained from `allocate(n)`.
    ///
    /// Null pointers and pointers this allocator does not recognize are ignored.
    ///
    /// # Safety
    ///
    /// `p` must be null, or come from `allocate(n)` on this thread, or be an aligned pointer
    /// whose preceding header-sized bytes are readable. The storage must not be used afterwards.
    pub unsafe fn deallocate(&self, p: *mut T, n: usize) {
        if p.is_null() || mem::size_of::<T>() == 0 {
            return;
        }
        // During thread teardown the arena and its pools are already gone.
        let _ = with_local_arena(|arena| {
            if cfg!(debug_assertions) {
                if let Some(usable) = arena.usable_size(p as *const u8) {
                    debug_assert!(
                        usable / mem::size_of::<T>() >= n,
                        "deallocate: {} elements do not fit in a block of {} bytes",
                        n,
                        usable
                    );
                }
            }
            arena.dealloc_bytes(p.cast())
        });
    }

    /// The largest element count that could ever be requested.
    pub fn max_size(&self) -> usize {
        match mem::size_of::<T>() {
            0 => usize::MAX,
            size => usize::MAX / size,
        }
    }

    /// Moves `value` into uninitialized storage at `p`.
    ///
    /// # Safety
    ///
    /// `p` must be valid for writes and properly aligned.
    pub unsafe fn construct<U>(&self, p: *mut U, value: U) {
        ptr::write(p, value);
    }

    /// Drops the value at `p` in place, leaving the storage uninitialized.
    ///
    /// # Safety
    ///
    /// `p` must point to an initialized value that is not used afterwards.
    pub unsafe fn destroy<U>(&self, p: *mut U) {
        ptr::drop_in_place(p);
    }

    /// Returns the equivalent allocator for another element type.
    pub fn rebind<U>(&self) -> PoolAlloc<U> {
        PoolAlloc::new()
    }
}

impl<T> Clone for PoolAlloc<T> {
    fn clone(&self) -> PoolAlloc<T> {
        *self
    }
}

impl<T> Copy for PoolAlloc<T> {}

impl<T> Default for PoolAlloc<T> {
    fn default() -> PoolAlloc<T> {
        PoolAlloc::new()
    }
}

impl<T> fmt::Debug for PoolAlloc<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PoolAlloc<{}>", core::any::type_name::<T>())
    }
}

impl<T, U> PartialEq<PoolAlloc<U>> for PoolAlloc<T> {
    fn eq(&self, _other: &PoolAlloc<U>) -> bool {
        true
    }
}

impl<T> Eq for PoolAlloc<T> {}
