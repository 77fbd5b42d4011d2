// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Pools.
//!
//! A pool is one OS mapping of `pool_size` bytes dedicated to a single size class. When it is
//! created, it is sliced into `blocks_per_page` slots, each of which gets a free header and is
//! pushed onto the class free list. If the source grants less than `pool_size`, only the slots
//! that fit are carved. A pool is only ever released as a whole.

use core::cmp;
use core::ptr::NonNull;

use mmap_alloc::{MapError, PageSource};

use crate::free_list::FreeList;
use crate::header::BlockHeader;
use crate::size_class::SizeClass;

pub struct Pool {
    base: NonNull<u8>,
    len: usize,
    blocks: usize,
}

impl Pool {
    /// Maps a new pool for class `index` and pushes all of its slots onto `free`.
    ///
    /// Slots are pushed from the highest address down, so the first pop returns the lowest slot.
    pub fn new<S: PageSource>(
        source: &S,
        index: usize,
        class: &SizeClass,
        free: &mut FreeList,
    ) -> Result<Pool, MapError> {
        debug_assert!(class.blocks_per_page >= 1);
        debug_assert!(class.blocks_per_page * class.slot_size <= class.pool_size);
        let region = source.map_pages(class.pool_size)?;
        let base = region.cast::<u8>();
        let blocks = cmp::min(class.blocks_per_page, region.len() / class.slot_size);
        for i in (0..blocks).rev() {
            unsafe {
                let at = NonNull::new_unchecked(base.as_ptr().add(i * class.slot_size));
                let header = BlockHeader::init(at, class.payload_size, index as u8, true);
                free.push(header);
            }
        }
        Ok(Pool {
            base,
            len: class.pool_size,
            blocks,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The number of slots carved from this pool.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr < start + self.len
    }

    /// Unmaps the pool.
    ///
    /// # Safety
    ///
    /// `source` must be the source that mapped this pool, and nothing may reference any of its
    /// slots afterwards, including free lists.
    pub unsafe fn release<S: PageSource>(self, source: &S) {
        source.unmap_pages(self.base, self.len);
    }
}

/// All pools of one size class, newest last.
pub struct PoolChain {
    pools: Vec<Pool>,
}

impl PoolChain {
    pub const fn new() -> PoolChain {
        PoolChain { pools: Vec::new() }
    }

    pub fn push(&mut self, pool: Pool) {
        self.pools.push(pool);
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn contains(&self, ptr: *const u8) -> bool {
        self.pools.iter().any(|pool| pool.contains(ptr))
    }

    /// Releases every pool in the chain, returning the number of bytes unmapped.
    ///
    /// # Safety
    ///
    /// Same as `Pool::release`, for every pool in the chain.
    pub unsafe fn release_all<S: PageSource>(&mut self, source: &S) -> usize {
        let mut bytes = 0;
        for pool in self.pools.drain(..) {
            bytes += pool.len();
            pool.release(source);
        }
        bytes
    }
}
