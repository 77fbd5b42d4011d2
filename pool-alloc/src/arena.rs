// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The allocator state.
//!
//! An `Arena` owns one free list and one pool chain per size class, and the `PageSource` that
//! backs them. Requests below the large threshold pop a block from their class free list,
//! creating a pool for the class first if the list is empty. Requests at or above the threshold
//! get their own mapping, tagged with `LARGE_CLASS` and the mmap flag, which is unmapped again on
//! deallocation.
//!
//! Arenas are single-threaded. Each thread has a local arena that every `PoolAlloc` on the thread
//! shares; it is reached only through `with_local_arena`.

use core::cell::RefCell;
use core::ptr::NonNull;

use mmap_alloc::{MapAlloc, PageSource};

use crate::error::AllocError;
use crate::free_list::FreeList;
use crate::header::{BlockHeader, HEADER_SIZE, LARGE_CLASS, MAX_BLOCK_SIZE};
use crate::pool::{Pool, PoolChain};
use crate::size_class::{SizeClass, SizeClassTable, DEFAULT_LARGE_THRESHOLD, NUM_CLASSES};

/// A builder for `Arena`.
#[derive(Debug, Clone)]
pub struct ArenaBuilder {
    large_threshold: usize,
}

impl Default for ArenaBuilder {
    fn default() -> ArenaBuilder {
        ArenaBuilder {
            large_threshold: DEFAULT_LARGE_THRESHOLD,
        }
    }
}

impl ArenaBuilder {
    /// Sets the request size, in bytes, at which allocations bypass the pools and are mapped
    /// directly. The default is 1 MiB.
    ///
    /// The value is clamped to between 1 and the largest size-class payload, so that every request
    /// below it has a class.
    pub fn large_threshold(mut self, bytes: usize) -> ArenaBuilder {
        self.large_threshold = bytes;
        self
    }

    /// Builds an arena that maps memory from the OS.
    pub fn build(&self) -> Arena<MapAlloc> {
        self.build_with(MapAlloc::default())
    }

    /// Builds an arena that maps memory from `source`.
    pub fn build_with<S: PageSource>(&self, source: S) -> Arena<S> {
        let classes = SizeClassTable::new(source.pagesize(), source.granularity());
        let large_threshold = self.large_threshold.clamp(1, classes.max_payload());
        Arena {
            source,
            classes,
            free_lists: core::array::from_fn(|_| FreeList::new()),
            pools: core::array::from_fn(|_| PoolChain::new()),
            large_threshold,
            stats: ArenaStats::default(),
        }
    }
}

/// Counters describing what an arena has done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Live pools across all classes.
    pub pools: usize,
    /// Bytes mapped by live pools.
    pub pool_bytes: usize,
    /// Live large blocks.
    pub large_blocks: usize,
    /// Bytes mapped by live large blocks.
    pub large_bytes: usize,
    /// Calls made to `map_pages`.
    pub map_calls: usize,
    /// Calls made to `unmap_pages`.
    pub unmap_calls: usize,
    /// Successful allocations.
    pub allocs: usize,
    /// Deallocations that returned a block.
    pub deallocs: usize,
    /// Deallocations of pointers that were not recognized and were ignored.
    pub ignored_deallocs: usize,
}

/// Segregated size-class allocator state.
///
/// Blocks carry their own headers, so `dealloc_bytes` needs nothing but the pointer. Pools are
/// never returned to the OS until the arena is dropped. Large blocks that are still live when the
/// arena is dropped are not tracked and stay mapped.
pub struct Arena<S: PageSource = MapAlloc> {
    source: S,
    classes: SizeClassTable,
    free_lists: [FreeList; NUM_CLASSES],
    pools: [PoolChain; NUM_CLASSES],
    large_threshold: usize,
    stats: ArenaStats,
}

impl Arena<MapAlloc> {
    /// Creates an arena with the default configuration. No memory is mapped until the first
    /// allocation.
    pub fn new() -> Arena<MapAlloc> {
        ArenaBuilder::default().build()
    }
}

impl Default for Arena<MapAlloc> {
    fn default() -> Arena<MapAlloc> {
        Arena::new()
    }
}

impl<S: PageSource> Arena<S> {
    pub fn page_size(&self) -> usize {
        self.classes.page_size()
    }

    pub fn large_threshold(&self) -> usize {
        self.large_threshold
    }

    pub fn size_classes(&self) -> &SizeClassTable {
        &self.classes
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    /// The number of free blocks currently on the list of class `index`.
    pub fn free_blocks(&self, index: usize) -> usize {
        self.free_lists.get(index).map_or(0, FreeList::len)
    }

    /// The number of pools class `index` has created.
    pub fn class_pools(&self, index: usize) -> usize {
        self.pools.get(index).map_or(0, PoolChain::len)
    }

    /// Allocates a block of at least `bytes` bytes, aligned to `ALIGNMENT`.
    ///
    /// `bytes` must be non-zero.
    pub fn alloc_bytes(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(bytes > 0, "alloc_bytes: size must be non-zero");
        let header = if bytes >= self.large_threshold {
            self.alloc_large(bytes)?
        } else {
            self.alloc_small(bytes)?
        };
        self.stats.allocs += 1;
        Ok(unsafe { BlockHeader::payload(header) })
    }

    fn alloc_small(&mut self, bytes: usize) -> Result<NonNull<BlockHeader>, AllocError> {
        let (index, class) = self.classes.classify(bytes);
        debug_assert!(class.payload_size >= bytes);
        let class = *class;
        let header = match unsafe { self.free_lists[index].pop() } {
            Some(header) => header,
            None => {
                self.grow(index, &class)?;
                unsafe { self.free_lists[index].pop() }.ok_or(AllocError::Exhausted { class: index })?
            }
        };
        unsafe {
            let h = &mut *header.as_ptr();
            debug_assert!(h.is_valid() && h.is_free());
            h.set_free(false);
        }
        Ok(header)
    }

    // Leaves the free list empty if the source granted too little for a single slot.
    fn grow(&mut self, index: usize, class: &SizeClass) -> Result<(), AllocError> {
        let pool = Pool::new(&self.source, index, class, &mut self.free_lists[index])?;
        self.stats.map_calls += 1;
        if pool.blocks() == 0 {
            debug_assert!(self.free_lists[index].is_empty());
            debug!(
                "pool for class {} holds no {}-byte slot; releasing it",
                index, class.slot_size
            );
            unsafe { pool.release(&self.source) };
            self.stats.unmap_calls += 1;
            return Ok(());
        }
        let blocks = pool.blocks();
        self.stats.pools += 1;
        self.stats.pool_bytes += pool.len();
        self.pools[index].push(pool);
        trace!(
            "created pool {} for class {} ({} slots of {} bytes)",
            self.pools[index].len(),
            index,
            blocks,
            class.slot_size
        );
        Ok(())
    }

    fn alloc_large(&mut self, bytes: usize) -> Result<NonNull<BlockHeader>, AllocError> {
        if bytes as u64 > MAX_BLOCK_SIZE {
            return Err(AllocError::CapacityOverflow);
        }
        let total = self.large_extent(bytes).ok_or(AllocError::CapacityOverflow)?;
        let region = self.source.map_pages(total)?;
        let base = region.cast::<u8>();
        self.stats.map_calls += 1;
        if region.len() < total {
            unsafe { self.source.unmap_pages(base, total) };
            self.stats.unmap_calls += 1;
            return Err(AllocError::ShortMapping {
                requested: total,
                granted: region.len(),
            });
        }
        self.stats.large_blocks += 1;
        self.stats.large_bytes += total;
        trace!("mapped large block of {} bytes at {:?}", total, base);
        let header = unsafe {
            let header = BlockHeader::init(base, bytes, LARGE_CLASS, false);
            (*header.as_ptr()).set_mmap(true);
            header
        };
        Ok(header)
    }

    // The mapped size of a large block holding `bytes`; computed identically on both paths.
    fn large_extent(&self, bytes: usize) -> Option<usize> {
        bytes
            .checked_add(HEADER_SIZE)
            .and_then(|n| sysconf::round_up(n, self.classes.page_size()))
    }

    /// Returns a block to the arena.
    ///
    /// Null pointers and pointers that do not carry a valid header are ignored, as are pool blocks
    /// that live in another arena's pools. A pointer that this arena already freed is ignored
    /// too, as long as its block has not been handed out again since. Large blocks are unmapped
    /// whichever arena mapped them.
    ///
    /// # Safety
    ///
    /// If `ptr` is non-null and aligned, the `HEADER_SIZE` bytes before it must be readable. A
    /// pointer from this arena must not be used after it is freed.
    pub unsafe fn dealloc_bytes(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let header = match BlockHeader::from_payload(ptr) {
            Some(header) => header,
            None => return self.ignore(ptr, "no block header"),
        };
        let h = &mut *header.as_ptr();
        if h.is_mmap() {
            if h.size_class() != LARGE_CLASS {
                return self.ignore(ptr, "mmap flag on a pooled block");
            }
            let total = match self.large_extent(h.size()) {
                Some(total) => total,
                None => return self.ignore(ptr, "large block size overflows"),
            };
            h.invalidate();
            self.source.unmap_pages(header.cast(), total);
            self.stats.unmap_calls += 1;
            // large blocks from another arena are unmapped all the same
            self.stats.large_blocks = self.stats.large_blocks.saturating_sub(1);
            self.stats.large_bytes = self.stats.large_bytes.saturating_sub(total);
            trace!("unmapped large block of {} bytes at {:?}", total, header);
        } else {
            let index = h.size_class() as usize;
            if index >= NUM_CLASSES {
                return self.ignore(ptr, "size class out of range");
            }
            if h.is_free() {
                return self.ignore(ptr, "block already free");
            }
            if !self.pools[index].contains(ptr) {
                return self.ignore(ptr, "block belongs to another arena");
            }
            h.set_free(true);
            self.free_lists[index].push(header);
        }
        self.stats.deallocs += 1;
    }

    fn ignore(&mut self, ptr: *mut u8, why: &str) {
        self.stats.ignored_deallocs += 1;
        trace!("ignoring deallocation of {:?}: {}", ptr, why);
    }

    /// Returns the number of bytes usable at `ptr`, or `None` if `ptr` is not a live block.
    ///
    /// # Safety
    ///
    /// Same as `dealloc_bytes`.
    pub unsafe fn usable_size(&self, ptr: *const u8) -> Option<usize> {
        let header = BlockHeader::from_payload(ptr)?;
        let h = &*header.as_ptr();
        if h.is_free() {
            None
        } else if h.is_mmap() {
            self.large_extent(h.size()).map(|total| total - HEADER_SIZE)
        } else {
            self.classes.get(h.size_class() as usize).map(|c| c.payload_size)
        }
    }
}

impl<S: PageSource> Drop for Arena<S> {
    fn drop(&mut self) {
        for (free, pools) in self.free_lists.iter_mut().zip(self.pools.iter_mut()) {
            free.clear();
            let n = pools.len();
            let bytes = unsafe { pools.release_all(&self.source) };
            self.stats.unmap_calls += n;
            self.stats.pools -= n;
            self.stats.pool_bytes -= bytes;
        }
        debug!(
            "arena dropped: {} map calls, {} unmap calls, {} large blocks still live",
            self.stats.map_calls, self.stats.unmap_calls, self.stats.large_blocks
        );
    }
}

thread_local! {
    static LOCAL_ARENA: RefCell<Arena> = RefCell::new(Arena::new());
}

/// Runs `f` with this thread's arena.
///
/// Every `PoolAlloc` on a thread allocates from this one arena, so memory freed through any of
/// them can be reused by all of them. The arena is created lazily and dropped, releasing all of
/// its pools, when the thread exits.
///
/// Returns `AllocError::ArenaUnavailable` while the thread is being torn down, or if `f` calls
/// back into `with_local_arena`.
pub fn with_local_arena<R, F>(f: F) -> Result<R, AllocError>
where
    F: FnOnce(&mut Arena) -> R,
{
    LOCAL_ARENA
        .try_with(|arena| match arena.try_borrow_mut() {
            Ok(mut arena) => Ok(f(&mut arena)),
            Err(_) => Err(AllocError::ArenaUnavailable),
        })
        .unwrap_or(Err(AllocError::ArenaUnavailable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size_class::{size_class_for, ALIGNMENT};
    use mmap_alloc::MapError;
    use std::cell::Cell;

    // Forwards to the OS and remembers every call. `granularity` overrides the reported
    // granularity, and `short` caps the length reported for every region.
    #[derive(Default)]
    struct CountingSource {
        inner: MapAlloc,
        maps: Cell<usize>,
        map_sizes: RefCell<Vec<usize>>,
        unmaps: RefCell<Vec<(usize, usize)>>,
        fail: Cell<bool>,
        granularity: Option<usize>,
        short: Option<usize>,
    }

    unsafe impl PageSource for CountingSource {
        fn pagesize(&self) -> usize {
            self.inner.pagesize()
        }

        fn granularity(&self) -> usize {
            self.granularity.unwrap_or_else(|| self.inner.pagesize())
        }

        fn map_pages(&self, size: usize) -> Result<NonNull<[u8]>, MapError> {
            if self.fail.get() {
                return Err(MapError::Os { size, code: 12 });
            }
            self.maps.set(self.maps.get() + 1);
            self.map_sizes.borrow_mut().push(size);
            let region = self.inner.map_pages(size)?;
            let len = self.short.map_or(region.len(), |short| short.min(region.len()));
            Ok(NonNull::slice_from_raw_parts(region.cast(), len))
        }

        unsafe fn unmap_pages(&self, ptr: NonNull<u8>, size: usize) {
            self.unmaps.borrow_mut().push((ptr.as_ptr() as usize, size));
            self.inner.unmap_pages(ptr, size)
        }
    }

    #[test]
    fn test_lazy_pools() {
        let _ = env_logger::try_init();
        let source = CountingSource::default();
        {
            let mut arena = ArenaBuilder::default().build_with(&source);
            assert_eq!(source.maps.get(), 0);
            let p = arena.alloc_bytes(24).unwrap();
            assert_eq!(source.maps.get(), 1);
            let index = size_class_for(24);
            assert_eq!(arena.class_pools(index), 1);
            let per_pool = arena.size_classes().get(index).unwrap().blocks_per_page;
            assert_eq!(arena.free_blocks(index), per_pool - 1);

            // the rest of the pool is served without another mapping
            let mut ptrs = vec![p];
            for _ in 1..per_pool {
                ptrs.push(arena.alloc_bytes(24).unwrap());
            }
            assert_eq!(source.maps.get(), 1);
            assert_eq!(arena.free_blocks(index), 0);
            ptrs.push(arena.alloc_bytes(24).unwrap());
            assert_eq!(source.maps.get(), 2);
            assert_eq!(arena.class_pools(index), 2);

            for p in ptrs {
                unsafe { arena.dealloc_bytes(p.as_ptr()) };
            }
            assert_eq!(arena.free_blocks(index), 2 * per_pool);
            assert_eq!(arena.stats().pools, 2);
        }
        // dropping the arena releases both pools
        assert_eq!(source.unmaps.borrow().len(), 2);
    }

    #[test]
    fn test_lifo_reuse() {
        let mut arena = Arena::new();
        let a = arena.alloc_bytes(100).unwrap();
        let b = arena.alloc_bytes(100).unwrap();
        unsafe {
            arena.dealloc_bytes(a.as_ptr());
            arena.dealloc_bytes(b.as_ptr());
        }
        assert_eq!(arena.alloc_bytes(100).unwrap(), b);
        assert_eq!(arena.alloc_bytes(120).unwrap(), a);
    }

    #[test]
    fn test_large_path() {
        let _ = env_logger::try_init();
        let source = CountingSource::default();
        let mut arena = ArenaBuilder::default().build_with(&source);
        let page = arena.page_size();
        let bytes = (1 << 20) + 1024;
        let expected = sysconf::round_up(bytes + HEADER_SIZE, page).unwrap();
        for _ in 0..3 {
            let p = arena.alloc_bytes(bytes).unwrap();
            assert_eq!(p.as_ptr() as usize % ALIGNMENT, 0);
            unsafe {
                let header = BlockHeader::from_payload(p.as_ptr()).unwrap();
                let h = &*header.as_ptr();
                assert!(h.is_mmap());
                assert!(!h.is_free());
                assert_eq!(h.size_class(), LARGE_CLASS);
                assert_eq!(h.size(), bytes);
                assert_eq!(arena.usable_size(p.as_ptr()), Some(expected - HEADER_SIZE));
                std::ptr::write_bytes(p.as_ptr(), 0xab, bytes);
                arena.dealloc_bytes(p.as_ptr());
                let (addr, size) = *source.unmaps.borrow().last().unwrap();
                assert_eq!(addr, header.as_ptr() as usize);
                assert_eq!(size, expected);
            }
        }
        let stats = arena.stats();
        assert_eq!(stats.large_blocks, 0);
        assert_eq!(stats.large_bytes, 0);
        assert_eq!(stats.map_calls, 3);
        assert_eq!(stats.unmap_calls, 3);
        assert_eq!(arena.class_pools(size_class_for(bytes)), 0);
    }

    #[test]
    fn test_threshold_boundary() {
        let source = CountingSource::default();
        let mut arena = ArenaBuilder::default().large_threshold(4096).build_with(&source);
        let below = arena.alloc_bytes(4095).unwrap();
        let at = arena.alloc_bytes(4096).unwrap();
        unsafe {
            let below_h = BlockHeader::from_payload(below.as_ptr()).unwrap();
            let at_h = BlockHeader::from_payload(at.as_ptr()).unwrap();
            assert!(!(*below_h.as_ptr()).is_mmap());
            assert!((*at_h.as_ptr()).is_mmap());
            arena.dealloc_bytes(below.as_ptr());
            arena.dealloc_bytes(at.as_ptr());
        }
        assert_eq!(arena.stats().large_blocks, 0);
    }

    #[test]
    fn test_threshold_clamped() {
        let arena = ArenaBuilder::default().large_threshold(0).build();
        assert_eq!(arena.large_threshold(), 1);
        let arena = ArenaBuilder::default().large_threshold(usize::MAX).build();
        assert_eq!(arena.large_threshold(), arena.size_classes().max_payload());
        assert_eq!(Arena::new().large_threshold(), DEFAULT_LARGE_THRESHOLD);
    }

    #[test]
    fn test_map_failure_is_reported() {
        let source = CountingSource::default();
        source.fail.set(true);
        let mut arena = ArenaBuilder::default().build_with(&source);
        let size = source.pagesize();
        assert_eq!(
            arena.alloc_bytes(32),
            Err(AllocError::Map(MapError::Os { size, code: 12 }))
        );
        assert!(matches!(arena.alloc_bytes(2 << 20), Err(AllocError::Map(_))));
        assert_eq!(arena.stats().pools, 0);

        // recovers once the source does
        source.fail.set(false);
        let p = arena.alloc_bytes(32).unwrap();
        unsafe { arena.dealloc_bytes(p.as_ptr()) };
    }

    #[test]
    fn test_ignored_deallocations() {
        let _ = env_logger::try_init();
        let mut arena = Arena::new();
        let p = arena.alloc_bytes(40).unwrap();
        let index = size_class_for(40);
        let free_before = arena.free_blocks(index);

        #[repr(C, align(16))]
        struct Local([u64; 16]);
        let local = Local([0; 16]);
        unsafe {
            arena.dealloc_bytes(std::ptr::null_mut());
            arena.dealloc_bytes(local.0.as_ptr().add(8) as *mut u8);
            arena.dealloc_bytes(p.as_ptr().add(1));
            arena.dealloc_bytes(p.as_ptr());
            // second free of the same block is recognized by its free flag
            arena.dealloc_bytes(p.as_ptr());
        }
        assert_eq!(arena.free_blocks(index), free_before + 1);
        assert_eq!(arena.stats().ignored_deallocs, 3);
        assert_eq!(arena.stats().deallocs, 1);
        assert_eq!(arena.alloc_bytes(40).unwrap(), p);
    }

    #[test]
    fn test_pools_follow_granularity() {
        let page = MapAlloc::default().pagesize();
        let source = CountingSource {
            granularity: Some(4 * page),
            ..CountingSource::default()
        };
        {
            let mut arena = ArenaBuilder::default().build_with(&source);
            assert_eq!(arena.page_size(), page);
            let index = size_class_for(24);
            let class = *arena.size_classes().get(index).unwrap();
            assert_eq!(class.pool_size, 4 * page);

            let p = arena.alloc_bytes(24).unwrap();
            assert_eq!(*source.map_sizes.borrow(), vec![4 * page]);
            assert_eq!(arena.stats().pool_bytes, 4 * page);
            assert_eq!(arena.free_blocks(index), class.blocks_per_page - 1);
            assert_eq!(class.blocks_per_page, 4 * page / class.slot_size);

            // large blocks are still rounded to pages only
            let bytes = 2 << 20;
            let q = arena.alloc_bytes(bytes).unwrap();
            let expected = sysconf::round_up(bytes + HEADER_SIZE, page).unwrap();
            assert_eq!(source.map_sizes.borrow()[1], expected);
            unsafe {
                arena.dealloc_bytes(q.as_ptr());
                arena.dealloc_bytes(p.as_ptr());
            }
        }
        let unmaps = source.unmaps.borrow();
        assert_eq!(unmaps.len(), 2);
        assert_eq!(unmaps[1].1, 4 * page);
    }

    #[test]
    fn test_short_pool_region_exhausts_class() {
        let _ = env_logger::try_init();
        // too short for even one 64-byte slot
        let source = CountingSource {
            short: Some(16),
            ..CountingSource::default()
        };
        let mut arena = ArenaBuilder::default().build_with(&source);
        let index = size_class_for(24);
        assert_eq!(
            arena.alloc_bytes(24),
            Err(AllocError::Exhausted { class: index })
        );
        // the useless pool was handed back rather than kept
        assert_eq!(source.maps.get(), 1);
        assert_eq!(source.unmaps.borrow().len(), 1);
        assert_eq!(arena.class_pools(index), 0);
        let stats = arena.stats();
        assert_eq!(stats.pools, 0);
        assert_eq!(stats.pool_bytes, 0);
        assert_eq!(stats.allocs, 0);
        assert_eq!(stats.map_calls, stats.unmap_calls);
    }

    #[test]
    fn test_short_large_region_is_rejected() {
        let source = CountingSource {
            short: Some(4096),
            ..CountingSource::default()
        };
        let mut arena = ArenaBuilder::default().build_with(&source);
        let bytes = 2 << 20;
        let total = sysconf::round_up(bytes + HEADER_SIZE, arena.page_size()).unwrap();
        assert_eq!(
            arena.alloc_bytes(bytes),
            Err(AllocError::ShortMapping {
                requested: total,
                granted: 4096,
            })
        );
        // the mapping was returned whole
        let unmaps = source.unmaps.borrow();
        assert_eq!(unmaps.len(), 1);
        assert_eq!(unmaps[0].1, total);
        let stats = arena.stats();
        assert_eq!(stats.large_blocks, 0);
        assert_eq!(stats.large_bytes, 0);
    }

    #[test]
    fn test_foreign_pool_block_is_ignored() {
        let _ = env_logger::try_init();
        let mut a = Arena::new();
        let mut b = Arena::new();
        let index = size_class_for(40);
        let p = a.alloc_bytes(40).unwrap();

        // an arena with no pools for the class at all
        unsafe { b.dealloc_bytes(p.as_ptr()) };
        assert_eq!(b.free_blocks(index), 0);

        // and one whose pools for the class are elsewhere
        let kept = b.alloc_bytes(40).unwrap();
        let b_free = b.free_blocks(index);
        unsafe { b.dealloc_bytes(p.as_ptr()) };
        assert_eq!(b.free_blocks(index), b_free);
        assert_eq!(b.stats().ignored_deallocs, 2);
        assert_eq!(b.stats().deallocs, 0);

        // the block still belongs to its own arena
        unsafe { a.dealloc_bytes(p.as_ptr()) };
        assert_eq!(a.stats().deallocs, 1);
        assert_eq!(a.alloc_bytes(40).unwrap(), p);
        drop(a);

        // b never handed out memory from a's released pools
        let mut ptrs = vec![kept];
        for _ in 0..b_free + 1 {
            let q = b.alloc_bytes(40).unwrap();
            unsafe { std::ptr::write_bytes(q.as_ptr(), 0x5a, 40) };
            ptrs.push(q);
        }
        for q in ptrs {
            unsafe { b.dealloc_bytes(q.as_ptr()) };
        }
        assert_eq!(b.stats().ignored_deallocs, 2);
    }

    #[test]
    fn test_usable_size() {
        let mut arena = Arena::new();
        let p = arena.alloc_bytes(100).unwrap();
        unsafe {
            assert_eq!(arena.usable_size(p.as_ptr()), Some(128));
            arena.dealloc_bytes(p.as_ptr());
            assert_eq!(arena.usable_size(p.as_ptr()), None);
        }
    }

    #[test]
    fn test_with_local_arena() {
        let p = with_local_arena(|arena| arena.alloc_bytes(8)).unwrap().unwrap();
        let nested = with_local_arena(|_| with_local_arena(|_| ())).unwrap();
        assert_eq!(nested, Err(AllocError::ArenaUnavailable));
        with_local_arena(|arena| unsafe { arena.dealloc_bytes(p.as_ptr()) }).unwrap();
        let q = with_local_arena(|arena| arena.alloc_bytes(8)).unwrap().unwrap();
        assert_eq!(p, q);
        with_local_arena(|arena| unsafe { arena.dealloc_bytes(q.as_ptr()) }).unwrap();
    }
}
