// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Anonymous page mappings.
//!
//! This crate hides the operating system's virtual memory calls behind the `PageSource` trait:
//! map a page-rounded region of zero-filled, readable and writable memory, and later release
//! exactly that region. `MapAlloc` implements it with `mmap`/`munmap` on Unix and
//! `VirtualAlloc`/`VirtualFree` on Windows, so code built on top of `PageSource` never needs to
//! know which platform it is running on.

#![cfg_attr(not(test), no_std)]

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
compile_error!("mmap-alloc only supports Windows, Linux, and Mac");


use core::ptr::{self, NonNull};

#[cfg(unix)]
use errno::errno;
use thiserror::Error;

/// An error returned when the OS refuses a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// The mapping call failed; `code` is `errno` on Unix and `GetLastError` on Windows.
    #[error("mapping {size} bytes failed with OS error {code}")]
    Os { size: usize, code: i32 },
    /// The requested size cannot be rounded up to whole pages.
    #[error("mapping size {size} overflows when rounded up to whole pages")]
    Overflow { size: usize },
}

/// A source of whole pages of memory.
///
/// # Safety
///
/// Implementations must return regions that are aligned to `pagesize()`, readable, writable,
/// zero-filled, and not aliased by any other live region. The length of a returned region is the
/// number of bytes the caller may use; it may be shorter than requested, and callers must check
/// it. A region passed to `unmap_pages` must have been returned by `map_pages` on the same source
/// with the same `size`, and is not accessed again afterwards.
pub unsafe trait PageSource {
    /// The page size that returned regions are aligned to and rounded up to.
    fn pagesize(&self) -> usize;

    /// The unit in which the OS hands out address space.
    ///
    /// Mapping less than this wastes the remainder of the unit. Always a multiple of
    /// `pagesize()`.
    fn granularity(&self) -> usize {
        self.pagesize()
    }

    /// Maps at least `size` bytes; `size` must be non-zero.
    ///
    /// Returns the region together with its usable length, like `alloc_excess` in the standard
    /// `Alloc` trait.
    fn map_pages(&self, size: usize) -> Result<NonNull<[u8]>, MapError>;

    /// Releases a region previously returned by `map_pages(size)`.
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must exactly match an earlier successful `map_pages` call on this source,
    /// and the region must not be used after this call.
    unsafe fn unmap_pages(&self, ptr: NonNull<u8>, size: usize);
}

unsafe impl<'a, S: PageSource + ?Sized> PageSource for &'a S {
    fn pagesize(&self) -> usize {
        (**self).pagesize()
    }

    fn granularity(&self) -> usize {
        (**self).granularity()
    }

    fn map_pages(&self, size: usize) -> Result<NonNull<[u8]>, MapError> {
        (**self).map_pages(size)
    }

    unsafe fn unmap_pages(&self, ptr: NonNull<u8>, size: usize) {
        (**self).unmap_pages(ptr, size)
    }
}

/// A builder for `MapAlloc`.
///
/// `MapAllocBuilder` represents the configuration of a `MapAlloc`. New `MapAllocBuilder`s are
/// constructed using `default`, and then other methods are used to set configuration options.
/// Memory is always mapped readable and writable.
#[derive(Debug, Clone)]
pub struct MapAllocBuilder {
    // Only meaningful on Linux (which has MAP_POPULATE); Windows always commits.
    commit: bool,
    // sysconf::pagesize goes through a lazy static, so store a copy of the pagesize to ensure
    // that loading it is cheap
    pagesize: usize,
}

impl MapAllocBuilder {
    pub fn build(&self) -> MapAlloc {
        MapAlloc {
            pagesize: self.pagesize,
            commit: self.commit,
        }
    }

    /// Configures whether mapped memory is pre-faulted.
    ///
    /// `commit` configures whether the pages of a new mapping are populated before `map_pages`
    /// returns, rather than on first access. The default is not to pre-fault.
    ///
    /// # Platform-specific behavior
    ///
    /// On Linux this passes `MAP_POPULATE`. On Mac it has no effect. On Windows, memory is
    /// always reserved and committed in one call, so it has no effect either.
    pub fn commit(mut self, commit: bool) -> MapAllocBuilder {
        self.commit = commit;
        self
    }
}

impl Default for MapAllocBuilder {
    fn default() -> MapAllocBuilder {
        MapAllocBuilder {
            commit: false,
            pagesize: sysconf::pagesize(),
        }
    }
}

/// A `PageSource` backed directly by the OS.
#[derive(Debug, Clone)]
pub struct MapAlloc {
    pagesize: usize,
    commit: bool,
}

impl Default for MapAlloc {
    fn default() -> MapAlloc {
        MapAllocBuilder::default().build()
    }
}

impl MapAlloc {
    fn debug_verify_ptr(&self, ptr: NonNull<u8>, size: usize) {
        debug_assert_eq!(
            ptr.as_ptr() as usize % self.pagesize,
            0,
            "ptr {:?} not aligned to page size {}",
            ptr,
            self.pagesize
        );
        debug_assert_eq!(
            size % self.pagesize,
            0,
            "size {} not a multiple of page size {}",
            size,
            self.pagesize
        );
    }
}

unsafe impl PageSource for MapAlloc {
    fn pagesize(&self) -> usize {
        self.pagesize
    }

    fn granularity(&self) -> usize {
        sysconf::allocation_granularity()
    }

    fn map_pages(&self, size: usize) -> Result<NonNull<[u8]>, MapError> {
        debug_assert!(size > 0, "map_pages: size must be non-zero");
        let size = sysconf::round_up_to_page(size).ok_or(MapError::Overflow { size })?;
        let ptr = unsafe { map(size, self.commit) }.map_err(|code| MapError::Os { size, code })?;
        self.debug_verify_ptr(ptr, size);
        Ok(NonNull::slice_from_raw_parts(ptr, size))
    }

    unsafe fn unmap_pages(&self, ptr: NonNull<u8>, size: usize) {
        debug_assert!(size > 0, "unmap_pages: size must be non-zero");
        // map_pages rounded the size the same way, so this recovers the mapped extent
        let size = match sysconf::round_up_to_page(size) {
            Some(size) => size,
            None => panic!("unmap_pages: size {} was never mapped", size),
        };
        self.debug_verify_ptr(ptr, size);
        unmap(ptr, size);
    }
}

// NOTE on mapping at the NULL address: the POSIX standard and the Linux manpage both guarantee
// that NULL will never be returned so long as the MAP_FIXED flag is not passed. The assertions
// below will catch us if a new platform breaks that promise.

#[cfg(target_os = "linux")]
unsafe fn map(size: usize, commit: bool) -> Result<NonNull<u8>, i32> {
    use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_POPULATE, MAP_PRIVATE, PROT_READ, PROT_WRITE};

    let flags = if commit { MAP_POPULATE } else { 0 };

    let ptr = libc::mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_ANONYMOUS | MAP_PRIVATE | flags,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        Err(errno().0)
    } else {
        assert_ne!(ptr, ptr::null_mut(), "mmap returned NULL");
        Ok(NonNull::new_unchecked(ptr as *mut u8))
    }
}

#[cfg(target_os = "macos")]
unsafe fn map(size: usize, _commit: bool) -> Result<NonNull<u8>, i32> {
    use libc::{MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};

    let ptr = libc::mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_ANON | MAP_PRIVATE,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        Err(errno().0)
    } else {
        // POSIX-compliant mmap implementations cannot return NULL if the MAP_FIXED flag is not
        // supplied: "When the implementation selects a value for pa, it never places a mapping
        // at address 0, nor does it replace any extant mapping."
        assert_ne!(ptr, ptr::null_mut(), "mmap returned NULL");
        Ok(NonNull::new_unchecked(ptr as *mut u8))
    }
}

// For a good overview of virtual memory handling on Windows, see
// https://blogs.technet.microsoft.com/markrussinovich/2008/11/17/pushing-the-limits-of-windows-virtual-memory/

#[cfg(windows)]
unsafe fn map(size: usize, _commit: bool) -> Result<NonNull<u8>, i32> {
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::memoryapi::VirtualAlloc;
    use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};

    // NOTE: VirtualAlloc only cares about allocation granularity for the pointer argument, not
    // the size. Since we're passing null for the pointer, this doesn't affect us.
    let ptr = VirtualAlloc(ptr::null_mut(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE);
    match NonNull::new(ptr as *mut u8) {
        Some(ptr) => Ok(ptr),
        None => Err(GetLastError() as i32),
    }
}

#[cfg(unix)]
unsafe fn unmap(ptr: NonNull<u8>, size: usize) {
    // NOTE: Don't inline the call to munmap; then errno might be called before munmap.
    let ret = libc::munmap(ptr.as_ptr() as *mut _, size);
    assert_eq!(ret, 0, "munmap failed: {}", errno().0);
}

#[cfg(windows)]
unsafe fn unmap(ptr: NonNull<u8>, _size: usize) {
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::memoryapi::VirtualFree;
    use winapi::um::winnt::MEM_RELEASE;

    // NOTE: VirtualFree with MEM_RELEASE can only operate on an entire region previously mapped
    // with VirtualAlloc, and requires the size argument to be 0; the kernel knows the length.
    let ret = VirtualFree(ptr.as_ptr() as *mut _, 0, MEM_RELEASE);
    assert_ne!(
        ret,
        0,
        "Call to VirtualFree failed with error code {}.",
        GetLastError()
    );
}
