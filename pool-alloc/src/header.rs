// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Block headers.
//!
//! Every block handed out by an `Arena` is preceded by a `BlockHeader`:
//!
//! ```text
//! <header (HEADER_SIZE bytes)> <payload>
//!                              ^ pointer returned to the caller
//! ```
//!
//! The header is the only record of a block's size class and state; there is no side table. A
//! pointer is recognized as ours by checking its alignment and then reading the `HEADER_SIZE`
//! bytes in front of it for the magic sentinel and the seal.
//!
//! Fields are stored little-endian regardless of the host byte order, so the in-memory encoding
//! is fixed. This is the only module that does pointer arithmetic between headers and payloads.

use core::mem;
use core::ptr::{self, NonNull};

use crate::size_class::ALIGNMENT;

/// The size of a `BlockHeader`, and the offset from a header to its payload.
pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// The sentinel stored in the first word of every header.
pub const HEADER_MAGIC: u64 = 0xDEAD_BEEF_1234_5678;

/// The class index of blocks mapped directly from the OS.
pub const LARGE_CLASS: u8 = 255;

/// Sizes above this cannot be recorded in a header.
pub const MAX_BLOCK_SIZE: u64 = 1 << 47;

// Second check word; a stray word that happens to equal HEADER_MAGIC is not enough.
const SEAL: u16 = 0xA000;

const FLAG_FREE: u8 = 1 << 0;
const FLAG_MMAP: u8 = 1 << 1;

const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(mem::align_of::<BlockHeader>() == ALIGNMENT);

/// Metadata stored immediately before each payload.
#[repr(C, align(16))]
pub struct BlockHeader {
    magic: u64,
    size: u64,
    class: u8,
    flags: u8,
    seal: u16,
    _reserved: u32,
    // Only meaningful while the block sits on a free list.
    next: *mut BlockHeader,
}

impl BlockHeader {
    /// Writes a fresh header at `at`.
    ///
    /// # Safety
    ///
    /// `at` must be aligned to `ALIGNMENT` and valid for writes of `HEADER_SIZE` bytes.
    pub unsafe fn init(at: NonNull<u8>, size: usize, class: u8, free: bool) -> NonNull<BlockHeader> {
        debug_assert_eq!(at.as_ptr() as usize % ALIGNMENT, 0);
        debug_assert!(size as u64 <= MAX_BLOCK_SIZE);
        let header = at.cast::<BlockHeader>();
        ptr::write(
            header.as_ptr(),
            BlockHeader {
                magic: HEADER_MAGIC.to_le(),
                size: (size as u64).to_le(),
                class,
                flags: if free { FLAG_FREE } else { 0 },
                seal: SEAL.to_le(),
                _reserved: 0,
                next: ptr::null_mut(),
            },
        );
        header
    }

    /// Checks the magic sentinel, the seal, and the recorded size.
    pub fn is_valid(&self) -> bool {
        u64::from_le(self.magic) == HEADER_MAGIC
            && u16::from_le(self.seal) == SEAL
            && u64::from_le(self.size) <= MAX_BLOCK_SIZE
    }

    pub fn size(&self) -> usize {
        u64::from_le(self.size) as usize
    }

    pub fn size_class(&self) -> u8 {
        self.class
    }

    pub fn is_free(&self) -> bool {
        self.flags & FLAG_FREE != 0
    }

    pub fn is_mmap(&self) -> bool {
        self.flags & FLAG_MMAP != 0
    }

    pub fn set_free(&mut self, free: bool) {
        self.set_flag(FLAG_FREE, free);
    }

    pub fn set_mmap(&mut self, mmap: bool) {
        self.set_flag(FLAG_MMAP, mmap);
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn next(&self) -> *mut BlockHeader {
        self.next
    }

    pub fn set_next(&mut self, next: *mut BlockHeader) {
        self.next = next;
    }

    /// Wipes the sentinel so that a stale pointer to this block is no longer recognized.
    pub fn invalidate(&mut self) {
        self.magic = 0;
        self.seal = 0;
    }

    /// Checks that `ptr` is aligned and that a header magic precedes it.
    ///
    /// # Safety
    ///
    /// If `ptr` is aligned, the `HEADER_SIZE` bytes before it must be readable.
    pub unsafe fn is_aligned(ptr: *const u8) -> bool {
        let addr = ptr as usize;
        if addr % ALIGNMENT != 0 || addr < HEADER_SIZE {
            return false;
        }
        let magic = ptr::read(ptr.sub(HEADER_SIZE) as *const u64);
        u64::from_le(magic) == HEADER_MAGIC
    }

    /// Recovers the header of a payload pointer, or `None` if `ptr` does not look like one of
    /// ours.
    ///
    /// # Safety
    ///
    /// Same as `is_aligned`.
    pub unsafe fn from_payload(ptr: *const u8) -> Option<NonNull<BlockHeader>> {
        if !BlockHeader::is_aligned(ptr) {
            return None;
        }
        let header = ptr.sub(HEADER_SIZE) as *mut BlockHeader;
        if (*header).is_valid() {
            NonNull::new(header)
        } else {
            None
        }
    }

    /// Returns the payload that follows `header`.
    ///
    /// # Safety
    ///
    /// `header` must have been written by `init` inside a slot or mapping that extends past it.
    pub unsafe fn payload(header: NonNull<BlockHeader>) -> NonNull<u8> {
        NonNull::new_unchecked(header.as_ptr().cast::<u8>().add(HEADER_SIZE))
    }
}
