// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An intrusive LIFO list of free blocks, linked through their headers.

use core::ptr::{self, NonNull};

use crate::header::BlockHeader;

pub struct FreeList {
    head: *mut BlockHeader,
    len: usize,
}

impl FreeList {
    pub const fn new() -> FreeList {
        FreeList {
            head: ptr::null_mut(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Pushes `block` onto the head of the list.
    ///
    /// # Safety
    ///
    /// `block` must be a live header that is not already on any list.
    pub unsafe fn push(&mut self, block: NonNull<BlockHeader>) {
        (*block.as_ptr()).set_next(self.head);
        self.head = block.as_ptr();
        self.len += 1;
    }

    /// Pops the most recently pushed block.
    ///
    /// # Safety
    ///
    /// Every block on the list must still be live.
    pub unsafe fn pop(&mut self) -> Option<NonNull<BlockHeader>> {
        let head = NonNull::new(self.head)?;
        self.head = (*head.as_ptr()).next();
        (*head.as_ptr()).set_next(ptr::null_mut());
        self.len -= 1;
        Some(head)
    }

    /// Forgets every block without touching them, for when their memory is about to be released.
    pub fn clear(&mut self) {
        self.head = ptr::null_mut();
        self.len = 0;
    }
}
