// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use mmap_alloc::MapError;
use thiserror::Error;

use crate::size_class::ALIGNMENT;

/// The ways an allocation can fail.
///
/// Deallocation never fails, so every variant describes a failed `allocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The OS refused to map a new pool or a large block.
    #[error(transparent)]
    Map(#[from] MapError),
    /// The class free list was still empty after a fresh pool was created for it.
    #[error("size class {class} has no free block after creating a pool")]
    Exhausted { class: usize },
    /// The page source returned a region too short to hold a large block.
    #[error("mapped {granted} bytes where {requested} were needed")]
    ShortMapping { requested: usize, granted: usize },
    /// The request does not fit in a `usize`, or exceeds the largest size a header can record.
    #[error("allocation size overflows")]
    CapacityOverflow,
    /// The element type needs more alignment than blocks provide.
    #[error("alignment {align} exceeds the {max}-byte block alignment", max = ALIGNMENT)]
    UnsupportedAlignment { align: usize },
    /// The thread's arena is being torn down or is already in use further up the stack.
    #[error("the thread-local arena is unavailable")]
    ArenaUnavailable,
}
