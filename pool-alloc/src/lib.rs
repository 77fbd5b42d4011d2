// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A segregated size-class pool allocator.
//!
//! # Design
//!
//! Requests are sorted into 32 size classes with power-of-two payloads from 8 bytes upward. Each
//! class keeps an intrusive LIFO free list of blocks, refilled by carving a fresh OS mapping (a
//! pool) into equal slots whenever the list runs dry. Every block is prefixed by a `BlockHeader`
//! recording its size, class, and state, so a pointer passed back to `deallocate` is routed to
//! its class without any side table, and pointers that lack a valid header are ignored.
//!
//! Requests of at least the large threshold (1 MiB by default) skip the pools: each gets its own
//! page-rounded mapping, which is unmapped as soon as it is freed.
//!
//! All state lives in an `Arena`. Every thread has one local arena shared by every `PoolAlloc<T>`
//! on that thread; an `Arena` can also be created and owned explicitly. Arenas are not
//! thread-safe, and memory must be freed on the thread that allocated it.
//!
//! The platform mapping calls live in the `mmap-alloc` crate behind the `PageSource` trait, so
//! nothing in this crate depends on the operating system.

#[macro_use]
extern crate log;

mod arena;
mod error;
mod free_list;
mod frontend;
pub mod header;
mod pool;
pub mod size_class;

pub use arena::{with_local_arena, Arena, ArenaBuilder, ArenaStats};
pub use error::AllocError;
pub use frontend::PoolAlloc;
pub use mmap_alloc::{MapAlloc, MapAllocBuilder, MapError, PageSource};
