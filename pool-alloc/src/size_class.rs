// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Size classes.
//!
//! Requests below the large threshold are served from one of `NUM_CLASSES` classes whose payload
//! sizes are the powers of two from `MIN_PAYLOAD` upward. Each slot holds a `BlockHeader`
//! followed by the payload, rounded up to `ALIGNMENT`.

use core::cmp;

use crate::header::HEADER_SIZE;

/// The number of size classes.
pub const NUM_CLASSES: usize = 32;

/// The payload size of class 0.
pub const MIN_PAYLOAD: usize = 8;

/// The alignment of every slot and every payload.
pub const ALIGNMENT: usize = 16;

/// Requests of at least this many bytes bypass the pools by default.
pub const DEFAULT_LARGE_THRESHOLD: usize = 1 << 20;

const LOG_MIN_PAYLOAD: usize = 3;

/// The geometry of one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    /// The largest request this class serves.
    pub payload_size: usize,
    /// `payload_size + HEADER_SIZE`, rounded up to `ALIGNMENT`.
    pub slot_size: usize,
    /// The number of slots carved from one pool.
    pub blocks_per_page: usize,
    /// The size of one pool mapping: one unit of mapping granularity, or enough whole units for
    /// one slot when a slot is larger than that.
    pub pool_size: usize,
}

impl SizeClass {
    fn new(index: usize, pool_unit: usize) -> SizeClass {
        // Classes near the top do not fit in a 32-bit address space; saturate them. They can
        // never be reached through the pool path there.
        let payload_size = (MIN_PAYLOAD as u64)
            .checked_shl(index as u32)
            .and_then(|p| usize::try_from(p).ok())
            .unwrap_or(usize::MAX);
        let slot_size = payload_size
            .checked_add(HEADER_SIZE)
            .and_then(|n| sysconf::round_up(n, ALIGNMENT))
            .unwrap_or(usize::MAX & !(ALIGNMENT - 1));
        let pool_size = if slot_size <= pool_unit {
            pool_unit
        } else {
            sysconf::round_up(slot_size, pool_unit).unwrap_or(usize::MAX & !(pool_unit - 1))
        };
        SizeClass {
            payload_size,
            slot_size,
            blocks_per_page: pool_size / slot_size,
            pool_size,
        }
    }
}

/// Returns the index of the smallest class whose payload holds `n` bytes.
///
/// The result is monotonic in `n` and clamped to the last class. `n == 0` maps to class 0.
pub fn size_class_for(n: usize) -> usize {
    let n = cmp::max(n, MIN_PAYLOAD);
    let log = match n.checked_next_power_of_two() {
        Some(pow) => pow.trailing_zeros() as usize,
        None => usize::BITS as usize,
    };
    cmp::min(log - LOG_MIN_PAYLOAD, NUM_CLASSES - 1)
}

/// The immutable table of all size classes for one page size.
#[derive(Debug, Clone)]
pub struct SizeClassTable {
    classes: [SizeClass; NUM_CLASSES],
    page_size: usize,
    pool_unit: usize,
}

impl SizeClassTable {
    /// Builds the table for a source with the given page size and mapping granularity.
    ///
    /// Pools are sized in whole units of `granularity` (or of `page_size`, if that is larger), so
    /// that no pool leaves part of a reservation unused.
    pub fn new(page_size: usize, granularity: usize) -> SizeClassTable {
        debug_assert!(page_size.is_power_of_two());
        debug_assert!(page_size % ALIGNMENT == 0);
        debug_assert!(granularity.is_power_of_two());
        let pool_unit = cmp::max(page_size, granularity);
        SizeClassTable {
            classes: core::array::from_fn(|i| SizeClass::new(i, pool_unit)),
            page_size,
            pool_unit,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The size of the smallest pool.
    pub fn pool_unit(&self) -> usize {
        self.pool_unit
    }

    /// Returns the class at `index`, or `None` if `index` is out of range.
    pub fn get(&self, index: usize) -> Option<&SizeClass> {
        self.classes.get(index)
    }

    /// Classifies an `n`-byte request, returning the class index with its geometry.
    pub fn classify(&self, n: usize) -> (usize, &SizeClass) {
        let index = size_class_for(n);
        (index, &self.classes[index])
    }

    /// The largest payload any class serves.
    pub fn max_payload(&self) -> usize {
        self.classes[NUM_CLASSES - 1].payload_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &SizeClass> {
        self.classes.iter()
    }
}
