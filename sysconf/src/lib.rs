// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Query runtime configuration information.
//!
//! This crate provides the ability to query for configuration information about the runtime
//! platform that a memory allocator needs: the page size, the granularity at which the OS hands
//! out new mappings, and page rounding. On POSIX systems, it makes use of the [sysconf] API; on
//! Windows, of `GetSystemInfo`.
//!
//! [sysconf]: http://man7.org/linux/man-pages/man3/sysconf.3.html

// NOTE: This crate assumes that any behavior required by POSIX 1003.1 will be properly
// implemented on any POSIX system. Running on a POSIX system which does not adhere to these
// requirements will cause an assertion failure.

#![cfg_attr(not(test), no_std)]

#[cfg(not(any(unix, windows)))]
compile_error!("sysconf only supports Unix and Windows");

#[macro_use]
extern crate lazy_static;

#[cfg(unix)]
use errno::errno;

/// Get the system's page size.
#[inline(always)]
pub fn pagesize() -> usize {
    PLATFORM.pagesize
}

/// Get the granularity at which new mappings are placed.
///
/// On Windows, `VirtualAlloc` reserves address space in units of the allocation granularity
/// (usually 64 KiB) even though it commits in units of pages. On Unix the two are the same.
#[inline]
pub fn allocation_granularity() -> usize {
    PLATFORM.granularity
}

/// Round `size` up to the next multiple of the page size.
///
/// Returns `None` if the result would overflow a `usize`.
#[inline]
pub fn round_up_to_page(size: usize) -> Option<usize> {
    round_up(size, pagesize())
}

/// Round `size` up to the next multiple of `unit`, which must be a power of two.
///
/// Returns `None` if the result would overflow a `usize`.
#[inline]
pub fn round_up(size: usize, unit: usize) -> Option<usize> {
    debug_assert!(unit.is_power_of_two(), "unit {} is not a power of two", unit);
    size.checked_add(unit - 1).map(|n| n & !(unit - 1))
}

struct Platform {
    pagesize: usize,
    granularity: usize,
}

lazy_static! { static ref PLATFORM: Platform = priv_platform(); }

#[cfg(unix)]
fn priv_platform() -> Platform {
    // sysconf(_SC_PAGESIZE) is required by POSIX 1003.1: http://www.unix.com/man-page/posix/3p/sysconf/
    use libc::{sysconf, EINVAL, _SC_PAGESIZE};
    let pagesize = unsafe { sysconf(_SC_PAGESIZE) };
    if pagesize < 1 {
        assert_eq!(errno().0, EINVAL);
        panic!("sysconf(_SC_PAGESIZE) returned EINVAL, but _SC_PAGESIZE is required by POSIX 1003.1");
    }
    let pagesize = pagesize as usize;
    assert!(pagesize.is_power_of_two(), "page size {} is not a power of two", pagesize);
    Platform {
        pagesize,
        granularity: pagesize,
    }
}

#[cfg(windows)]
fn priv_platform() -> Platform {
    use core::mem::MaybeUninit;
    use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
    let info = unsafe {
        let mut info = MaybeUninit::<SYSTEM_INFO>::uninit();
        GetSystemInfo(info.as_mut_ptr());
        info.assume_init()
    };
    Platform {
        pagesize: info.dwPageSize as usize,
        granularity: info.dwAllocationGranularity as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagesize() {
        let ps = pagesize();
        assert!(ps >= 4096, "pagesize: {}", ps);
        assert!(ps.is_power_of_two());
        assert_eq!(ps, pagesize());
        assert_eq!(allocation_granularity() % ps, 0);
    }

    #[test]
    fn test_round_up_to_page() {
        let ps = pagesize();
        assert_eq!(round_up_to_page(0), Some(0));
        assert_eq!(round_up_to_page(1), Some(ps));
        assert_eq!(round_up_to_page(ps), Some(ps));
        assert_eq!(round_up_to_page(ps + 1), Some(2 * ps));
        assert_eq!(round_up_to_page((1 << 20) + 32), Some((1 << 20) + ps));
        assert_eq!(round_up_to_page(usize::MAX), None);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(40, 16), Some(48));
        assert_eq!(round_up(48, 16), Some(48));
        assert_eq!(round_up(1, 1), Some(1));
        assert_eq!(round_up(usize::MAX - 3, 16), None);
    }
}
