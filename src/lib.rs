//! Mapio exposes memory-mapped I/O with POSIX semantics on every platform: [mapping](Mapper::map)
//! files or anonymous memory into the address space, [advising](Mapping::advise) the kernel of
//! access patterns, [flushing](Mapping::sync) dirty pages back to their file and
//! [querying](Mapping::residency) which pages are resident.
//!
//! ## Platforms
//!
//! On unix every operation is a thin layer over `mmap`, `munmap`, `msync`, `madvise` and
//! `mincore`. On Windows the same operations are emulated with file-mapping objects and views,
//! with a few documented gaps:
//!
//! - advice is accepted and ignored,
//! - invalidating other views on sync is ignored,
//! - residency queries fail with [`Error::Unsupported`].
//!
//! Both platforms check arguments identically before touching the OS, so a request that is
//! malformed on one platform is malformed on all of them.
//!
//! ## Lifetime
//!
//! A [`Mapping`] owns its address range. It is released exactly once, either by
//! [`Mapping::unmap`], which consumes it, or when it is dropped. Hosts that need to keep a handle
//! around after an explicit unmap can wrap it in a [`MappingCell`], where a second unmap fails
//! with [`Error::Released`].
//!
//! The raw release primitive is not exposed. Linux `munmap` reports success for a range that is
//! no longer mapped, so releasing through anything but an owned [`Mapping`] could not detect a
//! double release there.
//!
//! Regions are described at page granularity, whose size varies between operating systems. This
//! value can be queried at runtime through [`page_size`].

use lazy_static::lazy_static;

mod error;
mod flags;
mod mapping;
mod sys;

pub use error::{Error, Operation, SystemError, Violation};
pub use flags::{Advice, MapFlags, Protection};
pub use mapping::{MapOptions, Mapper, Mapping, MappingCell, Residency};
pub use sys::{consts, NO_DESCRIPTOR};

lazy_static! {
    static ref PAGE_SIZE: usize = sys::page_size_raw();
}

/// The native page size. It is read from the OS on first use and never changes afterwards.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Rounds `size` up to a whole number of native pages.
pub fn round_up_to_page_size(size: usize) -> usize {
    size.div_ceil(page_size()) * page_size()
}
