//! The platform virtual-memory shim.
//!
//! Every backend provides the five POSIX memory-mapping primitives with POSIX argument and error
//! semantics. The argument checks in this module run before any native call so that a bad
//! request fails the same way on every platform, even where the native API would silently
//! accept it (Linux ignores the descriptor of an anonymous mapping, for instance).

use std::{ffi::c_int, ptr::NonNull};

use crate::{
    error::{Error, Violation},
    Advice, MapFlags, Protection,
};

cfgenius::cond! {
    if cfg(windows) {
        mod windows;

        pub use windows::{consts, Emulated as Platform};
        pub(crate) use windows::page_size_raw;
    } else {
        mod unix;

        pub use unix::{consts, Native as Platform};
        pub(crate) use unix::page_size_raw;
    }
}

/// The descriptor of an anonymous mapping.
pub const NO_DESCRIPTOR: c_int = -1;

/// A set of memory-mapping primitives over one native virtual-memory API.
pub trait VirtualMemory {
    /// Maps `length` bytes at `offset` of `descriptor`, or anonymous memory if `flags` contains
    /// [`consts::MAP_ANONYMOUS`]. `hint` is advisory only and never replaces existing mappings.
    fn create_mapping(
        hint: Option<NonNull<u8>>,
        length: usize,
        protection: c_int,
        flags: c_int,
        descriptor: c_int,
        offset: u64,
    ) -> Result<NonNull<u8>, Error>;

    /// Rejections are reported as [`Error::System`]. Linux reports success for a range that is
    /// not mapped, so a second release of the same range cannot be detected here; callers own
    /// the address and release it once.
    ///
    /// ## Safety
    ///
    /// `addr` must be the start of a live mapping of `length` bytes created by
    /// [`create_mapping`](Self::create_mapping), and nothing may access the range afterwards.
    unsafe fn release_mapping(addr: NonNull<u8>, length: usize) -> Result<(), Error>;

    /// ## Safety
    ///
    /// `addr..addr + length` must lie within a live mapping and `addr` must be page-aligned.
    unsafe fn flush_mapping(addr: NonNull<u8>, length: usize, flags: c_int) -> Result<(), Error>;

    /// ## Safety
    ///
    /// Same as [`flush_mapping`](Self::flush_mapping). [`consts::MADV_DONTNEED`] may discard
    /// the contents of private pages.
    unsafe fn advise_mapping(addr: NonNull<u8>, length: usize, advice: c_int)
        -> Result<(), Error>;

    /// Writes one entry per page of the range into `out`, whose low bit is set when the page is
    /// resident.
    ///
    /// ## Safety
    ///
    /// Same as [`flush_mapping`](Self::flush_mapping).
    unsafe fn query_residency(addr: NonNull<u8>, length: usize, out: &mut [u8])
        -> Result<(), Error>;
}

pub(crate) fn check_create(
    length: usize,
    protection: c_int,
    flags: c_int,
    descriptor: c_int,
    offset: u64,
) -> Result<(), Violation> {
    if length == 0 {
        return Err(Violation::ZeroLength);
    }

    if Protection::from_bits(protection).is_none() {
        return Err(Violation::ProtectionBits(protection));
    }

    let Some(map_flags) = MapFlags::from_bits(flags) else {
        return Err(Violation::FlagBits(flags));
    };

    if map_flags.contains(MapFlags::SHARED) == map_flags.contains(MapFlags::PRIVATE) {
        return Err(Violation::SharingMode(flags));
    }

    if map_flags.contains(MapFlags::ANONYMOUS) {
        if descriptor != NO_DESCRIPTOR {
            return Err(Violation::AnonymousWithDescriptor(descriptor));
        }
        if offset != 0 {
            return Err(Violation::AnonymousWithOffset(offset));
        }
    } else if descriptor == NO_DESCRIPTOR {
        return Err(Violation::MissingDescriptor);
    }

    Ok(())
}

pub(crate) fn check_advice(advice: c_int) -> Result<(), Violation> {
    match Advice::from_raw(advice) {
        Some(_) => Ok(()),
        None => Err(Violation::UnknownAdvice(advice)),
    }
}

pub(crate) fn check_flush_flags(flags: c_int) -> Result<(), Violation> {
    let known = consts::MS_ASYNC | consts::MS_SYNC | consts::MS_INVALIDATE;
    let blocking = flags & consts::MS_SYNC != 0;
    let scheduled = flags & consts::MS_ASYNC != 0;

    if flags & !known != 0 || blocking == scheduled {
        return Err(Violation::FlagBits(flags));
    }
    Ok(())
}

pub(crate) fn check_residency_buffer(length: usize, out: &[u8]) -> Result<(), Violation> {
    let needed = length.div_ceil(crate::page_size());
    if out.len() < needed {
        return Err(Violation::ResidencyBuffer {
            needed,
            given: out.len(),
        });
    }
    Ok(())
}
