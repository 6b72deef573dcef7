use std::{
    ffi::{c_int, c_void},
    ptr::{null_mut, NonNull},
};

use crate::error::{Error, Operation, Violation};

use super::{check_advice, check_create, check_flush_flags, check_residency_buffer, VirtualMemory};

pub mod consts {
    pub use libc::{
        MADV_DONTNEED, MADV_NORMAL, MADV_RANDOM, MADV_SEQUENTIAL, MADV_WILLNEED, MAP_ANONYMOUS,
        MAP_PRIVATE, MAP_SHARED, MS_ASYNC, MS_INVALIDATE, MS_SYNC, PROT_EXEC, PROT_NONE,
        PROT_READ, PROT_WRITE,
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub use libc::{MAP_NONBLOCK, MAP_POPULATE};
}

pub fn page_size_raw() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// The host's own `mmap` family.
#[derive(Debug, Clone, Copy)]
pub enum Native {}

impl VirtualMemory for Native {
    fn create_mapping(
        hint: Option<NonNull<u8>>,
        length: usize,
        protection: c_int,
        flags: c_int,
        descriptor: c_int,
        offset: u64,
    ) -> Result<NonNull<u8>, Error> {
        check_create(length, protection, flags, descriptor, offset)?;

        let offset =
            libc::off_t::try_from(offset).map_err(|_| Violation::OffsetTooLarge(offset))?;
        let hint = hint.map_or(null_mut(), |addr| addr.as_ptr().cast::<c_void>());

        // N.B. `MAP_FIXED` is rejected by `check_create` so `hint` can never discard an existing
        // mapping.
        let addr = unsafe { libc::mmap(hint, length, protection, flags, descriptor, offset) };

        if addr == libc::MAP_FAILED {
            return Err(Error::last_os_error(Operation::Map));
        }

        NonNull::new(addr.cast::<u8>()).ok_or_else(|| Error::last_os_error(Operation::Map))
    }

    unsafe fn release_mapping(addr: NonNull<u8>, length: usize) -> Result<(), Error> {
        if libc::munmap(addr.as_ptr().cast(), length) != 0 {
            return Err(Error::last_os_error(Operation::Unmap));
        }
        Ok(())
    }

    unsafe fn flush_mapping(addr: NonNull<u8>, length: usize, flags: c_int) -> Result<(), Error> {
        check_flush_flags(flags)?;

        if libc::msync(addr.as_ptr().cast(), length, flags) != 0 {
            return Err(Error::last_os_error(Operation::Sync));
        }
        Ok(())
    }

    unsafe fn advise_mapping(
        addr: NonNull<u8>,
        length: usize,
        advice: c_int,
    ) -> Result<(), Error> {
        check_advice(advice)?;

        if libc::madvise(addr.as_ptr().cast(), length, advice) != 0 {
            return Err(Error::last_os_error(Operation::Advise));
        }
        Ok(())
    }

    unsafe fn query_residency(
        addr: NonNull<u8>,
        length: usize,
        out: &mut [u8],
    ) -> Result<(), Error> {
        check_residency_buffer(length, out)?;

        // The address and vector pointer types of `mincore` differ between unixes.
        if libc::mincore(addr.as_ptr() as _, length, out.as_mut_ptr() as _) != 0 {
            return Err(Error::last_os_error(Operation::Residency));
        }
        Ok(())
    }
}
