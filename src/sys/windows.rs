// win32 quick reference:
// https://docs.rs/windows-sys/latest/windows_sys/index.html
// https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/
// https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-createfilemappingw
// https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-mapviewoffile
// https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-flushviewoffile

use std::{
    ffi::{c_int, c_void},
    mem::MaybeUninit,
    ptr::{null, NonNull},
};

use windows_sys::Win32::{
    Foundation::{CloseHandle, ERROR_INVALID_HANDLE, HANDLE, INVALID_HANDLE_VALUE},
    System::{
        Memory::{
            CreateFileMappingW, FlushViewOfFile, MapViewOfFile, UnmapViewOfFile, FILE_MAP_COPY,
            FILE_MAP_EXECUTE, FILE_MAP_READ, FILE_MAP_WRITE, PAGE_EXECUTE_READ,
            PAGE_EXECUTE_READWRITE, PAGE_READONLY, PAGE_READWRITE,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
    },
};

use crate::error::{Error, Operation, SystemError};

use super::{
    check_advice, check_create, check_flush_flags, check_residency_buffer, VirtualMemory,
    NO_DESCRIPTOR,
};

/// The POSIX vocabulary, with the values of the common unix `<sys/mman.h>`.
pub mod consts {
    use std::ffi::c_int;

    pub const PROT_NONE: c_int = 0x00;
    pub const PROT_READ: c_int = 0x01;
    pub const PROT_WRITE: c_int = 0x02;
    pub const PROT_EXEC: c_int = 0x04;

    pub const MAP_SHARED: c_int = 0x01;
    pub const MAP_PRIVATE: c_int = 0x02;
    pub const MAP_ANONYMOUS: c_int = 0x20;

    pub const MS_ASYNC: c_int = 0x01;
    pub const MS_SYNC: c_int = 0x02;
    pub const MS_INVALIDATE: c_int = 0x04;

    pub const MADV_NORMAL: c_int = 0;
    pub const MADV_RANDOM: c_int = 1;
    pub const MADV_SEQUENTIAL: c_int = 2;
    pub const MADV_WILLNEED: c_int = 3;
    pub const MADV_DONTNEED: c_int = 4;
}

use consts::{MAP_ANONYMOUS, MAP_PRIVATE, MS_INVALIDATE, PROT_EXEC, PROT_READ, PROT_WRITE};

pub fn page_size_raw() -> usize {
    let sys_info = unsafe {
        let mut sys_info = MaybeUninit::<SYSTEM_INFO>::uninit();
        GetSystemInfo(sys_info.as_mut_ptr());
        sys_info.assume_init()
    };

    // N.B. views must start on a multiple of `dwAllocationGranularity` but their residency and
    // flushing are still tracked per `dwPageSize` page, which is the unit callers count in.
    sys_info.dwPageSize as usize
}

/// `mmap` emulated on top of file-mapping objects and views.
#[derive(Debug, Clone, Copy)]
pub enum Emulated {}

fn page_protection(protection: c_int) -> u32 {
    if protection & PROT_WRITE != 0 {
        if protection & PROT_EXEC != 0 {
            PAGE_EXECUTE_READWRITE
        } else {
            PAGE_READWRITE
        }
    } else if protection & PROT_EXEC != 0 {
        // File-mapping objects accept neither `PAGE_EXECUTE` nor `PAGE_NOACCESS`, so execute-only
        // and `PROT_NONE` get the most restrictive protection they do accept.
        PAGE_EXECUTE_READ
    } else {
        PAGE_READONLY
    }
}

fn view_access(protection: c_int, flags: c_int) -> u32 {
    let mut access = if protection & PROT_WRITE != 0 {
        FILE_MAP_WRITE
    } else {
        FILE_MAP_READ
    };
    if protection & PROT_EXEC != 0 {
        access |= FILE_MAP_EXECUTE;
    }
    if flags & MAP_PRIVATE != 0 {
        access |= FILE_MAP_COPY;
    }
    access
}

fn split_u64(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, (value & 0xFFFF_FFFF) as u32)
}

impl VirtualMemory for Emulated {
    fn create_mapping(
        _hint: Option<NonNull<u8>>,
        length: usize,
        protection: c_int,
        flags: c_int,
        descriptor: c_int,
        offset: u64,
    ) -> Result<NonNull<u8>, Error> {
        check_create(length, protection, flags, descriptor, offset)?;

        let file: HANDLE = if flags & MAP_ANONYMOUS != 0 {
            INVALID_HANDLE_VALUE
        } else {
            debug_assert_ne!(descriptor, NO_DESCRIPTOR);

            let handle = unsafe { libc::get_osfhandle(descriptor) };
            if handle == -1 {
                return Err(Error::System {
                    op: Operation::Map,
                    source: SystemError::from_code(ERROR_INVALID_HANDLE as i32),
                });
            }
            handle as HANDLE
        };

        // The mapping object must reach the end of the view. Overflow is left for the OS to
        // reject.
        let (end_high, end_low) = split_u64((length as u64).saturating_add(offset));
        let (offset_high, offset_low) = split_u64(offset);

        let mapping = unsafe {
            CreateFileMappingW(
                file,
                null(),
                page_protection(protection),
                end_high,
                end_low,
                null(),
            )
        };
        if mapping == 0 {
            return Err(Error::last_os_error(Operation::Map));
        }

        let view = unsafe {
            MapViewOfFile(
                mapping,
                view_access(protection, flags),
                offset_high,
                offset_low,
                length,
            )
        };

        // Capture the error before `CloseHandle` overwrites it.
        let result =
            NonNull::new(view as *mut u8).ok_or_else(|| Error::last_os_error(Operation::Map));

        // The view holds its own reference to the section, so the mapping object is never needed
        // past this point, whether the view was created or not.
        unsafe { CloseHandle(mapping) };

        result
    }

    unsafe fn release_mapping(addr: NonNull<u8>, _length: usize) -> Result<(), Error> {
        if UnmapViewOfFile(addr.as_ptr() as isize) == 0 {
            return Err(Error::last_os_error(Operation::Unmap));
        }
        Ok(())
    }

    unsafe fn flush_mapping(addr: NonNull<u8>, length: usize, flags: c_int) -> Result<(), Error> {
        check_flush_flags(flags)?;

        if flags & MS_INVALIDATE != 0 {
            log::trace!("invalidate has no equivalent on this platform, ignoring it");
        }

        if FlushViewOfFile(addr.as_ptr() as *const c_void, length) == 0 {
            return Err(Error::last_os_error(Operation::Sync));
        }
        Ok(())
    }

    unsafe fn advise_mapping(
        _addr: NonNull<u8>,
        _length: usize,
        advice: c_int,
    ) -> Result<(), Error> {
        check_advice(advice)?;
        Ok(())
    }

    unsafe fn query_residency(
        _addr: NonNull<u8>,
        length: usize,
        out: &mut [u8],
    ) -> Result<(), Error> {
        check_residency_buffer(length, out)?;
        Err(Error::Unsupported(Operation::Residency))
    }
}

#[cfg(test)]
mod tests {
    use windows_sys::Win32::System::Memory::{PAGE_EXECUTE, PAGE_NOACCESS};

    use super::{consts::PROT_NONE, *};

    #[test]
    fn protection_translation() {
        assert_eq!(page_protection(PROT_READ), PAGE_READONLY);
        assert_eq!(page_protection(PROT_WRITE), PAGE_READWRITE);
        assert_eq!(page_protection(PROT_READ | PROT_WRITE), PAGE_READWRITE);
        assert_eq!(page_protection(PROT_READ | PROT_EXEC), PAGE_EXECUTE_READ);
        assert_eq!(page_protection(PROT_EXEC), PAGE_EXECUTE_READ);
        assert_eq!(
            page_protection(PROT_READ | PROT_WRITE | PROT_EXEC),
            PAGE_EXECUTE_READWRITE
        );
        assert_ne!(page_protection(PROT_NONE), PAGE_NOACCESS);
        assert_ne!(page_protection(PROT_EXEC), PAGE_EXECUTE);
    }

    #[test]
    fn private_views_copy_on_write() {
        assert_eq!(view_access(PROT_READ, consts::MAP_SHARED), FILE_MAP_READ);
        assert_eq!(
            view_access(PROT_READ | PROT_WRITE, MAP_PRIVATE),
            FILE_MAP_WRITE | FILE_MAP_COPY
        );
        assert_eq!(
            view_access(PROT_READ | PROT_EXEC, consts::MAP_SHARED),
            FILE_MAP_READ | FILE_MAP_EXECUTE
        );
    }

    #[test]
    fn sizes_split_into_halves() {
        assert_eq!(split_u64(0x1_0000_0002), (1, 2));
        assert_eq!(split_u64(4096), (0, 4096));
    }
}
