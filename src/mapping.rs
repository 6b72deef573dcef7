use std::{ffi::c_int, marker::PhantomData, mem::ManuallyDrop, ptr::NonNull, slice};

use crate::{
    error::{Error, Violation},
    flags::sync_flags,
    page_size,
    sys::{Platform, VirtualMemory, NO_DESCRIPTOR},
    Advice, MapFlags, Protection,
};

/// Parameters of a mapping request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOptions {
    len: usize,
    protection: Protection,
    flags: MapFlags,
    descriptor: c_int,
    offset: u64,
    advice: Option<Advice>,
}

impl MapOptions {
    /// Private, zero-filled, read-write memory.
    pub fn anonymous(len: usize) -> Self {
        Self {
            len,
            protection: Protection::READ | Protection::WRITE,
            flags: MapFlags::PRIVATE | MapFlags::ANONYMOUS,
            descriptor: NO_DESCRIPTOR,
            offset: 0,
            advice: None,
        }
    }

    /// A shared, read-write view of `len` bytes of the file open as `descriptor`.
    pub fn file(len: usize, descriptor: c_int) -> Self {
        Self {
            len,
            protection: Protection::READ | Protection::WRITE,
            flags: MapFlags::SHARED,
            descriptor,
            offset: 0,
            advice: None,
        }
    }

    /// Builds a request from the untyped values a host binding receives. Only the types are
    /// checked here; the combination is checked when the request is mapped.
    pub fn from_raw(
        size: i64,
        protection: c_int,
        flags: c_int,
        descriptor: c_int,
        offset: i64,
        advice: c_int,
    ) -> Result<Self, Error> {
        let len = usize::try_from(size).map_err(|_| Violation::NegativeSize(size))?;
        let offset = u64::try_from(offset).map_err(|_| Violation::NegativeOffset(offset))?;
        let protection =
            Protection::from_bits(protection).ok_or(Violation::ProtectionBits(protection))?;
        let flags = MapFlags::from_bits(flags).ok_or(Violation::FlagBits(flags))?;
        let advice = Advice::from_raw(advice).ok_or(Violation::UnknownAdvice(advice))?;

        Ok(Self {
            len,
            protection,
            flags,
            descriptor,
            offset,
            advice: Some(advice).filter(|&advice| advice != Advice::Normal),
        })
    }

    pub fn protection(&mut self, protection: Protection) -> &mut Self {
        self.protection = protection;
        self
    }

    pub fn flags(&mut self, flags: MapFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn descriptor(&mut self, descriptor: c_int) -> &mut Self {
        self.descriptor = descriptor;
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = offset;
        self
    }

    /// Advice applied right after the mapping is created.
    pub fn advice(&mut self, advice: Advice) -> &mut Self {
        self.advice = Some(advice);
        self
    }
}

/// Creates [`Mapping`]s over a virtual-memory backend.
#[derive(Debug, Clone, Copy)]
pub struct Mapper<V: VirtualMemory = Platform> {
    _vm: PhantomData<fn() -> V>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::for_backend()
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: VirtualMemory> Mapper<V> {
    pub(crate) fn for_backend() -> Self {
        Self { _vm: PhantomData }
    }

    /// The page size ranges and residency reports are counted in, which is always the native
    /// [`page_size`].
    pub fn page_size(&self) -> usize {
        page_size()
    }

    pub fn map(&self, options: &MapOptions) -> Result<Mapping<V>, Error> {
        if options.len == 0 {
            return Err(Violation::ZeroLength.into());
        }

        let addr = V::create_mapping(
            None,
            options.len,
            options.protection.bits(),
            options.flags.bits(),
            options.descriptor,
            options.offset,
        )?;

        let mapping = Mapping {
            addr,
            len: options.len,
            protection: options.protection,
            flags: options.flags,
            _vm: PhantomData,
        };

        log::debug!(
            "mapped {} bytes at {:p} ({:?}, {:?})",
            mapping.len,
            mapping.addr,
            mapping.protection,
            mapping.flags
        );

        if let Some(advice) = options.advice.filter(|&advice| advice != Advice::Normal) {
            if let Err(err) = mapping.advise(advice) {
                if let Err(unmap_err) = mapping.unmap() {
                    log::warn!("failed to release mapping after rejected advice: {unmap_err}");
                }
                return Err(err);
            }
        }

        Ok(mapping)
    }
}

/// A live memory mapping. The mapping is released when this value is [unmapped](Self::unmap)
/// or dropped, whichever comes first.
#[derive(Debug)]
pub struct Mapping<V: VirtualMemory = Platform> {
    addr: NonNull<u8>,
    len: usize,
    protection: Protection,
    flags: MapFlags,
    _vm: PhantomData<fn() -> V>,
}

// Safety: a `Mapping` exclusively owns its address range.
unsafe impl<V: VirtualMemory> Send for Mapping<V> {}

impl<V: VirtualMemory> Mapping<V> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn flags(&self) -> MapFlags {
        self.flags
    }

    pub fn page_count(&self) -> usize {
        self.len.div_ceil(page_size())
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.addr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// ## Safety
    ///
    /// The mapping must be readable, and for shared mappings no other mapper of the same file may
    /// write to it while the slice is alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        slice::from_raw_parts(self.addr.as_ptr(), self.len)
    }

    /// ## Safety
    ///
    /// The mapping must be readable and writable, and for shared mappings no other mapper of the
    /// same file may access it while the slice is alive.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        slice::from_raw_parts_mut(self.addr.as_ptr(), self.len)
    }

    /// Resolves `offset..offset + length` to a page-aligned native range.
    fn range(&self, offset: usize, length: usize) -> Result<(NonNull<u8>, usize), Violation> {
        let out_of_range = Violation::OutOfRange {
            offset,
            length,
            mapping_len: self.len,
        };
        let end = offset
            .checked_add(length)
            .filter(|&end| offset < self.len && end <= self.len)
            .ok_or(out_of_range)?;

        // Native calls want a page-aligned start, so widen the range down to the page holding
        // `offset`.
        let start = offset - offset % page_size();

        // Safety: `start <= offset < self.len`, so the pointer stays inside the mapping.
        let addr = unsafe { NonNull::new_unchecked(self.addr.as_ptr().add(start)) };
        Ok((addr, end - start))
    }

    pub fn advise(&self, advice: Advice) -> Result<(), Error> {
        self.advise_range(0, self.len, advice)
    }

    /// Advises the kernel about `offset..offset + length`.
    ///
    /// An unaligned `offset` is widened down to the start of its page, so the advice also covers
    /// the bytes of that page before `offset`. With [`Advice::DontNeed`] on a private mapping
    /// those bytes may be discarded as well.
    pub fn advise_range(&self, offset: usize, length: usize, advice: Advice) -> Result<(), Error> {
        let (addr, length) = self.range(offset, length)?;
        log::trace!("advising {advice:?} for {length} bytes at {addr:p}");

        unsafe { V::advise_mapping(addr, length, advice.to_raw()) }
    }

    /// Writes dirty pages back to the backing file. A `blocking` sync returns once the write-back
    /// is done, otherwise once it is scheduled.
    pub fn sync(&self, blocking: bool, invalidate: bool) -> Result<(), Error> {
        self.sync_range(0, self.len, blocking, invalidate)
    }

    /// Syncs `offset..offset + length`, widened down to the start of the page holding `offset`.
    pub fn sync_range(
        &self,
        offset: usize,
        length: usize,
        blocking: bool,
        invalidate: bool,
    ) -> Result<(), Error> {
        let (addr, length) = self.range(offset, length)?;
        log::trace!("syncing {length} bytes at {addr:p} (blocking: {blocking})");

        unsafe { V::flush_mapping(addr, length, sync_flags(blocking, invalidate)) }
    }

    pub fn residency(&self) -> Result<Residency, Error> {
        let mut pages = vec![0u8; self.page_count()];
        unsafe { V::query_residency(self.addr, self.len, &mut pages)? };

        let residency = Residency {
            pages: pages.into_iter().map(|page| page & 1 != 0).collect(),
        };
        log::trace!(
            "{} of {} pages resident at {:p}",
            residency.resident(),
            residency.page_count(),
            self.addr
        );
        Ok(residency)
    }

    pub fn unmap(self) -> Result<(), Error> {
        let this = ManuallyDrop::new(self);
        log::debug!("unmapping {} bytes at {:p}", this.len, this.addr);

        // Safety: `this` is never used again and its destructor is suppressed.
        unsafe { V::release_mapping(this.addr, this.len) }
    }
}

impl<V: VirtualMemory> Drop for Mapping<V> {
    fn drop(&mut self) {
        log::debug!("releasing {} bytes at {:p}", self.len, self.addr);

        if let Err(err) = unsafe { V::release_mapping(self.addr, self.len) } {
            log::warn!("failed to release mapping at {:p}: {err}", self.addr);
        }
    }
}

/// Which pages of a mapping were resident in physical memory when it was queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residency {
    pages: Vec<bool>,
}

impl Residency {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn resident(&self) -> usize {
        self.pages.iter().filter(|&&page| page).count()
    }

    pub fn non_resident(&self) -> usize {
        self.page_count() - self.resident()
    }

    /// `(non_resident, resident)`
    pub fn counts(&self) -> (usize, usize) {
        (self.non_resident(), self.resident())
    }

    pub fn pages(&self) -> &[bool] {
        &self.pages
    }

    pub fn is_resident(&self, page: usize) -> Option<bool> {
        self.pages.get(page).copied()
    }
}

/// A slot for hosts whose buffers outlive an explicit unmap. Unmapping takes the mapping out of
/// the cell; every later use reports [`Error::Released`].
#[derive(Debug)]
pub struct MappingCell<V: VirtualMemory = Platform> {
    mapping: Option<Mapping<V>>,
}

impl<V: VirtualMemory> MappingCell<V> {
    pub fn new(mapping: Mapping<V>) -> Self {
        Self {
            mapping: Some(mapping),
        }
    }

    pub fn get(&self) -> Result<&Mapping<V>, Error> {
        self.mapping.as_ref().ok_or(Error::Released)
    }

    pub fn get_mut(&mut self) -> Result<&mut Mapping<V>, Error> {
        self.mapping.as_mut().ok_or(Error::Released)
    }

    pub fn is_released(&self) -> bool {
        self.mapping.is_none()
    }

    pub fn unmap(&mut self) -> Result<(), Error> {
        self.mapping.take().ok_or(Error::Released)?.unmap()
    }
}

impl<V: VirtualMemory> From<Mapping<V>> for MappingCell<V> {
    fn from(mapping: Mapping<V>) -> Self {
        Self::new(mapping)
    }
}
