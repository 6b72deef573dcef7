use std::ffi::c_int;

use bitflags::bitflags;

use crate::sys::consts;

bitflags! {
    /// Page protection of a mapping. The empty set is `PROT_NONE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: c_int {
        const READ = consts::PROT_READ;
        const WRITE = consts::PROT_WRITE;
        const EXEC = consts::PROT_EXEC;
    }

    /// Sharing mode and creation hints of a mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: c_int {
        /// Writes reach the backing file and every other mapping of it.
        const SHARED = consts::MAP_SHARED;
        /// Writes are copy-on-write and stay private to this mapping.
        const PRIVATE = consts::MAP_PRIVATE;
        /// Zero-filled memory with no backing file.
        const ANONYMOUS = consts::MAP_ANONYMOUS;
        #[cfg(any(target_os = "linux", target_os = "android"))]
        const NONBLOCK = consts::MAP_NONBLOCK;
        #[cfg(any(target_os = "linux", target_os = "android"))]
        const POPULATE = consts::MAP_POPULATE;
    }
}

impl Protection {
    pub const NONE: Self = Self::empty();
}

/// An access-pattern hint. Advice never changes the contents of shared or file-backed pages,
/// with the exception of [`Advice::DontNeed`] on private mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Advice {
    #[default]
    Normal,
    Random,
    Sequential,
    WillNeed,
    DontNeed,
}

impl Advice {
    pub const ALL: [Advice; 5] = [
        Advice::Normal,
        Advice::Random,
        Advice::Sequential,
        Advice::WillNeed,
        Advice::DontNeed,
    ];

    pub fn from_raw(advice: c_int) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.to_raw() == advice)
    }

    pub fn to_raw(self) -> c_int {
        match self {
            Advice::Normal => consts::MADV_NORMAL,
            Advice::Random => consts::MADV_RANDOM,
            Advice::Sequential => consts::MADV_SEQUENTIAL,
            Advice::WillNeed => consts::MADV_WILLNEED,
            Advice::DontNeed => consts::MADV_DONTNEED,
        }
    }
}

pub(crate) fn sync_flags(blocking: bool, invalidate: bool) -> c_int {
    let mut flags = if blocking {
        consts::MS_SYNC
    } else {
        consts::MS_ASYNC
    };
    if invalidate {
        flags |= consts::MS_INVALIDATE;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advice_round_trips_through_raw_values() {
        for advice in Advice::ALL {
            assert_eq!(Advice::from_raw(advice.to_raw()), Some(advice));
        }
        assert_eq!(Advice::from_raw(-1), None);
    }

    #[test]
    fn protection_rejects_foreign_bits() {
        assert_eq!(Protection::from_bits(0), Some(Protection::NONE));
        assert_eq!(
            Protection::from_bits(consts::PROT_READ | consts::PROT_WRITE),
            Some(Protection::READ | Protection::WRITE)
        );
        assert_eq!(Protection::from_bits(0x100), None);
    }

    #[test]
    fn sync_flags_pick_one_mode() {
        assert_eq!(sync_flags(true, false), consts::MS_SYNC);
        assert_eq!(sync_flags(false, false), consts::MS_ASYNC);
        assert_eq!(
            sync_flags(true, true),
            consts::MS_SYNC | consts::MS_INVALIDATE
        );
    }
}
