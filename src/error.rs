use std::{error, ffi::c_int, fmt, io};

/// A raw OS error code, as reported by `errno` on unix or `GetLastError` on Windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemError(i32);

impl error::Error for SystemError {}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system error {}: {}",
            self.0,
            io::Error::from_raw_os_error(self.0)
        )
    }
}

impl SystemError {
    pub(crate) fn from_errno() -> Self {
        // `last_os_error` reads `errno` on unix and `GetLastError` on Windows, both of which are
        // thread-local.
        Self(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    pub const fn from_code(code: i32) -> Self {
        Self(code)
    }

    pub fn code(&self) -> i32 {
        self.0
    }
}

/// The operation during which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Map,
    Unmap,
    Sync,
    Advise,
    Residency,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Map => "mmap",
            Operation::Unmap => "munmap",
            Operation::Sync => "msync",
            Operation::Advise => "madvise",
            Operation::Residency => "mincore",
        })
    }
}

/// An argument contract violation, detected before any call into the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    ZeroLength,
    NegativeSize(i64),
    NegativeOffset(i64),
    ProtectionBits(c_int),
    FlagBits(c_int),
    /// Exactly one of the shared and private flags must be given.
    SharingMode(c_int),
    AnonymousWithDescriptor(c_int),
    AnonymousWithOffset(u64),
    MissingDescriptor,
    OffsetTooLarge(u64),
    UnknownAdvice(c_int),
    OutOfRange {
        offset: usize,
        length: usize,
        mapping_len: usize,
    },
    ResidencyBuffer {
        needed: usize,
        given: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Violation::ZeroLength => f.write_str("mapping length must be greater than zero"),
            Violation::NegativeSize(size) => write!(f, "negative mapping size {size}"),
            Violation::NegativeOffset(offset) => write!(f, "negative mapping offset {offset}"),
            Violation::ProtectionBits(bits) => {
                write!(f, "protection {bits:#x} has bits outside of read, write and execute")
            }
            Violation::FlagBits(bits) => write!(f, "unsupported mapping flags {bits:#x}"),
            Violation::SharingMode(bits) => write!(
                f,
                "mapping flags {bits:#x} must contain exactly one of shared or private"
            ),
            Violation::AnonymousWithDescriptor(fd) => {
                write!(f, "anonymous mapping given file descriptor {fd}")
            }
            Violation::AnonymousWithOffset(offset) => {
                write!(f, "anonymous mapping given non-zero offset {offset}")
            }
            Violation::MissingDescriptor => f.write_str("file mapping requires a file descriptor"),
            Violation::OffsetTooLarge(offset) => {
                write!(f, "offset {offset} does not fit the platform's file offset type")
            }
            Violation::UnknownAdvice(advice) => write!(f, "unknown advice value {advice}"),
            Violation::OutOfRange {
                offset,
                length,
                mapping_len,
            } => write!(
                f,
                "range {offset}+{length} lies outside of mapping of {mapping_len} bytes"
            ),
            Violation::ResidencyBuffer { needed, given } => write!(
                f,
                "residency buffer holds {given} pages but the range spans {needed}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidArgument(Violation),
    System {
        op: Operation,
        source: SystemError,
    },
    /// The host platform has no way to perform the operation.
    Unsupported(Operation),
    /// The mapping held by a [`MappingCell`](crate::MappingCell) has already been released.
    Released,
}

impl Error {
    pub(crate) fn last_os_error(op: Operation) -> Self {
        Error::System {
            op,
            source: SystemError::from_errno(),
        }
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::System { source, .. } => Some(source.code()),
            _ => None,
        }
    }

    /// Whether the error is the caller's fault rather than the operating system's.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::Released)
    }
}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Self {
        Error::InvalidArgument(violation)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::System { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(violation) => write!(f, "invalid argument: {violation}"),
            Error::System { op, source } => write!(f, "{op}() failed: {source}"),
            Error::Unsupported(op) => write!(f, "{op}() is not supported on this platform"),
            Error::Released => f.write_str("mapping has already been released"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_errors_keep_their_code() {
        let err = Error::System {
            op: Operation::Sync,
            source: SystemError::from_code(22),
        };

        assert_eq!(err.raw_os_error(), Some(22));
        assert!(!err.is_contract_violation());
        assert!(err.to_string().starts_with("msync() failed: system error 22"));
        assert!(error::Error::source(&err).is_some());
    }

    #[test]
    fn violations_are_contract_errors() {
        let err = Error::from(Violation::MissingDescriptor);

        assert!(err.is_contract_violation());
        assert!(Error::Released.is_contract_violation());
        assert_eq!(err.raw_os_error(), None);
    }
}
