use core::error;
use core::fmt;

use std::io;

/// The error taxonomy of the graph.
///
/// Hot paths carry these as negative errno-style integers; the control plane
/// wraps them in anyhow chains. The variants map one-to-one onto POSIX codes
/// so both representations stay interchangeable.
#[derive(Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input: bad param shape, unknown id, wrong direction.
    Invalid,
    /// Valid request the implementation can not fulfill.
    NotSupported,
    /// A precondition is not met: already connected, buffer still held.
    Busy,
    /// Lookup miss: unknown port id, param not found.
    NoEntity,
    /// A limit was exceeded: buffer count, port count.
    NoSpace,
    /// The implementation disconnected or an fd operation failed.
    Io,
    /// Upstream hangup.
    Pipe,
    /// Transport sync did not converge in time.
    Timeout,
    /// Required argument was absent.
    Fault,
}

impl Error {
    /// The errno value of the error.
    pub const fn errno(self) -> i32 {
        match self {
            Error::Invalid => libc::EINVAL,
            Error::NotSupported => libc::ENOTSUP,
            Error::Busy => libc::EBUSY,
            Error::NoEntity => libc::ENOENT,
            Error::NoSpace => libc::ENOSPC,
            Error::Io => libc::EIO,
            Error::Pipe => libc::EPIPE,
            Error::Timeout => libc::ETIMEDOUT,
            Error::Fault => libc::EFAULT,
        }
    }

    /// The negative status value the data path uses for the error.
    #[inline]
    pub const fn status(self) -> i32 {
        -self.errno()
    }

    /// Recover an error from a negative status value.
    pub fn from_status(status: i32) -> Option<Self> {
        match -status {
            libc::EINVAL => Some(Error::Invalid),
            libc::ENOTSUP => Some(Error::NotSupported),
            libc::EBUSY => Some(Error::Busy),
            libc::ENOENT => Some(Error::NoEntity),
            libc::ENOSPC => Some(Error::NoSpace),
            libc::EIO => Some(Error::Io),
            libc::EPIPE => Some(Error::Pipe),
            libc::ETIMEDOUT => Some(Error::Timeout),
            libc::EFAULT => Some(Error::Fault),
            _ => None,
        }
    }
}

impl error::Error for Error {}

impl fmt::Debug for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Invalid => write!(f, "Invalid argument"),
            Error::NotSupported => write!(f, "Not supported"),
            Error::Busy => write!(f, "Busy"),
            Error::NoEntity => write!(f, "No such entity"),
            Error::NoSpace => write!(f, "No space left"),
            Error::Io => write!(f, "I/O error"),
            Error::Pipe => write!(f, "Broken pipe"),
            Error::Timeout => write!(f, "Timed out"),
            Error::Fault => write!(f, "Bad address"),
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(_: io::Error) -> Self {
        Error::Io
    }
}
