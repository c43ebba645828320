use core::error;
use core::fmt;

use crate::Type;

#[non_exhaustive]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    /// The two operands of a filter cannot be combined.
    #[inline]
    pub fn is_not_supported(&self) -> bool {
        matches!(self.kind, ErrorKind::NotSupported)
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    /// The intersection of the two operands is empty or an operand is
    /// malformed.
    Invalid,
    /// The combination of choice types is not supported.
    NotSupported,
    /// The operand types do not line up.
    TypeMismatch(Type, Type),
}

impl error::Error for Error {}

impl fmt::Debug for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Invalid => write!(f, "Empty or malformed intersection"),
            ErrorKind::NotSupported => write!(f, "Unsupported choice combination"),
            ErrorKind::TypeMismatch(a, b) => write!(f, "Type mismatch: {a} and {b}"),
        }
    }
}
