use core::fmt;

/// A raw identifier value.
///
/// Identifier newtypes declared through [`crate::macros::id!`] implement this
/// so they can be stored in and read back out of values generically.
pub trait RawId: Copy {
    /// Convert the identifier into its raw value.
    fn into_id(self) -> u32;

    /// Convert a raw value into the identifier.
    fn from_id(value: u32) -> Self;
}

/// An enumerated identifier.
///
/// Unlike [`crate::Value::Int`], identifiers only compare for equality and
/// never form ranges.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Id(pub u32);

impl Id {
    /// The invalid identifier.
    pub const INVALID: Self = Self(u32::MAX);
}

impl RawId for Id {
    #[inline]
    fn into_id(self) -> u32 {
        self.0
    }

    #[inline]
    fn from_id(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Id {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}
