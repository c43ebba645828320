use core::fmt;

use crate::Value;

crate::macros::flags! {
    /// Flags on an object property.
    pub struct PropertyFlags(u32) {
        NONE;
        /// The property must be matched by the other operand when filtering.
        MANDATORY = 1 << 3;
        /// The property is dropped from filter results.
        DROP = 1 << 4;
        /// The property is never collapsed to its default when fixating.
        DONT_FIXATE = 1 << 5;
    }
}

/// A keyed property of an [`crate::Object`].
#[derive(Clone, PartialEq)]
pub struct Property {
    pub key: u32,
    pub flags: PropertyFlags,
    pub value: Value,
}

impl Property {
    /// Construct a new property.
    #[inline]
    pub fn new(key: u32, value: Value) -> Self {
        Self {
            key,
            flags: PropertyFlags::NONE,
            value,
        }
    }

    /// Construct a new property with flags.
    #[inline]
    pub fn with_flags(key: u32, flags: PropertyFlags, value: Value) -> Self {
        Self { key, flags, value }
    }
}

impl fmt::Debug for Property {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.key, self.value)
    }
}
