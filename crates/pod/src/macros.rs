//! Declarative macros for identifier and flag newtypes.

#[macro_export]
macro_rules! __id {
    (
        $(
            $(#[$($ty_meta:meta)*])*
            $ty_vis:vis struct $ty:ident(u32) {
                $default:ident;
                $(
                    $(#[$($field_meta:meta)*])*
                    $field:ident = $field_value:expr;
                )*
            }
        )*
    ) => {
        $(
            $(#[$($ty_meta)*])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            #[repr(transparent)]
            $ty_vis struct $ty(u32);

            impl $ty {
                /// The sentinel for values outside the known set.
                $ty_vis const $default: Self = Self(u32::MAX);

                $(
                    $(#[$($field_meta)*])*
                    $ty_vis const $field: Self = Self($field_value);
                )*

                /// Test if the identifier is one of the known values.
                pub fn is_invalid(&self) -> bool {
                    match self.0 {
                        $($field_value => false,)*
                        _ => true,
                    }
                }

                /// Get the raw identifier value.
                #[inline]
                pub const fn into_id(self) -> u32 {
                    self.0
                }

                /// Convert a raw value into the identifier.
                #[inline]
                pub const fn from_id(value: u32) -> Self {
                    Self(value)
                }
            }

            impl $crate::RawId for $ty {
                #[inline]
                fn into_id(self) -> u32 {
                    <$ty>::into_id(self)
                }

                #[inline]
                fn from_id(value: u32) -> Self {
                    <$ty>::from_id(value)
                }
            }

            impl From<$ty> for $crate::Value {
                #[inline]
                fn from(id: $ty) -> Self {
                    $crate::Value::Id($crate::Id(id.into_id()))
                }
            }

            impl core::fmt::Debug for $ty {
                #[inline]
                fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                    match self.0 {
                        $($field_value => write!(f, "{}", stringify!($field)),)*
                        _ => write!(f, "{}({})", stringify!($default), self.0),
                    }
                }
            }
        )*
    };
}

pub use __id as id;

#[macro_export]
macro_rules! __flags {
    (
        $(
            $(#[$($ty_meta:meta)*])*
            $vis:vis struct $ty:ident($repr:ty) {
                $none:ident;
                $(
                    $(#[$($meta:meta)*])*
                    $flag:ident = $value:expr;
                )*
            }
        )*
    ) => {
        $(
            $(#[$($ty_meta)*])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash)]
            #[repr(transparent)]
            $vis struct $ty($repr);

            impl $ty {
                /// Empty flags.
                $vis const $none: Self = Self(0);

                $(
                    $(#[$($meta)*])*
                    $vis const $flag: Self = Self($value);
                )*

                /// Test if the set contains another set.
                #[inline]
                $vis fn contains(self, other: Self) -> bool {
                    (self.0 & other.0) == other.0
                }

                /// Test if the set is empty.
                #[inline]
                $vis fn is_empty(self) -> bool {
                    self.0 == 0
                }

                #[doc = concat!(" Convert the flags to a raw `", stringify!($repr), "` value.")]
                #[inline]
                $vis const fn into_raw(self) -> $repr {
                    self.0
                }

                #[doc = concat!(" Create flags from a raw `", stringify!($repr), "` value.")]
                #[inline]
                $vis const fn from_raw(value: $repr) -> Self {
                    Self(value)
                }
            }

            impl core::ops::BitOr for $ty {
                type Output = Self;

                #[inline]
                fn bitor(self, rhs: Self) -> Self::Output {
                    Self(self.0 | rhs.0)
                }
            }

            impl core::ops::BitOrAssign for $ty {
                #[inline]
                fn bitor_assign(&mut self, rhs: Self) {
                    self.0 |= rhs.0;
                }
            }

            impl core::ops::BitAnd for $ty {
                type Output = Self;

                #[inline]
                fn bitand(self, rhs: Self) -> Self::Output {
                    Self(self.0 & rhs.0)
                }
            }

            impl core::ops::BitAndAssign for $ty {
                #[inline]
                fn bitand_assign(&mut self, rhs: Self) {
                    self.0 &= rhs.0;
                }
            }

            impl core::ops::BitXorAssign for $ty {
                #[inline]
                fn bitxor_assign(&mut self, rhs: Self) {
                    self.0 ^= rhs.0;
                }
            }

            impl core::ops::Not for $ty {
                type Output = Self;

                #[inline]
                fn not(self) -> Self::Output {
                    Self(!self.0)
                }
            }

            impl Default for $ty {
                #[inline]
                fn default() -> Self {
                    Self::$none
                }
            }

            impl core::fmt::Debug for $ty {
                fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                    write!(f, "{}(", stringify!($ty))?;

                    let mut first = true;
                    let mut value = self.0;

                    $(
                        if ($value) != 0 && value & ($value) == ($value) {
                            if !first {
                                write!(f, " | ")?;
                            }

                            write!(f, "{}", stringify!($flag))?;
                            value &= !($value);
                            first = false;
                        }
                    )*

                    if value != 0 {
                        if !first {
                            write!(f, " | ")?;
                        }

                        write!(f, "0x{:x}", value)?;
                    }

                    write!(f, ")")?;
                    Ok(())
                }
            }
        )*
    };
}

pub use __flags as flags;
