use core::fmt;

use crate::{Type, Value};

/// The type of a choice.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ChoiceType(u32);

impl ChoiceType {
    /// Only the first value is a valid option.
    pub const NONE: Self = Self(0);
    /// The first value is a default, options are between the second and third
    /// value.
    pub const RANGE: Self = Self(1);
    /// Like a range, but options step from the second value in increments of
    /// the fourth.
    pub const STEP: Self = Self(2);
    /// The first value is a default, options are any value from the list,
    /// preferred values come first.
    pub const ENUM: Self = Self(3);
    /// The first value is a default, options are any combination of the listed
    /// flag bits.
    pub const FLAGS: Self = Self(4);
}

impl fmt::Debug for ChoiceType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "None"),
            1 => write!(f, "Range"),
            2 => write!(f, "Step"),
            3 => write!(f, "Enum"),
            4 => write!(f, "Flags"),
            _ => write!(f, "Unknown({})", self.0),
        }
    }
}

/// A constrained value.
///
/// All values in a choice share the same scalar type. The layout of the value
/// list depends on [`ChoiceType`]: ranges are `[default, min, max]`, steps are
/// `[default, min, max, step]`, enums and flags are `[default,
/// alternative...]`.
#[derive(Clone, PartialEq)]
pub struct Choice {
    pub ty: ChoiceType,
    pub values: Vec<Value>,
}

impl Choice {
    /// Construct a new choice.
    #[inline]
    pub fn new(ty: ChoiceType, values: Vec<Value>) -> Self {
        Self { ty, values }
    }

    /// The scalar type of the choice values.
    #[inline]
    pub fn child_type(&self) -> Type {
        self.values.first().map(Value::ty).unwrap_or(Type::NONE)
    }

    /// The default value of the choice.
    #[inline]
    pub fn default_value(&self) -> Option<&Value> {
        self.values.first()
    }

    /// The lower bound of a range or step choice.
    #[inline]
    pub fn min(&self) -> Option<&Value> {
        self.values.get(1)
    }

    /// The upper bound of a range or step choice.
    #[inline]
    pub fn max(&self) -> Option<&Value> {
        self.values.get(2)
    }

    /// The increment of a step choice.
    #[inline]
    pub fn step(&self) -> Option<&Value> {
        if self.ty == ChoiceType::STEP {
            self.values.get(3)
        } else {
            None
        }
    }

    /// Whether the choice describes a non-empty, well-formed set of options.
    ///
    /// A range or step whose bounds are inverted is not valid, nor is any
    /// choice without values.
    pub fn is_valid(&self) -> bool {
        let Some(first) = self.values.first() else {
            return false;
        };

        match self.ty {
            ChoiceType::RANGE | ChoiceType::STEP => {
                let (Some(min), Some(max)) = (self.min(), self.max()) else {
                    return false;
                };

                matches!(
                    min.compare(max),
                    Some(core::cmp::Ordering::Less | core::cmp::Ordering::Equal)
                )
            }
            _ => {
                let ty = first.ty();
                self.values.iter().all(|v| v.ty() == ty)
            }
        }
    }
}

impl fmt::Debug for Choice {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.ty, self.values)
    }
}
