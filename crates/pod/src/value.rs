use core::cmp::Ordering;
use core::fmt;

use crate::{Choice, ChoiceType, Fraction, Id, Object, RawId, Rectangle, Type};

/// A typed value.
#[derive(Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Id(Id),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Rectangle(Rectangle),
    Fraction(Fraction),
    Choice(Box<Choice>),
    Object(Box<Object>),
    Struct(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    /// Get the type tag of the value.
    pub fn ty(&self) -> Type {
        match self {
            Value::None => Type::NONE,
            Value::Bool(..) => Type::BOOL,
            Value::Id(..) => Type::ID,
            Value::Int(..) => Type::INT,
            Value::Long(..) => Type::LONG,
            Value::Float(..) => Type::FLOAT,
            Value::Double(..) => Type::DOUBLE,
            Value::String(..) => Type::STRING,
            Value::Bytes(..) => Type::BYTES,
            Value::Rectangle(..) => Type::RECTANGLE,
            Value::Fraction(..) => Type::FRACTION,
            Value::Choice(..) => Type::CHOICE,
            Value::Object(..) => Type::OBJECT,
            Value::Struct(..) => Type::STRUCT,
            Value::Array(..) => Type::ARRAY,
        }
    }

    /// Read the value as a boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Read the value as an identifier.
    #[inline]
    pub fn as_id<T>(&self) -> Option<T>
    where
        T: RawId,
    {
        match *self {
            Value::Id(id) => Some(T::from_id(id.0)),
            _ => None,
        }
    }

    /// Read the value as an `i32`.
    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Read the value as an `i64`.
    #[inline]
    pub fn as_long(&self) -> Option<i64> {
        match *self {
            Value::Long(v) => Some(v),
            Value::Int(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    /// Read the value as an `f32`.
    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Value::Float(v) => Some(v),
            Value::Double(v) => Some(v as f32),
            Value::Int(v) => Some(v as f32),
            _ => None,
        }
    }

    /// Read the value as a string.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Read the value as a fraction.
    #[inline]
    pub fn as_fraction(&self) -> Option<Fraction> {
        match *self {
            Value::Fraction(v) => Some(v),
            _ => None,
        }
    }

    /// Read the value as a rectangle.
    #[inline]
    pub fn as_rectangle(&self) -> Option<Rectangle> {
        match *self {
            Value::Rectangle(v) => Some(v),
            _ => None,
        }
    }

    /// Access the value as an object.
    #[inline]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Access the value as a choice.
    #[inline]
    pub fn as_choice(&self) -> Option<&Choice> {
        match self {
            Value::Choice(c) => Some(c),
            _ => None,
        }
    }

    /// View the value as a choice set: the list of raw option values and the
    /// choice type. A plain scalar is a single-value `None` choice.
    pub fn choice_values(&self) -> (&[Value], ChoiceType) {
        match self {
            Value::Choice(c) => (&c.values, c.ty),
            other => (core::slice::from_ref(other), ChoiceType::NONE),
        }
    }

    /// Compare two scalar values of the same type.
    ///
    /// Container values and mismatched types are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::None, Value::None) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => (a == b).then_some(Ordering::Equal),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Rectangle(a), Value::Rectangle(b)) => Some(a.cmp(b)),
            (Value::Fraction(a), Value::Fraction(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Test whether the value sits inside an inclusive range, honoring an
    /// optional step increment measured from `min`.
    pub fn is_in_range(&self, min: &Value, max: &Value, step: Option<&Value>) -> bool {
        let inside = matches!(
            self.compare(min),
            Some(Ordering::Greater | Ordering::Equal)
        ) && matches!(self.compare(max), Some(Ordering::Less | Ordering::Equal));

        if !inside {
            return false;
        }

        let Some(step) = step else {
            return true;
        };

        match (self, min, step) {
            (Value::Int(v), Value::Int(lo), Value::Int(s)) if *s > 0 => (v - lo) % s == 0,
            (Value::Long(v), Value::Long(lo), Value::Long(s)) if *s > 0 => (v - lo) % s == 0,
            _ => true,
        }
    }
}

impl From<Choice> for Value {
    #[inline]
    fn from(c: Choice) -> Self {
        Value::Choice(Box::new(c))
    }
}

impl From<Object> for Value {
    #[inline]
    fn from(o: Object) -> Self {
        Value::Object(Box::new(o))
    }
}

macro_rules! from_scalar {
    ($($variant:ident, $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

from_scalar! {
    Bool, bool,
    Int, i32,
    Long, i64,
    Float, f32,
    Double, f64,
    String, String,
    Rectangle, Rectangle,
    Fraction, Fraction,
    Id, Id,
}

impl From<&str> for Value {
    #[inline]
    fn from(v: &str) -> Self {
        Value::String(String::from(v))
    }
}

impl From<u32> for Value {
    #[inline]
    fn from(v: u32) -> Self {
        Value::Int(v as i32)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(v) => v.fmt(f),
            Value::Id(v) => v.fmt(f),
            Value::Int(v) => v.fmt(f),
            Value::Long(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Double(v) => v.fmt(f),
            Value::String(v) => v.fmt(f),
            Value::Bytes(v) => write!(f, "Bytes({})", v.len()),
            Value::Rectangle(v) => v.fmt(f),
            Value::Fraction(v) => v.fmt(f),
            Value::Choice(v) => v.fmt(f),
            Value::Object(v) => v.fmt(f),
            Value::Struct(v) => f.debug_tuple("Struct").field(v).finish(),
            Value::Array(v) => f.debug_tuple("Array").field(v).finish(),
        }
    }
}
