use crate::{Choice, ChoiceType, Object, Property, PropertyFlags, Value};

/// Fluent construction of [`Object`] values.
///
/// # Examples
///
/// ```
/// use pod::{ObjectBuilder, Value};
///
/// let obj = ObjectBuilder::new(3, 7)
///     .property(1, 44100i32)
///     .property_enum(2, 2i32, [1i32, 2, 6, 8])
///     .build();
///
/// assert_eq!(obj.value(1), Some(&Value::Int(44100)));
/// ```
pub struct ObjectBuilder {
    object: Object,
}

impl ObjectBuilder {
    /// Start a new object.
    #[inline]
    pub fn new(object_type: u32, object_id: u32) -> Self {
        Self {
            object: Object::new(object_type, object_id),
        }
    }

    /// Add a plain property.
    pub fn property(mut self, key: u32, value: impl Into<Value>) -> Self {
        self.object.set(Property::new(key, value.into()));
        self
    }

    /// Add a property with flags.
    pub fn property_flags(
        mut self,
        key: u32,
        flags: PropertyFlags,
        value: impl Into<Value>,
    ) -> Self {
        self.object.set(Property::with_flags(key, flags, value.into()));
        self
    }

    /// Add an enum choice property with the given default and alternatives.
    pub fn property_enum<V>(
        self,
        key: u32,
        default: impl Into<Value>,
        alternatives: impl IntoIterator<Item = V>,
    ) -> Self
    where
        V: Into<Value>,
    {
        let mut values = vec![default.into()];
        values.extend(alternatives.into_iter().map(Into::into));
        self.property(key, Value::from(Choice::new(ChoiceType::ENUM, values)))
    }

    /// Add a range choice property.
    pub fn property_range(
        self,
        key: u32,
        default: impl Into<Value>,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        self.property(
            key,
            Value::from(Choice::new(
                ChoiceType::RANGE,
                vec![default.into(), min.into(), max.into()],
            )),
        )
    }

    /// Add a flags choice property.
    pub fn property_choice_flags(self, key: u32, bits: impl Into<Value>) -> Self {
        self.property(
            key,
            Value::from(Choice::new(ChoiceType::FLAGS, vec![bits.into()])),
        )
    }

    /// Finish the object.
    #[inline]
    pub fn build(self) -> Object {
        self.object
    }

    /// Finish the object as a [`Value`].
    #[inline]
    pub fn build_value(self) -> Value {
        Value::from(self.object)
    }
}
