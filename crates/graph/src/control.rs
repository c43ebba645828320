//! Controllable values of a stream, derived from prop-info params.

use pod::{Choice, ChoiceType, Object, ObjectBuilder, Value};
use runtime::id;

/// The largest number of values a control carries.
pub const MAX_VALUES: usize = 64;

/// A single controllable value.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: u32,
    pub name: String,
    /// The container the value lives in, when not a plain scalar.
    pub container: Option<u32>,
    pub def: f32,
    pub min: f32,
    pub max: f32,
    pub values: Vec<f32>,
}

impl Control {
    /// Build a control from a prop-info object.
    pub fn from_prop_info(obj: &Object) -> Option<Self> {
        let id = obj
            .value(id::PropInfo::ID.into_id())?
            .as_id::<pod::Id>()?
            .0;

        let name = obj
            .value(id::PropInfo::NAME.into_id())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let container = obj
            .value(id::PropInfo::CONTAINER.into_id())
            .and_then(|v| v.as_id::<pod::Id>())
            .map(|v| v.0);

        let (def, min, max) = match obj.value(id::PropInfo::TYPE.into_id()) {
            Some(Value::Choice(c)) if c.ty == ChoiceType::RANGE => (
                c.default_value().and_then(Value::as_float)?,
                c.min().and_then(Value::as_float)?,
                c.max().and_then(Value::as_float)?,
            ),
            Some(v) => {
                let def = v.as_float()?;
                (def, def, def)
            }
            None => return None,
        };

        Some(Self {
            id,
            name,
            container,
            def,
            min,
            max,
            values: vec![def],
        })
    }

    /// Update the current values, clamping into the control's range.
    ///
    /// Returns `false` when the value count exceeds the supported maximum.
    pub fn set_values(&mut self, values: &[f32]) -> bool {
        if values.len() > MAX_VALUES {
            return false;
        }

        self.values.clear();
        self.values
            .extend(values.iter().map(|v| v.clamp(self.min, self.max)));
        true
    }

    /// Build the props object that writes this control back.
    pub fn to_props(&self) -> Value {
        let mut builder = ObjectBuilder::new(
            id::ObjectType::PROPS.into_id(),
            id::Param::PROPS.into_id(),
        );

        builder = if self.container.is_some() || self.values.len() > 1 {
            builder.property(
                self.id,
                Value::Array(self.values.iter().map(|v| Value::Float(*v)).collect()),
            )
        } else {
            builder.property(self.id, Value::Float(self.values[0]))
        };

        builder.build_value()
    }
}

/// Build a prop-info object describing a float control.
pub fn prop_info(id_value: u32, name: &str, def: f32, min: f32, max: f32) -> Value {
    ObjectBuilder::new(
        id::ObjectType::PROP_INFO.into_id(),
        id::Param::PROP_INFO.into_id(),
    )
    .property(id::PropInfo::ID.into_id(), pod::Id(id_value))
    .property(id::PropInfo::NAME.into_id(), name)
    .property(
        id::PropInfo::TYPE.into_id(),
        Value::from(Choice::new(
            ChoiceType::RANGE,
            vec![Value::Float(def), Value::Float(min), Value::Float(max)],
        )),
    )
    .build_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_from_prop_info() {
        let info = prop_info(0x10003, "volume", 1.0, 0.0, 4.0);
        let control = Control::from_prop_info(info.as_object().unwrap()).unwrap();

        assert_eq!(control.id, 0x10003);
        assert_eq!(control.name, "volume");
        assert_eq!(control.def, 1.0);
        assert_eq!(control.values, [1.0]);
    }

    #[test]
    fn set_values_round_trips_through_props() {
        let info = prop_info(0x10003, "volume", 1.0, 0.0, 4.0);
        let mut control = Control::from_prop_info(info.as_object().unwrap()).unwrap();

        assert!(control.set_values(&[0.5]));

        let props = control.to_props();
        let value = props.as_object().unwrap().value(0x10003).unwrap();
        assert_eq!(value.as_float(), Some(0.5));
    }

    #[test]
    fn values_clamp_to_range() {
        let info = prop_info(1, "gain", 1.0, 0.0, 2.0);
        let mut control = Control::from_prop_info(info.as_object().unwrap()).unwrap();

        control.set_values(&[9.0]);
        assert_eq!(control.values, [2.0]);
    }
}
