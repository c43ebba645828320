use core::fmt;

use crate::{Property, Value};

/// An object value: a sequence of keyed properties.
///
/// `object_type` tags what kind of object this is (a format, a buffer
/// requirement, ...) and `object_id` carries the parameter id the object was
/// enumerated under.
#[derive(Clone, PartialEq)]
pub struct Object {
    pub object_type: u32,
    pub object_id: u32,
    pub properties: Vec<Property>,
}

impl Object {
    /// Construct a new empty object.
    #[inline]
    pub fn new(object_type: u32, object_id: u32) -> Self {
        Self {
            object_type,
            object_id,
            properties: Vec::new(),
        }
    }

    /// Find a property by key.
    pub fn find(&self, key: u32) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// Find a property value by key.
    #[inline]
    pub fn value(&self, key: u32) -> Option<&Value> {
        self.find(key).map(|p| &p.value)
    }

    /// Add a property, replacing an existing one with the same key.
    pub fn set(&mut self, property: Property) {
        if let Some(existing) = self.properties.iter_mut().find(|p| p.key == property.key) {
            *existing = property;
        } else {
            self.properties.push(property);
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.object_type)
            .field("id", &self.object_id)
            .field("properties", &self.properties)
            .finish()
    }
}
