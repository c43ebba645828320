use core::fmt;
use core::mem;

use std::collections::BTreeMap;
use std::collections::btree_map;

use crate::Prop;

/// Collection of properties.
#[derive(Default, Clone)]
pub struct Properties {
    properties: BTreeMap<String, String>,
    modified: bool,
}

impl Properties {
    /// Create a new empty collection of properties.
    pub const fn new() -> Self {
        Self {
            properties: BTreeMap::new(),
            modified: false,
        }
    }

    /// Test if the properties collection has been modified.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Take the modification state of the properties.
    pub fn take_modified(&mut self) -> bool {
        mem::take(&mut self.modified)
    }

    /// Get the number of properties in the collection.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Test if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterate over the properties in the collection.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert a property into the collection.
    ///
    /// Returns `true` if the collection was modified.
    pub fn insert(&mut self, key: impl AsRef<Prop>, value: impl AsRef<str>) -> bool {
        let key = key.as_ref().as_str();
        let value = value.as_ref();

        let old = self
            .properties
            .insert(String::from(key), String::from(value));

        let Some(old) = old else {
            self.modified = true;
            return true;
        };

        if old == value {
            return false;
        }

        self.modified = true;
        true
    }

    /// Remove and return a property by its key.
    pub fn remove(&mut self, key: impl AsRef<Prop>) -> Option<String> {
        let value = self.properties.remove(key.as_ref().as_str());
        self.modified |= value.is_some();
        value
    }

    /// Get the value of a property by its key.
    pub fn get(&self, key: impl AsRef<Prop>) -> Option<&str> {
        self.properties
            .get(key.as_ref().as_str())
            .map(|s| s.as_str())
    }

    /// Get a property parsed into another type.
    pub fn parse<T>(&self, key: impl AsRef<Prop>) -> Option<T>
    where
        T: core::str::FromStr,
    {
        self.get(key)?.parse().ok()
    }

    /// Get a boolean property, treating `"true"` and `"1"` as true.
    pub fn get_bool(&self, key: impl AsRef<Prop>, default: bool) -> bool {
        match self.get(key) {
            Some(v) => v == "true" || v == "1",
            None => default,
        }
    }

    /// Get a fraction property of the form `"num/denom"`.
    ///
    /// A bare number is treated as `num/1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use runtime::Properties;
    ///
    /// let mut props = Properties::new();
    /// props.insert("node.latency", "1024/48000");
    /// props.insert("node.rate", "48000");
    ///
    /// assert_eq!(props.get_fraction("node.latency"), Some((1024, 48000)));
    /// assert_eq!(props.get_fraction("node.rate"), Some((48000, 1)));
    /// ```
    pub fn get_fraction(&self, key: impl AsRef<Prop>) -> Option<(u32, u32)> {
        let value = self.get(key)?;

        match value.split_once('/') {
            Some((num, denom)) => Some((num.parse().ok()?, denom.parse().ok()?)),
            None => Some((value.parse().ok()?, 1)),
        }
    }

    /// Extend this collection of properties with another.
    ///
    /// Returns `true` if any properties were added or modified.
    ///
    /// # Examples
    ///
    /// ```
    /// use runtime::Properties;
    ///
    /// let mut props = Properties::new();
    /// props.insert("key1", "value1");
    ///
    /// let mut other = Properties::new();
    /// other.insert("key2", "value2");
    ///
    /// assert!(props.extend(&other));
    /// assert_eq!(props.len(), 2);
    /// assert_eq!(props.get("key1"), Some("value1"));
    /// assert_eq!(props.get("key2"), Some("value2"));
    ///
    /// assert!(!props.extend(&other));
    /// ```
    pub fn extend<K, V>(&mut self, iter: impl IntoIterator<Item = (K, V)>) -> bool
    where
        K: AsRef<Prop>,
        V: AsRef<str>,
    {
        let mut modified = false;

        for (key, value) in iter {
            modified |= self.insert(key, value);
        }

        modified
    }
}

impl fmt::Debug for Properties {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.properties.fmt(f)
    }
}

/// The iterator produced by iterating over a borrowed [`Properties`].
pub type Iter<'a> = core::iter::Map<
    btree_map::Iter<'a, String, String>,
    fn((&'a String, &'a String)) -> (&'a str, &'a str),
>;

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: AsRef<Prop>,
    V: AsRef<str>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut props = Properties::new();
        props.extend(iter);
        props.take_modified();
        props
    }
}
