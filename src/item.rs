//! Uniform field access over heterogeneous item shapes
//!
//! The pipeline reads the URL field and writes the result field through
//! [`ItemAdapter`], so it works the same on plain maps, schema-declared items
//! and typed structs.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// The item cannot hold the requested field
#[derive(Debug, thiserror::Error)]
#[error("{item} does not support field '{field}'")]
pub struct UnsupportedField {
    /// Item kind
    pub item: String,
    /// Field that was rejected
    pub field: String,
}

/// Get/set access to named item fields
pub trait ItemAdapter: Send + Sync {
    /// Value of `field`, `None` when absent
    fn get_field(&self, field: &str) -> Option<Value>;

    /// Store `value` under `field`
    fn set_field(&mut self, field: &str, value: Value) -> Result<(), UnsupportedField>;
}

impl ItemAdapter for Map<String, Value> {
    fn get_field(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), UnsupportedField> {
        self.insert(field.to_string(), value);
        Ok(())
    }
}

impl ItemAdapter for HashMap<String, Value> {
    fn get_field(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), UnsupportedField> {
        self.insert(field.to_string(), value);
        Ok(())
    }
}

/// An item with a fixed set of declared fields
///
/// Reading an undeclared or unset field yields `None`; writing an undeclared
/// field fails.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaItem {
    name: String,
    fields: BTreeSet<String>,
    values: Map<String, Value>,
}

impl SchemaItem {
    /// An empty item declaring `fields`
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            values: Map::new(),
        }
    }

    /// Builder-style [`ItemAdapter::set_field`]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self, UnsupportedField> {
        self.set_field(field, value.into())?;
        Ok(self)
    }

    /// Whether `field` is declared
    pub fn declares(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Set values as a JSON object
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

impl ItemAdapter for SchemaItem {
    fn get_field(&self, field: &str) -> Option<Value> {
        self.values.get(field).cloned()
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), UnsupportedField> {
        if !self.declares(field) {
            return Err(UnsupportedField {
                item: self.name.clone(),
                field: field.to_string(),
            });
        }
        self.values.insert(field.to_string(), value);
        Ok(())
    }
}

/// A typed struct accessed field-by-field through its serde representation
///
/// Only fields that appear in the serialized form can be set, and the new
/// value must deserialize back into `T`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SerdeItem<T>(pub T);

impl<T> SerdeItem<T> {
    /// Unwrap the typed value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> SerdeItem<T>
where
    T: Serialize,
{
    fn as_object(&self) -> Option<Map<String, Value>> {
        match serde_json::to_value(&self.0) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

impl<T> ItemAdapter for SerdeItem<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn get_field(&self, field: &str) -> Option<Value> {
        self.as_object()?.remove(field)
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), UnsupportedField> {
        let unsupported = || UnsupportedField {
            item: std::any::type_name::<T>().to_string(),
            field: field.to_string(),
        };
        let mut map = self.as_object().ok_or_else(unsupported)?;
        if !map.contains_key(field) {
            return Err(unsupported());
        }
        map.insert(field.to_string(), value);
        self.0 = serde_json::from_value(Value::Object(map)).map_err(|_| unsupported())?;
        Ok(())
    }
}
