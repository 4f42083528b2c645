//! Declared state of a single entity instance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::InputError;

use super::value::AttrValue;

/// The caller's intended configuration for one entity instance.
///
/// Optional fields are tracked by presence: a field that was never set is
/// absent from the map rather than holding a zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredState {
    /// Remote identifier; empty before the first create and after deletion.
    #[serde(default)]
    id: String,
    /// Field values by name.
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
}

impl DeclaredState {
    /// Creates an empty declared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a declared state from attribute values.
    #[must_use]
    pub const fn from_attributes(attributes: BTreeMap<String, AttrValue>) -> Self {
        Self {
            id: String::new(),
            attributes,
        }
    }

    /// Sets an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets the identifier, builder style.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The remote identifier, empty if not yet created.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns true once the entity has an identifier.
    #[must_use]
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Clears the identifier, marking the entity absent.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    /// All attributes in name order.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Returns true if the field was explicitly set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Sets a field.
    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Sets a string field, or removes it when `value` is `None`.
    pub fn set_opt(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(v) => self.set(name, v),
            None => {
                self.attributes.remove(name);
            }
        }
    }

    /// Removes a field.
    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.attributes.remove(name)
    }

    /// Copies a field from another state, removing it here if absent there.
    pub fn copy_from(&mut self, other: &Self, name: &str) {
        match other.get(name) {
            Some(value) => {
                self.attributes.insert(name.to_string(), value.clone());
            }
            None => {
                self.attributes.remove(name);
            }
        }
    }

    /// Returns a string field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field holds a non-string value.
    pub fn str_opt(&self, name: &str) -> Result<Option<&str>, InputError> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(name, "string", other)),
        }
    }

    /// Returns a required, non-empty string field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is absent, empty or not a string.
    pub fn str_required(&self, name: &str) -> Result<&str, InputError> {
        match self.str_opt(name)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(InputError::MissingField {
                field: name.to_string(),
            }),
        }
    }

    /// Returns a boolean field, `false` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the field holds a non-boolean value.
    pub fn bool_or_default(&self, name: &str) -> Result<bool, InputError> {
        match self.get(name) {
            None => Ok(false),
            Some(AttrValue::Bool(b)) => Ok(*b),
            Some(other) => Err(mismatch(name, "bool", other)),
        }
    }

    /// Returns a string-set field, empty when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the field holds a non-set value.
    pub fn set_or_empty(&self, name: &str) -> Result<BTreeSet<String>, InputError> {
        match self.get(name) {
            None => Ok(BTreeSet::new()),
            Some(AttrValue::Set(items)) => Ok(items.clone()),
            Some(other) => Err(mismatch(name, "set of strings", other)),
        }
    }

    /// Names of fields whose values differ from `other`, ignoring `except`.
    ///
    /// A field present on one side and absent on the other counts as changed.
    #[must_use]
    pub fn changed_fields(&self, other: &Self, except: &[&str]) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .attributes
            .keys()
            .chain(other.attributes.keys())
            .collect();

        names
            .into_iter()
            .filter(|name| !except.contains(&name.as_str()))
            .filter(|name| self.get(name) != other.get(name))
            .cloned()
            .collect()
    }
}

fn mismatch(field: &str, expected: &str, found: &AttrValue) -> InputError {
    InputError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}
