//! Typed attribute values carried by declared state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single declared-state value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Plain string.
    Str(String),
    /// Unordered set of strings.
    Set(BTreeSet<String>),
    /// Nested record.
    Record(BTreeMap<String, AttrValue>),
}

/// The type a field of an entity kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Boolean flag.
    Bool,
    /// Signed integer.
    Int,
    /// Plain string.
    String,
    /// Set of strings.
    StringSet,
    /// Nested record.
    Record,
}

impl AttrValue {
    /// Builds a set value from any string iterator.
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// An empty string set.
    #[must_use]
    pub const fn empty_set() -> Self {
        Self::Set(BTreeSet::new())
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the set content, if this is a set.
    #[must_use]
    pub const fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's type, for messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Set(_) => "set of strings",
            Self::Record(_) => "record",
        }
    }
}

impl FieldType {
    /// The value an unset optional field is equivalent to.
    #[must_use]
    pub const fn zero(self) -> AttrValue {
        match self {
            Self::Bool => AttrValue::Bool(false),
            Self::Int => AttrValue::Int(0),
            Self::String => AttrValue::Str(String::new()),
            Self::StringSet => AttrValue::Set(BTreeSet::new()),
            Self::Record => AttrValue::Record(BTreeMap::new()),
        }
    }

    /// Returns true if `value` is acceptable for this field type.
    #[must_use]
    pub const fn accepts(self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (Self::Bool, AttrValue::Bool(_))
                | (Self::Int, AttrValue::Int(_))
                | (Self::String, AttrValue::Str(_))
                | (Self::StringSet, AttrValue::Set(_))
                | (Self::Record, AttrValue::Record(_))
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "string",
            Self::StringSet => "set of strings",
            Self::Record => "record",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                write!(f, "]")
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
