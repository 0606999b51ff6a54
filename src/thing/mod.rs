//! Thing description model
//!
//! A thing description enumerates the interaction affordances of a device:
//! properties that can be read (and sometimes written), actions that run
//! asynchronously, and events that clients can subscribe to. Descriptions are
//! loaded from JSON; validating them beyond what binding needs is left to
//! whoever produces them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Declared data type of an affordance value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
    Null,
    /// Anything goes; also used for type names this gateway does not know
    #[default]
    #[serde(other)]
    Any,
}

impl DataType {
    /// Whether a decoded value conforms to this type
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Boolean => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Null => value.is_null(),
        }
    }

    /// Initial value for a freshly created property of this type
    #[must_use]
    pub fn zero_value(self) -> Value {
        match self {
            Self::Boolean => Value::Bool(false),
            Self::Integer | Self::Number => Value::from(0),
            Self::String => Value::String(String::new()),
            Self::Object => Value::Object(serde_json::Map::new()),
            Self::Array => Value::Array(Vec::new()),
            Self::Null | Self::Any => Value::Null,
        }
    }

    /// Name used in diagnostics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
            Self::Any => "any",
        }
    }

    /// Name of the JSON kind a value actually has
    #[must_use]
    pub const fn kind_of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A readable (and optionally writable) device property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    #[serde(default)]
    pub hrefs: Vec<String>,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub value_type: DataType,
}

/// A long-running operation the device can execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub hrefs: Vec<String>,
    #[serde(default)]
    pub input_type: DataType,
    #[serde(default)]
    pub output_type: DataType,
}

/// A notification the device emits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub hrefs: Vec<String>,
    #[serde(default)]
    pub value_type: DataType,
}

/// Common view over the three affordance kinds
pub trait Affordance {
    /// Declared affordance name
    fn name(&self) -> &str;

    /// Declared relative paths
    fn hrefs(&self) -> &[String];

    /// Path segment used for routing: the first href, or the name when
    /// no usable href is declared
    fn primary_href(&self) -> &str {
        self.hrefs()
            .first()
            .map(|href| href.trim_matches('/'))
            .filter(|href| !href.is_empty())
            .unwrap_or_else(|| self.name().trim_matches('/'))
    }
}

macro_rules! impl_affordance {
    ($($ty:ty),*) => {
        $(impl Affordance for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn hrefs(&self) -> &[String] {
                &self.hrefs
            }
        })*
    };
}

impl_affordance!(Property, Action, Event);

/// Declarative schema of a thing's affordances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingDescription {
    pub name: String,
    /// URLs the thing is reachable at, filled in as protocol bindings are made
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl ThingDescription {
    /// Parse a description from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid description
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a description from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Look up a property by name
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up an action by name
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Look up an event by name
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }
}
