//! Keyword options accepted by `Block::set`.
//!
//! Options arrive as a JSON object, either from Rust callers, from a
//! configuration file or from a remote client. Each layer takes the keys it
//! understands; whatever is left when [`Options::finish`] runs is an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build options from a JSON document, which must be an object.
    pub fn from_json(value: Value) -> ControlResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(ControlError::config(format!(
                "options must be an object, got {other}"
            ))),
        }
    }

    /// Add an option, replacing any previous value for `key`.
    ///
    /// Non-finite floats have no JSON form and are stored as `null`.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Add an option from any serializable value, such as a [`BlockKind`].
    ///
    /// [`BlockKind`]: crate::BlockKind
    pub fn try_with(mut self, key: &str, value: impl Serialize) -> ControlResult<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| ControlError::config(format!("option '{key}': {e}")))?;
        self.0.insert(key.to_string(), value);
        Ok(self)
    }

    /// Remove `key` and decode it as `T`.
    pub fn take<T: DeserializeOwned>(&mut self, key: &str) -> ControlResult<Option<T>> {
        match self.0.remove(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ControlError::config(format!("option '{key}': {e}"))),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Fail if any option was left unprocessed.
    pub fn finish(self) -> ControlResult<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let keys: Vec<&str> = self.keys().collect();
        Err(ControlError::config(format!(
            "unrecognized option(s): {}",
            keys.join(", ")
        )))
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
