//! Named signal table.

use std::collections::HashMap;

use cf_core::SignalValue;

use crate::error::{ControlError, ControlResult};

/// Mapping from signal name to current value.
///
/// Lookups are hashed; insertion order is kept separately so listings are
/// stable.
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    values: HashMap<String, SignalValue>,
    order: Vec<String>,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signal initialised to scalar zero.
    pub fn add(&mut self, name: &str) -> ControlResult<()> {
        self.add_with(name, SignalValue::default())
    }

    /// Add a signal with an initial value. Names must be unique.
    pub fn add_with(&mut self, name: &str, value: SignalValue) -> ControlResult<()> {
        if self.values.contains_key(name) {
            return Err(ControlError::duplicate("signal", name));
        }
        self.values.insert(name.to_string(), value);
        self.order.push(name.to_string());
        Ok(())
    }

    /// Overwrite an existing signal.
    pub fn set(&mut self, name: &str, value: SignalValue) -> ControlResult<()> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ControlError::not_found("signal", name)),
        }
    }

    /// Get a signal's value.
    pub fn get(&self, name: &str) -> ControlResult<&SignalValue> {
        self.values
            .get(name)
            .ok_or_else(|| ControlError::not_found("signal", name))
    }

    /// Remove a signal and return its last value.
    pub fn remove(&mut self, name: &str) -> ControlResult<SignalValue> {
        let value = self
            .values
            .remove(name)
            .ok_or_else(|| ControlError::not_found("signal", name))?;
        self.order.retain(|n| n != name);
        Ok(value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Signal names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Collect the current values of `names`, in order.
    pub fn gather(&self, names: &[String]) -> ControlResult<Vec<SignalValue>> {
        names.iter().map(|n| self.get(n).cloned()).collect()
    }

    /// Store `values` into `names`, which must have the same length.
    pub fn assign(&mut self, names: &[String], values: Vec<SignalValue>) -> ControlResult<()> {
        if names.len() != values.len() {
            return Err(ControlError::shape(format!(
                "block produced {} value(s) for {} output signal(s)",
                values.len(),
                names.len()
            )));
        }
        for (name, value) in names.iter().zip(values) {
            self.set(name, value)?;
        }
        Ok(())
    }
}
