//! Block abstraction.
//!
//! Blocks are the processing elements of a controller:
//! - **Sources**: Produce signals from outside the controller (clock, encoders)
//! - **Filters**: Compute signals from other signals (gains, models)
//! - **Sinks**: Consume signals for an external effect (motors, loggers)
//!
//! Staging inputs (`write`) is separate from producing outputs (`read`) so that
//! composite blocks such as [`Feedback`](crate::Feedback) can drive a wrapped
//! block without knowing anything about the signal graph.

use std::fmt;
use std::ops::BitOr;

use cf_core::SignalValue;

use crate::error::ControlResult;
use crate::options::Options;

/// Roles a block can play in a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const SOURCE: Self = Self(0b001);
    pub const FILTER: Self = Self(0b010);
    pub const SINK: Self = Self(0b100);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if this block can act as a source (generates signals).
    pub fn is_source(self) -> bool {
        self.contains(Self::SOURCE)
    }

    /// Check if this block can act as a filter (transforms signals).
    pub fn is_filter(self) -> bool {
        self.contains(Self::FILTER)
    }

    /// Check if this block can act as a sink (consumes signals).
    pub fn is_sink(self) -> bool {
        self.contains(Self::SINK)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A unit of computation in the controller.
///
/// Sources only implement `read`, sinks only implement `write`, filters
/// implement both. Blocks are owned by the controller and evaluated on the
/// scheduling thread, hence `Send`.
pub trait Block: Send + fmt::Debug {
    /// Short type name used in listings.
    fn type_name(&self) -> &'static str;

    /// Roles this block supports.
    fn capabilities(&self) -> Capabilities;

    /// Stage input values for the next `read`.
    fn write(&mut self, _inputs: &[SignalValue]) -> ControlResult<()> {
        Ok(())
    }

    /// Produce output values.
    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        Ok(Vec::new())
    }

    /// Clear internal state without changing configuration.
    fn reset(&mut self) {}

    /// Apply configuration options, taking the ones this block recognizes.
    ///
    /// Leftover options are reported by the caller via [`Options::finish`].
    fn set(&mut self, _options: &mut Options) -> ControlResult<()> {
        Ok(())
    }
}

impl Block for Box<dyn Block> {
    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        (**self).write(inputs)
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        (**self).read()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        (**self).set(options)
    }
}

/// Constant signal source.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    value: SignalValue,
}

impl Constant {
    pub fn new(value: impl Into<SignalValue>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &SignalValue {
        &self.value
    }
}

impl Block for Constant {
    fn type_name(&self) -> &'static str {
        "Constant"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SOURCE
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        Ok(vec![self.value.clone()])
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        if let Some(value) = options.take("value")? {
            self.value = value;
        }
        Ok(())
    }
}
