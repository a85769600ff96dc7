//! Recording sink.

use std::collections::VecDeque;

use cf_core::{Array, SignalValue};

use crate::block::{Block, Capabilities};
use crate::error::{ControlError, ControlResult};
use crate::options::Options;

/// Records one row per tick, the flattened concatenation of its inputs.
///
/// Reading returns every recorded row as a single 2-D array. With a
/// capacity, the oldest rows are dropped once it is reached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Logger {
    rows: VecDeque<Vec<f64>>,
    capacity: Option<usize>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            rows: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Recorded rows as a `rows x columns` array.
    pub fn data(&self) -> ControlResult<Array> {
        let rows: Vec<Vec<f64>> = self.rows.iter().cloned().collect();
        Ok(Array::from_rows(&rows)?)
    }

    fn trim(&mut self) {
        if let Some(capacity) = self.capacity {
            while self.rows.len() > capacity {
                self.rows.pop_front();
            }
        }
    }
}

impl Block for Logger {
    fn type_name(&self) -> &'static str {
        "Logger"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SINK
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        let row = SignalValue::concat(inputs).as_slice().to_vec();
        if let Some(first) = self.rows.front() {
            if first.len() != row.len() {
                return Err(ControlError::shape(format!(
                    "logger rows have {} column(s), got {}",
                    first.len(),
                    row.len()
                )));
            }
        }
        self.rows.push_back(row);
        self.trim();
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        Ok(vec![SignalValue::Array(self.data()?)])
    }

    fn reset(&mut self) {
        self.rows.clear();
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        if let Some(capacity) = options.take::<Option<usize>>("capacity")? {
            self.capacity = capacity;
            self.trim();
        }
        Ok(())
    }
}
