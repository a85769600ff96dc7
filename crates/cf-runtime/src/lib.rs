//! ctrlflow runtime: clock, controller and configuration.
//!
//! A [`Controller`] owns a signal table and three ordered block sections
//! (sources, filters, sinks) and executes them periodically on its own
//! scheduling thread, paced by a [`Clock`].

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod stats;

pub use clock::{
    Clock, ClockDevice, ClockSource, DEFAULT_PERIOD, Interrupt, ManualClockDevice,
    SystemClockDevice,
};
pub use config::{BlockConfig, ControllerConfig, load_json, load_yaml, save_yaml};
pub use controller::{CLOCK, Controller, RunScope, RunState, Section};
pub use error::{RuntimeError, RuntimeResult};
pub use stats::TickStats;
