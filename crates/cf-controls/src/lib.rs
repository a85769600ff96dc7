//! Signal blocks and discrete-time models for ctrlflow.
//!
//! This crate provides the computational side of a controller: the named
//! signal table, the [`Block`] abstraction shared by sources, filters and
//! sinks, and the standard algebraic blocks built on top of it.
//!
//! # Architecture
//!
//! - Signals are [`SignalValue`]s (scalars or fixed-shape arrays) stored by name
//! - Blocks stage inputs with `write` and produce outputs with `read`
//! - Dynamic blocks wrap a [`Model`] (transfer function, state space) or a
//!   [`TimeVaryingModel`] (sampled ODE)
//! - Every block can also be described declaratively with [`BlockKind`], which is
//!   how configuration files and remote clients create them

pub mod block;
pub mod error;
pub mod kind;
pub mod logger;
pub mod model;
pub mod ode;
pub mod options;
pub mod signal;
pub mod system;

pub use block::{Block, Capabilities, Constant};
pub use cf_core::{Array, SignalValue};
pub use error::{ControlError, ControlResult};
pub use kind::{BlockKind, ModelKind};
pub use logger::Logger;
pub use model::{Model, StateSpace, TimeVaryingModel, TransferFunction};
pub use ode::Ode;
pub use options::Options;
pub use signal::SignalTable;
pub use system::{
    Affine, Differentiator, Feedback, Gain, ShortCircuit, Subtract, Sum, System,
    TimeVaryingSystem,
};
