//! cf-core: stable foundation for ctrlflow.
//!
//! Contains:
//! - value (signal values: scalars and fixed-shape arrays + elementwise algebra)
//! - numeric (Real + tolerances + float helpers)
//! - error (shared error types)

pub mod error;
pub mod numeric;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use value::{Array, SignalValue};
