use std::time::Duration;

use crate::{CoreError, CoreResult};

/// Floating point type of every signal element.
pub type Real = f64;

/// Absolute and relative tolerance for float comparisons.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

/// Whether `a` and `b` agree within the absolute or relative tolerance.
pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

/// Return `v`, or a `NonFinite` error naming `what`.
pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Convert a tick period given in seconds. Must be finite, positive and
/// representable as a [`Duration`].
pub fn period_from_secs(secs: Real) -> CoreResult<Duration> {
    let secs = ensure_finite(secs, "period")?;
    match Duration::try_from_secs_f64(secs) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(CoreError::OutOfRange {
            what: "period",
            value: secs,
        }),
    }
}
