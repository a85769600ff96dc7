//! Continuous-time models sampled by a [`TimeVaryingSystem`](crate::TimeVaryingSystem).
//!
//! Between two updates the input is held constant and the state is advanced
//! with fixed-step RK4.

use std::fmt;

use cf_core::SignalValue;
use nalgebra::{DMatrix, DVector};

use crate::error::{ControlError, ControlResult};
use crate::model::TimeVaryingModel;

/// Right-hand side `dx/dt = f(t, x, u)`.
pub type Rhs = Box<dyn Fn(f64, &DVector<f64>, &DVector<f64>) -> DVector<f64> + Send>;

/// Default upper bound on the integration step (seconds).
pub const DEFAULT_MAX_STEP: f64 = 1e-3;

/// Ordinary differential equation whose output is its state.
pub struct Ode {
    f: Rhs,
    num_inputs: usize,
    t0: f64,
    x0: DVector<f64>,
    t: f64,
    state: DVector<f64>,
    max_step: f64,
}

impl fmt::Debug for Ode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ode")
            .field("num_inputs", &self.num_inputs)
            .field("t", &self.t)
            .field("state", &self.state)
            .field("max_step", &self.max_step)
            .finish_non_exhaustive()
    }
}

impl Ode {
    /// Create a model from an arbitrary right-hand side.
    pub fn new(f: Rhs, num_inputs: usize, t0: f64, x0: DVector<f64>) -> Self {
        Self {
            f,
            num_inputs,
            t0,
            state: x0.clone(),
            x0,
            t: t0,
            max_step: DEFAULT_MAX_STEP,
        }
    }

    /// Linear model `dx/dt = A x + B u`.
    pub fn linear(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        t0: f64,
        x0: DVector<f64>,
    ) -> ControlResult<Self> {
        let n = x0.len();
        if a.nrows() != n || a.ncols() != n {
            return Err(ControlError::InvalidArg {
                what: "A must be square and match the initial state",
            });
        }
        if b.nrows() != n {
            return Err(ControlError::InvalidArg {
                what: "B must have as many rows as the state",
            });
        }
        let m = b.ncols();
        let f: Rhs = Box::new(
            move |_t: f64, x: &DVector<f64>, u: &DVector<f64>| -> DVector<f64> {
                &a * x + &b * u
            },
        );
        Ok(Self::new(f, m, t0, x0))
    }

    pub fn with_max_step(mut self, max_step: f64) -> ControlResult<Self> {
        if max_step <= 0.0 || !max_step.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "max_step must be positive",
            });
        }
        self.max_step = max_step;
        Ok(self)
    }

    /// Time of the last update.
    pub fn time(&self) -> f64 {
        self.t
    }

    fn rk4_step(&self, t: f64, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64> {
        let f = &self.f;
        let k1 = f(t, x, u);
        let k2 = f(t + 0.5 * dt, &(x + &k1 * (0.5 * dt)), u);
        let k3 = f(t + 0.5 * dt, &(x + &k2 * (0.5 * dt)), u);
        let k4 = f(t + dt, &(x + &k3 * dt), u);

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
    }
}

impl TimeVaryingModel for Ode {
    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn update(&mut self, t: f64, u: &DVector<f64>) -> ControlResult<SignalValue> {
        if u.len() != self.num_inputs {
            return Err(ControlError::shape(format!(
                "ode expects {} input(s), got {}",
                self.num_inputs,
                u.len()
            )));
        }
        if t < self.t {
            return Err(ControlError::InvalidArg {
                what: "ode time must not decrease",
            });
        }

        let span = t - self.t;
        let steps = (span / self.max_step).ceil().max(1.0) as usize;
        let dt = span / steps as f64;
        let mut x = self.state.clone();
        let mut tk = self.t;
        if span > 0.0 {
            for _ in 0..steps {
                x = self.rk4_step(tk, &x, u, dt);
                tk += dt;
            }
        }
        self.state = x;
        self.t = t;
        Ok(SignalValue::vector(self.state.iter().copied().collect()))
    }

    fn state(&self) -> &DVector<f64> {
        &self.state
    }

    fn set_state(&mut self, state: DVector<f64>) -> ControlResult<()> {
        if state.len() != self.state.len() {
            return Err(ControlError::shape(format!(
                "state has {} element(s), got {}",
                self.state.len(),
                state.len()
            )));
        }
        self.state = state;
        Ok(())
    }

    fn reset(&mut self) {
        self.state = self.x0.clone();
        self.t = self.t0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::{Tolerances, nearly_equal};

    fn decaying() -> Ode {
        let a = DMatrix::from_row_slice(2, 2, &[-1.0, 1.0, 0.0, -2.0]);
        let b = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        Ode::linear(a, b, 0.0, DVector::from_vec(vec![1.0, -1.0])).unwrap()
    }

    #[test]
    fn linear_ode_matches_closed_form() {
        // x1 = e^{-2t}, x2 = -e^{-2t} for u = 0
        let mut ode = decaying();
        let y = ode.update(1.0, &DVector::zeros(1)).unwrap();
        let expected = (-2.0_f64).exp();
        let tol = Tolerances {
            abs: 1e-9,
            rel: 1e-9,
        };
        let y = y.as_slice();
        assert!(nearly_equal(y[0], expected, tol));
        assert!(nearly_equal(y[1], -expected, tol));
    }

    #[test]
    fn reset_restores_initial_condition() {
        let mut ode = decaying();
        ode.update(0.5, &DVector::from_element(1, 1.0)).unwrap();
        ode.reset();
        assert_eq!(ode.state().as_slice(), &[1.0, -1.0]);
        assert_eq!(ode.time(), 0.0);
    }

    #[test]
    fn time_must_not_go_backwards() {
        let mut ode = decaying();
        ode.update(1.0, &DVector::zeros(1)).unwrap();
        assert!(ode.update(0.5, &DVector::zeros(1)).is_err());
    }

    #[test]
    fn input_arity_is_checked() {
        let mut ode = decaying();
        assert!(ode.update(1.0, &DVector::zeros(2)).is_err());
    }
}
