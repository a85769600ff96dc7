//! Discrete-time linear models.
//!
//! [`Model`] is the capability a [`System`](crate::System) block needs:
//! advance one sample, expose the state vector, reset it. Transfer-function
//! and state-space realisations both implement it.

use std::fmt;

use cf_core::{SignalValue, Tolerances, nearly_equal};
use nalgebra::{DMatrix, DVector};

use crate::error::{ControlError, ControlResult};

/// Discrete-time model advanced once per tick.
pub trait Model: Send + fmt::Debug {
    /// Number of scalar inputs expected by `update`.
    fn num_inputs(&self) -> usize;

    /// Advance one sample with input `u` and return the output.
    fn update(&mut self, u: &DVector<f64>) -> ControlResult<SignalValue>;

    fn state(&self) -> &DVector<f64>;

    fn set_state(&mut self, state: DVector<f64>) -> ControlResult<()>;

    /// Zero the state.
    fn reset(&mut self);
}

/// Continuous-time model sampled at the times it is updated.
pub trait TimeVaryingModel: Send + fmt::Debug {
    fn num_inputs(&self) -> usize;

    /// Advance to time `t` holding input `u` and return the output.
    fn update(&mut self, t: f64, u: &DVector<f64>) -> ControlResult<SignalValue>;

    fn state(&self) -> &DVector<f64>;

    fn set_state(&mut self, state: DVector<f64>) -> ControlResult<()>;

    /// Restore the initial condition.
    fn reset(&mut self);
}

fn check_state_len(current: &DVector<f64>, state: &DVector<f64>) -> ControlResult<()> {
    if current.len() != state.len() {
        return Err(ControlError::shape(format!(
            "state has {} element(s), got {}",
            current.len(),
            state.len()
        )));
    }
    Ok(())
}

/// SISO transfer function in powers of `z^-1`, realised in direct form II.
///
/// ```text
///         num[0] + num[1] z^-1 + ... + num[n] z^-n
/// G(z) = ------------------------------------------
///         den[0] + den[1] z^-1 + ... + den[n] z^-n
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    num: Vec<f64>,
    den: Vec<f64>,
    state: DVector<f64>,
}

impl TransferFunction {
    /// Create a transfer function from coefficients in powers of `z^-1`.
    ///
    /// The shorter polynomial is padded with trailing zeros and both are
    /// normalised by `den[0]`.
    pub fn new(num: Vec<f64>, den: Vec<f64>) -> ControlResult<Self> {
        if num.is_empty() {
            return Err(ControlError::InvalidArg {
                what: "numerator must not be empty",
            });
        }
        let den0 = den.first().copied().unwrap_or(0.0);
        if nearly_equal(den0, 0.0, Tolerances::default()) {
            return Err(ControlError::InvalidArg {
                what: "leading denominator coefficient must be nonzero",
            });
        }
        let n = num.len().max(den.len());
        let pad = |mut p: Vec<f64>| {
            p.resize(n, 0.0);
            p.into_iter().map(|c| c / den0).collect::<Vec<_>>()
        };
        Ok(Self {
            num: pad(num),
            den: pad(den),
            state: DVector::zeros(n - 1),
        })
    }

    /// Create a transfer function from coefficients in ascending powers of `z`.
    ///
    /// `G(z) = (num[0] + num[1] z + ...) / (den[0] + den[1] z + ...)`
    pub fn from_z(mut num: Vec<f64>, mut den: Vec<f64>) -> ControlResult<Self> {
        let n = num.len().max(den.len());
        num.resize(n, 0.0);
        den.resize(n, 0.0);
        num.reverse();
        den.reverse();
        Self::new(num, den)
    }

    /// Normalised numerator coefficients in powers of `z^-1`.
    pub fn num(&self) -> &[f64] {
        &self.num
    }

    pub fn den(&self) -> &[f64] {
        &self.den
    }
}

impl Model for TransferFunction {
    fn num_inputs(&self) -> usize {
        1
    }

    fn update(&mut self, u: &DVector<f64>) -> ControlResult<SignalValue> {
        if u.len() != 1 {
            return Err(ControlError::shape(format!(
                "transfer function expects 1 input, got {}",
                u.len()
            )));
        }
        let n = self.state.len();
        let feedback: f64 = (0..n).map(|i| self.state[i] * self.den[i + 1]).sum();
        let xk = u[0] - feedback;
        let forward: f64 = (0..n).map(|i| self.state[i] * self.num[i + 1]).sum();
        let yk = self.num[0] * xk + forward;

        if n > 0 {
            for i in (1..n).rev() {
                self.state[i] = self.state[i - 1];
            }
            self.state[0] = xk;
        }
        Ok(SignalValue::scalar(yk))
    }

    fn state(&self) -> &DVector<f64> {
        &self.state
    }

    fn set_state(&mut self, state: DVector<f64>) -> ControlResult<()> {
        check_state_len(&self.state, &state)?;
        self.state = state;
        Ok(())
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
    }
}

/// Discrete-time state-space model.
///
/// ```text
/// y[k]   = C x[k] + D u[k]
/// x[k+1] = A x[k] + B u[k]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpace {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    d: DMatrix<f64>,
    state: DVector<f64>,
}

impl StateSpace {
    /// Create a new state-space model; matrix shapes must agree.
    pub fn new(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
    ) -> ControlResult<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(ControlError::InvalidArg {
                what: "A must be square",
            });
        }
        if b.nrows() != n {
            return Err(ControlError::InvalidArg {
                what: "B must have as many rows as A",
            });
        }
        if c.ncols() != n {
            return Err(ControlError::InvalidArg {
                what: "C must have as many columns as A",
            });
        }
        if d.nrows() != c.nrows() || d.ncols() != b.ncols() {
            return Err(ControlError::InvalidArg {
                what: "D must be (rows of C) x (columns of B)",
            });
        }
        Ok(Self {
            a,
            b,
            c,
            d,
            state: DVector::zeros(n),
        })
    }

    /// Build from row-major nested vectors.
    pub fn from_rows(
        a: &[Vec<f64>],
        b: &[Vec<f64>],
        c: &[Vec<f64>],
        d: &[Vec<f64>],
    ) -> ControlResult<Self> {
        Self::new(matrix(a)?, matrix(b)?, matrix(c)?, matrix(d)?)
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub fn c(&self) -> &DMatrix<f64> {
        &self.c
    }

    pub fn d(&self) -> &DMatrix<f64> {
        &self.d
    }
}

impl Model for StateSpace {
    fn num_inputs(&self) -> usize {
        self.b.ncols()
    }

    fn update(&mut self, u: &DVector<f64>) -> ControlResult<SignalValue> {
        if u.len() != self.b.ncols() {
            return Err(ControlError::shape(format!(
                "state-space model expects {} input(s), got {}",
                self.b.ncols(),
                u.len()
            )));
        }
        let y = &self.c * &self.state + &self.d * u;
        self.state = &self.a * &self.state + &self.b * u;
        Ok(SignalValue::vector(y.iter().copied().collect()))
    }

    fn state(&self) -> &DVector<f64> {
        &self.state
    }

    fn set_state(&mut self, state: DVector<f64>) -> ControlResult<()> {
        check_state_len(&self.state, &state)?;
        self.state = state;
        Ok(())
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
    }
}

/// Row-major nested vectors to a matrix.
pub(crate) fn matrix(rows: &[Vec<f64>]) -> ControlResult<DMatrix<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(ControlError::shape("matrix rows must have equal length"));
    }
    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}
