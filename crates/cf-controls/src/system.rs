//! Algebraic and dynamic filter blocks.
//!
//! - **Gain / Affine**: elementwise `gain * x (+ offset)`, optional mux/demux
//! - **Sum / Subtract**: elementwise sums of the inputs
//! - **ShortCircuit**: identity
//! - **Differentiator**: finite-difference derivative against a time input
//! - **Feedback**: closes a loop around a wrapped block
//! - **System / TimeVaryingSystem**: drive a [`Model`] or [`TimeVaryingModel`]

use cf_core::SignalValue;
use nalgebra::DVector;

use crate::block::{Block, Capabilities};
use crate::error::{ControlError, ControlResult};
use crate::kind::{BlockKind, ModelKind};
use crate::model::{Model, TimeVaryingModel};
use crate::options::Options;

fn check_demuxable(what: &str, value: &SignalValue, demux: bool) -> ControlResult<()> {
    if demux && value.shape().len() > 1 {
        return Err(ControlError::config(format!(
            "with demux, {what} must be a scalar or a vector, got shape {:?}",
            value.shape()
        )));
    }
    Ok(())
}

/// Elementwise affine map `gain * x + offset`.
///
/// With `mux` all inputs are concatenated into one vector before scaling;
/// with `demux` every element of every result becomes its own output.
#[derive(Debug, Clone, PartialEq)]
pub struct Affine {
    gain: SignalValue,
    offset: SignalValue,
    mux: bool,
    demux: bool,
    staged: Vec<SignalValue>,
}

impl Affine {
    /// Create a new affine block computing `gain * u + offset`.
    pub fn new(gain: impl Into<SignalValue>, offset: impl Into<SignalValue>) -> Self {
        Self {
            gain: gain.into(),
            offset: offset.into(),
            mux: false,
            demux: false,
            staged: Vec::new(),
        }
    }

    /// Affine block with multiplexing options applied.
    pub fn configured(
        gain: impl Into<SignalValue>,
        offset: impl Into<SignalValue>,
        mux: bool,
        demux: bool,
    ) -> ControlResult<Self> {
        let affine = Self {
            mux,
            demux,
            ..Self::new(gain, offset)
        };
        affine.validate()?;
        Ok(affine)
    }

    pub fn gain(&self) -> &SignalValue {
        &self.gain
    }

    pub fn offset(&self) -> &SignalValue {
        &self.offset
    }

    fn validate(&self) -> ControlResult<()> {
        check_demuxable("gain", &self.gain, self.demux)?;
        check_demuxable("offset", &self.offset, self.demux)
    }

    fn apply(&self, x: &SignalValue) -> ControlResult<SignalValue> {
        Ok(self.gain.mul(x)?.add(&self.offset)?)
    }

    fn take_common(&mut self, options: &mut Options) -> ControlResult<()> {
        if let Some(gain) = options.take("gain")? {
            self.gain = gain;
        }
        if let Some(mux) = options.take("mux")? {
            self.mux = mux;
        }
        if let Some(demux) = options.take("demux")? {
            self.demux = demux;
        }
        Ok(())
    }
}

impl Block for Affine {
    fn type_name(&self) -> &'static str {
        "Affine"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        self.staged = inputs.to_vec();
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        let inputs = if self.mux {
            vec![SignalValue::concat(&self.staged)]
        } else {
            self.staged.clone()
        };
        let outputs = inputs
            .iter()
            .map(|x| self.apply(x))
            .collect::<ControlResult<Vec<_>>>()?;
        if self.demux {
            Ok(outputs.iter().flat_map(SignalValue::split).collect())
        } else {
            Ok(outputs)
        }
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        let mut next = self.clone();
        next.take_common(options)?;
        if let Some(offset) = options.take("offset")? {
            next.offset = offset;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Elementwise gain `gain * x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gain(Affine);

impl Gain {
    /// Create a new gain block.
    pub fn new(gain: impl Into<SignalValue>) -> Self {
        Self(Affine::new(gain, 0.0))
    }

    /// Gain block with multiplexing options applied.
    pub fn configured(gain: impl Into<SignalValue>, mux: bool, demux: bool) -> ControlResult<Self> {
        Affine::configured(gain, 0.0, mux, demux).map(Self)
    }

    pub fn gain(&self) -> &SignalValue {
        self.0.gain()
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Block for Gain {
    fn type_name(&self) -> &'static str {
        "Gain"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        self.0.write(inputs)
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        self.0.read()
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        let mut next = self.0.clone();
        next.take_common(options)?;
        next.validate()?;
        self.0 = next;
        Ok(())
    }
}

/// Elementwise sum of all inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sum {
    staged: Vec<SignalValue>,
}

impl Sum {
    pub fn new() -> Self {
        Self::default()
    }
}

fn total(values: &[SignalValue]) -> ControlResult<SignalValue> {
    let mut iter = values.iter();
    let Some(first) = iter.next() else {
        return Ok(SignalValue::scalar(0.0));
    };
    iter.try_fold(first.clone(), |acc, v| acc.add(v).map_err(ControlError::from))
}

impl Block for Sum {
    fn type_name(&self) -> &'static str {
        "Sum"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        self.staged = inputs.to_vec();
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        Ok(vec![total(&self.staged)?])
    }
}

/// Sum of all inputs but the first, minus the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subtract {
    staged: Vec<SignalValue>,
}

impl Subtract {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Block for Subtract {
    fn type_name(&self) -> &'static str {
        "Subtract"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        self.staged = inputs.to_vec();
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        let Some((first, rest)) = self.staged.split_first() else {
            return Ok(vec![SignalValue::scalar(0.0)]);
        };
        if rest.is_empty() {
            return Ok(vec![first.scale(-1.0)]);
        }
        Ok(vec![total(rest)?.sub(first)?])
    }
}

/// Passes its inputs through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShortCircuit {
    staged: Vec<SignalValue>,
}

impl ShortCircuit {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Block for ShortCircuit {
    fn type_name(&self) -> &'static str {
        "ShortCircuit"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        self.staged = inputs.to_vec();
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        Ok(self.staged.clone())
    }
}

/// Finite-difference derivative.
///
/// Inputs are `(time, x1, x2, ...)`; outputs are `dx1/dt, dx2/dt, ...`.
/// The first sample, and any sample whose shape changed since the previous
/// one, yields zeros of the input's shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Differentiator {
    staged: Vec<SignalValue>,
    last_time: Option<f64>,
    last: Vec<SignalValue>,
}

impl Differentiator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Block for Differentiator {
    fn type_name(&self) -> &'static str {
        "Differentiator"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        self.staged = inputs.to_vec();
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        let Some((time, values)) = self.staged.split_first() else {
            return Err(ControlError::shape(
                "differentiator expects (time, value, ...)",
            ));
        };
        let t = time
            .as_scalar()
            .ok_or_else(|| ControlError::shape("differentiator time input must be a scalar"))?;

        let mut outputs = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            let derivative = match (self.last_time, self.last.get(i)) {
                (Some(t0), Some(prev)) if prev.shape() == value.shape() && t > t0 => {
                    value.sub(prev)?.scale(1.0 / (t - t0))
                }
                _ => value.zeros_like(),
            };
            outputs.push(derivative);
        }

        self.last_time = Some(t);
        self.last = values.to_vec();
        Ok(outputs)
    }

    fn reset(&mut self) {
        self.last_time = None;
        self.last.clear();
    }
}

/// Closes a loop around a wrapped block.
///
/// Inputs are `(y, r)`; the wrapped block is fed `gamma * r - y` and its
/// outputs are returned.
#[derive(Debug)]
pub struct Feedback {
    block: Box<dyn Block>,
    gamma: f64,
}

impl Feedback {
    /// Wrap `block` in unit negative feedback.
    pub fn new(block: impl Block + 'static) -> Self {
        Self::with_gamma(block, 1.0)
    }

    /// Wrap `block` in feedback with loop gain `gamma`.
    pub fn with_gamma(block: impl Block + 'static, gamma: f64) -> Self {
        Self::from_boxed(Box::new(block), gamma)
    }

    pub fn from_boxed(block: Box<dyn Block>, gamma: f64) -> Self {
        Self { block, gamma }
    }

    pub fn block(&self) -> &dyn Block {
        self.block.as_ref()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Block for Feedback {
    fn type_name(&self) -> &'static str {
        "Feedback"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        let [y, r] = inputs else {
            return Err(ControlError::shape(format!(
                "feedback expects (y, r), got {} input(s)",
                inputs.len()
            )));
        };
        let error = r.scale(self.gamma).sub(y)?;
        self.block.write(&[error])
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        self.block.read()
    }

    fn reset(&mut self) {
        self.block.reset();
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        let block = options
            .take::<BlockKind>("block")?
            .map(|kind| kind.build())
            .transpose()?;
        let gamma = options.take::<f64>("gamma")?;
        if let Some(block) = block {
            self.block = block;
        }
        if let Some(gamma) = gamma {
            self.gamma = gamma;
        }
        Ok(())
    }
}

fn require_mux(mux: Option<bool>) -> ControlResult<()> {
    match mux {
        Some(false) => Err(ControlError::config("system blocks always mux their inputs")),
        _ => Ok(()),
    }
}

fn check_width(expected: usize, u: &SignalValue) -> ControlResult<()> {
    if u.len() != expected {
        return Err(ControlError::shape(format!(
            "model expects {} input(s), got {}",
            expected,
            u.len()
        )));
    }
    Ok(())
}

/// Drives a discrete-time [`Model`] with the concatenation of its inputs.
#[derive(Debug)]
pub struct System {
    model: Box<dyn Model>,
    staged: Option<DVector<f64>>,
}

impl System {
    /// Create a new block simulating `model`.
    pub fn new(model: impl Model + 'static) -> Self {
        Self::from_boxed(Box::new(model))
    }

    pub fn from_boxed(model: Box<dyn Model>) -> Self {
        Self {
            model,
            staged: None,
        }
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn Model {
        self.model.as_mut()
    }
}

impl Block for System {
    fn type_name(&self) -> &'static str {
        "System"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        let u = SignalValue::concat(inputs);
        check_width(self.model.num_inputs(), &u)?;
        self.staged = Some(DVector::from_column_slice(u.as_slice()));
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        let u = self
            .staged
            .as_ref()
            .ok_or_else(|| ControlError::shape("system read before any input was written"))?;
        Ok(vec![self.model.update(u)?])
    }

    fn reset(&mut self) {
        self.model.reset();
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        require_mux(options.take("mux")?)?;
        if let Some(kind) = options.take::<ModelKind>("model")? {
            self.model = kind.build()?;
        }
        Ok(())
    }
}

/// Drives a [`TimeVaryingModel`]; inputs are `(time, u1, u2, ...)`.
#[derive(Debug)]
pub struct TimeVaryingSystem {
    model: Box<dyn TimeVaryingModel>,
    staged: Option<(f64, DVector<f64>)>,
}

impl TimeVaryingSystem {
    /// Create a new block simulating the time-varying `model`.
    pub fn new(model: impl TimeVaryingModel + 'static) -> Self {
        Self::from_boxed(Box::new(model))
    }

    pub fn from_boxed(model: Box<dyn TimeVaryingModel>) -> Self {
        Self {
            model,
            staged: None,
        }
    }

    pub fn model(&self) -> &dyn TimeVaryingModel {
        self.model.as_ref()
    }
}

impl Block for TimeVaryingSystem {
    fn type_name(&self) -> &'static str {
        "TimeVaryingSystem"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FILTER
    }

    fn write(&mut self, inputs: &[SignalValue]) -> ControlResult<()> {
        let Some((time, rest)) = inputs.split_first() else {
            return Err(ControlError::shape(
                "time-varying system expects (time, u, ...)",
            ));
        };
        let t = time
            .as_scalar()
            .ok_or_else(|| ControlError::shape("time input must be a scalar"))?;
        let u = SignalValue::concat(rest);
        check_width(self.model.num_inputs(), &u)?;
        self.staged = Some((t, DVector::from_column_slice(u.as_slice())));
        Ok(())
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        let (t, u) = self
            .staged
            .as_ref()
            .ok_or_else(|| ControlError::shape("system read before any input was written"))?;
        Ok(vec![self.model.update(*t, u)?])
    }

    fn reset(&mut self) {
        self.model.reset();
    }

    fn set(&mut self, options: &mut Options) -> ControlResult<()> {
        require_mux(options.take("mux")?)?;
        if let Some(kind) = options.take::<ModelKind>("model")? {
            self.model = kind.build_time_varying()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StateSpace, TransferFunction};
    use nalgebra::DMatrix;

    fn s(x: f64) -> SignalValue {
        SignalValue::scalar(x)
    }

    fn v(data: &[f64]) -> SignalValue {
        SignalValue::vector(data.to_vec())
    }

    fn step(block: &mut dyn Block, inputs: &[SignalValue]) -> Vec<SignalValue> {
        block.write(inputs).unwrap();
        block.read().unwrap()
    }

    #[test]
    fn gain_scalar_and_vector_inputs() {
        let mut blk = Gain::new(-5.2);
        assert_eq!(step(&mut blk, &[v(&[2.0])]), vec![v(&[-10.4])]);

        let mut blk = Gain::new(3.0);
        assert_eq!(step(&mut blk, &[s(2.0), s(4.0)]), vec![s(6.0), s(12.0)]);
        assert_eq!(step(&mut blk, &[v(&[2.0, 4.0])]), vec![v(&[6.0, 12.0])]);
        assert_eq!(
            step(&mut blk, &[s(2.0), v(&[4.0, 2.0])]),
            vec![s(6.0), v(&[12.0, 6.0])]
        );
    }

    #[test]
    fn gain_mux_and_demux() {
        let mut blk = Gain::configured(v(&[-1.0, 2.0]), false, true).unwrap();
        assert_eq!(step(&mut blk, &[s(1.0)]), vec![s(-1.0), s(2.0)]);

        let mut blk = Gain::configured(2.0, true, false).unwrap();
        assert_eq!(step(&mut blk, &[s(1.0), s(3.0)]), vec![v(&[2.0, 6.0])]);

        let matrix = SignalValue::Array(
            cf_core::Array::new(vec![2, 2], vec![-1.0, 2.0, 3.0, 1.0]).unwrap(),
        );
        assert!(matches!(
            Gain::configured(matrix, true, true),
            Err(ControlError::Config { .. })
        ));
    }

    #[test]
    fn gain_set_options() {
        let mut blk = Gain::default();
        assert_eq!(blk.gain(), &s(1.0));

        let mut opts = Options::new().with("gain", 8.0);
        blk.set(&mut opts).unwrap();
        opts.finish().unwrap();
        assert_eq!(blk.gain(), &s(8.0));

        let mut opts = Options::new().with("gain", "asd");
        assert!(blk.set(&mut opts).is_err());
        assert_eq!(blk.gain(), &s(8.0));

        let mut opts = Options::new().with("offset", 1.0);
        blk.set(&mut opts).unwrap();
        assert!(opts.finish().is_err());
    }

    #[test]
    fn affine_offsets() {
        let mut blk = Affine::configured(v(&[-1.0, 2.0]), 1.0, false, true).unwrap();
        assert_eq!(step(&mut blk, &[s(1.0)]), vec![s(0.0), s(3.0)]);

        let mut blk = Affine::configured(v(&[-1.0, 2.0]), v(&[3.0, 4.0]), false, true).unwrap();
        assert_eq!(step(&mut blk, &[s(1.0)]), vec![s(2.0), s(6.0)]);

        let mut blk = Affine::new(3.0, 0.0);
        assert_eq!(step(&mut blk, &[s(2.0), s(4.0)]), vec![s(6.0), s(12.0)]);
    }

    #[test]
    fn sum_and_subtract() {
        let mut sum = Sum::new();
        assert_eq!(step(&mut sum, &[s(1.0)]), vec![s(1.0)]);
        assert_eq!(step(&mut sum, &[s(1.0), s(2.0)]), vec![s(3.0)]);
        assert_eq!(
            step(&mut sum, &[v(&[1.0, 0.4]), v(&[2.0, 3.0])]),
            vec![v(&[3.0, 3.4])]
        );

        let mut sub = Subtract::new();
        assert_eq!(step(&mut sub, &[s(1.0), s(2.0)]), vec![s(1.0)]);
        assert_eq!(step(&mut sub, &[s(2.0), s(1.0)]), vec![s(-1.0)]);
        assert_eq!(step(&mut sub, &[s(2.0), s(1.0), s(1.0)]), vec![s(0.0)]);
        assert_eq!(step(&mut sub, &[s(2.0)]), vec![s(-2.0)]);
    }

    #[test]
    fn short_circuit_passes_through() {
        let mut blk = ShortCircuit::new();
        assert_eq!(
            step(&mut blk, &[v(&[2.0, 4.0]), s(-1.0)]),
            vec![v(&[2.0, 4.0]), s(-1.0)]
        );
    }

    #[test]
    fn differentiator_scalar_pairs() {
        let mut diff = Differentiator::new();
        assert_eq!(step(&mut diff, &[s(1.0), s(0.0), s(5.0)]), vec![s(0.0), s(0.0)]);
        assert_eq!(step(&mut diff, &[s(2.0), s(3.0), s(5.0)]), vec![s(3.0), s(0.0)]);
        assert_eq!(step(&mut diff, &[s(4.0), s(0.0), s(6.0)]), vec![s(-1.5), s(0.5)]);
    }

    #[test]
    fn differentiator_mixed_shapes() {
        let mut diff = Differentiator::new();
        assert_eq!(
            step(&mut diff, &[s(1.0), v(&[0.0, 1.0]), s(5.0)]),
            vec![v(&[0.0, 0.0]), s(0.0)]
        );
        assert_eq!(
            step(&mut diff, &[s(2.0), v(&[3.0, 2.0]), s(5.0)]),
            vec![v(&[3.0, 1.0]), s(0.0)]
        );
        assert_eq!(
            step(&mut diff, &[s(4.0), v(&[0.0, -1.0]), s(6.0)]),
            vec![v(&[-1.5, -1.5]), s(0.5)]
        );

        diff.reset();
        assert_eq!(step(&mut diff, &[s(5.0), v(&[1.0, 1.0])]), vec![v(&[0.0, 0.0])]);
    }

    #[test]
    fn differentiator_rejects_unknown_options() {
        let mut diff = Differentiator::new();
        let mut opts = Options::new().with("time", 8);
        diff.set(&mut opts).unwrap();
        assert!(opts.finish().is_err());
    }

    #[test]
    fn feedback_scales_reference() {
        let mut blk = Feedback::with_gamma(Gain::new(2.0), 4.0);
        assert_eq!(blk.gamma(), 4.0);
        assert_eq!(step(&mut blk, &[s(2.0), s(3.0)]), vec![s(2.0 * (3.0 * 4.0 - 2.0))]);

        let mut opts = Options::new().with("gamma", 10.0).with(
            "block",
            serde_json::json!({"type": "Gain", "gain": 150}),
        );
        blk.set(&mut opts).unwrap();
        assert!(opts.is_empty());
        assert_eq!(blk.gamma(), 10.0);
        assert_eq!(blk.block().type_name(), "Gain");

        assert!(blk.write(&[s(1.0)]).is_err());
    }

    #[test]
    fn feedback_transfer_function_matches_state_space() {
        // G(z) = -.5 / (z - .5) in unit feedback
        let tf = TransferFunction::from_z(vec![-0.5, 0.0], vec![-0.5, 1.0]).unwrap();
        let mut closed = Feedback::new(System::new(tf));

        // x+ = .5 x + (-y + r), u = -.5 x
        let ss = StateSpace::from_rows(
            &[vec![0.5]],
            &[vec![-1.0, 1.0]],
            &[vec![-0.5]],
            &[vec![0.0, 0.0]],
        )
        .unwrap();
        let mut open = System::new(ss);

        for (y, r) in [(1.0, 3.0), (-1.0, 3.0), (-1.0, 3.0), (2.0, -1.0)] {
            let a = step(&mut closed, &[s(y), s(r)]);
            let b = step(&mut open, &[v(&[y, r])]);
            assert_eq!(a[0].as_slice(), b[0].as_slice());
        }
    }

    #[test]
    fn system_drives_transfer_function() {
        let tf = TransferFunction::new(vec![1.0, 1.0, 3.0], vec![1.0, -1.0]).unwrap();
        let mut blk = System::new(tf);
        for (u, y) in [(1.0, 1.0), (-1.0, 1.0), (2.0, 5.0), (1.0, 5.0)] {
            assert_eq!(step(&mut blk, &[v(&[u])]), vec![s(y)]);
        }
        assert_eq!(blk.model().state().as_slice(), &[3.0, 2.0]);

        blk.reset();
        assert_eq!(blk.model().state().as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn system_muxes_multiple_inputs() {
        let ss = StateSpace::from_rows(
            &[vec![0.0, 1.0], vec![1.0, -2.0]],
            &[vec![1.0, -1.0], vec![1.0, 0.0]],
            &[vec![1.0, -2.0], vec![0.0, 1.0]],
            &[vec![1.0, 0.0], vec![-1.0, 1.0]],
        )
        .unwrap();
        let mut blk = System::new(ss);

        let steps = [
            ((1.0, 1.0), [0.0, 1.0], [1.0, 0.0]),
            ((-1.0, 0.0), [0.0, -3.0], [-3.0, 2.0]),
            ((3.0, -1.0), [1.0, 9.0], [9.0, -7.0]),
            ((2.0, 1.0), [10.0, -15.0], [-15.0, 8.0]),
        ];
        for ((u1, u2), state, y) in steps.iter().copied() {
            assert_eq!(step(&mut blk, &[v(&[u1, u2])]), vec![v(&y)]);
            assert_eq!(blk.model().state().as_slice(), &state);
        }

        blk.reset();
        for ((u1, u2), state, y) in steps {
            assert_eq!(step(&mut blk, &[s(u1), s(u2)]), vec![v(&y)]);
            assert_eq!(blk.model().state().as_slice(), &state);
        }
    }

    #[test]
    fn system_rejects_mux_off_and_bad_models() {
        let tf = TransferFunction::new(vec![1.0], vec![1.0]).unwrap();
        let mut blk = System::new(tf);

        let mut opts = Options::new().with("mux", false);
        assert!(matches!(blk.set(&mut opts), Err(ControlError::Config { .. })));

        let mut opts = Options::new().with("model", 1);
        assert!(matches!(blk.set(&mut opts), Err(ControlError::Config { .. })));

        let mut opts = Options::new().with(
            "model",
            serde_json::json!({"type": "TransferFunction", "num": [1, 1], "den": [1, -1]}),
        );
        blk.set(&mut opts).unwrap();
        assert_eq!(blk.model().state().len(), 1);
    }

    #[test]
    fn system_checks_input_width_on_write() {
        let ss = StateSpace::new(
            DMatrix::from_row_slice(1, 1, &[0.5]),
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DMatrix::from_row_slice(1, 2, &[0.0, 0.0]),
        )
        .unwrap();
        let mut blk = System::new(ss);
        let err = blk.write(&[s(1.0), s(2.0), s(3.0)]).unwrap_err();
        assert!(matches!(err, ControlError::Shape { .. }));
        assert!(err.to_string().contains("expects 2 input(s), got 3"));

        blk.write(&[v(&[1.0, 2.0])]).unwrap();
        assert_eq!(blk.read().unwrap(), vec![v(&[0.0])]);
    }

    #[test]
    fn system_read_before_write_is_an_error() {
        let tf = TransferFunction::new(vec![1.0], vec![1.0]).unwrap();
        let mut blk = System::new(tf);
        assert!(blk.read().is_err());
    }
}
