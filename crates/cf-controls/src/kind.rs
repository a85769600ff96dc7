//! Declarative block and model descriptions.
//!
//! These are the serialized forms used by configuration files and by remote
//! clients. A description is validated and turned into a live block with
//! [`BlockKind::build`].

use cf_core::SignalValue;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::block::{Block, Constant};
use crate::error::{ControlError, ControlResult};
use crate::logger::Logger;
use crate::model::{Model, StateSpace, TimeVaryingModel, TransferFunction, matrix};
use crate::ode::Ode;
use crate::system::{
    Affine, Differentiator, Feedback, Gain, ShortCircuit, Subtract, Sum, System,
    TimeVaryingSystem,
};

fn default_one() -> SignalValue {
    SignalValue::scalar(1.0)
}

fn default_zero() -> SignalValue {
    SignalValue::scalar(0.0)
}

fn default_gamma() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Serialized description of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum BlockKind {
    Constant {
        #[serde(default = "default_zero")]
        value: SignalValue,
    },
    Gain {
        #[serde(default = "default_one")]
        gain: SignalValue,
        #[serde(default)]
        mux: bool,
        #[serde(default)]
        demux: bool,
    },
    Affine {
        #[serde(default = "default_one")]
        gain: SignalValue,
        #[serde(default = "default_zero")]
        offset: SignalValue,
        #[serde(default)]
        mux: bool,
        #[serde(default)]
        demux: bool,
    },
    Sum {},
    Subtract {},
    ShortCircuit {},
    Differentiator {},
    Feedback {
        block: Box<BlockKind>,
        #[serde(default = "default_gamma")]
        gamma: f64,
    },
    System {
        model: ModelKind,
        #[serde(default = "default_true")]
        mux: bool,
    },
    TimeVaryingSystem {
        model: ModelKind,
        #[serde(default = "default_true")]
        mux: bool,
    },
    Logger {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capacity: Option<usize>,
    },
}

impl BlockKind {
    /// Decode a description from JSON.
    pub fn from_json(value: serde_json::Value) -> ControlResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| ControlError::config(format!("invalid block description: {e}")))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BlockKind::Constant { .. } => "Constant",
            BlockKind::Gain { .. } => "Gain",
            BlockKind::Affine { .. } => "Affine",
            BlockKind::Sum {} => "Sum",
            BlockKind::Subtract {} => "Subtract",
            BlockKind::ShortCircuit {} => "ShortCircuit",
            BlockKind::Differentiator {} => "Differentiator",
            BlockKind::Feedback { .. } => "Feedback",
            BlockKind::System { .. } => "System",
            BlockKind::TimeVaryingSystem { .. } => "TimeVaryingSystem",
            BlockKind::Logger { .. } => "Logger",
        }
    }

    /// Validate the description and construct the block.
    pub fn build(self) -> ControlResult<Box<dyn Block>> {
        let block: Box<dyn Block> = match self {
            BlockKind::Constant { value } => Box::new(Constant::new(value)),
            BlockKind::Gain { gain, mux, demux } => Box::new(Gain::configured(gain, mux, demux)?),
            BlockKind::Affine {
                gain,
                offset,
                mux,
                demux,
            } => Box::new(Affine::configured(gain, offset, mux, demux)?),
            BlockKind::Sum {} => Box::new(Sum::new()),
            BlockKind::Subtract {} => Box::new(Subtract::new()),
            BlockKind::ShortCircuit {} => Box::new(ShortCircuit::new()),
            BlockKind::Differentiator {} => Box::new(Differentiator::new()),
            BlockKind::Feedback { block, gamma } => {
                Box::new(Feedback::from_boxed(block.build()?, gamma))
            }
            BlockKind::System { model, mux } => {
                check_mux(mux)?;
                Box::new(System::from_boxed(model.build()?))
            }
            BlockKind::TimeVaryingSystem { model, mux } => {
                check_mux(mux)?;
                Box::new(TimeVaryingSystem::from_boxed(model.build_time_varying()?))
            }
            BlockKind::Logger { capacity } => Box::new(Logger::with_capacity(capacity)),
        };
        Ok(block)
    }
}

fn check_mux(mux: bool) -> ControlResult<()> {
    if mux {
        Ok(())
    } else {
        Err(ControlError::config("system blocks always mux their inputs"))
    }
}

/// Serialized description of a model driven by a system block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum ModelKind {
    /// Coefficients in powers of `z^-1`.
    TransferFunction { num: Vec<f64>, den: Vec<f64> },
    /// Coefficients in ascending powers of `z`.
    ZTransferFunction { num: Vec<f64>, den: Vec<f64> },
    StateSpace {
        a: Vec<Vec<f64>>,
        b: Vec<Vec<f64>>,
        c: Vec<Vec<f64>>,
        d: Vec<Vec<f64>>,
    },
    /// `dx/dt = A x + B u`, integrated between samples.
    LinearOde {
        a: Vec<Vec<f64>>,
        b: Vec<Vec<f64>>,
        x0: Vec<f64>,
        #[serde(default)]
        t0: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_step: Option<f64>,
    },
}

impl ModelKind {
    pub fn from_json(value: serde_json::Value) -> ControlResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| ControlError::config(format!("invalid model description: {e}")))
    }

    /// Build a discrete-time model.
    pub fn build(self) -> ControlResult<Box<dyn Model>> {
        let model: Box<dyn Model> = match self {
            ModelKind::TransferFunction { num, den } => {
                Box::new(TransferFunction::new(num, den)?)
            }
            ModelKind::ZTransferFunction { num, den } => {
                Box::new(TransferFunction::from_z(num, den)?)
            }
            ModelKind::StateSpace { a, b, c, d } => {
                Box::new(StateSpace::from_rows(&a, &b, &c, &d)?)
            }
            ModelKind::LinearOde { .. } => {
                return Err(ControlError::config(
                    "LinearOde is time-varying; use a TimeVaryingSystem",
                ));
            }
        };
        Ok(model)
    }

    /// Build a continuous-time model.
    pub fn build_time_varying(self) -> ControlResult<Box<dyn TimeVaryingModel>> {
        match self {
            ModelKind::LinearOde {
                a,
                b,
                x0,
                t0,
                max_step,
            } => {
                let mut ode = Ode::linear(matrix(&a)?, matrix(&b)?, t0, DVector::from_vec(x0))?;
                if let Some(max_step) = max_step {
                    ode = ode.with_max_step(max_step)?;
                }
                Ok(Box::new(ode))
            }
            _ => Err(ControlError::config(
                "only LinearOde can drive a TimeVaryingSystem",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gain_defaults_to_unity() {
        let kind = BlockKind::from_json(json!({"type": "Gain"})).unwrap();
        assert_eq!(
            kind,
            BlockKind::Gain {
                gain: SignalValue::scalar(1.0),
                mux: false,
                demux: false
            }
        );
        assert_eq!(kind.build().unwrap().type_name(), "Gain");
    }

    #[test]
    fn unknown_fields_and_types_are_rejected() {
        assert!(BlockKind::from_json(json!({"type": "Gain", "gian": 2})).is_err());
        assert!(BlockKind::from_json(json!({"type": "Nope"})).is_err());
        assert!(BlockKind::from_json(json!({"gain": 2})).is_err());
    }

    #[test]
    fn system_requires_mux() {
        let kind = BlockKind::from_json(json!({
            "type": "System",
            "mux": false,
            "model": {"type": "TransferFunction", "num": [1], "den": [1]}
        }))
        .unwrap();
        assert!(matches!(kind.build(), Err(ControlError::Config { .. })));
    }

    #[test]
    fn demux_with_matrix_gain_is_rejected() {
        let kind = BlockKind::from_json(json!({
            "type": "Gain",
            "demux": true,
            "gain": {"shape": [2, 2], "data": [-1, 2, 3, 1]}
        }))
        .unwrap();
        assert!(matches!(kind.build(), Err(ControlError::Config { .. })));
    }

    #[test]
    fn nested_feedback_builds() {
        let kind = BlockKind::from_json(json!({
            "type": "Feedback",
            "gamma": 2.0,
            "block": {
                "type": "System",
                "model": {"type": "ZTransferFunction", "num": [-0.5, 0], "den": [-0.5, 1]}
            }
        }))
        .unwrap();
        let block = kind.build().unwrap();
        assert_eq!(block.type_name(), "Feedback");
    }

    #[test]
    fn ode_only_drives_time_varying_systems() {
        let ode = json!({"type": "LinearOde", "a": [[-1]], "b": [[1]], "x0": [0]});
        assert!(ModelKind::from_json(ode.clone()).unwrap().build().is_err());
        assert!(
            ModelKind::from_json(ode)
                .unwrap()
                .build_time_varying()
                .is_ok()
        );

        let tf = json!({"type": "TransferFunction", "num": [1], "den": [1]});
        assert!(
            ModelKind::from_json(tf)
                .unwrap()
                .build_time_varying()
                .is_err()
        );
    }

    #[test]
    fn kind_round_trips_through_yaml() {
        let kind = BlockKind::Affine {
            gain: SignalValue::vector(vec![1.0, 2.0]),
            offset: SignalValue::scalar(0.5),
            mux: true,
            demux: false,
        };
        let yaml = serde_yaml::to_string(&kind).unwrap();
        let back: BlockKind = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, kind);
    }
}
