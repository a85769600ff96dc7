use cf_controls::{Block, BlockKind, ControlError, Options, SignalTable, SignalValue};
use serde_json::json;

fn build(doc: serde_json::Value) -> Box<dyn Block> {
    BlockKind::from_json(doc).unwrap().build().unwrap()
}

fn step(block: &mut dyn Block, inputs: &[SignalValue]) -> Vec<SignalValue> {
    block.write(inputs).unwrap();
    block.read().unwrap()
}

#[test]
fn described_feedback_loop_tracks_state_space() {
    let mut closed = build(json!({
        "type": "Feedback",
        "block": {
            "type": "System",
            "model": {"type": "ZTransferFunction", "num": [-0.5, 0.0], "den": [-0.5, 1.0]}
        }
    }));
    let mut open = build(json!({
        "type": "System",
        "model": {
            "type": "StateSpace",
            "a": [[0.5]], "b": [[-1.0, 1.0]], "c": [[-0.5]], "d": [[0.0, 0.0]]
        }
    }));

    let ticks = [(1.0, 3.0), (-1.0, 3.0), (-1.0, 3.0), (0.5, 2.0), (2.0, -1.0)];
    for (y, r) in ticks {
        let a = step(closed.as_mut(), &[SignalValue::scalar(y), SignalValue::scalar(r)]);
        let b = step(open.as_mut(), &[SignalValue::vector(vec![y, r])]);
        assert_eq!(a[0].as_slice(), b[0].as_slice());
    }
}

#[test]
fn blocks_evaluated_against_a_signal_table() {
    let mut signals = SignalTable::new();
    signals.add_with("x", SignalValue::scalar(3.0)).unwrap();
    signals.add("y").unwrap();

    let mut gain = build(json!({"type": "Gain", "gain": 2}));
    let inputs = signals.gather(&["x".to_string()]).unwrap();
    gain.write(&inputs).unwrap();
    let outputs = gain.read().unwrap();
    signals.assign(&["y".to_string()], outputs).unwrap();

    assert_eq!(signals.get("y").unwrap(), &SignalValue::scalar(6.0));
}

#[test]
fn set_reports_bad_and_unknown_options() {
    let mut blk = build(json!({"type": "Differentiator"}));
    let mut opts = Options::new().with("last", 8);
    blk.set(&mut opts).unwrap();
    assert!(matches!(opts.finish(), Err(ControlError::Config { .. })));

    let mut blk = build(json!({"type": "Affine", "gain": 2, "offset": 1}));
    let mut opts = Options::new().with("offset", "nope");
    assert!(matches!(blk.set(&mut opts), Err(ControlError::Config { .. })));
    assert_eq!(step(blk.as_mut(), &[SignalValue::scalar(1.0)]), vec![SignalValue::scalar(3.0)]);
}

#[test]
fn time_varying_system_integrates_between_samples() {
    let mut blk = build(json!({
        "type": "TimeVaryingSystem",
        "model": {"type": "LinearOde", "a": [[0.0]], "b": [[1.0]], "x0": [0.0]}
    }));
    // dx/dt = u, so x grows linearly with a held input
    let y = step(blk.as_mut(), &[SignalValue::scalar(0.5), SignalValue::scalar(2.0)]);
    assert!((y[0].as_slice()[0] - 1.0).abs() < 1e-12);
    let y = step(blk.as_mut(), &[SignalValue::scalar(1.0), SignalValue::scalar(-2.0)]);
    assert!(y[0].as_slice()[0].abs() < 1e-12);

    blk.reset();
    let y = step(blk.as_mut(), &[SignalValue::scalar(0.0), SignalValue::scalar(1.0)]);
    assert_eq!(y[0].as_slice(), &[0.0]);
}
