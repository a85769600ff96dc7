use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use cf_controls::{Gain, SignalValue};
use cf_runtime::{Clock, Controller, ManualClockDevice, RunState};

fn chained() -> Arc<Controller> {
    let clock = Clock::new(ManualClockDevice::new(), Duration::from_millis(1)).unwrap();
    let ctrl = Controller::with_clock(clock).unwrap();
    for name in ["x", "y", "z"] {
        ctrl.add_signal(name).unwrap();
    }
    ctrl.add_filter("first", Box::new(Gain::new(1.0)), &["x"], &["y"])
        .unwrap();
    ctrl.add_filter("second", Box::new(Gain::new(3.0)), &["y"], &["z"])
        .unwrap();
    Arc::new(ctrl)
}

#[test]
fn readers_never_observe_a_partial_tick() {
    let ctrl = chained();
    ctrl.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let ctrl = Arc::clone(&ctrl);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut k = 0.0;
                while !done.load(Ordering::Relaxed) {
                    ctrl.set_signal("x", f64::from(w) * 1000.0 + k).unwrap();
                    k += 1.0;
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let ctrl = Arc::clone(&ctrl);
            thread::spawn(move || {
                for _ in 0..2000 {
                    let values = ctrl.get_signals(&["y", "z"]).unwrap();
                    let y = values[0].as_scalar().unwrap();
                    let z = values[1].as_scalar().unwrap();
                    assert_eq!(z, 3.0 * y, "observed y={y} z={z}");
                }
            })
        })
        .collect();

    for r in readers {
        r.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);
    for w in writers {
        w.join().unwrap();
    }

    ctrl.stop().unwrap();
    assert_eq!(ctrl.state(), RunState::Stopped);
    assert!(ctrl.stats().ticks > 0);
}

#[test]
fn stop_and_join_from_other_threads() {
    let ctrl = chained();
    ctrl.start().unwrap();

    let joiner = {
        let ctrl = Arc::clone(&ctrl);
        thread::spawn(move || ctrl.join())
    };
    let stopper = {
        let ctrl = Arc::clone(&ctrl);
        thread::spawn(move || {
            while ctrl.stats().ticks < 5 {
                thread::yield_now();
            }
            ctrl.stop().unwrap();
        })
    };

    stopper.join().unwrap();
    joiner.join().unwrap();
    assert_eq!(ctrl.state(), RunState::Stopped);

    // state after stop is the last completed tick
    let values = ctrl.get_signals(&["y", "z"]).unwrap();
    assert_eq!(values[1], SignalValue::scalar(3.0 * values[0].as_scalar().unwrap()));
}

#[test]
fn restart_after_stop() {
    let ctrl = chained();
    ctrl.set_signal("x", 2.0).unwrap();
    for _ in 0..2 {
        ctrl.start().unwrap();
        while ctrl.get_signal("z").unwrap() != SignalValue::scalar(6.0) {
            thread::yield_now();
        }
        ctrl.stop().unwrap();
        ctrl.set_signal("z", 0.0).unwrap();
    }
    assert_eq!(ctrl.state(), RunState::Stopped);
}
