use std::sync::Arc;
use std::time::Duration;

use cf_controls::{BlockKind, Options, SignalValue};
use cf_protocol::{Client, ProtocolError, Server, ServerConfig};
use cf_runtime::{Clock, Controller, ManualClockDevice, RunState};

fn serve() -> (Arc<Controller>, cf_protocol::ServerHandle) {
    let clock = Clock::new(ManualClockDevice::new(), Duration::from_millis(1)).unwrap();
    let ctrl = Arc::new(Controller::with_clock(clock).unwrap());
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
    };
    let handle = Server::bind(&config, Arc::clone(&ctrl))
        .unwrap()
        .spawn()
        .unwrap();
    (ctrl, handle)
}

fn kind(json: serde_json::Value) -> BlockKind {
    BlockKind::from_json(json).unwrap()
}

#[test]
fn build_and_run_a_pipeline_remotely() {
    let (ctrl, server) = serve();
    let mut client = Client::connect(server.local_addr()).unwrap();

    client.add_signal("x").unwrap();
    client.add_signal("y").unwrap();
    client.set_signal("x", 2.0).unwrap();
    client
        .add_filter(
            "gain",
            &kind(serde_json::json!({"type": "Gain", "gain": 3.0})),
            &["x"],
            &["y"],
        )
        .unwrap();
    client
        .add_sink("log", &kind(serde_json::json!({"type": "Logger"})), &["y"])
        .unwrap();

    // ticks run locally against the shared controller
    ctrl.step().unwrap();
    ctrl.step().unwrap();
    assert_eq!(client.get_signal("y").unwrap(), SignalValue::scalar(6.0));

    let log = client.read_sink("log").unwrap();
    assert_eq!(log.shape(), &[2, 1]);
    assert_eq!(log.as_slice(), &[6.0, 6.0]);

    client
        .set_filter("gain", &Options::new().with("gain", 0.5))
        .unwrap();
    ctrl.step().unwrap();
    assert_eq!(client.get_signal("y").unwrap(), SignalValue::scalar(1.0));

    let info = client.info("filters").unwrap();
    assert!(info.contains("gain[Gain, enabled] x >> y"));
    assert!(client.help(None).unwrap().contains("add_filter"));
    assert!(client.help(Some('g')).unwrap().contains("get_signal"));

    server.shutdown();
}

#[test]
fn errors_are_reported_and_the_session_continues() {
    let (_ctrl, server) = serve();
    let mut client = Client::connect(server.local_addr()).unwrap();

    let err = client.get_signal("nope").unwrap_err();
    match err {
        ProtocolError::Handler { code, message } => {
            assert_eq!(code, 'g');
            assert!(message.contains("nope"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    client.add_signal("x").unwrap();
    assert!(client.add_signal("x").is_err());
    assert!(client.remove_signal("clock").is_err());
    assert!(client.info("bogus").is_err());
    assert!(client.set_period(-1.0).is_err());

    client.set_period(0.02).unwrap();
    assert_eq!(client.get_period().unwrap(), 0.02);
    client.remove_signal("x").unwrap();
}

#[test]
fn start_and_stop_remotely() {
    let (ctrl, server) = serve();
    let mut client = Client::connect(server.local_addr()).unwrap();

    client.start().unwrap();
    assert_eq!(ctrl.state(), RunState::Running);
    assert!(client.set_period(0.5).is_err());
    client.stop().unwrap();
    assert_eq!(ctrl.state(), RunState::Stopped);

    let t = client.read_source("clock").unwrap();
    assert!(t.as_scalar().unwrap() >= 0.0);
}

#[test]
fn several_clients_share_one_controller() {
    let (ctrl, server) = serve();
    let mut a = Client::connect(server.local_addr()).unwrap();
    let mut b = Client::connect(server.local_addr()).unwrap();

    a.add_signal("shared").unwrap();
    b.set_signal("shared", 4.0).unwrap();
    assert_eq!(a.get_signal("shared").unwrap(), SignalValue::scalar(4.0));
    assert_eq!(ctrl.get_signal("shared").unwrap(), SignalValue::scalar(4.0));
}
