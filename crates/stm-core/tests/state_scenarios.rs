//! State machine scenarios driven by tokio's paused clock

use std::sync::{Arc, Mutex};
use std::time::Duration;

use stm_core::config::RequestTimeouts;
use stm_core::{HostState, RequestKind, StateMachine};

fn record(machine: &mut StateMachine) -> Arc<Mutex<Vec<HostState>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    machine.subscribe(move |_, state| sink.lock().unwrap().push(*state));
    states
}

#[tokio::test(start_paused = true)]
async fn test_turn_on_expires_without_activity() {
    let mut machine = StateMachine::new("nas", RequestTimeouts::default());
    machine.handle_turn_on();

    tokio::time::advance(Duration::from_secs(59)).await;
    machine.handle_update();
    assert_eq!(machine.request(), Some(RequestKind::TurnOn));

    tokio::time::advance(Duration::from_secs(2)).await;
    machine.handle_update();
    assert_eq!(machine.request(), None);
}

#[tokio::test(start_paused = true)]
async fn test_request_clock_restarts_on_promotion() {
    let mut machine = StateMachine::new("nas", RequestTimeouts::default());
    machine.handle_turn_on();

    tokio::time::advance(Duration::from_secs(50)).await;
    machine.handle_ping_success();
    assert_eq!(machine.request(), Some(RequestKind::Connect));

    // Connect has its own 30s budget starting at the promotion
    tokio::time::advance(Duration::from_secs(20)).await;
    machine.handle_update();
    assert_eq!(machine.request(), Some(RequestKind::Connect));

    tokio::time::advance(Duration::from_secs(11)).await;
    machine.handle_update();
    assert_eq!(machine.request(), None);
}

#[tokio::test(start_paused = true)]
async fn test_restart_offline_then_online() {
    let mut machine = StateMachine::new("nas", RequestTimeouts::default());
    machine.handle_ping_success();
    machine.handle_connect_success();
    machine.handle_restart();
    assert!(machine.is_shutting_down());

    let effects = machine.handle_ping_error();
    assert!(effects.disconnect);
    assert!(!machine.online());
    assert_eq!(machine.request(), Some(RequestKind::TurnOn));

    tokio::time::advance(Duration::from_secs(10)).await;
    machine.handle_ping_success();
    assert!(machine.online());
    assert_eq!(machine.request(), Some(RequestKind::Connect));
}

#[tokio::test(start_paused = true)]
async fn test_online_tracks_last_probe() {
    let mut machine = StateMachine::new("nas", RequestTimeouts::default());
    for alive in [true, true, false, true, false, false, true] {
        if alive {
            machine.handle_ping_success();
        } else {
            let _ = machine.handle_ping_error();
        }
        assert_eq!(machine.online(), alive);
    }
}

#[test]
fn test_connected_implies_online_on_every_change() {
    let mut machine = StateMachine::new("nas", RequestTimeouts::default());
    let states = record(&mut machine);

    machine.handle_ping_success();
    machine.handle_connect_success();
    machine.handle_turn_off();
    let _ = machine.handle_ping_error();
    machine.handle_ping_success();
    machine.handle_connect_success();
    machine.handle_disconnect();
    machine.handle_connect_success();
    machine.handle_close();

    let states = states.lock().unwrap();
    assert!(!states.is_empty());
    for state in states.iter() {
        assert!(!state.connected || state.online, "invalid state {:?}", state);
    }
    assert_eq!(machine.state(), HostState::default());
}
