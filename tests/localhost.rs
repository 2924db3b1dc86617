use std::net::IpAddr;
use std::time::Duration;

use more_asserts as ma;
use ping_sweep::{Config, PingEngine, ResultCode};

// These tests exercise real kernel ICMP sockets and need raw-socket
// privileges (root or CAP_NET_RAW) plus a working loopback interface:
//
//   cargo test -- --ignored

#[test]
#[ignore = "requires raw-socket privileges"]
fn ping_localhost_resolves_ok() {
    let localhost: IpAddr = "127.0.0.1".parse().unwrap();
    let config = Config {
        interval: Duration::from_millis(200),
        timeout: Duration::from_secs(2),
        ..Config::default()
    };

    let mut engine = PingEngine::new(config);
    engine.add_target(localhost).unwrap();
    engine.start().unwrap();

    let result = engine.next_result().unwrap();

    assert_eq!(ResultCode::Ok, result.code);
    assert_eq!(Some(localhost), result.responder);
    assert_eq!(localhost, result.target.host_address());
    ma::assert_gt!(result.round_trip, Duration::ZERO);
    ma::assert_lt!(result.round_trip, Duration::from_secs(1));

    engine.stop().unwrap();
}

#[test]
#[ignore = "requires raw-socket privileges"]
fn unrouted_address_times_out() {
    // TEST-NET-1 is reserved for documentation, nothing answers there
    let unrouted: IpAddr = "192.0.2.1".parse().unwrap();
    let config = Config {
        interval: Duration::from_secs(30),
        timeout: Duration::from_millis(500),
        ..Config::default()
    };

    let mut engine = PingEngine::new(config);
    engine.add_target(unrouted).unwrap();
    engine.start().unwrap();

    let result = engine.next_result().unwrap();

    assert_eq!(ResultCode::NoReply, result.code);
    assert!(result.responder.is_none());
    ma::assert_gt!(result.round_trip, Duration::from_millis(500));

    engine.stop().unwrap();
}
