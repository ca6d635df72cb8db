//! Process-wide adapter registration lifecycle.
//!
//! Kept in a single test: the registration is global to the test binary.
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use ws_console_bridge::client::{Connection, FrameSink};
use ws_console_bridge::config::{AdapterConfig, ConnectionConfig};
use ws_console_bridge::domain::EventDispatcher;
use ws_console_bridge::error::BridgeError;
use ws_console_bridge::stream::StreamAdapter;

#[test]
fn register_global_unregister_cycle() {
    assert!(matches!(
        StreamAdapter::global(),
        Err(BridgeError::NotRegistered)
    ));

    let adapter = assert_ok!(StreamAdapter::register(
        AdapterConfig::default(),
        Box::new(std::io::sink())
    ));
    assert!(matches!(
        StreamAdapter::register(AdapterConfig::default(), Box::new(std::io::sink())),
        Err(BridgeError::AlreadyRegistered)
    ));
    let global = assert_ok!(StreamAdapter::global());
    assert!(Arc::ptr_eq(&adapter, &global));

    let dispatcher = EventDispatcher::new();
    let connection = Arc::new(Connection::new(
        ConnectionConfig {
            uri: "ws://127.0.0.1:9".to_string(),
            ..ConnectionConfig::default()
        },
        dispatcher.clone(),
    ));
    let Ok(path) = adapter.attach(Arc::clone(&connection) as Arc<dyn FrameSink>, 1) else {
        panic!("attach failed");
    };
    assert_eq!(path, "/websocket/1");
    assert_ok!(adapter.open(&path));
    assert_eq!(dispatcher.subscriber_count(), 1);

    assert_ok!(StreamAdapter::unregister());
    assert_eq!(dispatcher.subscriber_count(), 0);
    assert!(!adapter.is_attached(1));
    assert!(matches!(
        StreamAdapter::global(),
        Err(BridgeError::NotRegistered)
    ));
    assert_err!(StreamAdapter::unregister());

    let Ok(again) = StreamAdapter::register(
        AdapterConfig {
            base_path: "/ws".to_string(),
            recv_timeout: Duration::from_millis(10),
            ..AdapterConfig::default()
        },
        Box::new(std::io::sink()),
    ) else {
        panic!("re-registration after teardown failed");
    };
    assert_eq!(again.path_for(0), "/ws/0");
    assert_ok!(StreamAdapter::unregister());
}
