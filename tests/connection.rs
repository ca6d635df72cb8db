//! Connection round trips against a local WebSocket echo server.
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use ws_console_bridge::client::{Connection, ConnectionState};
use ws_console_bridge::config::ConnectionConfig;
use ws_console_bridge::domain::{
    EventDispatcher, EventFilter, EventKind, EventPayload, Opcode, WsEvent,
};
use ws_console_bridge::error::BridgeError;

const WAIT: Duration = Duration::from_secs(5);

/// Echoes text and binary messages; answers `close-me` with a 1001 close.
async fn echo_server() -> String {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match &message {
                        Message::Text(text) if text.as_str() == "close-me" => {
                            let frame = CloseFrame {
                                code: CloseCode::Away,
                                reason: "bye".into(),
                            };
                            let _ = ws.close(Some(frame)).await;
                        }
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message.clone()).await.is_err() {
                                break;
                            }
                        }
                        // Reading on lets the close reply go out.
                        _ => {}
                    }
                }
            });
        }
    });
    format!("ws://{addr}")
}

/// Completes the handshake, then never reads or writes again.
async fn silent_server() -> String {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                    return;
                };
                let _held = ws;
                std::future::pending::<()>().await;
            });
        }
    });
    format!("ws://{addr}")
}

fn config(uri: String) -> ConnectionConfig {
    ConnectionConfig {
        uri,
        reconnect_interval: Duration::from_millis(50),
        network_timeout: Duration::from_secs(2),
        ping_interval: Duration::from_millis(500),
        rx_chunk_size: 1024,
        outbox_capacity: 8,
    }
}

fn recorder(dispatcher: &EventDispatcher) -> Arc<Mutex<Vec<WsEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    dispatcher.subscribe(None, EventFilter::Any, move |event| {
        sink.lock().push(event.clone());
    });
    events
}

async fn wait_for(events: &Mutex<Vec<WsEvent>>, mut done: impl FnMut(&[WsEvent]) -> bool) {
    let result = tokio::time::timeout(WAIT, async {
        loop {
            if done(events.lock().as_slice()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if result.is_err() {
        panic!("timed out; events so far: {:?}", kinds(&events.lock()));
    }
}

fn kinds(events: &[WsEvent]) -> Vec<EventKind> {
    events.iter().map(WsEvent::kind).collect()
}

fn count(events: &[WsEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

fn text_received(events: &[WsEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::DataReceived(frame) if frame.opcode == Opcode::Text => {
                Some(frame.payload.clone())
            }
            _ => None,
        })
        .flatten()
        .collect()
}

async fn close(connection: &Arc<Connection>) -> Result<(), BridgeError> {
    close_within(connection, Duration::from_secs(2)).await
}

async fn close_within(connection: &Arc<Connection>, timeout: Duration) -> Result<(), BridgeError> {
    let connection = Arc::clone(connection);
    let Ok(result) = tokio::task::spawn_blocking(move || connection.close(timeout)).await else {
        panic!("close task panicked");
    };
    result
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connects_echoes_and_closes() {
    let uri = echo_server().await;
    let dispatcher = EventDispatcher::new();
    let events = recorder(&dispatcher);
    let connection = Arc::new(Connection::new(config(uri), dispatcher));

    assert!(connection.start().is_ok());
    wait_for(&events, |e| count(e, EventKind::Connected) == 1).await;
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.status().connected_since.is_some());

    assert!(connection.send(b"hello", Opcode::Text).is_ok());
    wait_for(&events, |e| text_received(e) == b"hello").await;

    assert!(close(&connection).await.is_ok());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    {
        let recorded = events.lock();
        let kinds = kinds(&recorded);
        assert_eq!(kinds.first(), Some(&EventKind::BeforeConnect));
        assert_eq!(kinds.last(), Some(&EventKind::Disconnected));
        assert_eq!(count(&recorded, EventKind::Disconnected), 1);
    }

    let before = events.lock().len();
    assert!(close(&connection).await.is_ok());
    assert_eq!(events.lock().len(), before);
    assert!(matches!(
        connection.send(b"late", Opcode::Text),
        Err(BridgeError::NotConnected)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn large_messages_arrive_in_chunks() {
    let uri = echo_server().await;
    let dispatcher = EventDispatcher::new();
    let events = recorder(&dispatcher);
    let connection = Arc::new(Connection::new(config(uri), dispatcher));

    assert!(connection.start().is_ok());
    wait_for(&events, |e| count(e, EventKind::Connected) == 1).await;

    let message: Vec<u8> = (0..3000_u32).map(|i| b'a' + (i % 26) as u8).collect();
    assert!(connection.send(&message, Opcode::Text).is_ok());
    wait_for(&events, |e| text_received(e).len() == message.len()).await;

    {
        let recorded = events.lock();
        let chunks: Vec<(usize, usize, bool)> = recorded
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::DataReceived(frame) if frame.opcode == Opcode::Text => {
                    Some((frame.offset, frame.total_len, frame.is_final))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            chunks,
            vec![(0, 3000, false), (1024, 3000, false), (2048, 3000, true)]
        );
        assert_eq!(text_received(&recorded), message);
    }
    assert!(close(&connection).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_close_reports_code_and_reconnects() {
    let uri = echo_server().await;
    let dispatcher = EventDispatcher::new();
    let events = recorder(&dispatcher);
    let connection = Arc::new(Connection::new(config(uri), dispatcher));

    assert!(connection.start().is_ok());
    wait_for(&events, |e| count(e, EventKind::Connected) == 1).await;

    assert!(connection.send(b"close-me", Opcode::Text).is_ok());
    wait_for(&events, |e| count(e, EventKind::Connected) == 2).await;

    {
        let recorded = events.lock();
        let closed = recorded.iter().find_map(|e| match &e.payload {
            EventPayload::ClosedWithCode { code, reason } => Some((*code, reason.clone())),
            _ => None,
        });
        assert_eq!(closed, Some((1001, "bye".to_string())));

        let close_data = recorded.iter().find_map(|e| match &e.payload {
            EventPayload::DataReceived(frame) if frame.opcode == Opcode::Close => {
                frame.close_code()
            }
            _ => None,
        });
        assert_eq!(close_data, Some(1001));
        assert!(count(&recorded, EventKind::Disconnected) >= 1);
    }
    assert_eq!(connection.status().reconnects, 1);
    assert!(close(&connection).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_peer_times_out_and_reconnects() {
    let uri = silent_server().await;
    let dispatcher = EventDispatcher::new();
    let events = recorder(&dispatcher);
    let connection = Arc::new(Connection::new(
        ConnectionConfig {
            network_timeout: Duration::from_millis(300),
            ping_interval: Duration::from_millis(100),
            ..config(uri)
        },
        dispatcher,
    ));

    assert!(connection.start().is_ok());
    wait_for(&events, |e| count(e, EventKind::Connected) == 2).await;
    assert!(connection.status().reconnects >= 1);

    {
        let recorded = events.lock();
        let order: Vec<EventKind> = kinds(&recorded).into_iter().take(5).collect();
        assert_eq!(
            order,
            vec![
                EventKind::BeforeConnect,
                EventKind::Connected,
                EventKind::Disconnected,
                EventKind::Error,
                EventKind::Connected,
            ]
        );
        let idle = recorded.iter().find_map(|e| match &e.payload {
            EventPayload::Error { message } => Some(message.clone()),
            _ => None,
        });
        assert!(idle.is_some_and(|m| m.starts_with("no traffic")));
    }
    assert!(close_within(&connection, Duration::from_millis(300)).await.is_ok());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}
