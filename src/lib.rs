//! # ws-console-bridge
//!
//! Exposes a live WebSocket connection as a blocking byte stream and runs
//! a line-oriented command console over it.
//!
//! The connection is driven asynchronously on its own network thread;
//! the console reads and writes synchronously. The stream adapter sits
//! between the two with bounded, timeout-aware buffers.
//!
//! ## Architecture
//!
//! ```text
//! WebSocket server
//!     │
//!     ├── Connection (client/)          network thread, reconnects
//!     │       │ WsEvent
//!     ├── EventDispatcher (domain/)     synchronous, registration order
//!     │       │
//!     ├── StreamAdapter (stream/)       inbound ring, outbound line buffer
//!     │       │ EndpointStream (Read + Write)
//!     └── ConsoleWorker (console/)      prompt, read line, dispatch
//! ```

pub mod client;
pub mod config;
pub mod console;
pub mod domain;
pub mod error;
pub mod stream;
