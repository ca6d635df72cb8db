//! ws-console-bridge entry point.
//!
//! Connects to the configured WebSocket server and runs the command
//! console over the connection until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use ws_console_bridge::client::{Connection, FrameSink};
use ws_console_bridge::config::{BridgeConfig, LogFormat};
use ws_console_bridge::console::{
    CommandRegistry, CompletionFn, ConsoleWorker, DumbLineEditor, register_builtins,
};
use ws_console_bridge::domain::{EventDispatcher, EventFilter, log_event};
use ws_console_bridge::stream::StreamAdapter;

const WORKER_POLL: Duration = Duration::from_millis(250);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);
    tracing::info!(uri = %config.connection.uri, "starting ws-console-bridge");

    // Event wiring: logging first, then the stream endpoint.
    let dispatcher = EventDispatcher::new();
    dispatcher.subscribe(None, EventFilter::Any, log_event);

    let connection = Arc::new(Connection::new(config.connection.clone(), dispatcher));
    let adapter = StreamAdapter::register(config.adapter.clone(), Box::new(std::io::stdout()))
        .context("failed to register stream adapter")?;
    let sink = Arc::clone(&connection) as Arc<dyn FrameSink>;
    let path = adapter
        .attach(sink, config.console_slot)
        .context("failed to attach connection")?;

    connection.start().context("failed to start connection")?;

    let mut registry = CommandRegistry::with_max_args(config.console.max_args);
    register_builtins(&mut registry, Some(Arc::clone(&connection)));
    let registry = Arc::new(registry);
    let completer = Arc::clone(&registry);
    let completion: CompletionFn = Arc::new(move |typed: &str| completer.complete(typed));
    let editor = DumbLineEditor::new(config.console.max_line_len, config.console.history_len)
        .with_completion(completion);

    let worker = ConsoleWorker::spawn(
        Arc::clone(&adapter),
        path,
        registry,
        editor,
        config.console.clone(),
    )
    .context("failed to spawn console worker")?;

    let mut poll = tokio::time::interval(WORKER_POLL);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                tracing::info!("shutdown requested");
                break;
            }
            _ = poll.tick() => {
                if worker.is_finished() {
                    break;
                }
            }
        }
    }

    // Stop the console first; detaching its endpoint wakes a blocked read.
    worker.request_stop();
    let network_timeout = config.connection.network_timeout;
    let console_result = tokio::task::spawn_blocking(move || {
        let unregistered = StreamAdapter::unregister();
        let joined = worker.join();
        let closed = connection.close(network_timeout);
        unregistered.and(closed).and(joined)
    })
    .await
    .context("shutdown task failed")?;

    tracing::info!("ws-console-bridge stopped");
    console_result.context("console worker failed")?;
    Ok(())
}
