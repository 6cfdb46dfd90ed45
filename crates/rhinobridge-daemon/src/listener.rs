//! Loopback socket listener
//!
//! Accepts connections from the exporter on `127.0.0.1:<port>`. Each
//! connection carries one JSON batch and ends when the peer closes its write
//! side. The listener runs on its own thread with a single-threaded tokio
//! runtime and only ever appends to the [`ImportQueue`].

use rhinobridge_core::parse_batch;
use rhinobridge_import::ImportQueue;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::BridgeEvent;

const THREAD_NAME: &str = "bridge-listener";

/// Pause after a failed accept so a persistent error (e.g. out of file
/// handles) doesn't spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build listener runtime: {0}")]
    Runtime(std::io::Error),
    #[error("Failed to register listener socket: {0}")]
    Register(std::io::Error),
    #[error("Failed to spawn listener thread: {0}")]
    Spawn(std::io::Error),
}

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Timed out waiting for payload")]
    Timeout,
    #[error("Payload exceeds {0} bytes")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-connection limits
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub read_timeout: Duration,
    pub max_payload_bytes: usize,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

struct RunningListener {
    bound_port: u16,
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

#[derive(Clone)]
struct ConnectionContext {
    queue: Arc<ImportQueue>,
    events: broadcast::Sender<BridgeEvent>,
    options: ListenerOptions,
}

/// Socket listener feeding the import queue
pub struct BridgeListener {
    port: u16,
    options: ListenerOptions,
    queue: Arc<ImportQueue>,
    events: broadcast::Sender<BridgeEvent>,
    running: Option<RunningListener>,
}

impl BridgeListener {
    pub fn new(
        port: u16,
        options: ListenerOptions,
        queue: Arc<ImportQueue>,
        events: broadcast::Sender<BridgeEvent>,
    ) -> Self {
        Self {
            port,
            options,
            queue,
            events,
            running: None,
        }
    }

    /// Bind and start accepting. Returns the bound port; does nothing if
    /// already running.
    pub fn start(&mut self) -> Result<u16, ListenerError> {
        if let Some(running) = &self.running {
            debug!(port = running.bound_port, "Listener already running");
            return Ok(running.bound_port);
        }

        let port = self.port;
        let bind_err = |source: std::io::Error| ListenerError::Bind { port, source };
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port)).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let bound_port = listener.local_addr().map_err(bind_err)?.port();

        // Runtime and socket registration fail here, not on the thread
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ListenerError::Runtime)?;
        let listener = {
            let _entered = runtime.enter();
            TcpListener::from_std(listener).map_err(ListenerError::Register)?
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = ConnectionContext {
            queue: self.queue.clone(),
            events: self.events.clone(),
            options: self.options.clone(),
        };

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(accept_loop(listener, shutdown_rx, ctx.clone()));
                let _ = ctx.events.send(BridgeEvent::ListenerStopped);
            })
            .map_err(ListenerError::Spawn)?;

        info!(port = bound_port, "Listener started");
        let _ = self.events.send(BridgeEvent::ListenerStarted { port: bound_port });

        self.running = Some(RunningListener {
            bound_port,
            shutdown,
            thread,
        });
        Ok(bound_port)
    }

    /// Stop accepting and wait for in-flight connections. Does nothing if
    /// not running.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if running.thread.join().is_err() {
            warn!("Listener thread panicked");
        }
        info!(port = running.bound_port, "Listener stopped");
    }

    /// Change the port. A running listener keeps its socket until restarted.
    pub fn set_port(&mut self, port: u16) {
        if self.port == port {
            return;
        }
        self.port = port;
        if self.is_running() {
            info!(port = port, "Port updated, takes effect after restart");
        } else {
            info!(port = port, "Port updated");
        }
    }

    /// Configured port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Port actually bound while running
    pub fn bound_port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.bound_port)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for BridgeListener {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(listener: TcpListener, mut shutdown: watch::Receiver<bool>, ctx: ConnectionContext) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    connections.spawn(handle_connection(stream, peer, ctx.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    if !connections.is_empty() {
        debug!(connections = connections.len(), "Waiting for in-flight connections");
    }
    while connections.join_next().await.is_some() {}
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: ConnectionContext) {
    let result = read_payload(stream, &ctx.options)
        .await
        .and_then(|payload| parse_batch(&payload).map_err(PayloadError::from));

    match result {
        Ok(assets) if assets.is_empty() => {
            debug!(peer = %peer, "Empty batch");
        }
        Ok(assets) => {
            let count = assets.len();
            let pending = ctx.queue.enqueue_batch(assets);
            let _ = ctx.events.send(BridgeEvent::ImportsReceived { count, pending });
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "Rejected payload");
            let _ = ctx.events.send(BridgeEvent::PayloadRejected {
                peer,
                error: e.to_string(),
            });
        }
    }
}

/// Read until the peer closes its write side
async fn read_payload(stream: TcpStream, options: &ListenerOptions) -> Result<Vec<u8>, PayloadError> {
    let limit = options.max_payload_bytes as u64 + 1;
    let mut payload = Vec::new();
    let mut reader = stream.take(limit);

    tokio::time::timeout(options.read_timeout, reader.read_to_end(&mut payload))
        .await
        .map_err(|_| PayloadError::Timeout)??;

    if payload.len() > options.max_payload_bytes {
        return Err(PayloadError::TooLarge(options.max_payload_bytes));
    }
    Ok(payload)
}
