//! Bridge events for informational subscribers

use std::net::SocketAddr;

/// Event broadcast by the listener and the idle loop
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Listener accepted its socket
    ListenerStarted { port: u16 },
    /// Listener thread has exited
    ListenerStopped,
    /// A batch was queued
    ImportsReceived { count: usize, pending: usize },
    /// A connection's payload could not be read or parsed
    PayloadRejected { peer: SocketAddr, error: String },
    /// An asset left the queue and reached a terminal state
    AssetImported {
        import_id: String,
        name: String,
        completed: bool,
        failure: Option<String>,
        /// Time spent converting and applying
        elapsed_ms: i64,
    },
}
