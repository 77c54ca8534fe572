//! Realtime hub: the single registry of live WebSocket subscribers
//!
//! Register, unregister and broadcast requests travel over one FIFO channel
//! into a single task that owns the connection set, so the set needs no lock
//! and every subscriber sees broadcasts in the order they were enqueued.
//!
//! Each subscriber gets a small bounded hand-off queue drained by its writer
//! task. A full or closed queue means the subscriber cannot keep up or is
//! gone: it is dropped from the set and the rest of the fan-out continues.
//!
//! ```text
//!  ingestor ─┐                       ┌─► queue ─► writer ─► socket
//!  relay(s) ─┼─► HubCommand ─► Hub ──┼─► queue ─► writer ─► socket
//!  ws conn  ─┘    (FIFO)      (owns) └─► queue ─► writer ─► socket
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::shutdown::Shutdown;

/// Identity of one connected subscriber, never reused within a process.
pub type ConnectionId = u64;

/// Configuration for the hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered between the hub and one subscriber's writer task.
    pub client_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: 256,
        }
    }
}

enum HubCommand {
    Register {
        id: ConnectionId,
        outbound: mpsc::Sender<Bytes>,
    },
    Unregister(ConnectionId),
    Broadcast(Bytes),
    ConnectionCount(oneshot::Sender<usize>),
}

impl std::fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubCommand::Register { id, .. } => write!(f, "Register({id})"),
            HubCommand::Unregister(id) => write!(f, "Unregister({id})"),
            HubCommand::Broadcast(payload) => write!(f, "Broadcast({} bytes)", payload.len()),
            HubCommand::ConnectionCount(_) => f.write_str("ConnectionCount"),
        }
    }
}

/// Cloneable handle used by every producer and by connection handlers.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

/// Receiving side of one registered connection.
#[derive(Debug)]
pub struct Subscriber {
    id: ConnectionId,
    frames: mpsc::Receiver<Bytes>,
}

impl Subscriber {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next frame, or `None` once the hub has released this connection.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.frames.try_recv().ok()
    }
}

impl HubHandle {
    /// Add a new connection to the live set.
    ///
    /// Every broadcast enqueued after this call returns reaches the returned
    /// subscriber unless it is unregistered or falls behind.
    pub fn register(&self) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, frames) = mpsc::channel(self.queue_capacity);

        if self
            .commands
            .send(HubCommand::Register { id, outbound })
            .is_err()
        {
            debug!(connection_id = id, "Hub stopped, registration ignored");
        }

        Subscriber { id, frames }
    }

    /// Remove a connection; a no-op if it is not (or no longer) registered.
    pub fn unregister(&self, id: ConnectionId) {
        let _ = self.commands.send(HubCommand::Unregister(id));
    }

    /// Enqueue a payload for every connection live at delivery time.
    pub fn broadcast(&self, payload: impl Into<Bytes>) {
        if self
            .commands
            .send(HubCommand::Broadcast(payload.into()))
            .is_err()
        {
            debug!("Hub stopped, broadcast dropped");
        }
    }

    /// Number of live connections, or 0 once the hub has stopped.
    pub async fn connection_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(HubCommand::ConnectionCount(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// The hub loop. Owns the connection set exclusively.
pub struct Hub {
    commands: mpsc::UnboundedReceiver<HubCommand>,
    connections: BTreeMap<ConnectionId, mpsc::Sender<Bytes>>,
}

impl Hub {
    pub fn new(config: HubConfig) -> (HubHandle, Hub) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = HubHandle {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: config.client_queue_capacity.max(1),
        };
        let hub = Hub {
            commands: rx,
            connections: BTreeMap::new(),
        };
        (handle, hub)
    }

    /// Process requests until shutdown, then apply whatever was already
    /// enqueued and release every connection.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!("Realtime hub started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            }
        }

        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        let released = self.connections.len();
        self.connections.clear();
        info!(released, "Realtime hub stopped");
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { id, outbound } => {
                self.connections.insert(id, outbound);
                info!(
                    connection_id = id,
                    total = self.connections.len(),
                    "Client connected"
                );
            }
            HubCommand::Unregister(id) => {
                if self.connections.remove(&id).is_some() {
                    info!(
                        connection_id = id,
                        total = self.connections.len(),
                        "Client disconnected"
                    );
                }
            }
            HubCommand::Broadcast(payload) => self.fan_out(payload),
            HubCommand::ConnectionCount(reply) => {
                let _ = reply.send(self.connections.len());
            }
        }
    }

    fn fan_out(&mut self, payload: Bytes) {
        self.connections
            .retain(|id, outbound| match outbound.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = *id, "Subscriber lagging, disconnecting");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection_id = *id, "Subscriber gone, removing");
                    false
                }
            });
    }
}
