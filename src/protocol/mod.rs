pub mod advertisement;
mod estimator;
mod link_control;
pub mod liveness;
mod message_handler;
pub mod messages;
pub mod node_table;
mod task_manager;
pub mod types;

pub use advertisement::Advertisement;
pub use liveness::{Expiry, LivenessMonitor, MonitorFactory};
pub use messages::*;
pub use node_table::{Link, LinkState, Node, NodeTable, RouteSnapshot, TableSnapshot};
pub use types::*;

use crate::error::{Error, LinkError};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

pub type SharedTable = Arc<Mutex<NodeTable>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: NodeId,
    pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkCommand {
    Down,
    Up,
    Change(Cost),
}

/// Distance-vector routing engine for one node.
///
/// The node table sits behind a single lock; inbound messages, liveness
/// expiries, operator commands and the periodic broadcaster all go through
/// it, and every mutation recomputes routes before the lock is released.
/// Network I/O never happens under the lock: outgoing messages are queued
/// on `outbound` for the transport to drain.
pub struct DistanceVectorProtocol {
    local: NodeId,
    broadcast_interval: Duration,
    table: SharedTable,
    outbound: mpsc::UnboundedSender<Outbound>,
    expired_rx: Arc<Mutex<mpsc::UnboundedReceiver<Expiry>>>,
    shutdown_tx: broadcast::Sender<()>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DistanceVectorProtocol {
    /// Creates the engine with `neighbors` already live. Must run inside a
    /// tokio runtime since each neighbor gets a liveness monitor immediately.
    pub fn new(
        local: NodeId,
        broadcast_interval: Duration,
        neighbors: impl IntoIterator<Item = (NodeId, Cost)>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let monitors = MonitorFactory::new(broadcast_interval * LIVENESS_MULTIPLIER, expired_tx);
        let table = NodeTable::with_neighbors(local, monitors, neighbors);
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            "Node {} starting with {} neighbor(s), broadcast every {:?}",
            local,
            table.neighbors().count(),
            broadcast_interval
        );

        Self {
            local,
            broadcast_interval,
            table: Arc::new(Mutex::new(table)),
            outbound,
            expired_rx: Arc::new(Mutex::new(expired_rx)),
            shutdown_tx,
            task_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn table(&self) -> &SharedTable {
        &self.table
    }

    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub async fn start(&self) {
        task_manager::start_tasks(self).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
        drop(handles);

        self.table.lock().await.cancel_monitors();
        info!("Node {} shut down", self.local);
    }

    pub async fn handle_datagram(&self, bytes: &[u8], from: NodeId) -> Result<(), Error> {
        let message = Message::decode(bytes)?;
        debug!("Received {} from {}", message.kind(), from);
        self.apply(&from, message).await
    }

    pub async fn apply(&self, sender: &NodeId, message: Message) -> Result<(), Error> {
        self.table.lock().await.apply(sender, message)
    }

    pub async fn link_down(&self, addr: &NodeId) -> Result<(), LinkError> {
        self.table.lock().await.link_down(addr)
    }

    pub async fn link_up(&self, addr: &NodeId) -> Result<(), LinkError> {
        self.table.lock().await.link_up(addr)
    }

    pub async fn link_change(&self, addr: &NodeId, direct: Cost) -> Result<(), LinkError> {
        self.table.lock().await.link_change(addr, direct)
    }

    /// Applies an operator command locally, then asks the peer to mirror it.
    /// Nothing is sent when the local operation is rejected.
    pub async fn execute(&self, target: &NodeId, command: LinkCommand) -> Result<(), LinkError> {
        let message = {
            let mut table = self.table.lock().await;
            match command {
                LinkCommand::Down => {
                    table.link_down(target)?;
                    Message::LinkDown
                }
                LinkCommand::Up => {
                    table.link_up(target)?;
                    Message::LinkUp
                }
                LinkCommand::Change(direct) => {
                    table.link_change(target, direct)?;
                    Message::LinkChange(LinkChange { direct })
                }
            }
        };

        if self
            .outbound
            .send(Outbound {
                to: *target,
                message,
            })
            .is_err()
        {
            warn!("Outbound queue closed, {} not notified", target);
        }
        Ok(())
    }

    pub async fn broadcast(&self) -> usize {
        task_manager::broadcast_round(&self.table, &self.outbound).await
    }

    pub async fn snapshot(&self) -> TableSnapshot {
        self.table.lock().await.snapshot()
    }
}
