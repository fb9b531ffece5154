use super::messages::{CostUpdate, Message, NeighborLink};
use super::{DistanceVectorProtocol, Expiry, Outbound, SharedTable};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::interval;

pub async fn start_tasks(protocol: &DistanceVectorProtocol) {
    let mut handles_guard = protocol.task_handles.lock().await;

    for handle in handles_guard.drain(..) {
        handle.abort();
    }

    let broadcast_handle = start_broadcast_task(protocol, protocol.shutdown_tx.subscribe());
    let expiry_handle = start_expiry_task(protocol, protocol.shutdown_tx.subscribe());

    handles_guard.push(broadcast_handle);
    handles_guard.push(expiry_handle);

    info!("All protocol tasks started");
}

fn start_broadcast_task(
    protocol: &DistanceVectorProtocol,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let table = protocol.table.clone();
    let outbound = protocol.outbound.clone();
    let period = protocol.broadcast_interval;

    tokio::spawn(async move {
        broadcast_task(table, outbound, period, &mut shutdown_rx).await;
    })
}

fn start_expiry_task(
    protocol: &DistanceVectorProtocol,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let table = protocol.table.clone();
    let expired_rx = protocol.expired_rx.clone();

    tokio::spawn(async move {
        expiry_task(table, expired_rx, &mut shutdown_rx).await;
    })
}

async fn broadcast_task(
    table: SharedTable,
    outbound: mpsc::UnboundedSender<Outbound>,
    period: Duration,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let mut interval = interval(period);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Broadcast task shutting down");
                break;
            }
            _ = interval.tick() => {
                broadcast_round(&table, &outbound).await;
            }
        }
    }
}

async fn expiry_task(
    table: SharedTable,
    expired_rx: Arc<Mutex<mpsc::UnboundedReceiver<Expiry>>>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let mut expired_rx = expired_rx.lock().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Expiry task shutting down");
                break;
            }
            expiry = expired_rx.recv() => {
                match expiry {
                    Some(expiry) => {
                        table.lock().await.expire(expiry);
                    }
                    None => break,
                }
            }
        }
    }
}

/// Builds every neighbor's advertisement under the lock, then queues them
/// once the lock is released. Returns how many were queued.
pub async fn broadcast_round(table: &SharedTable, outbound: &mpsc::UnboundedSender<Outbound>) -> usize {
    let advertisements = {
        let table_guard = table.lock().await;
        table_guard.advertisements()
    };

    let mut sent = 0;
    for advertisement in advertisements {
        let message = Message::CostUpdate(CostUpdate {
            costs: advertisement.costs,
            neighbor: NeighborLink {
                direct: advertisement.direct,
            },
        });

        if outbound
            .send(Outbound {
                to: advertisement.to,
                message,
            })
            .is_err()
        {
            warn!("Outbound queue closed, dropping broadcast round");
            break;
        }
        sent += 1;
    }

    debug!("Queued cost updates for {} neighbor(s)", sent);
    sent
}
