use crate::protocol::{DistanceVectorProtocol, NodeId, Outbound};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const MAX_DATAGRAM: usize = 65_535;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: NodeId,
}

impl UdpTransport {
    pub async fn bind(addr: NodeId) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr.addr()).await?;
        let local = NodeId::new(socket.local_addr()?);
        info!("Listening on {}", local);

        Ok(Self {
            socket: Arc::new(socket),
            local,
        })
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn spawn_sender(
        &self,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let socket = self.socket.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Sender task shutting down");
                        break;
                    }
                    outbound = outbound_rx.recv() => {
                        let Some(outbound) = outbound else { break };
                        send_one(&socket, outbound).await;
                    }
                }
            }
        })
    }

    pub fn spawn_listener(
        &self,
        protocol: Arc<DistanceVectorProtocol>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let socket = self.socket.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM];

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Listen task shutting down");
                        break;
                    }
                    result = socket.recv_from(&mut buffer) => {
                        match result {
                            Ok((len, addr)) => {
                                let from = NodeId::new(addr);
                                debug!("Received {} bytes from {}", len, from);
                                if let Err(e) = protocol.handle_datagram(&buffer[..len], from).await {
                                    warn!("Dropped datagram from {}: {}", from, e);
                                }
                            }
                            Err(e) => {
                                error!("Failed to receive datagram: {}", e);
                                tokio::time::sleep(Duration::from_millis(100)).await;
                            }
                        }
                    }
                }
            }
        })
    }
}

async fn send_one(socket: &UdpSocket, outbound: Outbound) {
    let data = match outbound.message.encode() {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to encode {} for {}: {}", outbound.message.kind(), outbound.to, e);
            return;
        }
    };

    if let Err(e) = socket.send_to(&data, outbound.to.addr()).await {
        warn!("Failed to send {} to {}: {}", outbound.message.kind(), outbound.to, e);
    } else {
        debug!("Sent {} to {} ({} bytes)", outbound.message.kind(), outbound.to, data.len());
    }
}
