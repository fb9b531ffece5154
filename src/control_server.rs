use crate::protocol::{Cost, DistanceVectorProtocol, LinkCommand, NodeId};
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, lookup_host};
use tokio::sync::broadcast;

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl ControlResponse {
    fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: String,
    pub args: Option<Value>,
}

/// Line-delimited JSON console for inspecting and editing links at runtime.
pub struct ControlServer {
    port: u16,
    protocol: Arc<DistanceVectorProtocol>,
}

impl ControlServer {
    pub fn new(port: u16, protocol: Arc<DistanceVectorProtocol>) -> Self {
        Self { port, protocol }
    }

    pub async fn start(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let bind_addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Control server listening on {}", bind_addr);

        self.serve(listener, shutdown_rx).await;
        Ok(())
    }

    pub async fn serve(&self, listener: TcpListener, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Control server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!("Control connection from {}", addr);
                            let protocol = self.protocol.clone();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_client(stream, protocol).await {
                                    error!("Error handling control client {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept control connection: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_client(mut stream: TcpStream, protocol: Arc<DistanceVectorProtocol>) -> Result<()> {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            if buf_reader.read_line(&mut line).await? == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ControlCommand>(trimmed) {
                Ok(command) => Self::process_command(command, &protocol).await,
                Err(e) => ControlResponse::failure(format!("Invalid JSON command: {}", e)),
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(format!("{}\n", response_json).as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    async fn process_command(command: ControlCommand, protocol: &DistanceVectorProtocol) -> ControlResponse {
        match command.command.as_str() {
            "routes" => Self::get_routes(protocol).await,
            "neighbors" => Self::get_neighbors(protocol).await,
            "linkdown" => Self::run_link_command(command.args, protocol, |_| Ok(LinkCommand::Down)).await,
            "linkup" => Self::run_link_command(command.args, protocol, |_| Ok(LinkCommand::Up)).await,
            "linkchange" => {
                Self::run_link_command(command.args, protocol, |args| {
                    parse_cost(args).map(LinkCommand::Change)
                })
                .await
            }
            "help" => Self::get_help(),
            _ => ControlResponse::failure(format!("Unknown command: {}", command.command)),
        }
    }

    async fn get_routes(protocol: &DistanceVectorProtocol) -> ControlResponse {
        let snapshot = protocol.snapshot().await;
        let count = snapshot.entries.len();

        match serde_json::to_value(&snapshot) {
            Ok(data) => ControlResponse::ok(format!("{} known destination(s)", count), Some(data)),
            Err(e) => ControlResponse::failure(format!("Failed to serialize routes: {}", e)),
        }
    }

    async fn get_neighbors(protocol: &DistanceVectorProtocol) -> ControlResponse {
        let snapshot = protocol.snapshot().await;
        let neighbors: Vec<_> = snapshot.neighbors().collect();

        match serde_json::to_value(&neighbors) {
            Ok(data) => ControlResponse::ok(format!("Found {} neighbors", neighbors.len()), Some(data)),
            Err(e) => ControlResponse::failure(format!("Failed to serialize neighbors: {}", e)),
        }
    }

    async fn run_link_command(
        args: Option<Value>,
        protocol: &DistanceVectorProtocol,
        build: impl FnOnce(&Value) -> Result<LinkCommand, String>,
    ) -> ControlResponse {
        let Some(args) = args else {
            return ControlResponse::failure("addr parameter required");
        };

        let target = match parse_addr(&args).await {
            Ok(target) => target,
            Err(message) => return ControlResponse::failure(message),
        };
        let command = match build(&args) {
            Ok(command) => command,
            Err(message) => return ControlResponse::failure(message),
        };

        match protocol.execute(&target, command).await {
            Ok(()) => ControlResponse::ok(format!("{:?} applied to link {}", command, target), None),
            Err(e) => {
                warn!("Rejected {:?} on {}: {}", command, target, e);
                ControlResponse::failure(e.to_string())
            }
        }
    }

    fn get_help() -> ControlResponse {
        ControlResponse::ok(
            "Available commands",
            Some(serde_json::json!({
                "routes": "Show the distance vector of every known destination",
                "neighbors": "Show direct neighbors and their link costs",
                "linkdown": "Take a link down: {\"addr\": \"host:port\"}",
                "linkup": "Restore a link taken down earlier: {\"addr\": \"host:port\"}",
                "linkchange": "Change a link's cost: {\"addr\": \"host:port\", \"cost\": 3}",
                "help": "Show this help message"
            })),
        )
    }
}

async fn parse_addr(args: &Value) -> Result<NodeId, String> {
    let Some(raw) = args.get("addr").and_then(Value::as_str) else {
        return Err("Missing or invalid addr parameter".to_string());
    };

    if let Ok(id) = raw.parse() {
        return Ok(id);
    }

    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("'{}' is not a host:port address", raw))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("port values must be integers, '{}' is not an int", port))?;

    if host.eq_ignore_ascii_case("localhost") {
        return Ok(NodeId::new(SocketAddr::from((Ipv4Addr::LOCALHOST, port))));
    }

    let candidates: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| format!("cannot resolve {}: {}", raw, e))?
        .collect();
    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .map(|addr| NodeId::new(*addr))
        .ok_or_else(|| format!("no address found for {}", raw))
}

fn parse_cost(args: &Value) -> Result<Cost, String> {
    let raw = args
        .get("cost")
        .ok_or_else(|| "cost parameter required".to_string())?;

    match serde_json::from_value::<Cost>(raw.clone()) {
        Ok(cost) if cost.is_finite() => Ok(cost),
        _ => Err(format!("link costs must be finite numbers, {} is not valid", raw)),
    }
}
