use anyhow::{Context, Result};
use clap::Parser;
use dv_router::config::RouterConfig;
use dv_router::control_server::ControlServer;
use dv_router::error::ConfigError;
use dv_router::protocol::DistanceVectorProtocol;
use dv_router::transport::UdpTransport;
use log::{error, info};
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "dv-router", about = "Distance-vector routing node")]
struct Cli {
    /// UDP port this node listens on
    port: Option<String>,

    /// Seconds between cost-update broadcasts
    interval: Option<String>,

    /// Neighbor links as HOST PORT COST triples
    #[arg(num_args = 0.., allow_hyphen_values = true)]
    links: Vec<String>,

    /// Load the node configuration from a JSON file instead
    #[arg(long, conflicts_with_all = ["port", "interval", "links"])]
    config: Option<String>,

    /// Host to bind and identify as
    #[arg(long)]
    bind: Option<String>,

    /// Serve the JSON control console on this TCP port
    #[arg(long)]
    control_port: Option<u16>,

    /// Write the effective configuration to this file and continue
    #[arg(long)]
    save_config: Option<String>,
}

impl Cli {
    fn router_config(&self) -> Result<RouterConfig, ConfigError> {
        let mut config = match (&self.config, &self.port, &self.interval) {
            (Some(path), _, _) => RouterConfig::load(path)?,
            (None, Some(port), Some(interval)) => RouterConfig::from_args(port, interval, &self.links)?,
            (None, Some(_), None) => {
                return Err(ConfigError::InvalidInterval("missing".to_string()));
            }
            (None, None, _) => return Err(ConfigError::MissingPort),
        };

        if let Some(bind) = &self.bind {
            config.bind_host = bind.clone();
        }
        if self.control_port.is_some() {
            config.control_port = self.control_port;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.router_config()?;
    let resolved = config.validate()?;

    if let Some(path) = &cli.save_config {
        config
            .save(path)
            .with_context(|| format!("failed to save configuration to {}", path))?;
        info!("Configuration saved to {}", path);
    }

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let transport = UdpTransport::bind(resolved.local)
            .await
            .with_context(|| format!("failed to bind UDP socket on {}", resolved.local))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let protocol = Arc::new(DistanceVectorProtocol::new(
            transport.local(),
            resolved.broadcast_interval,
            resolved.neighbors.iter().copied(),
            outbound_tx,
        ));

        let sender = transport.spawn_sender(outbound_rx, protocol.shutdown_signal());
        let listener = transport.spawn_listener(protocol.clone(), protocol.shutdown_signal());
        protocol.start().await;

        let control = resolved.control_port.map(|port| {
            let server = ControlServer::new(port, protocol.clone());
            let shutdown_rx = protocol.shutdown_signal();
            tokio::spawn(async move {
                if let Err(e) = server.start(shutdown_rx).await {
                    error!("Control server failed: {}", e);
                }
            })
        });

        info!("Node {} running, press Ctrl-C to stop", protocol.local());
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;

        info!("Shutting down");
        protocol.shutdown().await;
        let _ = sender.await;
        let _ = listener.await;
        if let Some(control) = control {
            let _ = control.await;
        }

        Ok::<(), anyhow::Error>(())
    })
}
