use crate::error::ConfigError;
use crate::protocol::{Cost, MIN_LINK_COST, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    pub port: u16,
    pub broadcast_interval_secs: f64,
    #[serde(default)]
    pub neighbors: Vec<NeighborConfig>,
    #[serde(default)]
    pub control_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborConfig {
    pub host: String,
    pub port: u16,
    pub cost: Cost,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub local: NodeId,
    pub broadcast_interval: Duration,
    pub neighbors: Vec<(NodeId, Cost)>,
    pub control_port: Option<u16>,
}

impl RouterConfig {
    /// Builds a config from `<PORT> <INTERVAL> [HOST PORT COST]...` style arguments.
    pub fn from_args(port: &str, interval: &str, links: &[String]) -> Result<Self, ConfigError> {
        let port = parse_port(port)?;
        let broadcast_interval_secs = parse_interval(interval)?;

        if links.len() % 3 != 0 {
            return Err(ConfigError::IncompleteNeighbor);
        }

        let neighbors = links
            .chunks(3)
            .map(|link| {
                Ok(NeighborConfig {
                    host: link[0].to_lowercase(),
                    port: parse_port(&link[1])?,
                    cost: link[2]
                        .parse()
                        .map_err(|_| ConfigError::InvalidCost(link[2].clone()))?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            bind_host: default_bind_host(),
            port,
            broadcast_interval_secs,
            neighbors,
            control_port: None,
        })
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Checks every parameter and resolves host names. Nothing here touches
    /// the network beyond name resolution.
    pub fn validate(&self) -> Result<ResolvedConfig, ConfigError> {
        if !self.broadcast_interval_secs.is_finite() || self.broadcast_interval_secs <= 0.0 {
            return Err(ConfigError::InvalidInterval(self.broadcast_interval_secs.to_string()));
        }
        let broadcast_interval = Duration::try_from_secs_f64(self.broadcast_interval_secs)
            .map_err(|_| ConfigError::InvalidInterval(self.broadcast_interval_secs.to_string()))?;

        let local = resolve_host(&self.bind_host, self.port)?;

        let mut seen = HashSet::new();
        let mut neighbors = Vec::with_capacity(self.neighbors.len());
        for neighbor in &self.neighbors {
            if !neighbor.cost.is_finite() || neighbor.cost < MIN_LINK_COST {
                return Err(ConfigError::InvalidCost(neighbor.cost.to_string()));
            }

            let id = resolve_host(&neighbor.host, neighbor.port)?;
            if id == local {
                return Err(ConfigError::SelfNeighbor(id));
            }
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateNeighbor(id));
            }
            neighbors.push((id, neighbor.cost));
        }

        Ok(ResolvedConfig {
            local,
            broadcast_interval,
            neighbors,
            control_port: self.control_port,
        })
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(raw.to_string()))
}

fn parse_interval(raw: &str) -> Result<f64, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(secs),
        _ => Err(ConfigError::InvalidInterval(raw.to_string())),
    }
}

fn resolve_host(host: &str, port: u16) -> Result<NodeId, ConfigError> {
    NodeId::resolve(host, port).map_err(|source| ConfigError::Unresolvable {
        host: host.to_string(),
        port,
        source,
    })
}
