use crate::protocol::{Cost, NodeId};
use thiserror::Error;

/// Malformed startup parameters. Fatal before any socket is bound.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("port values must be integers, '{0}' is not an int")]
    InvalidPort(String),

    #[error("broadcast interval must be a positive number of seconds, got '{0}'")]
    InvalidInterval(String),

    #[error("link costs must be numbers of at least 1, '{0}' is not valid")]
    InvalidCost(String),

    #[error("please provide host, port and link cost for each link")]
    IncompleteNeighbor,

    #[error("cannot resolve {host}:{port}: {source}")]
    Unresolvable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("neighbor {0} is listed more than once")]
    DuplicateNeighbor(NodeId),

    #[error("node {0} cannot be its own neighbor")]
    SelfNeighbor(NodeId),

    #[error("no port given; pass <PORT> <INTERVAL> or --config <FILE>")]
    MissingPort,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Inbound datagram rejected before touching the node table.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("'{0}' is not in the update protocol")]
    UnknownKind(String),

    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("undecodable datagram: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("datagram claims to come from this node ({0})")]
    FromSelf(NodeId),

    #[error("{0} advertised an infinite direct cost")]
    UnusableDirectCost(NodeId),
}

/// Link operation whose preconditions do not hold. Nothing was mutated.
#[derive(Debug, Error, PartialEq)]
pub enum LinkError {
    #[error("node {0} is not in the network")]
    UnknownNode(NodeId),

    #[error("node {0} is not a neighbor")]
    NotNeighbor(NodeId),

    #[error("link to {0} is already down")]
    AlreadyDown(NodeId),

    #[error("link to {0} is currently down, bring it back with linkup first")]
    LinkIsDown(NodeId),

    #[error("{0} wasn't a previous neighbor, nothing to restore")]
    NoSavedCost(NodeId),

    #[error("link to {0} cannot be set to an infinite cost, use linkdown instead")]
    InfiniteCost(NodeId),

    #[error("the minimum link cost is {minimum}, got {requested}")]
    CostBelowMinimum { requested: Cost, minimum: Cost },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Link(#[from] LinkError),
}
