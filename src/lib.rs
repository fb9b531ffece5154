pub mod config;
pub mod control_server;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::{NeighborConfig, ResolvedConfig, RouterConfig};
pub use error::{ConfigError, Error, LinkError, ProtocolError};
pub use protocol::{Cost, DistanceVectorProtocol, LinkCommand, Message, NodeId, Outbound};
