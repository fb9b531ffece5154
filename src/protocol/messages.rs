use super::{Cost, NodeId};
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    CostUpdate,
    LinkDown,
    LinkUp,
    LinkChange,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::CostUpdate => "cost-update",
            MessageKind::LinkDown => "linkdown",
            MessageKind::LinkUp => "linkup",
            MessageKind::LinkChange => "linkchange",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "cost-update" | "costsupdate" => Some(MessageKind::CostUpdate),
            "linkdown" => Some(MessageKind::LinkDown),
            "linkup" => Some(MessageKind::LinkUp),
            "linkchange" => Some(MessageKind::LinkChange),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostUpdate {
    pub costs: BTreeMap<NodeId, Cost>,
    pub neighbor: NeighborLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborLink {
    pub direct: Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkChange {
    pub direct: Cost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    CostUpdate(CostUpdate),
    LinkDown,
    LinkUp,
    LinkChange(LinkChange),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct OutboundEnvelope<P: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: P,
}

#[derive(Serialize)]
struct NoPayload {}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::CostUpdate(_) => MessageKind::CostUpdate,
            Message::LinkDown => MessageKind::LinkDown,
            Message::LinkUp => MessageKind::LinkUp,
            Message::LinkChange(_) => MessageKind::LinkChange,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let kind = self.kind().as_str();
        match self {
            Message::CostUpdate(update) => serde_json::to_vec(&OutboundEnvelope { kind, payload: update }),
            Message::LinkDown | Message::LinkUp => {
                serde_json::to_vec(&OutboundEnvelope { kind, payload: NoPayload {} })
            }
            Message::LinkChange(change) => serde_json::to_vec(&OutboundEnvelope { kind, payload: change }),
        }
    }

    /// Decodes a whole datagram. Nothing partial ever escapes: either every
    /// field parsed or the datagram is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(bytes).map_err(ProtocolError::Envelope)?;
        let kind = MessageKind::parse(&envelope.kind)
            .ok_or_else(|| ProtocolError::UnknownKind(envelope.kind.clone()))?;

        let malformed = |source: serde_json::Error| ProtocolError::Malformed {
            kind: kind.as_str(),
            source,
        };

        Ok(match kind {
            MessageKind::CostUpdate => {
                Message::CostUpdate(serde_json::from_value(envelope.payload).map_err(malformed)?)
            }
            MessageKind::LinkDown => Message::LinkDown,
            MessageKind::LinkUp => Message::LinkUp,
            MessageKind::LinkChange => {
                Message::LinkChange(serde_json::from_value(envelope.payload).map_err(malformed)?)
            }
        })
    }
}
