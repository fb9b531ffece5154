use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::ops::Add;
use std::str::FromStr;

/// Any computed cost strictly greater than this is unreachable.
pub const MAX_METRIC: Cost = Cost(16.0);

pub const MIN_LINK_COST: Cost = Cost(1.0);

/// Number of silent broadcast periods after which a neighbor is presumed dead.
pub const LIVENESS_MULTIPLIER: u32 = 3;

/// Identity of a node in the network: the `host:port` its routing socket is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(SocketAddr);

impl NodeId {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Resolves a host name and port, preferring IPv4. `localhost` maps to the loopback address.
    pub fn resolve(host: &str, port: u16) -> std::io::Result<Self> {
        if host.eq_ignore_ascii_case("localhost") {
            return Ok(Self(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)));
        }

        let candidates: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        candidates
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| candidates.first())
            .copied()
            .map(Self)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address found for {}:{}", host, port),
                )
            })
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for NodeId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for NodeId {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl TryFrom<String> for NodeId {
    type Error = AddrParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Path or link metric. Never negative and never NaN; `Cost::INFINITY` means unreachable.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Cost(f64);

impl Cost {
    pub const ZERO: Cost = Cost(0.0);
    pub const INFINITY: Cost = Cost(f64::INFINITY);

    pub fn new(value: f64) -> Option<Self> {
        if value.is_nan() || value < 0.0 {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    pub fn capped(self, ceiling: Cost) -> Cost {
        if self.0 > ceiling.0 { Cost::INFINITY } else { self }
    }
}

impl Eq for Cost {}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost(self.0 + rhs.0)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_finite() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "inf")
        }
    }
}

impl FromStr for Cost {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if is_infinity_token(s) {
            return Ok(Cost::INFINITY);
        }
        let value: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
        Cost::new(value).ok_or_else(|| format!("'{}' is not a valid cost", s))
    }
}

fn is_infinity_token(s: &str) -> bool {
    s.eq_ignore_ascii_case("inf") || s.eq_ignore_ascii_case("infinity")
}

// Infinity travels as JSON null; serde_json cannot represent non-finite numbers.
impl Serialize for Cost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_unit()
        }
    }
}

struct CostVisitor;

impl<'de> Visitor<'de> for CostVisitor {
    type Value = Cost;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative number, null or \"inf\"")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Cost, E> {
        Ok(Cost::INFINITY)
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Cost, E> {
        Cost::new(value).ok_or_else(|| E::custom(format!("invalid cost {}", value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Cost, E> {
        self.visit_f64(value as f64)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Cost, E> {
        self.visit_f64(value as f64)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Cost, E> {
        if is_infinity_token(value.trim()) {
            Ok(Cost::INFINITY)
        } else {
            Err(E::custom(format!("invalid cost '{}'", value)))
        }
    }
}

// `deserialize_any` so that an absent field is an error rather than infinity.
impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CostVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_rejects_negative_and_nan() {
        assert!(Cost::new(-1.0).is_none());
        assert!(Cost::new(f64::NAN).is_none());
        assert_eq!(Cost::new(0.0), Some(Cost::ZERO));
    }

    #[test]
    fn test_cost_ceiling() {
        assert_eq!(Cost(16.0).capped(MAX_METRIC), Cost(16.0));
        assert_eq!(Cost(16.5).capped(MAX_METRIC), Cost::INFINITY);
        assert_eq!((Cost::INFINITY + Cost(1.0)).capped(MAX_METRIC), Cost::INFINITY);
    }

    #[test]
    fn test_cost_wire_format() {
        assert_eq!(serde_json::to_string(&Cost::INFINITY).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Cost(2.5)).unwrap(), "2.5");

        let parsed: Vec<Cost> = serde_json::from_str(r#"[3, 1.5, null, "Infinity", "inf"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![Cost(3.0), Cost(1.5), Cost::INFINITY, Cost::INFINITY, Cost::INFINITY]
        );

        assert!(serde_json::from_str::<Cost>("-2").is_err());
        assert!(serde_json::from_str::<Cost>(r#""cheap""#).is_err());
    }

    #[test]
    fn test_missing_cost_field_is_an_error() {
        #[derive(Debug, Deserialize)]
        struct Link {
            direct: Cost,
        }

        assert!(serde_json::from_str::<Link>("{}").is_err());
        assert_eq!(
            serde_json::from_str::<Link>(r#"{"direct": null}"#).unwrap().direct,
            Cost::INFINITY
        );
        assert_eq!(
            serde_json::from_value::<Link>(serde_json::json!({"direct": 4})).unwrap().direct,
            Cost(4.0)
        );
    }

    #[test]
    fn test_node_id_canonical_form() {
        let id: NodeId = "127.0.0.1:20000".parse().unwrap();
        assert_eq!(id.to_string(), "127.0.0.1:20000");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""127.0.0.1:20000""#);

        let back: NodeId = serde_json::from_str(r#""127.0.0.1:20000""#).unwrap();
        assert_eq!(back, id);
        assert!("not-an-address".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_resolve_localhost() {
        let id = NodeId::resolve("LOCALHOST", 20001).unwrap();
        assert_eq!(id.to_string(), "127.0.0.1:20001");
    }
}
