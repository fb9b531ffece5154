use super::liveness::{LivenessMonitor, MonitorFactory};
use super::{Cost, NodeId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
pub enum Link {
    NotNeighbor,
    Neighbor {
        direct: Cost,
        monitor: LivenessMonitor,
    },
    /// Administratively down; `saved` is the direct cost to restore on link-up.
    Down { saved: Cost },
}

impl Link {
    pub fn state(&self) -> LinkState {
        match self {
            Link::NotNeighbor => LinkState::NotNeighbor,
            Link::Neighbor { .. } => LinkState::Neighbor,
            Link::Down { .. } => LinkState::Down,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    NotNeighbor,
    Neighbor,
    Down,
}

#[derive(Debug)]
pub struct Node {
    pub(super) id: NodeId,
    pub(super) cost: Cost,
    pub(super) route: Option<NodeId>,
    pub(super) link: Link,
    pub(super) advertised: HashMap<NodeId, Cost>,
}

impl Node {
    pub(super) fn unreachable(id: NodeId) -> Self {
        Self {
            id,
            cost: Cost::INFINITY,
            route: None,
            link: Link::NotNeighbor,
            advertised: HashMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn cost(&self) -> Cost {
        self.cost
    }

    pub fn route(&self) -> Option<NodeId> {
        self.route
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn is_neighbor(&self) -> bool {
        matches!(self.link, Link::Neighbor { .. })
    }

    pub fn direct_cost(&self) -> Cost {
        match &self.link {
            Link::Neighbor { direct, .. } => *direct,
            Link::NotNeighbor | Link::Down { .. } => Cost::INFINITY,
        }
    }

    pub fn saved_direct_cost(&self) -> Option<Cost> {
        match &self.link {
            Link::Down { saved } => Some(*saved),
            _ => None,
        }
    }

    pub fn monitor(&self) -> Option<&LivenessMonitor> {
        match &self.link {
            Link::Neighbor { monitor, .. } => Some(monitor),
            _ => None,
        }
    }

    /// Cost this neighbor last claimed for `destination`. A neighbor always
    /// reaches itself at zero even before its first advertisement.
    pub fn advertised_cost(&self, destination: &NodeId) -> Cost {
        match self.advertised.get(destination) {
            Some(cost) => *cost,
            None if *destination == self.id => Cost::ZERO,
            None => Cost::INFINITY,
        }
    }

    pub fn advertised_costs(&self) -> &HashMap<NodeId, Cost> {
        &self.advertised
    }
}

/// Every destination this node has ever heard of, keyed by identifier.
///
/// Entries are never removed, only demoted to unreachable. All mutating
/// operations recompute routes before returning so callers holding the
/// table lock never observe a half-relaxed state.
#[derive(Debug)]
pub struct NodeTable {
    pub(super) local: NodeId,
    pub(super) nodes: BTreeMap<NodeId, Node>,
    pub(super) monitors: MonitorFactory,
}

impl NodeTable {
    pub fn new(local: NodeId, monitors: MonitorFactory) -> Self {
        let mut nodes = BTreeMap::new();
        let mut me = Node::unreachable(local);
        me.cost = Cost::ZERO;
        nodes.insert(local, me);

        Self {
            local,
            nodes,
            monitors,
        }
    }

    pub fn with_neighbors(
        local: NodeId,
        monitors: MonitorFactory,
        neighbors: impl IntoIterator<Item = (NodeId, Cost)>,
    ) -> Self {
        let mut table = Self::new(local, monitors);
        for (id, direct) in neighbors {
            if id == local {
                continue;
            }
            let monitor = table.monitors.spawn(id);
            let node = table.materialize(id);
            node.link = Link::Neighbor { direct, monitor };
        }
        table.recompute();
        table
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the entry for `id`, creating an unreachable one on first access.
    pub fn get(&mut self, id: &NodeId) -> &Node {
        self.materialize(*id)
    }

    pub fn lookup(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.is_neighbor())
    }

    pub(super) fn materialize(&mut self, id: NodeId) -> &mut Node {
        self.nodes.entry(id).or_insert_with(|| Node::unreachable(id))
    }

    pub fn cancel_monitors(&mut self) {
        for node in self.nodes.values_mut() {
            if let Link::Neighbor { monitor, .. } = &mut node.link {
                monitor.cancel();
            }
        }
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            local: self.local,
            taken_at: Utc::now(),
            entries: self
                .nodes
                .values()
                .filter(|node| node.id != self.local)
                .map(|node| RouteSnapshot {
                    destination: node.id,
                    cost: node.cost,
                    next_hop: node.route,
                    link: node.link.state(),
                    direct: node.direct_cost(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub local: NodeId,
    pub taken_at: DateTime<Utc>,
    pub entries: Vec<RouteSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub destination: NodeId,
    pub cost: Cost,
    pub next_hop: Option<NodeId>,
    pub link: LinkState,
    pub direct: Cost,
}

impl TableSnapshot {
    pub fn entry(&self, destination: &NodeId) -> Option<&RouteSnapshot> {
        self.entries.iter().find(|e| e.destination == *destination)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &RouteSnapshot> {
        self.entries.iter().filter(|e| e.link == LinkState::Neighbor)
    }
}
