use super::node_table::NodeTable;
use super::{Cost, NodeId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub to: NodeId,
    pub costs: BTreeMap<NodeId, Cost>,
    /// Our direct cost to `to`, never poisoned.
    pub direct: Cost,
}

impl NodeTable {
    /// Current cost vector as seen by `neighbor`, with poison reverse applied
    /// to every destination we reach through it.
    pub fn advertisement_for(&self, neighbor: &NodeId) -> Advertisement {
        let costs = self
            .nodes
            .values()
            .map(|node| {
                let poisoned = node.id != self.local
                    && node.id != *neighbor
                    && node.route == Some(*neighbor);
                let cost = if poisoned { Cost::INFINITY } else { node.cost };
                (node.id, cost)
            })
            .collect();

        Advertisement {
            to: *neighbor,
            costs,
            direct: self
                .lookup(neighbor)
                .map_or(Cost::INFINITY, |node| node.direct_cost()),
        }
    }

    pub fn advertisements(&self) -> Vec<Advertisement> {
        self.neighbors()
            .map(|neighbor| self.advertisement_for(&neighbor.id()))
            .collect()
    }
}
