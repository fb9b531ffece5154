use super::node_table::NodeTable;
use super::{Cost, NodeId, MAX_METRIC};
use log::debug;

impl NodeTable {
    /// Neighbors are scanned in identifier order and only a strictly smaller
    /// candidate replaces the current best, so ties go to the lowest id.
    pub fn recompute(&mut self) {
        let best: Vec<(NodeId, Cost, Option<NodeId>)> = self
            .nodes
            .keys()
            .filter(|dest| **dest != self.local)
            .map(|dest| {
                let mut cost = Cost::INFINITY;
                let mut route = None;
                for neighbor in self.neighbors() {
                    let candidate = neighbor.direct_cost() + neighbor.advertised_cost(dest);
                    if candidate < cost {
                        cost = candidate;
                        route = Some(neighbor.id());
                    }
                }

                let cost = cost.capped(MAX_METRIC);
                if !cost.is_finite() {
                    route = None;
                }
                (*dest, cost, route)
            })
            .collect();

        for (dest, cost, route) in best {
            if let Some(node) = self.nodes.get_mut(&dest) {
                if node.cost != cost || node.route != route {
                    debug!(
                        "Route to {} now cost {} via {}",
                        dest,
                        cost,
                        route.map_or_else(|| "-".to_string(), |r| r.to_string())
                    );
                }
                node.cost = cost;
                node.route = route;
            }
        }
    }
}
