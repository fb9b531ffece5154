use super::liveness::{Expiry, LivenessMonitor};
use super::node_table::{Link, Node, NodeTable};
use super::{Cost, NodeId, MIN_LINK_COST};
use crate::error::LinkError;
use log::{debug, info, warn};

impl NodeTable {
    pub fn link_down(&mut self, addr: &NodeId) -> Result<(), LinkError> {
        let node = self
            .nodes
            .get_mut(addr)
            .ok_or(LinkError::UnknownNode(*addr))?;

        let direct = match &node.link {
            Link::Neighbor { direct, .. } => *direct,
            Link::Down { .. } => return Err(LinkError::AlreadyDown(*addr)),
            Link::NotNeighbor => return Err(LinkError::NotNeighbor(*addr)),
        };

        // Dropping the old variant cancels its monitor.
        node.link = Link::Down { saved: direct };
        info!("Link to {} is down (saved cost {})", addr, direct);

        self.recompute();
        Ok(())
    }

    /// Restores a link previously taken down with [`NodeTable::link_down`].
    pub fn link_up(&mut self, addr: &NodeId) -> Result<(), LinkError> {
        let node = self
            .nodes
            .get_mut(addr)
            .ok_or(LinkError::UnknownNode(*addr))?;

        let Link::Down { saved } = node.link else {
            return Err(LinkError::NoSavedCost(*addr));
        };

        let monitor = self.monitors.spawn(*addr);
        node.link = Link::Neighbor {
            direct: saved,
            monitor,
        };
        info!("Link to {} is back up (cost {})", addr, saved);

        self.recompute();
        Ok(())
    }

    pub fn link_change(&mut self, addr: &NodeId, new_direct: Cost) -> Result<(), LinkError> {
        let node = self
            .nodes
            .get_mut(addr)
            .ok_or(LinkError::UnknownNode(*addr))?;

        let direct = match &mut node.link {
            Link::Neighbor { direct, .. } => direct,
            Link::Down { .. } => return Err(LinkError::LinkIsDown(*addr)),
            Link::NotNeighbor => return Err(LinkError::NotNeighbor(*addr)),
        };

        if !new_direct.is_finite() {
            return Err(LinkError::InfiniteCost(*addr));
        }
        if new_direct < MIN_LINK_COST {
            return Err(LinkError::CostBelowMinimum {
                requested: new_direct,
                minimum: MIN_LINK_COST,
            });
        }

        info!("Link to {} changed cost {} -> {}", addr, direct, new_direct);
        *direct = new_direct;

        self.recompute();
        Ok(())
    }

    /// Takes a silent neighbor down if `expiry` still belongs to its current
    /// monitor. Returns whether the link went down.
    pub fn expire(&mut self, expiry: Expiry) -> bool {
        let current = self
            .lookup(&expiry.node)
            .and_then(Node::monitor)
            .map(LivenessMonitor::generation);

        if current != Some(expiry.generation) {
            debug!(
                "Ignoring stale liveness expiry for {} (generation {})",
                expiry.node, expiry.generation
            );
            return false;
        }

        warn!("Neighbor {} went silent, taking link down", expiry.node);
        self.link_down(&expiry.node).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::super::node_table::tests::{cost, id, make_table};
    use super::super::Message;
    use super::*;
    use crate::error::Error;

    fn current_expiry(table: &NodeTable, port: u16) -> Expiry {
        Expiry {
            node: id(port),
            generation: table.lookup(&id(port)).unwrap().monitor().unwrap().generation(),
        }
    }

    #[tokio::test]
    async fn test_expiry_takes_link_down_once() {
        let (mut table, _rx) = make_table(20000, &[(20001, 2.0)]);
        let expiry = current_expiry(&table, 20001);

        assert!(table.expire(expiry));
        let b = table.lookup(&id(20001)).unwrap();
        assert!(!b.is_neighbor());
        assert_eq!(b.saved_direct_cost(), Some(cost(2.0)));
        assert_eq!(b.cost(), Cost::INFINITY);

        assert!(!table.expire(expiry));
    }

    #[tokio::test]
    async fn test_superseded_expiry_is_ignored() {
        let (mut table, _rx) = make_table(20000, &[(20001, 2.0)]);
        let stale = current_expiry(&table, 20001);

        // Link bounced before the old countdown's event was handled.
        table.link_down(&id(20001)).unwrap();
        table.link_up(&id(20001)).unwrap();

        assert!(!table.expire(stale));
        assert!(table.lookup(&id(20001)).unwrap().is_neighbor());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_neighbor_expires_after_three_periods() {
        let (mut table, mut rx) = make_table(20000, &[(20001, 1.0)]);
        let started = tokio::time::Instant::now();

        let expiry = rx.recv().await.unwrap();
        assert!(started.elapsed() >= table.monitors.timeout());
        assert!(table.expire(expiry));
        assert!(!table.lookup(&id(20001)).unwrap().is_neighbor());
    }

    #[tokio::test]
    async fn test_link_down_then_up_restores_exact_cost() {
        let (mut table, _rx) = make_table(20000, &[(20001, 2.75)]);
        let before = table.lookup(&id(20001)).unwrap().direct_cost();
        let first_generation = table.lookup(&id(20001)).unwrap().monitor().unwrap().generation();

        table.link_down(&id(20001)).unwrap();
        let b = table.lookup(&id(20001)).unwrap();
        assert!(!b.is_neighbor());
        assert!(b.monitor().is_none());
        assert_eq!(b.direct_cost(), Cost::INFINITY);
        assert_eq!(b.saved_direct_cost(), Some(before));
        assert_eq!(b.cost(), Cost::INFINITY);
        assert_eq!(b.route(), None);

        table.link_up(&id(20001)).unwrap();
        let b = table.lookup(&id(20001)).unwrap();
        assert!(b.is_neighbor());
        assert_eq!(b.direct_cost().value().to_bits(), before.value().to_bits());
        assert_eq!(b.saved_direct_cost(), None);
        let monitor = b.monitor().unwrap();
        assert!(monitor.is_running());
        assert_ne!(monitor.generation(), first_generation);
        assert_eq!(b.cost(), before);
    }

    #[tokio::test]
    async fn test_link_down_rejections() {
        let (mut table, _rx) = make_table(20000, &[(20001, 1.0)]);

        assert_eq!(
            table.link_down(&id(20009)),
            Err(LinkError::UnknownNode(id(20009)))
        );

        table.get(&id(20003));
        assert_eq!(
            table.link_down(&id(20003)),
            Err(LinkError::NotNeighbor(id(20003)))
        );

        table.link_down(&id(20001)).unwrap();
        assert_eq!(
            table.link_down(&id(20001)),
            Err(LinkError::AlreadyDown(id(20001)))
        );
        assert_eq!(table.lookup(&id(20001)).unwrap().saved_direct_cost(), Some(cost(1.0)));
    }

    #[tokio::test]
    async fn test_link_up_requires_saved_cost() {
        let (mut table, _rx) = make_table(20000, &[(20001, 1.0)]);

        assert_eq!(
            table.link_up(&id(20001)),
            Err(LinkError::NoSavedCost(id(20001)))
        );
        assert_eq!(
            table.link_up(&id(20009)),
            Err(LinkError::UnknownNode(id(20009)))
        );
    }

    #[tokio::test]
    async fn test_link_change_updates_routes() {
        let (mut table, _rx) = make_table(20000, &[(20001, 1.0)]);
        table.link_change(&id(20001), cost(4.0)).unwrap();

        let b = table.lookup(&id(20001)).unwrap();
        assert_eq!(b.direct_cost(), cost(4.0));
        assert_eq!(b.cost(), cost(4.0));
    }

    #[tokio::test]
    async fn test_remote_infinite_link_change_is_refused() {
        let (mut table, _rx) = make_table(20000, &[(20001, 2.0)]);
        let message = Message::decode(br#"{"type": "linkchange", "payload": {"direct": null}}"#).unwrap();

        assert!(matches!(
            table.apply(&id(20001), message),
            Err(Error::Link(LinkError::InfiniteCost(_)))
        ));

        table.link_down(&id(20001)).unwrap();
        table.link_up(&id(20001)).unwrap();
        assert_eq!(table.lookup(&id(20001)).unwrap().direct_cost(), cost(2.0));
    }

    #[tokio::test]
    async fn test_link_change_rejections_leave_state_alone() {
        let (mut table, _rx) = make_table(20000, &[(20001, 3.0)]);

        assert_eq!(
            table.link_change(&id(20001), cost(0.5)),
            Err(LinkError::CostBelowMinimum {
                requested: cost(0.5),
                minimum: MIN_LINK_COST
            })
        );
        assert_eq!(table.lookup(&id(20001)).unwrap().direct_cost(), cost(3.0));

        assert_eq!(
            table.link_change(&id(20001), Cost::INFINITY),
            Err(LinkError::InfiniteCost(id(20001)))
        );
        assert_eq!(table.lookup(&id(20001)).unwrap().cost(), cost(3.0));

        table.get(&id(20004));
        assert_eq!(
            table.link_change(&id(20004), cost(2.0)),
            Err(LinkError::NotNeighbor(id(20004)))
        );

        table.link_down(&id(20001)).unwrap();
        assert_eq!(
            table.link_change(&id(20001), cost(2.0)),
            Err(LinkError::LinkIsDown(id(20001)))
        );
        assert_eq!(table.lookup(&id(20001)).unwrap().saved_direct_cost(), Some(cost(3.0)));
    }
}
