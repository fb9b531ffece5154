use super::messages::{CostUpdate, Message};
use super::node_table::{Link, Node, NodeTable};
use super::NodeId;
use crate::error::{Error, ProtocolError};
use log::{debug, info};

impl NodeTable {
    /// Applies one decoded message from `sender`.
    ///
    /// Link messages arriving from the network mirror a change the peer made
    /// on its end of the shared link, so they target the sender's own entry.
    pub fn apply(&mut self, sender: &NodeId, message: Message) -> Result<(), Error> {
        if *sender == self.local {
            return Err(ProtocolError::FromSelf(*sender).into());
        }

        match message {
            Message::CostUpdate(update) => self.apply_cost_update(sender, update)?,
            Message::LinkDown => self.link_down(sender)?,
            Message::LinkUp => self.link_up(sender)?,
            Message::LinkChange(change) => self.link_change(sender, change.direct)?,
        }
        Ok(())
    }

    fn apply_cost_update(&mut self, sender: &NodeId, update: CostUpdate) -> Result<(), ProtocolError> {
        let promotes = !self.lookup(sender).is_some_and(Node::is_neighbor);
        if promotes && !update.neighbor.direct.is_finite() {
            return Err(ProtocolError::UnusableDirectCost(*sender));
        }

        for destination in update.costs.keys() {
            self.materialize(*destination);
        }

        let Self { nodes, monitors, .. } = self;
        let node = nodes
            .entry(*sender)
            .or_insert_with(|| Node::unreachable(*sender));

        if let Link::Neighbor { monitor, .. } = &mut node.link {
            monitors.reset(monitor);
            debug!("Cost update from {} ({} destinations)", sender, update.costs.len());
        } else {
            info!("Making new neighbor {} (direct cost {})", sender, update.neighbor.direct);
            node.link = Link::Neighbor {
                direct: update.neighbor.direct,
                monitor: monitors.spawn(*sender),
            };
        }
        node.advertised = update.costs.into_iter().collect();

        self.recompute();
        Ok(())
    }
}
