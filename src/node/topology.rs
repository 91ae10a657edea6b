use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use super::messages::TopologyMap;
use super::NodeId;

pub type Neighbors = BTreeSet<NodeId>;

/// This node's current neighbor set.
///
/// The set sits behind an `Arc` that is swapped wholesale on install, so a
/// reader holds either the complete old set or the complete new one.
#[derive(Debug, Default)]
pub struct TopologyTable {
    neighbors: RwLock<Arc<Neighbors>>,
}

impl TopologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, neighbors: Neighbors) {
        *self.neighbors.write() = Arc::new(neighbors);
    }

    pub fn current(&self) -> Arc<Neighbors> {
        self.neighbors.read().clone()
    }

    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }
}

/// Pick `node_id`'s neighbors out of a cluster-wide topology map.
///
/// A node missing from the map has no neighbors. A node listed as its own
/// neighbor is dropped so it never gossips to itself.
pub fn neighbors_for(node_id: &NodeId, topology: &TopologyMap) -> Neighbors {
    topology
        .get(node_id)
        .map(|peers| peers.iter().filter(|p| *p != node_id).cloned().collect())
        .unwrap_or_default()
}
