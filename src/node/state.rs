use super::store::ValueStore;
use super::topology::TopologyTable;

/// Shared state of one broadcast node.
///
/// Both halves synchronize internally, so handlers and fan-out tasks share
/// it through an `Arc` without an outer lock.
#[derive(Debug, Default)]
pub struct NodeState {
    pub seen: ValueStore,
    pub neighbors: TopologyTable,
}

impl NodeState {
    pub fn new() -> Self {
        Self::default()
    }
}
