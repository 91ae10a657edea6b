//! Broadcast node
//!
//! A node keeps every value it has seen in a [`ValueStore`] and the peers it
//! gossips to in a [`TopologyTable`]. The first receipt of a value spawns one
//! [`RetryingSender`] delivery per neighbor; later receipts only get the
//! client acknowledgment, if one is owed.
pub mod broadcast_node;
pub mod commands;
pub mod controller;
pub mod messages;
pub mod node_id;
pub mod retry;
pub mod state;
pub mod store;
pub mod topology;

pub use broadcast_node::{BroadcastNode, FanOut};
pub use commands::NodeCommand;
pub use controller::NodeController;
pub use messages::{Body, Message, Payload, TopologyMap, Value};
pub use node_id::NodeId;
pub use retry::{DeliveryOutcome, RetryingSender};
pub use state::NodeState;
pub use store::ValueStore;
pub use topology::TopologyTable;
