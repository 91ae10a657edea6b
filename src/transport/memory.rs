//! In-process message hub
//!
//! Nodes register their command channel, observers (clients, or stand-in
//! peers in tests) register a mailbox. Links can be cut to simulate a
//! network partition: `transmit` across a cut link fails with
//! [`TransportError::Delivery`] exactly like a real partitioned send.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use super::Transport;
use crate::error::TransportError;
use crate::node::commands::NodeCommand;
use crate::node::messages::Message;
use crate::node::NodeId;

#[derive(Debug)]
enum Endpoint {
    Node(mpsc::Sender<NodeCommand>),
    Mailbox(mpsc::UnboundedSender<Message>),
}

/// Accepted envelopes kept for inspection; older ones are evicted first
pub const DEFAULT_DELIVERY_LOG_CAPACITY: usize = 4096;

#[derive(Debug)]
struct NetworkState {
    endpoints: HashMap<NodeId, Endpoint>,
    // directed (src, dest) links that drop traffic
    cut_links: HashSet<(NodeId, NodeId)>,
    // scripted transient failures per destination
    pending_failures: HashMap<NodeId, u32>,
    delivered: VecDeque<Message>,
    log_capacity: usize,
    failed_attempts: u64,
}

impl NetworkState {
    fn new(log_capacity: usize) -> Self {
        Self {
            endpoints: HashMap::new(),
            cut_links: HashSet::new(),
            pending_failures: HashMap::new(),
            delivered: VecDeque::new(),
            log_capacity,
            failed_attempts: 0,
        }
    }

    fn record(&mut self, message: &Message) {
        if self.log_capacity == 0 {
            return;
        }
        if self.delivered.len() == self.log_capacity {
            self.delivered.pop_front();
        }
        self.delivered.push_back(message.clone());
    }
}

/// Shared handle to the simulated network
#[derive(Clone, Debug)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_DELIVERY_LOG_CAPACITY)
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network that remembers at most `capacity` accepted envelopes
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState::new(capacity))),
        }
    }

    /// Transport that any number of nodes can share
    pub fn transport(&self) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            network: self.clone(),
        })
    }

    pub fn register_node(&self, id: NodeId, commands: mpsc::Sender<NodeCommand>) {
        self.state.lock().endpoints.insert(id, Endpoint::Node(commands));
    }

    pub fn register_mailbox(&self, id: NodeId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().endpoints.insert(id, Endpoint::Mailbox(tx));
        rx
    }

    /// Cut traffic between `a` and `b` in both directions
    pub fn partition(&self, a: &NodeId, b: &NodeId) {
        let mut state = self.state.lock();
        state.cut_links.insert((a.clone(), b.clone()));
        state.cut_links.insert((b.clone(), a.clone()));
    }

    /// Cut every link between the two groups
    pub fn split(&self, left: &[NodeId], right: &[NodeId]) {
        for a in left {
            for b in right {
                self.partition(a, b);
            }
        }
    }

    pub fn heal(&self) {
        self.state.lock().cut_links.clear();
    }

    /// Make the next `count` sends to `dest` fail, whatever their source
    pub fn fail_next(&self, dest: &NodeId, count: u32) {
        *self
            .state
            .lock()
            .pending_failures
            .entry(dest.clone())
            .or_default() += count;
    }

    /// Most recently accepted envelopes, in acceptance order
    pub fn delivered(&self) -> Vec<Message> {
        self.state.lock().delivered.iter().cloned().collect()
    }

    /// Take the delivery log, leaving it empty
    pub fn drain_delivered(&self) -> Vec<Message> {
        self.state.lock().delivered.drain(..).collect()
    }

    pub fn failed_attempts(&self) -> u64 {
        self.state.lock().failed_attempts
    }

    fn route(&self, message: &Message) -> Result<Route, TransportError> {
        let mut state = self.state.lock();
        let blocked = state
            .cut_links
            .contains(&(message.src.clone(), message.dest.clone()));
        let scripted = match state.pending_failures.get_mut(&message.dest) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if blocked || scripted {
            state.failed_attempts += 1;
            return Err(TransportError::Delivery {
                dest: message.dest.clone(),
                reason: "network partition".to_string(),
            });
        }

        let route = state.endpoints.get(&message.dest).map(|endpoint| match endpoint {
            Endpoint::Node(tx) => Route::Node(tx.clone()),
            Endpoint::Mailbox(tx) => Route::Mailbox(tx.clone()),
        });
        match route {
            Some(route) => {
                state.record(message);
                Ok(route)
            }
            None => {
                state.failed_attempts += 1;
                Err(TransportError::Delivery {
                    dest: message.dest.clone(),
                    reason: "unknown destination".to_string(),
                })
            }
        }
    }
}

enum Route {
    Node(mpsc::Sender<NodeCommand>),
    Mailbox(mpsc::UnboundedSender<Message>),
}

/// [`Transport`] backed by a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryTransport {
    network: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn transmit(&self, message: Message) -> Result<(), TransportError> {
        trace!("{} -> {}: {:?}", message.src, message.dest, message.body);
        let dest = message.dest.clone();
        let closed = || TransportError::Delivery {
            dest: dest.clone(),
            reason: "endpoint closed".to_string(),
        };
        match self.network.route(&message)? {
            Route::Node(tx) => tx
                .send(NodeCommand::Deliver(message))
                .await
                .map_err(|_| closed()),
            Route::Mailbox(tx) => tx.send(message).map_err(|_| closed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::messages::{Body, Payload};

    fn msg(src: &str, dest: &str, value: i64) -> Message {
        Message {
            src: NodeId::from(src),
            dest: NodeId::from(dest),
            body: Body::new(Payload::Broadcast { message: value }),
        }
    }

    #[tokio::test]
    async fn test_mailbox_delivery() {
        let network = MemoryNetwork::new();
        let mut inbox = network.register_mailbox(NodeId::from("n2"));
        let transport = network.transport();

        transport.transmit(msg("n1", "n2", 5)).await.unwrap();

        assert_eq!(inbox.recv().await.unwrap(), msg("n1", "n2", 5));
        assert_eq!(network.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_partition_fails_then_heals() {
        let network = MemoryNetwork::new();
        let mut inbox = network.register_mailbox(NodeId::from("n2"));
        let transport = network.transport();

        network.partition(&NodeId::from("n1"), &NodeId::from("n2"));
        let err = transport.transmit(msg("n1", "n2", 5)).await.unwrap_err();
        assert!(matches!(err, TransportError::Delivery { .. }));
        assert_eq!(network.failed_attempts(), 1);

        network.heal();
        transport.transmit(msg("n1", "n2", 5)).await.unwrap();
        assert!(inbox.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed() {
        let network = MemoryNetwork::new();
        let _inbox = network.register_mailbox(NodeId::from("n2"));
        let transport = network.transport();

        network.fail_next(&NodeId::from("n2"), 2);
        assert!(transport.transmit(msg("n1", "n2", 1)).await.is_err());
        assert!(transport.transmit(msg("n3", "n2", 1)).await.is_err());
        assert!(transport.transmit(msg("n1", "n2", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_delivery_log_is_bounded() {
        let network = MemoryNetwork::with_log_capacity(2);
        let _inbox = network.register_mailbox(NodeId::from("n2"));
        let transport = network.transport();

        for value in 1..=3 {
            transport.transmit(msg("n1", "n2", value)).await.unwrap();
        }
        assert_eq!(network.delivered(), vec![msg("n1", "n2", 2), msg("n1", "n2", 3)]);

        assert_eq!(network.drain_delivered().len(), 2);
        assert!(network.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_destination() {
        let network = MemoryNetwork::new();
        let transport = network.transport();
        assert!(transport.transmit(msg("n1", "n9", 1)).await.is_err());
        assert!(network.delivered().is_empty());
    }
}
