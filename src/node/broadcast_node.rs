use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::messages::{Message, Payload, TopologyMap, Value};
use super::retry::{DeliveryOutcome, RetryingSender};
use super::state::NodeState;
use super::topology::neighbors_for;
use super::NodeId;
use crate::error::Result;
use crate::protocol_error;
use crate::settings::Settings;
use crate::transport::Outbox;

/// A broadcast node: dedups values, gossips new ones to its neighbors
/// and answers `broadcast`, `read` and `topology` requests.
#[derive(Clone)]
pub struct BroadcastNode {
    state: Arc<NodeState>,
    outbox: Outbox,
    sender: RetryingSender,
    /// Caps deliveries in flight at once; excess tasks queue for a permit
    in_flight: Arc<Semaphore>,
}

impl std::fmt::Debug for BroadcastNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastNode")
            .field("node_id", self.outbox.node_id())
            .field("seen", &self.state.seen.len())
            .field("neighbors", &self.state.neighbors.len())
            .finish()
    }
}

/// Delivery tasks spawned for one newly seen value
#[derive(Debug, Default)]
pub struct FanOut {
    tasks: Vec<(NodeId, JoinHandle<DeliveryOutcome>)>,
}

impl FanOut {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn targets(&self) -> Vec<NodeId> {
        self.tasks.iter().map(|(dest, _)| dest.clone()).collect()
    }

    /// Wait for every delivery to reach `Delivered` or `Exhausted`
    pub async fn join(self) -> Vec<(NodeId, DeliveryOutcome)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (dest, task) in self.tasks {
            match task.await {
                Ok(outcome) => outcomes.push((dest, outcome)),
                Err(e) => debug!("Delivery task for {} did not finish: {}", dest, e),
            }
        }
        outcomes
    }

    /// Let the deliveries run on without tracking them
    pub fn detach(self) {}
}

impl BroadcastNode {
    pub fn new(outbox: Outbox, settings: &Settings) -> Self {
        info!(
            "[{}] Created BroadcastNode (max attempts: {}, initial backoff: {:?})",
            outbox.node_id(),
            settings.retry.max_attempts,
            settings.retry.initial_backoff
        );
        Self {
            state: Arc::new(NodeState::new()),
            sender: RetryingSender::new(outbox.clone(), settings.retry.clone()),
            outbox,
            in_flight: Arc::new(Semaphore::new(settings.max_in_flight_sends.max(1))),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        self.outbox.node_id()
    }

    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    /// Route one decoded request to its handler
    pub async fn handle(&self, request: &Message) -> Result<FanOut> {
        match &request.body.payload {
            Payload::Broadcast { message } => self.handle_broadcast(request, *message).await,
            Payload::Read => self.handle_read(request).await.map(|_| FanOut::default()),
            Payload::Topology { topology } => self
                .handle_topology(request, topology)
                .await
                .map(|_| FanOut::default()),
            other => Err(protocol_error!(
                "'{}' is not handled by a broadcast node",
                other.type_name()
            )),
        }
    }

    /// Record `value` and gossip it onward if it is new.
    ///
    /// A `msg_id` on the request means a client is waiting: it gets
    /// `broadcast_ok` whether or not the value was already known. Gossip
    /// from peers carries no `msg_id` and is never answered.
    pub async fn handle_broadcast(&self, request: &Message, value: Value) -> Result<FanOut> {
        let fan_out = if self.state.seen.add(value) {
            debug!("[{}] New value {} from {}", self.node_id(), value, request.src);
            self.fan_out(value)
        } else {
            debug!("[{}] Already seen {} (from {})", self.node_id(), value, request.src);
            FanOut::default()
        };

        if request.body.msg_id.is_some() {
            self.outbox.reply(request, Payload::BroadcastOk).await?;
        }
        Ok(fan_out)
    }

    /// Spawn one delivery per current neighbor.
    ///
    /// The neighbor set is read here, at fan-out time, so a concurrent
    /// reinstall yields either the old set or the new one.
    fn fan_out(&self, value: Value) -> FanOut {
        let neighbors = self.state.neighbors.current();
        let tasks = neighbors
            .iter()
            .map(|dest| {
                let sender = self.sender.clone();
                let in_flight = self.in_flight.clone();
                let target = dest.clone();
                let task = tokio::spawn(async move {
                    let Ok(_permit) = in_flight.acquire_owned().await else {
                        return DeliveryOutcome::Exhausted { attempts: 0 };
                    };
                    sender
                        .deliver(&target, Payload::Broadcast { message: value })
                        .await
                });
                (dest.clone(), task)
            })
            .collect();
        FanOut { tasks }
    }

    /// Answer with a snapshot of every value seen so far
    pub async fn handle_read(&self, request: &Message) -> Result<()> {
        let messages = self.state.seen.snapshot();
        self.outbox
            .reply(request, Payload::ReadOk { messages })
            .await?;
        Ok(())
    }

    /// Install this node's neighbors from the cluster-wide map
    pub async fn handle_topology(&self, request: &Message, topology: &TopologyMap) -> Result<()> {
        let neighbors = neighbors_for(self.node_id(), topology);
        if !topology.contains_key(self.node_id()) {
            info!(
                "[{}] Topology has no entry for this node, installing no neighbors",
                self.node_id()
            );
        }
        info!("[{}] Installing neighbors {:?}", self.node_id(), neighbors);
        self.state.neighbors.install(neighbors);
        self.outbox.reply(request, Payload::TopologyOk).await?;
        Ok(())
    }
}
