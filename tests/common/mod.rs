#![allow(dead_code)]
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use plover::node::{Body, Message, NodeCommand, NodeController, NodeId, Payload, TopologyMap, Value};
use plover::settings::{RetrySettings, Settings};
use plover::transport::{MemoryNetwork, MemoryTransport, Transport};

pub const BACKOFF: Duration = Duration::from_millis(10);

pub fn settings(max_attempts: u32) -> Settings {
    Settings {
        retry: RetrySettings {
            initial_backoff: BACKOFF,
            backoff_multiplier: 2.0,
            max_attempts,
        },
        ..Settings::default()
    }
}

pub fn id(name: &str) -> NodeId {
    NodeId::from(name)
}

pub fn ids(names: &[&str]) -> BTreeSet<NodeId> {
    names.iter().map(|n| id(n)).collect()
}

/// Nodes running full dispatch loops on one in-memory network, plus one client
pub struct Cluster {
    pub network: MemoryNetwork,
    pub transport: Arc<MemoryTransport>,
    pub client: mpsc::UnboundedReceiver<Message>,
    pub nodes: Vec<(NodeId, mpsc::Sender<NodeCommand>)>,
    loops: Vec<JoinHandle<()>>,
    next_msg_id: u64,
}

impl Cluster {
    pub fn new() -> Self {
        let network = MemoryNetwork::new();
        let client = network.register_mailbox(id("c1"));
        Self {
            transport: network.transport(),
            network,
            client,
            nodes: Vec::new(),
            loops: Vec::new(),
            next_msg_id: 0,
        }
    }

    /// Start nodes and walk each through the init handshake
    pub async fn start_nodes(&mut self, names: &[&str], settings: &Settings) {
        let all: Vec<NodeId> = names.iter().map(|n| id(n)).collect();
        for name in names {
            let (tx, rx) = mpsc::channel(256);
            self.network.register_node(id(name), tx.clone());
            let controller = NodeController::new(settings.clone(), self.transport.clone());
            self.loops.push(tokio::spawn(controller.start(rx)));
            self.nodes.push((id(name), tx));

            let reply = self
                .request(
                    name,
                    Payload::Init {
                        node_id: id(name),
                        node_ids: all.clone(),
                    },
                )
                .await;
            assert_eq!(reply.body.payload, Payload::InitOk);
        }
    }

    /// Send a client request and wait for its reply
    pub async fn request(&mut self, dest: &str, payload: Payload) -> Message {
        self.next_msg_id += 1;
        let msg_id = self.next_msg_id;
        self.submit(dest, Some(msg_id), payload).await;
        let reply = tokio::time::timeout(Duration::from_secs(60), self.client.recv())
            .await
            .expect("reply within timeout")
            .expect("client mailbox open");
        assert_eq!(reply.body.in_reply_to, Some(msg_id));
        reply
    }

    /// Send without waiting for anything
    pub async fn submit(&self, dest: &str, msg_id: Option<u64>, payload: Payload) {
        let mut body = Body::new(payload);
        body.msg_id = msg_id;
        self.transport
            .transmit(Message {
                src: id("c1"),
                dest: id(dest),
                body,
            })
            .await
            .expect("client send");
    }

    pub async fn install_topology(&mut self, topology: &TopologyMap) {
        let names = self.node_names();
        for name in names {
            let reply = self
                .request(
                    name.as_str(),
                    Payload::Topology {
                        topology: topology.clone(),
                    },
                )
                .await;
            assert_eq!(reply.body.payload, Payload::TopologyOk);
        }
    }

    pub async fn read(&mut self, dest: &str) -> Vec<Value> {
        match self.request(dest, Payload::Read).await.body.payload {
            Payload::ReadOk { messages } => messages,
            other => panic!("unexpected reply {:?}", other),
        }
    }

    pub fn node_names(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Poll every node until all hold exactly `expected` (order ignored)
    pub async fn await_convergence(&mut self, expected: &BTreeSet<Value>) -> bool {
        let names = self.node_names();
        for _ in 0..500 {
            let mut converged = true;
            for name in &names {
                let seen: BTreeSet<Value> = self.read(name.as_str()).await.into_iter().collect();
                if &seen != expected {
                    converged = false;
                    break;
                }
            }
            if converged {
                return true;
            }
            tokio::time::sleep(BACKOFF).await;
        }
        false
    }

    pub async fn shutdown(self) {
        for (_, tx) in &self.nodes {
            let _ = tx.send(NodeCommand::Shutdown).await;
        }
        for handle in self.loops {
            let _ = handle.await;
        }
    }
}

/// Undirected line n1 - n2 - ... - nN
pub fn line_topology(names: &[&str]) -> TopologyMap {
    let mut topology = TopologyMap::new();
    for (i, name) in names.iter().enumerate() {
        let mut neighbors = BTreeSet::new();
        if i > 0 {
            neighbors.insert(id(names[i - 1]));
        }
        if i + 1 < names.len() {
            neighbors.insert(id(names[i + 1]));
        }
        topology.insert(id(name), neighbors);
    }
    topology
}
