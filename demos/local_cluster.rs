//! Runs a ring of in-process broadcast nodes, partitions it, heals it and
//! shows every node converging on the same values.
//!
//! ```text
//! RUST_LOG=plover=debug cargo run --example local_cluster
//! ```
use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plover::node::{Body, Message, NodeController, NodeId, Payload, TopologyMap};
use plover::settings::{RetrySettings, Settings};
use plover::transport::{MemoryNetwork, Transport};

const NODES: [&str; 4] = ["n1", "n2", "n3", "n4"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "local_cluster=info,plover=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings {
        retry: RetrySettings {
            initial_backoff: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            max_attempts: 8,
        },
        ..Settings::default()
    };

    let network = MemoryNetwork::new();
    let transport = network.transport();
    let mut client = network.register_mailbox(NodeId::from("c1"));

    for name in NODES {
        let (tx, rx) = mpsc::channel(256);
        network.register_node(NodeId::from(name), tx);
        let controller =
            NodeController::with_node_id(settings.clone(), transport.clone(), NodeId::from(name));
        tokio::spawn(controller.start(rx));
    }

    // ring: every node talks to the next one and the previous one
    let mut topology = TopologyMap::new();
    for (i, name) in NODES.iter().enumerate() {
        let next = NODES[(i + 1) % NODES.len()];
        let prev = NODES[(i + NODES.len() - 1) % NODES.len()];
        let neighbors: BTreeSet<NodeId> = [next, prev].into_iter().map(NodeId::from).collect();
        topology.insert(NodeId::from(*name), neighbors);
    }

    let mut msg_id = 0;
    let mut call = |dest: &str, payload: Payload| {
        msg_id += 1;
        Message {
            src: NodeId::from("c1"),
            dest: NodeId::from(dest),
            body: Body::new(payload).with_msg_id(msg_id),
        }
    };

    for name in NODES {
        transport
            .transmit(call(name, Payload::Topology { topology: topology.clone() }))
            .await?;
        client.recv().await;
    }

    info!("Cutting n1 off from the ring");
    network.split(&[NodeId::from("n1")], &[NodeId::from("n2"), NodeId::from("n4")]);
    for (value, name) in NODES.iter().enumerate() {
        transport
            .transmit(call(name, Payload::Broadcast { message: value as i64 * 10 }))
            .await?;
        client.recv().await;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Healing partition");
    network.heal();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let gossip = network
        .drain_delivered()
        .iter()
        .filter(|m| m.body.msg_id.is_none() && m.body.in_reply_to.is_none())
        .count();
    info!("{} gossip envelopes exchanged", gossip);

    for name in NODES {
        transport.transmit(call(name, Payload::Read)).await?;
        if let Some(reply) = client.recv().await {
            info!("{} read: {:?}", name, reply.body.payload);
        }
    }
    info!("{} failed delivery attempts recovered by retry", network.failed_attempts());
    Ok(())
}
