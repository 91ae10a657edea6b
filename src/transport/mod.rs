//! Message transport
//!
//! The node only needs two primitives from the host: fire-and-forget
//! `send` to a peer, which may fail with a delivery error, and `reply`
//! correlated to an inbound request. Both are built on [`Transport::transmit`].
//!
//! - [`StdioTransport`]: newline-delimited JSON over stdin/stdout
//! - [`MemoryNetwork`]: in-process hub with injectable partitions

pub mod memory;
pub mod stdio;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::node::messages::{Body, Message, Payload};
use crate::node::NodeId;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use stdio::{spawn_stdin_reader, StdioTransport};

/// Sink for outbound envelopes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand one envelope to the network.
    ///
    /// `Ok` means the transport accepted it, not that the peer processed it.
    async fn transmit(&self, message: Message) -> std::result::Result<(), TransportError>;
}

/// Addressing wrapper binding a transport to the local node id
#[derive(Clone)]
pub struct Outbox {
    node_id: NodeId,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl Outbox {
    pub fn new(node_id: NodeId, transport: Arc<dyn Transport>) -> Self {
        Self { node_id, transport }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Fire-and-forget send; the body carries no `msg_id` so no reply is expected.
    pub async fn send(
        &self,
        dest: &NodeId,
        payload: Payload,
    ) -> std::result::Result<(), TransportError> {
        self.transport
            .transmit(Message {
                src: self.node_id.clone(),
                dest: dest.clone(),
                body: Body::new(payload),
            })
            .await
    }

    /// Reply to `request`, correlating by its `msg_id`.
    pub async fn reply(
        &self,
        request: &Message,
        payload: Payload,
    ) -> std::result::Result<(), TransportError> {
        let mut body = Body::new(payload);
        body.in_reply_to = request.body.msg_id;
        self.transport
            .transmit(Message {
                src: self.node_id.clone(),
                dest: request.src.clone(),
                body,
            })
            .await
    }
}
