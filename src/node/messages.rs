//! Broadcast Message Protocol
//!
//! Every envelope is one JSON object per line:
//!
//! ```text
//! {"src":"c1","dest":"n1","body":{"type":"broadcast","message":5,"msg_id":1}}
//! ```
//!
//! `msg_id` is the request correlation id. Clients always set it; gossip
//! retransmissions between nodes never do, so its presence decides whether
//! a reply is owed. Replies echo it back as `in_reply_to`.
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::NodeId;
use crate::error::{ErrorCode, Result};
use crate::{malformed_error, protocol_error};

/// Payload broadcast through the cluster
pub type Value = i64;

/// Topology map as supplied by the host: node -> neighbors
pub type TopologyMap = HashMap<NodeId, BTreeSet<NodeId>>;

/// A complete addressed envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Body,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Init {
        node_id: NodeId,
        #[serde(default)]
        node_ids: Vec<NodeId>,
    },
    InitOk,
    Broadcast {
        message: Value,
    },
    BroadcastOk,
    Read,
    ReadOk {
        messages: Vec<Value>,
    },
    Topology {
        topology: TopologyMap,
    },
    TopologyOk,
    Error {
        code: u32,
        text: String,
    },
}

impl Payload {
    /// Wire tags this node understands
    pub const KNOWN_TYPES: [&'static str; 9] = [
        "init",
        "init_ok",
        "broadcast",
        "broadcast_ok",
        "read",
        "read_ok",
        "topology",
        "topology_ok",
        "error",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::InitOk => "init_ok",
            Payload::Broadcast { .. } => "broadcast",
            Payload::BroadcastOk => "broadcast_ok",
            Payload::Read => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Topology { .. } => "topology",
            Payload::TopologyOk => "topology_ok",
            Payload::Error { .. } => "error",
        }
    }

    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Payload::Error {
            code: code.code(),
            text: text.into(),
        }
    }
}

impl Body {
    /// Body without a correlation id (gossip, or a reply before `in_reply_to` is set)
    pub fn new(payload: Payload) -> Self {
        Self {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }

    pub fn with_msg_id(mut self, msg_id: u64) -> Self {
        self.msg_id = Some(msg_id);
        self
    }
}

impl Message {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Envelope decoded only as far as its addressing.
///
/// Keeping the body as raw JSON lets the dispatcher answer a request whose
/// body is malformed, since `msg_id` can still be recovered.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundFrame {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: serde_json::Value,
}

impl InboundFrame {
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn msg_id(&self) -> Option<u64> {
        self.body.get("msg_id").and_then(serde_json::Value::as_u64)
    }

    pub fn message_type(&self) -> Option<&str> {
        self.body.get("type").and_then(serde_json::Value::as_str)
    }

    /// Decode the body into a typed message.
    ///
    /// Unknown types are a protocol error. A missing type is a malformed
    /// request, and known types with the wrong shape are a serialization error.
    pub fn decode(self) -> Result<Message> {
        match self.message_type() {
            Some(kind) if Payload::KNOWN_TYPES.iter().any(|known| *known == kind) => {}
            Some(kind) => return Err(protocol_error!("unsupported message type '{}'", kind)),
            None => return Err(malformed_error!("message body has no type")),
        }
        let body: Body = serde_json::from_value(self.body)?;
        Ok(Message {
            src: self.src,
            dest: self.dest,
            body,
        })
    }
}
