use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::broadcast_node::BroadcastNode;
use super::commands::NodeCommand;
use super::messages::{Body, InboundFrame, Message, Payload};
use super::NodeId;
use crate::error::{PloverError, Result};
use crate::protocol_error;
use crate::settings::Settings;
use crate::transport::{Outbox, Transport};

/// Dispatch loop for one node.
///
/// Commands are handled strictly one at a time; only the fan-out tasks a
/// broadcast spawns run concurrently with later commands.
pub struct NodeController {
    settings: Settings,
    transport: Arc<dyn Transport>,
    node: Option<BroadcastNode>,
}

impl std::fmt::Debug for NodeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeController")
            .field("node", &self.node)
            .finish()
    }
}

impl NodeController {
    /// Controller waiting for the host's `init` handshake
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            node: None,
        }
    }

    /// Controller for a node whose id is already known
    pub fn with_node_id(settings: Settings, transport: Arc<dyn Transport>, node_id: NodeId) -> Self {
        let mut controller = Self::new(settings, transport);
        controller.initialize(node_id);
        controller
    }

    pub fn node(&self) -> Option<&BroadcastNode> {
        self.node.as_ref()
    }

    /// Log prefix: the node id once known
    fn label(&self) -> &str {
        self.node
            .as_ref()
            .map(|node| node.node_id().as_str())
            .unwrap_or("uninitialized")
    }

    fn initialize(&mut self, node_id: NodeId) {
        let outbox = Outbox::new(node_id, self.transport.clone());
        self.node = Some(BroadcastNode::new(outbox, &self.settings));
    }

    fn log_stats(&self) {
        if let Some(node) = &self.node {
            debug!(
                "[{}] Node stats: {} values seen, {} neighbors",
                node.node_id(),
                node.state().seen.len(),
                node.state().neighbors.len()
            );
        }
    }

    /// Handle commands until the channel closes or `Shutdown` arrives
    pub async fn start(mut self, mut commands: mpsc::Receiver<NodeCommand>) {
        info!(
            "[{}] Starting dispatch loop with {:?} stats interval",
            self.label(),
            self.settings.stats_interval
        );
        let mut stats_timer = time::interval(self.settings.stats_interval);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(NodeCommand::Shutdown) => {
                        info!("[{}] Shutdown requested, leaving dispatch loop", self.label());
                        break;
                    }
                    Some(cmd) => {
                        if let Err(e) = self.handle_command(cmd).await {
                            warn!("[{}] Error processing inbound message: {}", self.label(), e);
                        }
                    }
                    // Exit if inbound channel is closed
                    None => {
                        info!("[{}] Inbound channel closed, exiting dispatch loop", self.label());
                        break;
                    }
                },
                _ = stats_timer.tick() => {
                    self.log_stats();
                }
            }
        }
        self.log_stats();
    }

    /// Handle one command; errors are returned after any error reply was sent
    pub async fn handle_command(&mut self, cmd: NodeCommand) -> Result<()> {
        match cmd {
            NodeCommand::Line(line) => self.handle_line(&line).await,
            NodeCommand::Deliver(message) => self.handle_message(message).await,
            NodeCommand::Shutdown => Ok(()),
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<()> {
        let frame = InboundFrame::parse(line)?;
        let msg_id = frame.msg_id();
        let src = frame.src.clone();
        let dest = frame.dest.clone();
        match frame.decode() {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                if let Some(msg_id) = msg_id {
                    self.send_error(&dest, &src, msg_id, &e).await;
                }
                Err(e)
            }
        }
    }

    async fn handle_message(&mut self, message: Message) -> Result<()> {
        if message.body.in_reply_to.is_some() {
            // nothing this node sends expects an answer
            debug!(
                "[{}] Ignoring {} reply from {}",
                self.label(),
                message.body.payload.type_name(),
                message.src
            );
            return Ok(());
        }

        let result = match &message.body.payload {
            Payload::Init { node_id, node_ids } => {
                self.handle_init(&message, node_id, node_ids).await
            }
            _ => match &self.node {
                Some(node) => node.handle(&message).await.map(|fan_out| fan_out.detach()),
                None => Err(PloverError::NotInitialized),
            },
        };

        if let Err(e) = &result {
            if let Some(msg_id) = message.body.msg_id {
                self.send_error(&message.dest, &message.src, msg_id, e).await;
            }
        }
        result
    }

    async fn handle_init(
        &mut self,
        request: &Message,
        node_id: &NodeId,
        node_ids: &[NodeId],
    ) -> Result<()> {
        match self.node.as_ref().map(|node| node.node_id().clone()) {
            Some(current) if &current == node_id => {
                debug!("[{}] Repeated init, acknowledging again", current);
            }
            Some(current) => {
                return Err(protocol_error!(
                    "already initialized as {}, refusing {}",
                    current,
                    node_id
                ))
            }
            None => {
                info!("[{}] Initialized in a cluster of {}", node_id, node_ids.len());
                self.initialize(node_id.clone());
            }
        }
        Outbox::new(node_id.clone(), self.transport.clone())
            .reply(request, Payload::InitOk)
            .await?;
        Ok(())
    }

    async fn send_error(&self, local: &NodeId, requester: &NodeId, msg_id: u64, err: &PloverError) {
        let mut body = Body::new(Payload::error(err.error_code(), err.to_string()));
        body.in_reply_to = Some(msg_id);
        let reply = Message {
            src: local.clone(),
            dest: requester.clone(),
            body,
        };
        if let Err(e) = self.transport.transmit(reply).await {
            error!("[{}] Failed sending error reply to {}: {}", local, requester, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::error::ErrorCode;
    use crate::transport::MemoryNetwork;

    fn controller() -> (NodeController, UnboundedReceiver<Message>) {
        let network = MemoryNetwork::new();
        let client = network.register_mailbox(NodeId::from("c1"));
        (
            NodeController::new(Settings::default(), network.transport()),
            client,
        )
    }

    fn line(body: &str) -> NodeCommand {
        NodeCommand::Line(format!(r#"{{"src":"c1","dest":"n1","body":{}}}"#, body))
    }

    #[tokio::test]
    async fn test_init_handshake() {
        let (mut controller, mut client) = controller();
        controller
            .handle_command(line(r#"{"type":"init","msg_id":1,"node_id":"n1","node_ids":["n1","n2"]}"#))
            .await
            .unwrap();

        let reply = client.recv().await.unwrap();
        assert_eq!(reply.src, NodeId::from("n1"));
        assert_eq!(reply.body.payload, Payload::InitOk);
        assert_eq!(reply.body.in_reply_to, Some(1));
        assert_eq!(controller.node().unwrap().node_id(), &NodeId::from("n1"));
    }

    #[tokio::test]
    async fn test_request_before_init_is_rejected() {
        let (mut controller, mut client) = controller();
        let err = controller
            .handle_command(line(r#"{"type":"read","msg_id":3}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, PloverError::NotInitialized));

        let reply = client.recv().await.unwrap();
        assert_eq!(
            reply.body.payload,
            Payload::Error {
                code: ErrorCode::TemporarilyUnavailable.code(),
                text: err.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_conflicting_init_is_rejected() {
        let (mut controller, mut client) = controller();
        controller
            .handle_command(line(r#"{"type":"init","msg_id":1,"node_id":"n1","node_ids":[]}"#))
            .await
            .unwrap();
        let _ = client.recv().await;

        let err = controller
            .handle_command(line(r#"{"type":"init","msg_id":2,"node_id":"n7","node_ids":[]}"#))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "protocol_error");
        assert_eq!(controller.node().unwrap().node_id(), &NodeId::from("n1"));
    }

    #[tokio::test]
    async fn test_malformed_body_gets_error_reply_and_no_mutation() {
        let (mut controller, mut client) = controller();
        controller
            .handle_command(line(r#"{"type":"init","msg_id":1,"node_id":"n1","node_ids":[]}"#))
            .await
            .unwrap();
        let _ = client.recv().await;

        let err = controller
            .handle_command(line(r#"{"type":"broadcast","msg_id":2,"message":"five"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, PloverError::Serialization(_)));

        let reply = client.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(2));
        match reply.body.payload {
            Payload::Error { code, .. } => assert_eq!(code, ErrorCode::MalformedRequest.code()),
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(controller.node().unwrap().state().seen.is_empty());
    }

    #[tokio::test]
    async fn test_missing_type_gets_malformed_reply() {
        let (mut controller, mut client) = controller();
        let err = controller
            .handle_command(line(r#"{"msg_id":4,"message":5}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, PloverError::Malformed(_)));

        let reply = client.recv().await.unwrap();
        assert_eq!(reply.src, NodeId::from("n1"));
        assert_eq!(reply.body.in_reply_to, Some(4));
        match reply.body.payload {
            Payload::Error { code, .. } => assert_eq!(code, ErrorCode::MalformedRequest.code()),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_label_follows_init() {
        let (mut controller, mut client) = controller();
        assert_eq!(controller.label(), "uninitialized");

        controller
            .handle_command(line(r#"{"type":"init","msg_id":1,"node_id":"n1","node_ids":[]}"#))
            .await
            .unwrap();
        let _ = client.recv().await;
        assert_eq!(controller.label(), "n1");
    }

    #[tokio::test]
    async fn test_unknown_type_is_not_supported() {
        let (mut controller, mut client) = controller();
        let _ = controller
            .handle_command(line(r#"{"type":"generate","msg_id":8}"#))
            .await;

        match client.recv().await.unwrap().body.payload {
            Payload::Error { code, .. } => assert_eq!(code, ErrorCode::NotSupported.code()),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_line_is_surfaced() {
        let (mut controller, mut client) = controller();
        assert!(controller
            .handle_command(NodeCommand::Line("{not json".to_string()))
            .await
            .is_err());
        assert!(client.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replies_are_ignored() {
        let network = MemoryNetwork::new();
        let mut peer = network.register_mailbox(NodeId::from("n2"));
        let mut controller =
            NodeController::with_node_id(Settings::default(), network.transport(), NodeId::from("n1"));

        let mut body = Body::new(Payload::BroadcastOk);
        body.in_reply_to = Some(4);
        controller
            .handle_command(NodeCommand::Deliver(Message {
                src: NodeId::from("n2"),
                dest: NodeId::from("n1"),
                body,
            }))
            .await
            .unwrap();
        assert!(peer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_loop_exits_when_channel_closes() {
        let (controller, _client) = controller();
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(controller.start(rx));

        tx.send(line(r#"{"type":"init","msg_id":1,"node_id":"n1","node_ids":[]}"#))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_exits_on_shutdown() {
        let (controller, _client) = controller();
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(controller.start(rx));

        tx.send(NodeCommand::Shutdown).await.unwrap();
        handle.await.unwrap();
        drop(tx);
    }
}
