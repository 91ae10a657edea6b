//! Newline-delimited JSON over the process's standard streams
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Transport;
use crate::error::TransportError;
use crate::node::commands::NodeCommand;
use crate::node::messages::Message;

/// Writes each envelope as one line on stdout.
///
/// Writers are serialized by an async mutex so concurrent fan-out tasks
/// never interleave partial lines.
#[derive(Debug)]
pub struct StdioTransport {
    stdout: Mutex<tokio::io::Stdout>,
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn transmit(&self, message: Message) -> Result<(), TransportError> {
        let mut line = message
            .encode()
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        line.push('\n');

        let mut stdout = self.stdout.lock().await;
        let written = match stdout.write_all(line.as_bytes()).await {
            Ok(()) => stdout.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Delivery {
                dest: message.dest.clone(),
                reason: e.to_string(),
            },
        })
    }
}

/// Forward stdin lines to the dispatch loop until EOF.
///
/// Dropping the sender on EOF closes the command channel, which ends the
/// controller loop.
pub fn spawn_stdin_reader(commands: mpsc::Sender<NodeCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if commands.send(NodeCommand::Line(line)).await.is_err() {
                        debug!("Dispatch loop gone, stopping stdin reader");
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Err(e) => {
                    info!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    })
}
