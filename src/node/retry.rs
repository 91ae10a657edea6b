//! Retrying delivery of one gossip envelope to one neighbor
//!
//! Each delivery walks `Pending -> Delivered | Exhausted`. A failed send
//! is treated as a transient partition: wait, grow the delay, try again.
//! Once the attempt budget is spent the delivery is dropped with a warning;
//! the value can still reach that neighbor through other paths.
use tracing::{debug, warn};

use super::messages::Payload;
use super::NodeId;
use crate::settings::RetrySettings;
use crate::transport::Outbox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Exhausted { attempts } => {
                *attempts
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryingSender {
    outbox: Outbox,
    settings: RetrySettings,
}

impl RetryingSender {
    pub fn new(outbox: Outbox, settings: RetrySettings) -> Self {
        Self { outbox, settings }
    }

    /// Deliver `payload` to `dest`, sleeping between failed attempts.
    ///
    /// Success means the transport accepted the envelope; no
    /// acknowledgment from the peer is awaited.
    pub async fn deliver(&self, dest: &NodeId, payload: Payload) -> DeliveryOutcome {
        let node_id = self.outbox.node_id();
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.outbox.send(dest, payload.clone()).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(
                            "[{}] Delivered {} to {} after {} attempts",
                            node_id,
                            payload.type_name(),
                            dest,
                            attempt
                        );
                    }
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        "[{}] Dropping {:?} for {} after {} attempts: {}",
                        node_id, payload, dest, attempt, e
                    );
                    return DeliveryOutcome::Exhausted { attempts: attempt };
                }
                Err(e) => {
                    let backoff = self.settings.backoff_after(attempt);
                    debug!(
                        "[{}] Send to {} failed (attempt {}/{}): {}; retrying in {:?}",
                        node_id, dest, attempt, max_attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
