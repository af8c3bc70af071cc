//! Publisher seam and batch dispatch

use async_trait::async_trait;
use floorsensor_core::OutboundEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Broker client rejected publish to {topic}: {reason}")]
    Rejected { topic: String, reason: String },
    #[error("Publisher is shut down")]
    Closed,
}

/// Delivers single events to the message bus
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError>;
}

/// Publish a device's batch on a separate task.
///
/// The returned handle resolves to the number of events the publisher
/// accepted. Callers that do not care about the outcome can drop it; the
/// task keeps running and logs its own failures.
pub fn dispatch(
    publisher: Arc<dyn Publisher>,
    device: String,
    events: Vec<OutboundEvent>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut delivered = 0;

        for event in &events {
            match publisher.publish(event).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    device = %device,
                    topic = %event.topic,
                    error = %e,
                    "Failed to publish sensor value"
                ),
            }
        }

        debug!(
            device = %device,
            delivered = delivered,
            total = events.len(),
            "Published sensor batch"
        );
        delivered
    })
}
