//! Producer side of the notification dispatch pipeline.

use service_core::error::AppError;
use service_core::notify::NotificationJob;
use service_core::queue::MessageQueue;
use std::sync::Arc;

/// Publishes notification jobs to the durable queue.
///
/// Success means the broker accepted the message, nothing more: delivery
/// to the recipient is the consumer's business, and publishing never
/// waits for it.
#[derive(Clone)]
pub struct NotificationPublisher {
    queue: Arc<dyn MessageQueue>,
    queue_name: String,
}

impl NotificationPublisher {
    pub fn new(queue: Arc<dyn MessageQueue>, queue_name: &str) -> Self {
        Self {
            queue,
            queue_name: queue_name.to_string(),
        }
    }

    pub async fn publish(&self, job: &NotificationJob) -> Result<(), AppError> {
        let payload = serde_json::to_vec(job).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "Failed to serialize notification job: {}",
                e
            ))
        })?;

        self.queue.publish(&self.queue_name, &payload).await?;

        tracing::info!(to = %job.to, kind = ?job.kind, "Notification job published");
        Ok(())
    }
}
