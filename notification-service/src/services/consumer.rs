//! Notification dispatch consumer.
//!
//! A single subscriber handles messages one at a time: parse, deliver,
//! settle. Failed deliveries are rejected with requeue and no attempt
//! cap, so a message that can never be delivered keeps coming back; the
//! error log per attempt is what surfaces that to operators. Malformed
//! payloads are logged and left unsettled, leaving their redelivery to
//! connection-level behavior.

use service_core::error::AppError;
use service_core::notify::{NotificationJob, NotificationKind};
use service_core::queue::{Delivery, DeliveryStream, MessageQueue};
use std::sync::Arc;

use crate::services::Mailer;

pub struct NotificationConsumer {
    queue: Arc<dyn MessageQueue>,
    mailer: Arc<dyn Mailer>,
    queue_name: String,
}

impl NotificationConsumer {
    pub fn new(queue: Arc<dyn MessageQueue>, mailer: Arc<dyn Mailer>, queue_name: &str) -> Self {
        Self {
            queue,
            mailer,
            queue_name: queue_name.to_string(),
        }
    }

    /// Declare the queue and consume until the delivery stream ends.
    pub async fn run(&self) -> Result<(), AppError> {
        self.queue.assert_queue(&self.queue_name).await?;
        let mut deliveries = self.queue.subscribe(&self.queue_name).await?;

        tracing::info!(queue = %self.queue_name, "Waiting for messages");

        while let Some(delivery) = deliveries.next().await {
            match delivery {
                Ok(delivery) => self.handle(delivery).await,
                Err(e) => tracing::error!(error = %e, "Failed to receive delivery"),
            }
        }

        tracing::info!(queue = %self.queue_name, "Delivery stream ended");
        Ok(())
    }

    /// Process one delivery and settle it.
    pub async fn handle(&self, delivery: Box<dyn Delivery>) {
        let job: NotificationJob = match serde_json::from_slice(delivery.payload()) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(error = %e, "Malformed notification payload");
                return;
            }
        };

        tracing::info!(to = %job.to, kind = ?job.kind, "Received notification job");

        let subject = job
            .subject
            .clone()
            .unwrap_or_else(|| default_subject(job.kind));

        match self
            .mailer
            .send(&job.to, &subject, &job.content, job.html.as_deref())
            .await
        {
            Ok(()) => match delivery.ack().await {
                Ok(()) => {
                    tracing::info!(to = %job.to, "Email sent and message acknowledged");
                }
                Err(e) => tracing::error!(error = %e, "Failed to ack delivery"),
            },
            Err(e) => {
                // Unconditional retry: no backoff, no attempt cap.
                tracing::error!(error = %e, to = %job.to, "Email send failed, requeueing");
                if let Err(e) = delivery.nack(true).await {
                    tracing::error!(error = %e, "Failed to nack delivery");
                }
            }
        }
    }
}

fn default_subject(kind: Option<NotificationKind>) -> String {
    match kind {
        Some(NotificationKind::Otp) => "Account Verification".to_string(),
        _ => "Invite User".to_string(),
    }
}
