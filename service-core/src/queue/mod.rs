//! Durable message-queue client.
//!
//! Producers publish persistent payloads to a named durable queue; a
//! subscriber receives deliveries and settles each one with `ack` (remove
//! permanently) or `nack` (reject, optionally requeueing for redelivery).
//! Delivery is at-least-once: a message that is never settled, or nacked
//! with requeue, comes back.

use crate::error::AppError;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A single message handed to a subscriber. Must be settled exactly once.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];

    /// Remove the message from the queue permanently.
    async fn ack(self: Box<Self>) -> Result<(), AppError>;

    /// Reject the message. With `requeue` the broker redelivers it.
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), AppError>;
}

/// Stream of deliveries for one subscriber.
#[async_trait]
pub trait DeliveryStream: Send {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>, AppError>>;
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Declare the named queue as durable. Idempotent.
    async fn assert_queue(&self, name: &str) -> Result<(), AppError>;

    /// Publish a payload with persistent delivery marking. Resolves once
    /// the publish is handed to the broker; never waits for a consumer.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), AppError>;

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, AppError>;
}

/// AMQP-backed queue client. The connection is held for the lifetime of
/// the client; all operations go through one channel.
pub struct AmqpQueue {
    _connection: Connection,
    channel: Channel,
}

impl AmqpQueue {
    /// Connect to the broker and open a channel.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        tracing::info!(url = %url, "Connecting to AMQP broker");
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        tracing::info!("AMQP connection ready");

        Ok(Self {
            _connection: connection,
            channel,
        })
    }
}

#[async_trait]
impl MessageQueue for AmqpQueue {
    async fn assert_queue(&self, name: &str) -> Result<(), AppError> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), AppError> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                // Delivery mode 2: message survives a broker restart.
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, AppError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(Box::new(AmqpDeliveryStream { consumer }))
    }
}

struct AmqpDeliveryStream {
    consumer: lapin::Consumer,
}

#[async_trait]
impl DeliveryStream for AmqpDeliveryStream {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>, AppError>> {
        self.consumer.next().await.map(|res| {
            res.map(|delivery| Box::new(AmqpDelivery { delivery }) as Box<dyn Delivery>)
                .map_err(AppError::from)
        })
    }
}

struct AmqpDelivery {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    async fn ack(self: Box<Self>) -> Result<(), AppError> {
        self.delivery.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), AppError> {
        self.delivery
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

/// Events recorded by [`InMemoryQueue`], for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Published { queue: String },
    Acked { queue: String },
    Nacked { queue: String, requeue: bool },
}

#[derive(Default)]
struct InMemoryState {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    events: Vec<QueueEvent>,
}

/// In-memory queue with real requeue semantics, used in tests in place of
/// a live broker. A subscriber's stream ends when its queue drains.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QueueEvent> {
        self.state.lock().expect("queue mutex poisoned").events.clone()
    }

    /// Number of messages currently waiting on a queue.
    pub fn depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .expect("queue mutex poisoned")
            .queues
            .get(queue)
            .map_or(0, |q| q.len())
    }

    /// Snapshot of the payloads currently waiting on a queue.
    pub fn messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .expect("queue mutex poisoned")
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn assert_queue(&self, name: &str) -> Result<(), AppError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| AppError::QueueError(anyhow::anyhow!("queue mutex poisoned: {}", e)))?;
        state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), AppError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| AppError::QueueError(anyhow::anyhow!("queue mutex poisoned: {}", e)))?;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        state.events.push(QueueEvent::Published {
            queue: queue.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, AppError> {
        Ok(Box::new(InMemoryDeliveryStream {
            queue: queue.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct InMemoryDeliveryStream {
    queue: String,
    state: Arc<Mutex<InMemoryState>>,
}

#[async_trait]
impl DeliveryStream for InMemoryDeliveryStream {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>, AppError>> {
        let payload = {
            let mut state = self.state.lock().ok()?;
            state.queues.get_mut(&self.queue)?.pop_front()?
        };

        Some(Ok(Box::new(InMemoryDelivery {
            queue: self.queue.clone(),
            payload,
            state: self.state.clone(),
        }) as Box<dyn Delivery>))
    }
}

struct InMemoryDelivery {
    queue: String,
    payload: Vec<u8>,
    state: Arc<Mutex<InMemoryState>>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(self: Box<Self>) -> Result<(), AppError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| AppError::QueueError(anyhow::anyhow!("queue mutex poisoned: {}", e)))?;
        state.events.push(QueueEvent::Acked { queue: self.queue });
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), AppError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| AppError::QueueError(anyhow::anyhow!("queue mutex poisoned: {}", e)))?;
        if requeue {
            state
                .queues
                .entry(self.queue.clone())
                .or_default()
                .push_front(self.payload);
        }
        state.events.push(QueueEvent::Nacked {
            queue: self.queue,
            requeue,
        });
        Ok(())
    }
}
