use notification_service::config::NotificationConfig;
use notification_service::services::{Mailer, MockMailer, NotificationConsumer, SmtpMailer};
use service_core::observability::init_tracing;
use service_core::queue::{AmqpQueue, MessageQueue};
use std::sync::Arc;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_tracing("notification-service", "info");

    let config = NotificationConfig::from_env().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    let queue: Arc<dyn MessageQueue> =
        Arc::new(AmqpQueue::connect(&config.amqp.url).await.map_err(|e| {
            tracing::error!("Failed to connect to AMQP broker: {}", e);
            std::io::Error::other(format!("Queue connection error: {}", e))
        })?);

    let mailer: Arc<dyn Mailer> = if config.smtp.enabled {
        match SmtpMailer::new(config.smtp.clone()) {
            Ok(mailer) => {
                tracing::info!("SMTP mailer initialized");
                Arc::new(mailer)
            }
            Err(e) => {
                tracing::warn!("Failed to initialize SMTP mailer: {}. Using mock.", e);
                Arc::new(MockMailer::new())
            }
        }
    } else {
        tracing::info!("SMTP disabled, using mock mailer");
        Arc::new(MockMailer::new())
    };

    let consumer = NotificationConsumer::new(queue, mailer, &config.amqp.queue);

    tokio::select! {
        result = consumer.run() => {
            if let Err(e) = result {
                tracing::error!("Consumer error: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    Ok(())
}
