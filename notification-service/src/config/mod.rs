use service_core::config::{self as core_config, get_env};
use service_core::error::AppError;

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub amqp: AmqpConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub url: String,
    pub queue: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

impl NotificationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.environment.is_prod();

        let config = NotificationConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("notification-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            amqp: AmqpConfig {
                url: get_env("AMQP_URL", Some("amqp://127.0.0.1:5672"), is_prod)?,
                queue: get_env("NOTIFICATION_QUEUE", Some("notification_queue"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Notification Service"), is_prod)?,
                enabled: std::env::var("SMTP_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.amqp.queue.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "NOTIFICATION_QUEUE must not be empty"
            )));
        }

        if self.smtp.enabled && self.smtp.user.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SMTP_USER is required when SMTP is enabled"
            )));
        }

        Ok(())
    }
}
