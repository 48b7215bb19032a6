use service_core::config::{self as core_config, get_env};
use service_core::error::AppError;

#[derive(Debug, Clone)]
pub struct UserServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub amqp: AmqpConfig,
    pub jwt: JwtConfig,
    pub invite: InviteConfig,
    pub totp_issuer: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub url: String,
    pub queue: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub reset_token_expiry_minutes: i64,
    pub invite_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct InviteConfig {
    /// Base URL embedded in invite emails.
    pub base_url: String,
    pub expiry_days: i64,
}

impl UserServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.environment.is_prod();

        let config = UserServiceConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("user-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            amqp: AmqpConfig {
                url: get_env("AMQP_URL", Some("amqp://127.0.0.1:5672"), is_prod)?,
                queue: get_env("NOTIFICATION_QUEUE", Some("notification_queue"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                access_token_expiry_minutes: parse_env("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "60", is_prod)?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
                reset_token_expiry_minutes: parse_env("JWT_RESET_TOKEN_EXPIRY_MINUTES", "15", is_prod)?,
                invite_token_expiry_days: parse_env("JWT_INVITE_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
            },
            invite: InviteConfig {
                base_url: get_env("INVITE_BASE_URL", Some("http://localhost:3000"), is_prod)?,
                expiry_days: parse_env("INVITE_EXPIRY_DAYS", "7", is_prod)?,
            },
            totp_issuer: get_env("TOTP_ISSUER", Some("UserManagementService"), is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.jwt.secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 bytes"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.amqp.queue.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "NOTIFICATION_QUEUE must not be empty"
            )));
        }

        Ok(())
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}
