//! Ephemeral staging store for in-flight verification state.
//!
//! Records are keyed by email and expire with a store-level TTL; TTL
//! eviction is the only cleanup for abandoned signups. The logical code
//! expiry inside each record is checked separately.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Store-level TTL for staged verification records.
pub const STAGING_TTL_SECONDS: i64 = 600;

pub fn pending_key(email: &str) -> String {
    format!("pending_user:{}", email)
}

pub fn reset_key(email: &str) -> String {
    format!("reset_user:{}", email)
}

#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), AppError>;
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn del(&self, key: &str) -> Result<(), AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct RedisStaging {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisStaging {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, AppError> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            AppError::InternalError(anyhow::anyhow!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl StagingStore for RedisStaging {
    async fn set(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(AppError::RedisError)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(AppError::RedisError)
    }

    async fn del(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(AppError::RedisError)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(AppError::RedisError)
    }
}

/// In-memory staging store for tests. TTLs are accepted but not enforced;
/// the logical expiry inside each record still applies.
#[derive(Default)]
pub struct MockStaging {
    entries: Mutex<HashMap<String, String>>,
}

impl MockStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .expect("staging mutex poisoned")
            .contains_key(key)
    }

    /// Overwrite a staged record, e.g. to back-date its expiry in tests.
    pub fn put(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("staging mutex poisoned")
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("staging mutex poisoned")
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl StagingStore for MockStaging {
    async fn set(&self, key: &str, value: &str, _ttl_seconds: i64) -> Result<(), AppError> {
        self.entries
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("staging mutex poisoned: {}", e)))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let val = self
            .entries
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("staging mutex poisoned: {}", e)))?
            .get(key)
            .cloned();
        Ok(val)
    }

    async fn del(&self, key: &str) -> Result<(), AppError> {
        self.entries
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("staging mutex poisoned: {}", e)))?
            .remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
