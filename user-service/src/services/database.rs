//! Credential store: account persistence with atomic state transitions.
//!
//! Every activation or revocation is a single conditional UPDATE with a
//! RETURNING clause, never a read-then-write pair, so two racing attempts
//! cannot both observe the pending state.

use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Account, InviteState, Role, TwoFactorMode};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    async fn find_by_email_and_invite(
        &self,
        email: &str,
        invite_id: &str,
    ) -> Result<Option<Account>, AppError>;

    async fn insert_account(&self, account: &Account) -> Result<(), AppError>;

    /// Atomic pending -> accepted transition: sets the chosen username,
    /// password hash and two-factor mode, flips the verified flag and
    /// stamps the acceptance. Returns None when the record is no longer a
    /// pending unverified invite.
    async fn accept_pending(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        two_factor: TwoFactorMode,
    ) -> Result<Option<Account>, AppError>;

    /// Store the password hash and TOTP secret on a still-pending invite,
    /// switching its two-factor mode to totp ahead of verification.
    async fn stage_totp_secret(
        &self,
        email: &str,
        password_hash: &str,
        secret: &str,
    ) -> Result<Option<Account>, AppError>;

    /// Finish TOTP enrollment: requires a provisioned secret, flips
    /// totp_enabled and accepts the invite.
    async fn enable_totp(&self, email: &str) -> Result<Option<Account>, AppError>;

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, AppError>;

    async fn touch_last_login(&self, email: &str) -> Result<(), AppError>;

    async fn find_invited_by(
        &self,
        inviter: Uuid,
        role: &Role,
    ) -> Result<Vec<Account>, AppError>;

    /// Atomic pending -> expired transition (revocation). Returns None
    /// when the invite was not found or already processed.
    async fn expire_invite(&self, invite_id: &str) -> Result<Option<Account>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// PostgreSQL credential store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_by_email_and_invite(
        &self,
        email: &str,
        invite_id: &str,
    ) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE LOWER(email) = LOWER($1) AND invite_id = $2",
        )
        .bind(email)
        .bind(invite_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, username, email, password_hash, role_code, verified, invite_state_code, invited_by, invite_id, invite_expiry_utc, two_factor_code, totp_secret, totp_enabled, organisation, created_utc, accepted_utc, last_login_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(account.account_id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.role_code)
        .bind(account.verified)
        .bind(&account.invite_state_code)
        .bind(account.invited_by)
        .bind(&account.invite_id)
        .bind(account.invite_expiry_utc)
        .bind(&account.two_factor_code)
        .bind(&account.totp_secret)
        .bind(account.totp_enabled)
        .bind(&account.organisation)
        .bind(account.created_utc)
        .bind(account.accepted_utc)
        .bind(account.last_login_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn accept_pending(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        two_factor: TwoFactorMode,
    ) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET username = $2, password_hash = $3, two_factor_code = $4,
                verified = true, invite_state_code = 'accepted',
                accepted_utc = NOW(), last_login_utc = NOW()
            WHERE LOWER(email) = LOWER($1)
              AND invite_state_code = 'pending'
              AND verified = false
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .bind(two_factor.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn stage_totp_secret(
        &self,
        email: &str,
        password_hash: &str,
        secret: &str,
    ) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET password_hash = $2, totp_secret = $3, two_factor_code = 'totp'
            WHERE LOWER(email) = LOWER($1)
              AND invite_state_code = 'pending'
              AND verified = false
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(secret)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn enable_totp(&self, email: &str) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET totp_enabled = true, verified = true, invite_state_code = 'accepted',
                accepted_utc = COALESCE(accepted_utc, NOW()), last_login_utc = NOW()
            WHERE LOWER(email) = LOWER($1)
              AND two_factor_code = 'totp'
              AND totp_secret IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts SET password_hash = $2 WHERE LOWER(email) = LOWER($1) RETURNING *",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn touch_last_login(&self, email: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE accounts SET last_login_utc = NOW() WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn find_invited_by(
        &self,
        inviter: Uuid,
        role: &Role,
    ) -> Result<Vec<Account>, AppError> {
        sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE invited_by = $1 AND role_code = $2 ORDER BY created_utc DESC",
        )
        .bind(inviter)
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn expire_invite(&self, invite_id: &str) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET invite_state_code = 'expired', invite_expiry_utc = NOW()
            WHERE invite_id = $1 AND invite_state_code = 'pending'
            RETURNING *
            "#,
        )
        .bind(invite_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}

/// In-memory credential store for tests, keyed by lowercased email.
#[derive(Default)]
pub struct MockCredentialStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account directly, bypassing the invite flow.
    pub fn seed(&self, account: Account) {
        self.accounts
            .lock()
            .expect("account mutex poisoned")
            .insert(account.email.to_lowercase(), account);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Account>>, AppError> {
        self.accounts
            .lock()
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("account mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self.lock()?.get(&email.to_lowercase()).cloned())
    }

    async fn find_by_email_and_invite(
        &self,
        email: &str,
        invite_id: &str,
    ) -> Result<Option<Account>, AppError> {
        Ok(self
            .lock()?
            .get(&email.to_lowercase())
            .filter(|a| a.invite_id == invite_id)
            .cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        let mut accounts = self.lock()?;
        let key = account.email.to_lowercase();
        if accounts.contains_key(&key) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "duplicate key value violates unique constraint"
            )));
        }
        accounts.insert(key, account.clone());
        Ok(())
    }

    async fn accept_pending(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        two_factor: TwoFactorMode,
    ) -> Result<Option<Account>, AppError> {
        let mut accounts = self.lock()?;
        let Some(account) = accounts.get_mut(&email.to_lowercase()) else {
            return Ok(None);
        };
        if account.invite_state() != InviteState::Pending || account.verified {
            return Ok(None);
        }
        account.username = username.to_string();
        account.password_hash = Some(password_hash.to_string());
        account.two_factor_code = two_factor.as_str().to_string();
        account.verified = true;
        account.invite_state_code = InviteState::Accepted.as_str().to_string();
        account.accepted_utc = Some(Utc::now());
        account.last_login_utc = Some(Utc::now());
        Ok(Some(account.clone()))
    }

    async fn stage_totp_secret(
        &self,
        email: &str,
        password_hash: &str,
        secret: &str,
    ) -> Result<Option<Account>, AppError> {
        let mut accounts = self.lock()?;
        let Some(account) = accounts.get_mut(&email.to_lowercase()) else {
            return Ok(None);
        };
        if account.invite_state() != InviteState::Pending || account.verified {
            return Ok(None);
        }
        account.password_hash = Some(password_hash.to_string());
        account.totp_secret = Some(secret.to_string());
        account.two_factor_code = TwoFactorMode::Totp.as_str().to_string();
        Ok(Some(account.clone()))
    }

    async fn enable_totp(&self, email: &str) -> Result<Option<Account>, AppError> {
        let mut accounts = self.lock()?;
        let Some(account) = accounts.get_mut(&email.to_lowercase()) else {
            return Ok(None);
        };
        if account.two_factor() != TwoFactorMode::Totp || account.totp_secret.is_none() {
            return Ok(None);
        }
        account.totp_enabled = true;
        account.verified = true;
        account.invite_state_code = InviteState::Accepted.as_str().to_string();
        account.accepted_utc = account.accepted_utc.or_else(|| Some(Utc::now()));
        account.last_login_utc = Some(Utc::now());
        Ok(Some(account.clone()))
    }

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, AppError> {
        let mut accounts = self.lock()?;
        let Some(account) = accounts.get_mut(&email.to_lowercase()) else {
            return Ok(None);
        };
        account.password_hash = Some(password_hash.to_string());
        Ok(Some(account.clone()))
    }

    async fn touch_last_login(&self, email: &str) -> Result<(), AppError> {
        if let Some(account) = self.lock()?.get_mut(&email.to_lowercase()) {
            account.last_login_utc = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_invited_by(
        &self,
        inviter: Uuid,
        role: &Role,
    ) -> Result<Vec<Account>, AppError> {
        Ok(self
            .lock()?
            .values()
            .filter(|a| a.invited_by == Some(inviter) && a.role_code == role.as_str())
            .cloned()
            .collect())
    }

    async fn expire_invite(&self, invite_id: &str) -> Result<Option<Account>, AppError> {
        let mut accounts = self.lock()?;
        let Some(account) = accounts
            .values_mut()
            .find(|a| a.invite_id == invite_id)
        else {
            return Ok(None);
        };
        if account.invite_state() != InviteState::Pending {
            return Ok(None);
        }
        account.invite_state_code = InviteState::Expired.as_str().to_string();
        account.invite_expiry_utc = Some(Utc::now());
        Ok(Some(account.clone()))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
