//! Test helpers wiring the invitation service against in-memory
//! collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use service_core::notify::NotificationJob;
use service_core::queue::InMemoryQueue;
use user_service::config::{InviteConfig, JwtConfig};
use user_service::models::{Account, PendingReset, PendingVerification, Role, TwoFactorMode};
use user_service::services::{
    pending_key, reset_key, Actor, InvitationService, JwtService, MockCredentialStore,
    MockStaging, NotificationPublisher, TwoFactorService,
};
use user_service::utils::{hash_password, Password};
use uuid::Uuid;

pub const QUEUE: &str = "notification_queue";
pub const TOTP_ISSUER: &str = "UserManagementService";

pub struct TestApp {
    pub service: InvitationService,
    pub db: Arc<MockCredentialStore>,
    pub staging: Arc<MockStaging>,
    pub queue: InMemoryQueue,
    pub jwt: JwtService,
}

impl TestApp {
    pub fn spawn() -> Self {
        let db = Arc::new(MockCredentialStore::new());
        let staging = Arc::new(MockStaging::new());
        let queue = InMemoryQueue::new();
        let jwt = JwtService::new(&JwtConfig {
            secret: "test-secret-test-secret-test-secret!".to_string(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
            reset_token_expiry_minutes: 15,
            invite_token_expiry_days: 7,
        });
        let notifier = NotificationPublisher::new(Arc::new(queue.clone()), QUEUE);
        let two_factor = TwoFactorService::new(TOTP_ISSUER);
        let invite = InviteConfig {
            base_url: "http://localhost:3000".to_string(),
            expiry_days: 7,
        };

        let service = InvitationService::new(
            db.clone(),
            staging.clone(),
            notifier,
            jwt.clone(),
            two_factor,
            invite,
        );

        Self {
            service,
            db,
            staging,
            queue,
            jwt,
        }
    }

    pub fn actor_with_role(&self, role_code: &str) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", role_code),
            role_code: role_code.to_string(),
        }
    }

    pub fn super_admin(&self) -> Actor {
        self.actor_with_role("super_admin")
    }

    /// Seed a fully activated account, bypassing the invite flow.
    pub fn seed_verified_account(
        &self,
        email: &str,
        password: &str,
        two_factor: TwoFactorMode,
    ) -> Account {
        let mailbox = email.split('@').next().unwrap_or(email);
        let mut account = Account::new_invited(
            email,
            Role::Operator,
            Uuid::new_v4(),
            &format!("123{}45", mailbox),
            None,
            Utc::now(),
        );
        account.username = mailbox.to_string();
        account.password_hash =
            Some(hash_password(&Password::new(password.to_string())).unwrap());
        account.verified = true;
        account.invite_state_code = "accepted".to_string();
        account.two_factor_code = two_factor.as_str().to_string();
        self.db.seed(account.clone());
        account
    }

    /// Payloads currently waiting on the notification queue, parsed.
    pub fn queued_jobs(&self) -> Vec<NotificationJob> {
        self.queue
            .messages(QUEUE)
            .iter()
            .map(|payload| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    /// The staged signup/login record for an email, if any.
    pub fn staged_pending(&self, email: &str) -> Option<PendingVerification> {
        self.staging
            .value(&pending_key(email))
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    /// The staged password-reset record for an email, if any.
    pub fn staged_reset(&self, email: &str) -> Option<PendingReset> {
        self.staging
            .value(&reset_key(email))
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }
}
