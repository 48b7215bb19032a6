//! Invitation & signup state machine.
//!
//! Accounts move `pending -> accepted` through a staged two-factor
//! signup; revocation moves `pending -> expired`. Every transition that
//! activates an account goes through a single conditional update on the
//! credential store, so two racing activation attempts cannot both
//! succeed. The account insert and the notification enqueue are *not*
//! transactional with each other: a publish failure after the insert
//! leaves an invite without an email.

use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::config::InviteConfig;
use crate::dtos::{
    ChangePasswordRequest, CreateInviteRequest, InviteCreated, InviteSummary, LoginOutcome,
    LoginRequest, PasswordResetStarted, ResetPasswordRequest, SignupRequest, SignupStarted,
    TokenPair, VerificationPreference,
};
use crate::models::{
    Account, InviteState, PendingPurpose, PendingReset, PendingVerification, Role, TwoFactorMode,
};
use crate::services::{
    authorization, pending_key, reset_key, CredentialStore, JwtService, NotificationPublisher,
    OtpError, ServiceError, StagingStore, TwoFactorService, STAGING_TTL_SECONDS,
};
use crate::utils::{hash_password, verify_password, Password};
use service_core::notify::NotificationJob;

/// Identity of the actor performing an invite-scoped operation, as
/// established by the (external) authentication layer.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
    pub role_code: String,
}

#[derive(Clone)]
pub struct InvitationService {
    db: Arc<dyn CredentialStore>,
    staging: Arc<dyn StagingStore>,
    notifier: NotificationPublisher,
    jwt: JwtService,
    two_factor: TwoFactorService,
    invite: InviteConfig,
}

impl InvitationService {
    pub fn new(
        db: Arc<dyn CredentialStore>,
        staging: Arc<dyn StagingStore>,
        notifier: NotificationPublisher,
        jwt: JwtService,
        two_factor: TwoFactorService,
        invite: InviteConfig,
    ) -> Self {
        Self {
            db,
            staging,
            notifier,
            jwt,
            two_factor,
            invite,
        }
    }

    /// Create a pending invite for `req.invite_email` and enqueue the
    /// invite email.
    pub async fn create_invite(
        &self,
        actor: &Actor,
        req: CreateInviteRequest,
    ) -> Result<InviteCreated, ServiceError> {
        req.validate()?;

        if req.invite_role == Role::ClientAdmin
            && req
                .organisation
                .as_deref()
                .map_or(true, |o| o.trim().is_empty())
        {
            return Err(ServiceError::OrganisationRequired);
        }

        if !authorization::authorize_invite(&actor.role_code, req.invite_role) {
            tracing::warn!(
                actor = %actor.email,
                actor_role = %actor.role_code,
                target_role = %req.invite_role.as_str(),
                "Invite denied by role hierarchy"
            );
            return Err(ServiceError::InviteNotAuthorized);
        }

        if self.db.find_by_email(&req.invite_email).await?.is_some() {
            return Err(ServiceError::UserAlreadyExists);
        }

        let invite_id = generate_invite_id(&req.invite_email);
        let account = Account::new_invited(
            &req.invite_email,
            req.invite_role,
            actor.id,
            &invite_id,
            req.organisation.clone(),
            Utc::now() + Duration::days(self.invite.expiry_days),
        );
        self.db.insert_account(&account).await?;

        tracing::info!(
            email = %req.invite_email,
            role = %req.invite_role.as_str(),
            invite_id = %invite_id,
            invited_by = %actor.id,
            "Invite created"
        );

        let invite_token = self
            .jwt
            .generate_invite_token(&req.invite_email)
            .map_err(ServiceError::Internal)?;
        let link = format!(
            "{}/signup?invite_id={}&token={}",
            self.invite.base_url, invite_id, invite_token
        );
        let content = format!(
            "You have been invited as {}.\nYour invite ID is {}.\nComplete your signup here: {}",
            req.invite_role.as_str(),
            invite_id,
            link
        );
        self.notifier
            .publish(&NotificationJob::invite(&req.invite_email, &content))
            .await?;

        Ok(InviteCreated { invite_id })
    }

    /// Begin signup against a pending invite, branching on the chosen
    /// second factor.
    pub async fn begin_signup(&self, req: SignupRequest) -> Result<SignupStarted, ServiceError> {
        req.validate()?;

        let account = self
            .db
            .find_by_email_and_invite(&req.email, &req.invite_id)
            .await?
            .ok_or(ServiceError::NotInvited)?;

        if account.verified {
            return Err(ServiceError::AlreadyVerified);
        }
        if account.invite_state() != InviteState::Pending {
            // Revoked or externally expired invites are a precondition
            // failure, not a signup path.
            return Err(ServiceError::InviteNotPending);
        }

        // Only the hash is ever staged.
        let password_hash =
            hash_password(&Password::new(req.password.clone())).map_err(ServiceError::Internal)?;

        match req.verification_preference {
            VerificationPreference::Otp => {
                let otp = self.two_factor.generate_otp();
                let pending = PendingVerification::for_signup(
                    &req.username,
                    &req.email,
                    &password_hash,
                    &req.invite_id,
                    &otp,
                );
                self.stage(&pending_key(&req.email), &pending).await?;
                self.send_otp_email(&req.email, &otp).await?;

                tracing::info!(email = %req.email, "Signup staged, OTP sent");
                Ok(SignupStarted::OtpSent)
            }
            VerificationPreference::Totp => {
                let setup = self
                    .two_factor
                    .generate_totp_secret(&req.email)
                    .map_err(ServiceError::Internal)?;
                self.db
                    .stage_totp_secret(&req.email, &password_hash, &setup.secret)
                    .await?
                    .ok_or(ServiceError::InviteNotPending)?;

                tracing::info!(email = %req.email, "TOTP secret provisioned");
                Ok(SignupStarted::TotpSetup(setup))
            }
        }
    }

    /// Consume a staged signup with its one-time code and activate the
    /// account. A second call with an already-consumed record fails with
    /// a not-found error, because the record is deleted on first use.
    pub async fn complete_otp_signup(
        &self,
        email: &str,
        submitted_code: &str,
    ) -> Result<(Account, TokenPair), ServiceError> {
        let (pending, key) = self
            .load_and_verify_pending(email, submitted_code, PendingPurpose::Signup)
            .await?;

        let account = self
            .db
            .accept_pending(
                &pending.email,
                &pending.username,
                &pending.password_hash,
                TwoFactorMode::Otp,
            )
            .await?
            .ok_or(ServiceError::NotInvited)?;

        self.staging.del(&key).await?;

        let tokens = self
            .jwt
            .generate_token_pair(&account)
            .map_err(ServiceError::Internal)?;

        tracing::info!(email = %account.email, "Signup completed via OTP");
        Ok((account, tokens))
    }

    /// Consume a staged login with its one-time code and issue tokens.
    pub async fn complete_otp_login(
        &self,
        email: &str,
        submitted_code: &str,
    ) -> Result<(Account, TokenPair), ServiceError> {
        let (pending, key) = self
            .load_and_verify_pending(email, submitted_code, PendingPurpose::Login)
            .await?;

        let account = self
            .db
            .find_by_email(&pending.email)
            .await?
            .ok_or(ServiceError::UserNotRegistered)?;

        self.staging.del(&key).await?;
        self.db.touch_last_login(&account.email).await?;

        let tokens = self
            .jwt
            .generate_token_pair(&account)
            .map_err(ServiceError::Internal)?;

        tracing::info!(email = %account.email, "Login completed via OTP");
        Ok((account, tokens))
    }

    /// Check a submitted TOTP code for an account. This is the
    /// verification stage that precedes [`Self::complete_totp_signup`].
    pub async fn verify_totp(
        &self,
        email: &str,
        token: &str,
    ) -> Result<(Account, bool), ServiceError> {
        let account = self
            .db
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let verified = self
            .two_factor
            .verify_totp(account.totp_secret.as_deref(), token);
        Ok((account, verified))
    }

    /// Finish TOTP enrollment for a verified submission: flips the
    /// totp_enabled flag, activates the account and issues tokens.
    pub async fn complete_totp_signup(
        &self,
        account: &Account,
        verified: bool,
    ) -> Result<(Account, TokenPair), ServiceError> {
        if !verified {
            return Err(ServiceError::InvalidTotp);
        }

        let account = self
            .db
            .enable_totp(&account.email)
            .await?
            .ok_or(ServiceError::TotpNotConfigured)?;

        let tokens = self
            .jwt
            .generate_token_pair(&account)
            .map_err(ServiceError::Internal)?;

        tracing::info!(email = %account.email, "Signup completed via TOTP");
        Ok((account, tokens))
    }

    /// Log in with email and password. Depending on the account's
    /// two-factor mode this either issues tokens directly or returns a
    /// challenge to complete out of band.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginOutcome, ServiceError> {
        req.validate()?;

        let account = self
            .db
            .find_by_email(&req.email)
            .await?
            .ok_or(ServiceError::UserNotRegistered)?;

        let Some(stored_hash) = account.password_hash.as_deref() else {
            return Err(ServiceError::InvalidCredentials);
        };
        if !verify_password(&Password::new(req.password), stored_hash) {
            return Err(ServiceError::InvalidCredentials);
        }
        if !account.verified {
            return Err(ServiceError::NotVerified);
        }

        match account.two_factor() {
            TwoFactorMode::None => {
                self.db.touch_last_login(&account.email).await?;
                let tokens = self
                    .jwt
                    .generate_token_pair(&account)
                    .map_err(ServiceError::Internal)?;
                tracing::info!(email = %account.email, "Login successful");
                Ok(LoginOutcome::Tokens(tokens))
            }
            TwoFactorMode::Otp => {
                let otp = self.two_factor.generate_otp();
                let pending = PendingVerification::for_login(
                    &account.username,
                    &account.email,
                    stored_hash,
                    &account.invite_id,
                    &otp,
                );
                self.stage(&pending_key(&account.email), &pending).await?;
                self.send_otp_email(&account.email, &otp).await?;

                tracing::info!(email = %account.email, "Login staged, OTP sent");
                Ok(LoginOutcome::OtpSent)
            }
            TwoFactorMode::Totp => {
                tracing::info!(email = %account.email, "Login requires TOTP");
                Ok(LoginOutcome::TotpRequired)
            }
        }
    }

    /// Complete a TOTP-challenged login.
    pub async fn complete_totp_login(
        &self,
        email: &str,
        token: &str,
    ) -> Result<(Account, TokenPair), ServiceError> {
        let (account, verified) = self.verify_totp(email, token).await?;
        if !verified {
            return Err(ServiceError::InvalidTotp);
        }
        if !account.verified {
            return Err(ServiceError::NotVerified);
        }

        self.db.touch_last_login(&account.email).await?;
        let tokens = self
            .jwt
            .generate_token_pair(&account)
            .map_err(ServiceError::Internal)?;

        tracing::info!(email = %account.email, "Login completed via TOTP");
        Ok((account, tokens))
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, ServiceError> {
        let claims = self.jwt.verify_refresh_token(refresh_token)?;

        let account = self
            .db
            .find_by_email(&claims.email)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        self.jwt
            .generate_access_token(&account)
            .map_err(ServiceError::Internal)
    }

    /// List the invites an actor has issued for a given role.
    pub async fn list_invites(
        &self,
        actor: &Actor,
        role: Role,
    ) -> Result<Vec<InviteSummary>, ServiceError> {
        let invites = self.db.find_invited_by(actor.id, &role).await?;
        Ok(invites.into_iter().map(InviteSummary::from).collect())
    }

    /// Revoke a pending invite. Admin ranks only; the transition is the
    /// external `pending -> expired` edge that signup must tolerate.
    pub async fn revoke_invite(
        &self,
        actor: &Actor,
        invite_id: &str,
    ) -> Result<Account, ServiceError> {
        let role = actor
            .role_code
            .parse::<Role>()
            .map_err(|_| ServiceError::InviteNotAuthorized)?;
        if !authorization::can_manage_invites(&role) {
            return Err(ServiceError::InviteNotAuthorized);
        }

        let account = self
            .db
            .expire_invite(invite_id)
            .await?
            .ok_or(ServiceError::NotInvited)?;

        tracing::info!(invite_id = %invite_id, email = %account.email, "Invite revoked");
        Ok(account)
    }

    /// Start a password reset. The outcome never reveals whether the
    /// email belongs to an account.
    pub async fn forgot_initiate(&self, email: &str) -> Result<PasswordResetStarted, ServiceError> {
        let Some(account) = self.db.find_by_email(email).await? else {
            return Ok(PasswordResetStarted::Accepted);
        };

        if account.two_factor() == TwoFactorMode::Totp {
            return Ok(PasswordResetStarted::TotpRequired);
        }

        let otp = self.two_factor.generate_otp();
        let pending = PendingReset::new(&account.email, &otp);
        let serialized = serde_json::to_string(&pending).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Failed to serialize reset record: {}", e))
        })?;
        self.staging
            .set(&reset_key(&account.email), &serialized, STAGING_TTL_SECONDS)
            .await?;
        self.send_otp_email(&account.email, &otp).await?;

        tracing::info!(email = %account.email, "Password reset staged, OTP sent");
        Ok(PasswordResetStarted::OtpSent)
    }

    /// Verify a password-reset code and hand back a reset token.
    pub async fn forgot_verify_otp(
        &self,
        email: &str,
        submitted_code: &str,
    ) -> Result<String, ServiceError> {
        let key = reset_key(email);
        let raw = self
            .staging
            .get(&key)
            .await?
            .ok_or(ServiceError::PendingRecordMissing)?;
        let pending: PendingReset = serde_json::from_str(&raw).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Corrupt reset record: {}", e))
        })?;

        match self.two_factor.verify_reset_otp(
            &pending,
            submitted_code,
            Utc::now().timestamp_millis(),
        ) {
            Err(OtpError::Mismatch) => return Err(ServiceError::OtpMismatch),
            Err(OtpError::Expired) => return Err(ServiceError::OtpExpired),
            Ok(()) => {}
        }

        let token = self
            .jwt
            .generate_reset_token(&pending.email)
            .map_err(ServiceError::Internal)?;
        self.staging.del(&key).await?;

        Ok(token)
    }

    /// Verify a TOTP code for a password reset and hand back a reset
    /// token.
    pub async fn forgot_verify_totp(
        &self,
        email: &str,
        token: &str,
    ) -> Result<String, ServiceError> {
        // A missing account reads the same as a bad code.
        let account = self
            .db
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidTotp)?;

        if !self
            .two_factor
            .verify_totp(account.totp_secret.as_deref(), token)
        {
            return Err(ServiceError::InvalidTotp);
        }

        self.jwt
            .generate_reset_token(&account.email)
            .map_err(ServiceError::Internal)
    }

    /// Set a new password from a reset token.
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<Account, ServiceError> {
        req.validate()?;

        let claims = self.jwt.verify_reset_token(&req.reset_token)?;
        let hash =
            hash_password(&Password::new(req.new_password)).map_err(ServiceError::Internal)?;

        let account = self
            .db
            .update_password(&claims.email, &hash)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        tracing::info!(email = %account.email, "Password reset");
        Ok(account)
    }

    /// Authenticated password change.
    pub async fn change_password(
        &self,
        email: &str,
        req: ChangePasswordRequest,
    ) -> Result<Account, ServiceError> {
        req.validate()?;

        let account = self
            .db
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let current_ok = account
            .password_hash
            .as_deref()
            .map(|h| verify_password(&Password::new(req.current_password.clone()), h))
            .unwrap_or(false);
        if !current_ok {
            return Err(ServiceError::InvalidCredentials);
        }

        let hash =
            hash_password(&Password::new(req.new_password)).map_err(ServiceError::Internal)?;
        let account = self
            .db
            .update_password(email, &hash)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        tracing::info!(email = %account.email, "Password updated");
        Ok(account)
    }

    async fn stage(&self, key: &str, pending: &PendingVerification) -> Result<(), ServiceError> {
        let serialized = serde_json::to_string(pending).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Failed to serialize staging record: {}", e))
        })?;
        self.staging
            .set(key, &serialized, STAGING_TTL_SECONDS)
            .await?;
        Ok(())
    }

    /// Load a staged verification record and check the submitted code
    /// against it. A mismatch leaves the record consumable; only a
    /// successful completion deletes it.
    async fn load_and_verify_pending(
        &self,
        email: &str,
        submitted_code: &str,
        purpose: PendingPurpose,
    ) -> Result<(PendingVerification, String), ServiceError> {
        let key = pending_key(email);
        let raw = self
            .staging
            .get(&key)
            .await?
            .ok_or(ServiceError::PendingRecordMissing)?;
        let pending: PendingVerification = serde_json::from_str(&raw).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Corrupt staging record: {}", e))
        })?;

        if pending.purpose != purpose {
            return Err(ServiceError::PendingRecordMissing);
        }

        match self
            .two_factor
            .verify_otp(&pending, submitted_code, Utc::now().timestamp_millis())
        {
            Err(OtpError::Mismatch) => Err(ServiceError::OtpMismatch),
            Err(OtpError::Expired) => Err(ServiceError::OtpExpired),
            Ok(()) => Ok((pending, key)),
        }
    }

    async fn send_otp_email(&self, email: &str, otp: &str) -> Result<(), ServiceError> {
        let content = format!(
            "Your verification code is {}. It expires in 10 minutes.",
            otp
        );
        self.notifier
            .publish(&NotificationJob::otp(email, &content))
            .await?;
        Ok(())
    }
}

/// Invite ids interleave the invitee's mailbox name with five random
/// digits. Uniqueness is probabilistic; the unique column constraint
/// surfaces the rare collision as a store error.
fn generate_invite_id(email: &str) -> String {
    let digits = rand::thread_rng().gen_range(10_000..100_000u32).to_string();
    let mailbox = email.split('@').next().unwrap_or(email);
    format!("{}{}{}", &digits[..3], mailbox, &digits[3..])
}
