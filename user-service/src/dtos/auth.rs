//! Request and outcome types for the invitation and signup operations.
//!
//! Requests carry their own field validation; failures surface as a
//! structured per-field error list through
//! [`validator::ValidationErrors`].

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Account, Role};
use crate::services::TotpSetup;

/// Request to invite a user at a given role.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInviteRequest {
    #[validate(email(message = "Invalid email"))]
    pub invite_email: String,
    pub invite_role: Role,
    /// Required when inviting a client_admin.
    pub organisation: Option<String>,
}

/// Result of a successful invite.
#[derive(Debug, Serialize)]
pub struct InviteCreated {
    pub invite_id: String,
}

/// Which second factor the invitee chose for signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPreference {
    Otp,
    Totp,
}

/// Request to begin signup against a pending invite.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 3, message = "Minimum three characters"))]
    pub username: String,
    #[validate(email(message = "email not in correct format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Minimum 6 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Password not matched"))]
    pub confirm_password: String,
    pub invite_id: String,
    pub verification_preference: VerificationPreference,
}

/// Outcome of `begin_signup`: either a code is on its way by email, or
/// the caller gets the TOTP provisioning artifacts to scan.
#[derive(Debug)]
pub enum SignupStarted {
    OtpSent,
    TotpSetup(TotpSetup),
}

/// Request to log in with email and password.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "email not in correct format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Minimum 6 characters"))]
    pub password: String,
}

/// Signed access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Outcome of `login`: tokens directly, or a second-factor challenge.
#[derive(Debug)]
pub enum LoginOutcome {
    Tokens(TokenPair),
    OtpSent,
    TotpRequired,
}

/// Outcome of `forgot_initiate`. `Accepted` is returned for unknown
/// emails as well, so the response never reveals whether an account
/// exists.
#[derive(Debug, PartialEq, Eq)]
pub enum PasswordResetStarted {
    Accepted,
    OtpSent,
    TotpRequired,
}

/// Request to set a new password with a reset token.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 10, message = "Invalid reset token"))]
    pub reset_token: String,
    #[validate(length(min = 6, message = "Minimum 6 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_new_password: String,
}

/// Authenticated password change.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 6, message = "Minimum 6 characters"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Minimum 6 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_new_password: String,
}

/// Invite listing entry.
#[derive(Debug, Serialize)]
pub struct InviteSummary {
    pub username: String,
    pub email: String,
    pub invite_state_code: String,
}

impl From<Account> for InviteSummary {
    fn from(account: Account) -> Self {
        Self {
            username: account.username,
            email: account.email,
            invite_state_code: account.invite_state_code,
        }
    }
}
