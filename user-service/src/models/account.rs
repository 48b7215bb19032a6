//! Account model - invited and activated user records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account roles, ordered from highest to lowest privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    SiteAdmin,
    Operator,
    ClientAdmin,
    ClientUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::SiteAdmin => "site_admin",
            Role::Operator => "operator",
            Role::ClientAdmin => "client_admin",
            Role::ClientUser => "client_user",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "site_admin" => Ok(Role::SiteAdmin),
            "operator" => Ok(Role::Operator),
            "client_admin" => Ok(Role::ClientAdmin),
            "client_user" => Ok(Role::ClientUser),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Invite state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteState {
    Pending,
    Accepted,
    Expired,
}

impl InviteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteState::Pending => "pending",
            InviteState::Accepted => "accepted",
            InviteState::Expired => "expired",
        }
    }
}

impl std::str::FromStr for InviteState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteState::Pending),
            "accepted" => Ok(InviteState::Accepted),
            "expired" => Ok(InviteState::Expired),
            _ => Err(format!("Unknown invite state: {}", s)),
        }
    }
}

/// Second-factor mode attached to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorMode {
    None,
    Otp,
    Totp,
}

impl TwoFactorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFactorMode::None => "none",
            TwoFactorMode::Otp => "otp",
            TwoFactorMode::Totp => "totp",
        }
    }
}

impl std::str::FromStr for TwoFactorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TwoFactorMode::None),
            "otp" => Ok(TwoFactorMode::Otp),
            "totp" => Ok(TwoFactorMode::Totp),
            _ => Err(format!("Unknown two-factor mode: {}", s)),
        }
    }
}

/// Account entity.
///
/// Created in `pending` state by an invite with no password; the
/// signup-completion step sets the password hash, the verified flag and
/// the two-factor mode. An account is active iff `verified` is true.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub account_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role_code: String,
    pub verified: bool,
    pub invite_state_code: String,
    pub invited_by: Option<Uuid>,
    pub invite_id: String,
    pub invite_expiry_utc: Option<DateTime<Utc>>,
    pub two_factor_code: String,
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    pub organisation: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub last_login_utc: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a pending invited account. The username is a placeholder
    /// until the invitee picks one at signup.
    pub fn new_invited(
        email: &str,
        role: Role,
        invited_by: Uuid,
        invite_id: &str,
        organisation: Option<String>,
        invite_expiry_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: Uuid::new_v4(),
            username: email.to_string(),
            email: email.to_string(),
            password_hash: None,
            role_code: role.as_str().to_string(),
            verified: false,
            invite_state_code: InviteState::Pending.as_str().to_string(),
            invited_by: Some(invited_by),
            invite_id: invite_id.to_string(),
            invite_expiry_utc: Some(invite_expiry_utc),
            two_factor_code: TwoFactorMode::None.as_str().to_string(),
            totp_secret: None,
            totp_enabled: false,
            organisation,
            created_utc: Utc::now(),
            accepted_utc: None,
            last_login_utc: None,
        }
    }

    /// Check if the account has completed signup.
    pub fn is_active(&self) -> bool {
        self.verified
    }

    pub fn role(&self) -> Option<Role> {
        self.role_code.parse().ok()
    }

    /// Invite state; unknown codes read as expired so they cannot re-enter
    /// the signup flow.
    pub fn invite_state(&self) -> InviteState {
        self.invite_state_code.parse().unwrap_or(InviteState::Expired)
    }

    /// Second-factor mode. The column is CHECK-constrained to the three
    /// codes, so the fallback is unreachable through normal writes.
    pub fn two_factor(&self) -> TwoFactorMode {
        self.two_factor_code.parse().unwrap_or(TwoFactorMode::None)
    }
}
