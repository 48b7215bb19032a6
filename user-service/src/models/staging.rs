//! Staging records held in the ephemeral store while a second factor is
//! outstanding.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Validity window for a staged one-time code, independent of the
/// store-level TTL on the record itself. The two are allowed to drift;
/// the code expiry is always checked explicitly.
pub const OTP_VALIDITY_MS: i64 = 600_000;

/// Which flow a staged verification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPurpose {
    Signup,
    Login,
}

/// Signup or login state parked until the one-time code comes back.
///
/// Only the password *hash* is staged, never the plaintext. At most one
/// live record exists per email; it is consumed exactly once, on
/// successful verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingVerification {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub invite_id: String,
    pub otp: String,
    pub otp_expiry_ms: i64,
    pub purpose: PendingPurpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_factor: Option<super::TwoFactorMode>,
}

impl PendingVerification {
    pub fn for_signup(
        username: &str,
        email: &str,
        password_hash: &str,
        invite_id: &str,
        otp: &str,
    ) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            invite_id: invite_id.to_string(),
            otp: otp.to_string(),
            otp_expiry_ms: Utc::now().timestamp_millis() + OTP_VALIDITY_MS,
            purpose: PendingPurpose::Signup,
            two_factor: Some(super::TwoFactorMode::Otp),
        }
    }

    pub fn for_login(
        username: &str,
        email: &str,
        password_hash: &str,
        invite_id: &str,
        otp: &str,
    ) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            invite_id: invite_id.to_string(),
            otp: otp.to_string(),
            otp_expiry_ms: Utc::now().timestamp_millis() + OTP_VALIDITY_MS,
            purpose: PendingPurpose::Login,
            two_factor: Some(super::TwoFactorMode::Otp),
        }
    }
}

/// Password-reset verification parked under its own key namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReset {
    pub email: String,
    pub otp: String,
    pub otp_expiry_ms: i64,
}

impl PendingReset {
    pub fn new(email: &str, otp: &str) -> Self {
        Self {
            email: email.to_string(),
            otp: otp.to_string(),
            otp_expiry_ms: Utc::now().timestamp_millis() + OTP_VALIDITY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_record_serializes_round_trip() {
        let record =
            PendingVerification::for_signup("alice", "alice@example.com", "$argon2id$stub", "123alice45", "482913");

        let json = serde_json::to_string(&record).unwrap();
        let back: PendingVerification = serde_json::from_str(&json).unwrap();

        assert_eq!(back.email, "alice@example.com");
        assert_eq!(back.otp, "482913");
        assert_eq!(back.purpose, PendingPurpose::Signup);
        assert!(back.otp_expiry_ms > Utc::now().timestamp_millis());
    }
}
