//! Two-factor verification: staged one-time codes and TOTP.

use rand::Rng;
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::models::{PendingReset, PendingVerification};

const TOTP_DIGITS: usize = 6;
/// Accept codes up to two time steps before or after the current one.
const TOTP_SKEW_STEPS: u8 = 2;
const TOTP_STEP_SECONDS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("Invalid OTP")]
    Mismatch,
    #[error("OTP expired")]
    Expired,
}

/// Provisioning artifacts handed back to the caller after a TOTP secret
/// is generated.
#[derive(Debug, Clone)]
pub struct TotpSetup {
    /// Base32-encoded shared secret.
    pub secret: String,
    pub otpauth_url: String,
    /// PNG data URL for direct display as a scannable QR code.
    pub qr_data_url: String,
}

#[derive(Clone)]
pub struct TwoFactorService {
    issuer: String,
}

impl TwoFactorService {
    pub fn new(issuer: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
        }
    }

    /// Uniform six-digit one-time code.
    pub fn generate_otp(&self) -> String {
        rand::thread_rng().gen_range(100_000..=999_999).to_string()
    }

    /// Check a submitted code against a staged signup/login record.
    ///
    /// Mismatch is checked first and leaves the record intact for another
    /// attempt. Expiry is inclusive: a code whose expiry equals `now_ms`
    /// is already expired. The check is independent of the staging
    /// store's TTL, which is allowed to drift from the logical expiry.
    pub fn verify_otp(
        &self,
        pending: &PendingVerification,
        submitted: &str,
        now_ms: i64,
    ) -> Result<(), OtpError> {
        check_code(&pending.otp, pending.otp_expiry_ms, submitted, now_ms)
    }

    /// Check a submitted code against a staged password-reset record.
    pub fn verify_reset_otp(
        &self,
        pending: &PendingReset,
        submitted: &str,
        now_ms: i64,
    ) -> Result<(), OtpError> {
        check_code(&pending.otp, pending.otp_expiry_ms, submitted, now_ms)
    }

    /// Generate a fresh TOTP secret bound to an email, with the
    /// provisioning URI and QR image for authenticator apps.
    pub fn generate_totp_secret(&self, email: &str) -> Result<TotpSetup, anyhow::Error> {
        let secret = Secret::generate_secret();
        let bytes = secret
            .to_bytes()
            .map_err(|e| anyhow::anyhow!("Failed to read generated secret: {:?}", e))?;

        let Secret::Encoded(encoded) = secret.to_encoded() else {
            return Err(anyhow::anyhow!("Secret encoding failed"));
        };

        let totp = self.totp_for(bytes, email)?;
        let qr = totp
            .get_qr_base64()
            .map_err(|e| anyhow::anyhow!("Failed to render QR code: {}", e))?;

        Ok(TotpSetup {
            secret: encoded,
            otpauth_url: totp.get_url(),
            qr_data_url: format!("data:image/png;base64,{}", qr),
        })
    }

    /// Verify a submitted TOTP code against a stored base32 secret.
    ///
    /// An absent or unparseable secret verifies false, never errors.
    pub fn verify_totp(&self, secret: Option<&str>, token: &str) -> bool {
        let Some(secret) = secret else {
            return false;
        };
        let Ok(bytes) = Secret::Encoded(secret.to_string()).to_bytes() else {
            return false;
        };
        let Ok(totp) = self.totp_for(bytes, "account") else {
            return false;
        };
        totp.check_current(token).unwrap_or(false)
    }

    fn totp_for(&self, secret: Vec<u8>, account_name: &str) -> Result<TOTP, anyhow::Error> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to build TOTP: {}", e))
    }
}

fn check_code(staged: &str, expiry_ms: i64, submitted: &str, now_ms: i64) -> Result<(), OtpError> {
    if staged != submitted {
        return Err(OtpError::Mismatch);
    }
    if now_ms >= expiry_ms {
        return Err(OtpError::Expired);
    }
    Ok(())
}
