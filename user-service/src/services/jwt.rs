//! Token service: stateless HS256 signing and verification.
//!
//! Tokens are trusted purely via signature and expiry; there is no
//! revocation list. Verification failures are reported uniformly, without
//! distinguishing a bad signature from an elapsed expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::dtos::TokenPair;
use crate::models::Account;
use crate::services::ServiceError;

const PURPOSE_RESET: &str = "password_reset";
const PURPOSE_INVITE: &str = "invite";

/// Claims for access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (account ID)
    pub sub: String,
    pub email: String,
    pub username: String,
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Claims for refresh tokens (long-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub email: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

/// Claims for single-purpose tokens (password reset, invite links).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeTokenClaims {
    pub email: String,
    pub purpose: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    reset_token_expiry_minutes: i64,
    invite_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            reset_token_expiry_minutes: config.reset_token_expiry_minutes,
            invite_token_expiry_days: config.invite_token_expiry_days,
        }
    }

    /// Generate an access token for an account.
    pub fn generate_access_token(&self, account: &Account) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: account.account_id.to_string(),
            email: account.email.clone(),
            username: account.username.clone(),
            role: account.role_code.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Generate a refresh token for an account.
    pub fn generate_refresh_token(&self, account: &Account) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::days(self.refresh_token_expiry_days);

        let claims = RefreshTokenClaims {
            email: account.email.clone(),
            username: account.username.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    /// Generate both access and refresh tokens.
    pub fn generate_token_pair(&self, account: &Account) -> Result<TokenPair, anyhow::Error> {
        Ok(TokenPair {
            access_token: self.generate_access_token(account)?,
            refresh_token: self.generate_refresh_token(account)?,
        })
    }

    /// Generate a short-lived password-reset token.
    pub fn generate_reset_token(&self, email: &str) -> Result<String, anyhow::Error> {
        self.generate_purpose_token(
            email,
            PURPOSE_RESET,
            Duration::minutes(self.reset_token_expiry_minutes),
        )
    }

    /// Generate the signed correlate of an invite link.
    pub fn generate_invite_token(&self, email: &str) -> Result<String, anyhow::Error> {
        self.generate_purpose_token(
            email,
            PURPOSE_INVITE,
            Duration::days(self.invite_token_expiry_days),
        )
    }

    fn generate_purpose_token(
        &self,
        email: &str,
        purpose: &str,
        validity: Duration,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = PurposeTokenClaims {
            email: email.to_string(),
            purpose: purpose.to_string(),
            exp: (now + validity).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode {} token: {}", purpose, e))
    }

    /// Validate and decode an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &Self::validation())
            .map(|data| data.claims)
            .map_err(|_| ServiceError::InvalidToken)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, ServiceError> {
        decode::<RefreshTokenClaims>(token, &self.decoding_key, &Self::validation())
            .map(|data| data.claims)
            .map_err(|_| ServiceError::InvalidToken)
    }

    /// Validate and decode a password-reset token.
    pub fn verify_reset_token(&self, token: &str) -> Result<PurposeTokenClaims, ServiceError> {
        self.verify_purpose_token(token, PURPOSE_RESET)
    }

    /// Validate and decode an invite-link token.
    pub fn verify_invite_token(&self, token: &str) -> Result<PurposeTokenClaims, ServiceError> {
        self.verify_purpose_token(token, PURPOSE_INVITE)
    }

    fn verify_purpose_token(
        &self,
        token: &str,
        purpose: &str,
    ) -> Result<PurposeTokenClaims, ServiceError> {
        let claims = decode::<PurposeTokenClaims>(token, &self.decoding_key, &Self::validation())
            .map(|data| data.claims)
            .map_err(|_| ServiceError::InvalidToken)?;

        if claims.purpose != purpose {
            return Err(ServiceError::InvalidToken);
        }
        Ok(claims)
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation
    }

    /// Access token expiry in seconds (for client info).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use uuid::Uuid;

    fn test_service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-test-secret-test-secret!".to_string(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
            reset_token_expiry_minutes: 15,
            invite_token_expiry_days: 7,
        })
    }

    fn test_account() -> Account {
        let mut account = Account::new_invited(
            "test@example.com",
            Role::Operator,
            Uuid::new_v4(),
            "123test45",
            None,
            Utc::now(),
        );
        account.username = "tester".to_string();
        account
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = test_service();
        let account = test_account();

        let token = service.generate_access_token(&account).unwrap();
        let claims = service.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, account.account_id.to_string());
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.username, "tester");
        assert_eq!(claims.role, "operator");
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let service = test_service();
        let account = test_account();

        let token = service.generate_refresh_token(&account).unwrap();
        let claims = service.verify_refresh_token(&token).unwrap();

        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.username, "tester");
    }

    #[test]
    fn test_token_pair_generation() {
        let service = test_service();
        let pair = service.generate_token_pair(&test_account()).unwrap();

        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn test_tampered_token_fails_uniformly() {
        let service = test_service();
        let token = service.generate_access_token(&test_account()).unwrap();

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(
            service.verify_access_token(&tampered),
            Err(ServiceError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let service = test_service();
        let other = JwtService::new(&JwtConfig {
            secret: "another-secret-another-secret-another!".to_string(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
            reset_token_expiry_minutes: 15,
            invite_token_expiry_days: 7,
        });

        let token = service.generate_access_token(&test_account()).unwrap();
        assert!(other.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_reset_token_rejected_as_invite_token() {
        let service = test_service();
        let reset = service.generate_reset_token("test@example.com").unwrap();

        assert!(service.verify_reset_token(&reset).is_ok());
        assert!(matches!(
            service.verify_invite_token(&reset),
            Err(ServiceError::InvalidToken)
        ));
    }
}
