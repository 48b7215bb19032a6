//! Login branches, token refresh and password reset.

mod common;

use common::{TestApp, TOTP_ISSUER};
use totp_rs::{Algorithm, Secret, TOTP};
use user_service::dtos::{
    ChangePasswordRequest, LoginOutcome, LoginRequest, PasswordResetStarted, ResetPasswordRequest,
};
use user_service::models::{PendingPurpose, TwoFactorMode};
use user_service::services::ServiceError;

const EMAIL: &str = "user@example.com";
const PASSWORD: &str = "secret1";

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn test_login_without_second_factor_issues_tokens() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::None);

    let outcome = app
        .service
        .login(login_request(EMAIL, PASSWORD))
        .await
        .unwrap();

    let LoginOutcome::Tokens(tokens) = outcome else {
        panic!("expected direct token issuance");
    };
    let claims = app.jwt.verify_access_token(&tokens.access_token).unwrap();
    assert_eq!(claims.email, EMAIL);
}

#[tokio::test]
async fn test_login_unknown_user_conflicts() {
    let app = TestApp::spawn();

    let err = app
        .service
        .login(login_request("nobody@example.com", PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UserNotRegistered));
}

#[tokio::test]
async fn test_login_wrong_password_fails_auth() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::None);

    let err = app
        .service
        .login(login_request(EMAIL, "wrong-password"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));
}

#[tokio::test]
async fn test_login_unverified_account_conflicts() {
    let app = TestApp::spawn();
    let mut account = app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::None);
    account.verified = false;
    account.invite_state_code = "pending".to_string();
    app.db.seed(account);

    let err = app
        .service
        .login(login_request(EMAIL, PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotVerified));
}

#[tokio::test]
async fn test_login_with_otp_mode_stages_a_challenge() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::Otp);

    let outcome = app
        .service
        .login(login_request(EMAIL, PASSWORD))
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::OtpSent));

    let pending = app.staged_pending(EMAIL).expect("staging record missing");
    assert_eq!(pending.purpose, PendingPurpose::Login);
    assert_eq!(pending.otp.len(), 6);

    // Completing with the staged code issues tokens and consumes the
    // record.
    let (account, tokens) = app
        .service
        .complete_otp_login(EMAIL, &pending.otp)
        .await
        .unwrap();
    assert_eq!(account.email, EMAIL);
    assert!(app.jwt.verify_access_token(&tokens.access_token).is_ok());
    assert!(app.staged_pending(EMAIL).is_none());
}

#[tokio::test]
async fn test_login_otp_record_cannot_complete_signup() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::Otp);
    app.service
        .login(login_request(EMAIL, PASSWORD))
        .await
        .unwrap();
    let pending = app.staged_pending(EMAIL).unwrap();

    // A login-purpose record is invisible to the signup completion path.
    let err = app
        .service
        .complete_otp_signup(EMAIL, &pending.otp)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PendingRecordMissing));
}

#[tokio::test]
async fn test_login_with_totp_mode_returns_challenge_without_tokens() {
    let app = TestApp::spawn();
    let mut account = app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::Totp);

    let secret = Secret::generate_secret();
    let encoded = match secret.to_encoded() {
        Secret::Encoded(s) => s,
        Secret::Raw(_) => unreachable!(),
    };
    account.totp_secret = Some(encoded.clone());
    account.totp_enabled = true;
    app.db.seed(account);

    let outcome = app
        .service
        .login(login_request(EMAIL, PASSWORD))
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::TotpRequired));

    // No staging record and nothing on the queue for the TOTP branch.
    assert!(app.staged_pending(EMAIL).is_none());
    assert!(app.queued_jobs().is_empty());

    // The challenge completes with a current authenticator code.
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        2,
        30,
        Secret::Encoded(encoded.clone()).to_bytes().unwrap(),
        Some(TOTP_ISSUER.to_string()),
        EMAIL.to_string(),
    )
    .unwrap();
    let code = totp.generate_current().unwrap();

    let (_account, tokens) = app.service.complete_totp_login(EMAIL, &code).await.unwrap();
    assert!(app.jwt.verify_access_token(&tokens.access_token).is_ok());
}

#[tokio::test]
async fn test_refresh_exchanges_for_a_new_access_token() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::None);

    let LoginOutcome::Tokens(tokens) = app
        .service
        .login(login_request(EMAIL, PASSWORD))
        .await
        .unwrap()
    else {
        panic!("expected tokens");
    };

    let access = app.service.refresh(&tokens.refresh_token).await.unwrap();
    let claims = app.jwt.verify_access_token(&access).unwrap();
    assert_eq!(claims.email, EMAIL);

    // A tampered refresh token is rejected.
    let mut tampered = tokens.refresh_token.clone();
    tampered.push('x');
    let err = app.service.refresh(&tampered).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));
}

#[tokio::test]
async fn test_password_reset_flow_with_otp() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::None);

    let started = app.service.forgot_initiate(EMAIL).await.unwrap();
    assert_eq!(started, PasswordResetStarted::OtpSent);

    let reset = app.staged_reset(EMAIL).expect("reset record missing");
    let token = app
        .service
        .forgot_verify_otp(EMAIL, &reset.otp)
        .await
        .unwrap();

    // The reset record is consumed with the verification.
    assert!(app.staged_reset(EMAIL).is_none());

    app.service
        .reset_password(ResetPasswordRequest {
            reset_token: token,
            new_password: "brand-new-pass".to_string(),
            confirm_new_password: "brand-new-pass".to_string(),
        })
        .await
        .unwrap();

    // Old password is gone, new one works.
    let err = app
        .service
        .login(login_request(EMAIL, PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));
    let outcome = app
        .service
        .login(login_request(EMAIL, "brand-new-pass"))
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Tokens(_)));
}

#[tokio::test]
async fn test_password_reset_never_reveals_account_existence() {
    let app = TestApp::spawn();

    let started = app
        .service
        .forgot_initiate("nobody@example.com")
        .await
        .unwrap();
    assert_eq!(started, PasswordResetStarted::Accepted);
    assert!(app.queued_jobs().is_empty());
}

#[tokio::test]
async fn test_change_password_requires_current_password() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::None);

    let err = app
        .service
        .change_password(
            EMAIL,
            ChangePasswordRequest {
                current_password: "wrong-password".to_string(),
                new_password: "brand-new-pass".to_string(),
                confirm_new_password: "brand-new-pass".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));

    app.service
        .change_password(
            EMAIL,
            ChangePasswordRequest {
                current_password: PASSWORD.to_string(),
                new_password: "brand-new-pass".to_string(),
                confirm_new_password: "brand-new-pass".to_string(),
            },
        )
        .await
        .unwrap();

    let outcome = app
        .service
        .login(login_request(EMAIL, "brand-new-pass"))
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Tokens(_)));
}

#[tokio::test]
async fn test_password_reset_totp_account_gets_totp_challenge() {
    let app = TestApp::spawn();
    app.seed_verified_account(EMAIL, PASSWORD, TwoFactorMode::Totp);

    let started = app.service.forgot_initiate(EMAIL).await.unwrap();
    assert_eq!(started, PasswordResetStarted::TotpRequired);
    assert!(app.staged_reset(EMAIL).is_none());
}
