use service_core::error::AppError;
use thiserror::Error;

/// Typed failures of the invitation and signup operations.
///
/// The variants follow the shared taxonomy: validation, conflict,
/// not-found, authentication and internal. Transport errors from the
/// store, staging store or queue arrive as [`AppError`] and pass through
/// unchanged so their detail never reaches callers as anything but
/// Internal.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Organisation is required when inviting a client_admin")]
    OrganisationRequired,

    #[error("Not authorized to invite this role")]
    InviteNotAuthorized,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User already signed up, please login")]
    AlreadyVerified,

    #[error("User not invited or found")]
    NotInvited,

    #[error("Invite is no longer pending")]
    InviteNotPending,

    #[error("User not registered")]
    UserNotRegistered,

    #[error("User not found")]
    UserNotFound,

    #[error("User not verified, please sign up using the invite")]
    NotVerified,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No signup request found or OTP expired")]
    PendingRecordMissing,

    #[error("Invalid OTP")]
    OtpMismatch,

    #[error("OTP expired")]
    OtpExpired,

    #[error("Invalid totp")]
    InvalidTotp,

    #[error("TOTP is not configured for this account")]
    TotpNotConfigured,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => AppError::ValidationError(e),
            ServiceError::OrganisationRequired => AppError::BadRequest(anyhow::anyhow!(
                "Organisation is required when inviting a client_admin"
            )),
            ServiceError::InviteNotAuthorized => {
                AppError::Forbidden(anyhow::anyhow!("Not authorized to invite this role"))
            }
            ServiceError::UserAlreadyExists => {
                AppError::Conflict(anyhow::anyhow!("User already exists"))
            }
            ServiceError::AlreadyVerified => {
                AppError::Conflict(anyhow::anyhow!("User already signed up, please login"))
            }
            ServiceError::NotInvited => {
                AppError::NotFound(anyhow::anyhow!("User not invited or found"))
            }
            ServiceError::InviteNotPending => {
                AppError::Conflict(anyhow::anyhow!("Invite is no longer pending"))
            }
            ServiceError::UserNotRegistered => {
                AppError::Conflict(anyhow::anyhow!("User not registered"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::NotVerified => AppError::Conflict(anyhow::anyhow!(
                "User not verified, please sign up using the invite"
            )),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::PendingRecordMissing => {
                AppError::NotFound(anyhow::anyhow!("No signup request found or OTP expired"))
            }
            ServiceError::OtpMismatch => AppError::AuthError(anyhow::anyhow!("Invalid OTP")),
            ServiceError::OtpExpired => AppError::AuthError(anyhow::anyhow!("OTP expired")),
            ServiceError::InvalidTotp => AppError::AuthError(anyhow::anyhow!("Invalid totp")),
            ServiceError::TotpNotConfigured => AppError::BadRequest(anyhow::anyhow!(
                "TOTP is not configured for this account"
            )),
            ServiceError::InvalidToken => AppError::AuthError(anyhow::anyhow!("Invalid token")),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::App(e) => e,
        }
    }
}
