pub mod auth;

pub use auth::{
    ChangePasswordRequest, CreateInviteRequest, InviteCreated, InviteSummary, LoginOutcome,
    LoginRequest, PasswordResetStarted, ResetPasswordRequest, SignupRequest, SignupStarted,
    TokenPair, VerificationPreference,
};
