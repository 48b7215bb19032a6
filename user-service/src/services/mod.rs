pub mod authorization;
pub mod database;
pub mod error;
pub mod invitation;
pub mod jwt;
pub mod notifications;
pub mod staging;
pub mod twofactor;

pub use database::{CredentialStore, Database, MockCredentialStore};
pub use error::ServiceError;
pub use invitation::{Actor, InvitationService};
pub use jwt::JwtService;
pub use notifications::NotificationPublisher;
pub use staging::{pending_key, reset_key, MockStaging, RedisStaging, StagingStore, STAGING_TTL_SECONDS};
pub use twofactor::{OtpError, TotpSetup, TwoFactorService};
