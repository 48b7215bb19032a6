pub mod account;
pub mod staging;

pub use account::{Account, InviteState, Role, TwoFactorMode};
pub use staging::{PendingPurpose, PendingReset, PendingVerification};
