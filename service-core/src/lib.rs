//! service-core: Shared infrastructure for the workspace services.
pub mod config;
pub mod error;
pub mod notify;
pub mod observability;
pub mod queue;

pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;
