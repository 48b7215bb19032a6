pub mod consumer;
pub mod mailer;

pub use consumer::NotificationConsumer;
pub use mailer::{Mailer, MockMailer, SentEmail, SmtpMailer};
