//! Outbound notification wire model, shared by producer and consumer.

use serde::{Deserialize, Serialize};

/// Job type tag carried on the queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Invite,
    Otp,
}

/// A single outbound notification as persisted on the queue.
///
/// Wire shape: `{ "to", "content", "subject"?, "html"?, "type"? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub to: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationKind>,
}

impl NotificationJob {
    pub fn invite(to: &str, content: &str) -> Self {
        Self {
            to: to.to_string(),
            content: content.to_string(),
            subject: None,
            html: None,
            kind: Some(NotificationKind::Invite),
        }
    }

    pub fn otp(to: &str, content: &str) -> Self {
        Self {
            to: to.to_string(),
            content: content.to_string(),
            subject: None,
            html: None,
            kind: Some(NotificationKind::Otp),
        }
    }
}
