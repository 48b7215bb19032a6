//! Mail delivery for the notification consumer.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use service_core::error::AppError;
use std::sync::Mutex;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message. Any rejection, whatever the transport cause,
    /// reads as a failed delivery to the caller.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<(), AppError> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let html_body = match html {
            Some(html) => html.to_string(),
            None => render_default_html(subject, text, &self.config.from_name),
        };

        let message = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Fallback HTML scaffold for jobs that carry no rendered markup. The
/// plain-text content is escaped before interpolation.
pub fn render_default_html(subject: &str, content: &str, from_name: &str) -> String {
    let escaped = content.replace('<', "&lt;").replace('>', "&gt;");

    format!(
        r###"<div style="font-family:Arial,Helvetica,sans-serif;background:#f7f7f9;padding:24px;">
  <div style="max-width:560px;margin:0 auto;background:#ffffff;border:1px solid #e6e8eb;border-radius:8px;overflow:hidden;">
    <div style="padding:20px 24px;border-bottom:1px solid #f0f2f5;">
      <h2 style="margin:0;color:#111827;font-size:18px;">{}</h2>
    </div>
    <div style="padding:24px;color:#374151;white-space:pre-line;line-height:1.5;">
      {}
    </div>
    <div style="padding:16px 24px;color:#6b7280;font-size:12px;border-top:1px solid #f0f2f5;">
      Sent by {}
    </div>
  </div>
</div>"###,
        subject, escaped, from_name
    )
}

/// A delivery recorded by [`MockMailer`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Mock mailer for tests: records deliveries and can be told to reject
/// every send with a given error message.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<SentEmail>>,
    fail_with: Mutex<Option<String>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().expect("mailer mutex poisoned") = Some(message.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock().expect("mailer mutex poisoned") = None;
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<(), AppError> {
        let failure = self
            .fail_with
            .lock()
            .map_err(|e| AppError::EmailError(format!("mailer mutex poisoned: {}", e)))?
            .clone();
        if let Some(message) = failure {
            return Err(AppError::EmailError(message));
        }

        self.sent
            .lock()
            .map_err(|e| AppError::EmailError(format!("mailer mutex poisoned: {}", e)))?
            .push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                text: text.to_string(),
                html: html.map(str::to_string),
            });

        tracing::info!(to = %to, subject = %subject, "[MOCK] Email would be sent");
        Ok(())
    }
}
