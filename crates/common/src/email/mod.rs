//! Outbound email for account flows
//!
//! Registration sends a single confirmation message. When no SMTP relay is
//! configured the gateway falls back to [`RecordingEmailSender`], which keeps
//! messages in memory and logs them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::config::EmailConfig;
use crate::errors::{AppError, Result};
use crate::metrics;

/// Email template types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    /// Registration confirmation link
    Confirmation {
        recipient: String,
        reference: String,
        expires_at: DateTime<Utc>,
    },
}

impl EmailTemplate {
    pub fn recipient(&self) -> &str {
        match self {
            EmailTemplate::Confirmation { recipient, .. } => recipient,
        }
    }
}

/// A template rendered against a base URL
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn confirmation_link(base_url: &str, reference: &str) -> String {
    format!(
        "{}/register/confirm?ref={}",
        base_url.trim_end_matches('/'),
        reference
    )
}

pub fn render(template: &EmailTemplate, base_url: &str) -> RenderedEmail {
    match template {
        EmailTemplate::Confirmation {
            recipient,
            reference,
            expires_at,
        } => {
            let link = confirmation_link(base_url, reference);
            let expiry = expires_at.format("%Y-%m-%d %H:%M UTC");
            let text = format!(
                "Hello,\n\n\
                Please confirm your registration by opening the link below:\n\n\
                {}\n\n\
                The link is valid until {}.\n\n\
                If you did not register, you can ignore this email.",
                link, expiry
            );
            let html = format!(
                "<p>Hello,</p>\
                <p>Please confirm your registration by opening the link below:</p>\
                <p><a href=\"{0}\">{0}</a></p>\
                <p>The link is valid until {1}.</p>\
                <p>If you did not register, you can ignore this email.</p>",
                link, expiry
            );
            RenderedEmail {
                to: recipient.clone(),
                subject: "Confirm your registration".to_string(),
                text,
                html,
            }
        }
    }
}

/// Email sender trait for abstraction
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, template: EmailTemplate) -> Result<()>;
}

/// Keeps every message in memory instead of delivering it
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailTemplate>>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailTemplate> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, template: EmailTemplate) -> Result<()> {
        info!(recipient = template.recipient(), "Email recorded, not delivered");
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(template);
        Ok(())
    }
}

/// SMTP email sender over an implicit-TLS relay
pub struct SmtpEmailSender {
    config: EmailConfig,
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid from address: {}", e),
            })?;

        let transport = if config.smtp_user.is_empty() {
            // No authentication (local development relays)
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(config.smtp_user.clone(), config.smtp_password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| AppError::Configuration {
                    message: format!("SMTP relay error: {}", e),
                })?
                .credentials(creds)
                .port(config.smtp_port)
                .build()
        };

        info!(host = %config.smtp_host, port = config.smtp_port, "SMTP sender configured");
        Ok(Self {
            config,
            from,
            transport,
        })
    }

    fn build_message(&self, template: &EmailTemplate) -> Result<Message> {
        let rendered = render(template, &self.config.base_url);
        let to = rendered.to.parse::<Mailbox>().map_err(|e| AppError::Email {
            message: format!("Invalid recipient address: {}", e),
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(rendered.subject)
            .multipart(MultiPart::alternative_plain_html(rendered.text, rendered.html))
            .map_err(|e| AppError::Email {
                message: format!("Failed to build email: {}", e),
            })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, template: EmailTemplate) -> Result<()> {
        let message = self.build_message(&template)?;

        match self.transport.send(message).await {
            Ok(_) => {
                metrics::record_email(true);
                info!(recipient = template.recipient(), "Email sent");
                Ok(())
            }
            Err(e) => {
                metrics::record_email(false);
                warn!(recipient = template.recipient(), error = %e, "Email delivery failed");
                Err(AppError::Email {
                    message: e.to_string(),
                })
            }
        }
    }
}
