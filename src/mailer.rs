//! Outbound mail used by registration.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the welcome mail carrying the activation link.
    async fn send_welcome(
        &self,
        username: &str,
        email: &str,
        activation_url: &str,
    ) -> Result<(), MailError>;
}

fn welcome_body(username: &str, activation_url: &str) -> String {
    format!(
        "Hi {username},\n\n\
         Thanks for signing up. Confirm your account by opening the link below:\n\n\
         {activation_url}\n\n\
         If you did not sign up, you can ignore this email.\n"
    )
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig, from: &str) -> Result<Self, MailError> {
        let from = from
            .parse::<Mailbox>()
            .map_err(|_| MailError::InvalidAddress(from.to_owned()))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_welcome(
        &self,
        username: &str,
        email: &str,
        activation_url: &str,
    ) -> Result<(), MailError> {
        let to = email
            .parse::<Mailbox>()
            .map_err(|_| MailError::InvalidAddress(email.to_owned()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Finish setting up your account")
            .header(ContentType::TEXT_PLAIN)
            .body(welcome_body(username, activation_url))?;

        let response = self.transport.send(message).await?;
        info!(code = %response.code(), "welcome email sent");
        Ok(())
    }
}

/// Sandbox mailer for environments without an SMTP relay. Logs the
/// delivery instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_welcome(
        &self,
        username: &str,
        email: &str,
        _activation_url: &str,
    ) -> Result<(), MailError> {
        info!(%username, %email, "sandbox: welcome email not sent");
        Ok(())
    }
}
