//! SMTP delivery
//!
//! Known providers map to their relay hosts; credentials are the account
//! user plus an app password. The transport is verified before every send
//! so connection problems surface as transport errors rather than
//! half-sent messages.

use std::str::FromStr;
use std::time::Duration;

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::render::render_html;
use crate::{ConnectorError, Mailer, OutboundEmail};

/// Recognised SMTP providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpProvider {
    Gmail,
    Zoho,
}

impl SmtpProvider {
    pub fn relay_host(self) -> &'static str {
        match self {
            SmtpProvider::Gmail => "smtp.gmail.com",
            SmtpProvider::Zoho => "smtp.zoho.com",
        }
    }
}

impl FromStr for SmtpProvider {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gmail" => Ok(SmtpProvider::Gmail),
            "zoho" => Ok(SmtpProvider::Zoho),
            other => Err(ConnectorError::Validation(format!(
                "unknown SMTP provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub provider: SmtpProvider,
    /// Account user; also the `From` address
    pub user: String,
    pub app_password: String,
    /// Per-SMTP-operation deadline
    pub timeout: Duration,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &MailerConfig) -> Result<Self, ConnectorError> {
        let from = cfg
            .user
            .parse::<Mailbox>()
            .map_err(|e| ConnectorError::Validation(format!("invalid sender address: {}", e)))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(cfg.provider.relay_host())
            .map_err(|e| ConnectorError::Transport(e.to_string()))?
            .credentials(Credentials::new(cfg.user.clone(), cfg.app_password.clone()))
            .timeout(Some(cfg.timeout))
            .build();
        Ok(Self { transport, from })
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message, ConnectorError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone());
        for recipient in &email.recipients {
            let mailbox = recipient.parse::<Mailbox>().map_err(|e| {
                ConnectorError::Validation(format!("invalid recipient {}: {}", recipient, e))
            })?;
            builder = builder.to(mailbox);
        }
        builder
            .multipart(MultiPart::alternative_plain_html(
                email.body_text.clone(),
                render_html(&email.body_text),
            ))
            .map_err(|e| ConnectorError::Validation(format!("message build failed: {}", e)))
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), ConnectorError> {
        if email.recipients.is_empty() {
            return Err(ConnectorError::Validation(
                "no recipients configured".to_string(),
            ));
        }
        let message = self.build_message(email)?;

        // Connect and verify before sending.
        let live = self
            .transport
            .test_connection()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        if !live {
            return Err(ConnectorError::Transport(
                "SMTP connection verification failed".to_string(),
            ));
        }

        self.transport
            .send(message)
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(())
    }
}
