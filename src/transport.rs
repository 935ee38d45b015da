use anyhow::Context;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

/// A fully composed outgoing message, ready for submission.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// The outbound-mail boundary. Succeeds or errors; no delivery confirmation
/// beyond that.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingEmail) -> anyhow::Result<()>;
}

/// SMTP submission over STARTTLS with username/password auth.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(config.user.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("building SMTP transport for {}", config.host))?
            .credentials(credentials)
            .build();
        Ok(SmtpSender { transport })
    }
}

#[async_trait]
impl MailTransport for SmtpSender {
    async fn send(&self, mail: &OutgoingEmail) -> anyhow::Result<()> {
        let from: Mailbox = mail
            .from
            .parse()
            .with_context(|| format!("invalid from address {:?}", mail.from))?;

        let mut builder = Message::builder().from(from).subject(&mail.subject);
        for recipient in &mail.to {
            let to: Mailbox = recipient
                .parse()
                .with_context(|| format!("invalid recipient address {recipient:?}"))?;
            builder = builder.to(to);
        }

        let message = builder
            .body(mail.body.clone())
            .context("building outgoing message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP submission failed")?;
        Ok(())
    }
}
