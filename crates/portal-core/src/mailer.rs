//! Mail transport collaborator. The dispatcher only sees the
//! `MailTransport` trait; `SmtpMailer` talks to a real relay, while
//! `MemoryMailer` records deliveries for tests and local runs.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("could not compose message: {0}")]
    Compose(String),
    #[error("{0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// A composed report email, transport-agnostic. `text_body` is the full
/// plain-text rendering (the link line included); `image_link` and
/// `inline_image` carry the structured attachment for transports that
/// can do better than plain text.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub inline_image: Option<InlineImage>,
    pub image_link: Option<String>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

// ── SMTP ────────────────────────────────────────────────────────────────

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// STARTTLS when TLS is on; a plain relay otherwise (local testing
    /// against a debug SMTP server).
    pub fn from_config(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = if cfg.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
        };
        builder = builder.port(cfg.port);

        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from: Mailbox = cfg
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("SMTP_FROM is not a valid address: {}", e))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| MailError::Compose(format!("bad recipient {}: {}", mail.to, e)))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone());

        let message = match &mail.inline_image {
            Some(image) => {
                let content_type = ContentType::parse(&image.content_type)
                    .map_err(|e| MailError::Compose(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(mail.text_body.clone()))
                        .singlepart(
                            Attachment::new_inline("report-image".to_string())
                                .body(image.bytes.clone(), content_type),
                        ),
                )
            }
            None => builder.body(mail.text_body.clone()),
        }
        .map_err(|e| MailError::Compose(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

// ── In-memory sink ──────────────────────────────────────────────────────

/// Records every delivery instead of sending it. Tests use the injected
/// failure and latency knobs to exercise the dispatcher's failure and
/// concurrency paths.
#[derive(Default)]
pub struct MemoryMailer {
    sent: std::sync::Mutex<Vec<OutgoingMail>>,
    fail_with: std::sync::Mutex<Option<String>>,
    latency: Option<std::time::Duration>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: std::time::Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// All subsequent deliveries fail with this message until cleared.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for MemoryMailer {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(MailError::Transport(message));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
