use crate::error::AlerterError;
use configuration::EmailConfig;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reporter::EmailDocument;

pub mod error;

/// Implicit-TLS SMTP port. Any other port upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

/// How many recipients a send reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends report and notification emails over authenticated SMTP.
pub struct EmailSender {
    sender: String,
    password: String,
    smtp_server: String,
    smtp_port: u16,
    recipients: Vec<String>,
}

impl EmailSender {
    /// Creates a new `EmailSender`.
    ///
    /// Returns `None` if the sender, password or SMTP server is missing from the
    /// configuration, allowing the system to run without email.
    pub fn new(config: &EmailConfig) -> Option<Self> {
        if !config.is_configured() {
            tracing::warn!("Email sender is not configured (missing sender, password or SMTP server).");
            return None;
        }
        if config.recipients.is_empty() {
            tracing::warn!("Email sender has no recipients; reports will not be delivered.");
        }
        Some(Self {
            sender: config.sender.clone(),
            password: config.password.clone(),
            smtp_server: config.smtp_server.clone(),
            smtp_port: config.smtp_port,
            recipients: config.recipients.clone(),
        })
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, AlerterError> {
        let builder = if self.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp_server)?
        };
        Ok(builder
            .port(self.smtp_port)
            .credentials(Credentials::new(self.sender.clone(), self.password.clone()))
            .build())
    }

    /// Opens and authenticates an SMTP session without sending anything.
    pub async fn test_connection(&self) -> Result<bool, AlerterError> {
        let ok = self.transport()?.test_connection().await?;
        tracing::info!(server = %self.smtp_server, port = self.smtp_port, ok, "SMTP connection test finished.");
        Ok(ok)
    }

    /// Sends the report to every recipient, one message each, with charts inline.
    pub async fn send_report(&self, document: &EmailDocument) -> Result<DeliverySummary, AlerterError> {
        let from: Mailbox = self.sender.parse()?;
        let body = related_body(document)?;
        self.deliver(&document.subject, |to| {
            Message::builder()
                .from(from.clone())
                .to(to)
                .subject(document.subject.clone())
                .multipart(body.clone())
        })
        .await
    }

    /// Sends a plain-text message, used for failure notifications.
    pub async fn send_plain(&self, subject: &str, text: &str) -> Result<DeliverySummary, AlerterError> {
        let from: Mailbox = self.sender.parse()?;
        self.deliver(subject, |to| {
            Message::builder()
                .from(from.clone())
                .to(to)
                .subject(subject)
                .header(ContentType::TEXT_PLAIN)
                .body(text.to_string())
        })
        .await
    }

    async fn deliver<F>(&self, subject: &str, build: F) -> Result<DeliverySummary, AlerterError>
    where
        F: Fn(Mailbox) -> Result<Message, lettre::error::Error>,
    {
        if self.recipients.is_empty() {
            return Err(AlerterError::NoRecipients);
        }
        let transport = self.transport()?;

        let mut summary = DeliverySummary { delivered: 0, failed: 0 };
        for recipient in &self.recipients {
            let result = async {
                let to: Mailbox = recipient.parse()?;
                let message = build(to)?;
                transport.send(message).await?;
                Ok::<(), AlerterError>(())
            }
            .await;

            match result {
                Ok(()) => {
                    summary.delivered += 1;
                    tracing::info!(recipient = %recipient, subject, "Email sent.");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(recipient = %recipient, error = %e, "Failed to send email.");
                }
            }
        }

        if summary.delivered == 0 {
            return Err(AlerterError::AllFailed(summary.failed));
        }
        Ok(summary)
    }
}

/// HTML body plus each chart as an inline part whose Content-ID matches its `cid:` reference.
fn related_body(document: &EmailDocument) -> Result<MultiPart, AlerterError> {
    let mut body = MultiPart::related().singlepart(SinglePart::html(document.html.clone()));
    for image in &document.images {
        let path = image.path.display().to_string();
        let bytes = std::fs::read(&image.path).map_err(|e| AlerterError::Attachment(path.clone(), e.to_string()))?;
        let content_type =
            ContentType::parse(image.content_type).map_err(|e| AlerterError::Attachment(path.clone(), e.to_string()))?;
        body = body.singlepart(Attachment::new_inline(image.cid.clone()).body(bytes, content_type));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reporter::{InlineImage, Section, compose_email};
    use std::path::PathBuf;

    fn configured() -> EmailConfig {
        EmailConfig {
            sender: "bot@example.com".to_string(),
            password: "secret".to_string(),
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 465,
            recipients: vec!["reader@example.com".to_string()],
            recipients_file: None,
        }
    }

    #[test]
    fn unconfigured_sender_is_disabled() {
        assert!(EmailSender::new(&EmailConfig::default()).is_none());
        assert!(EmailSender::new(&configured()).is_some());
    }

    #[test]
    fn report_body_embeds_charts_by_content_id() {
        let dir = tempfile::tempdir().unwrap();
        let chart = dir.path().join("chart.svg");
        std::fs::write(&chart, "<svg></svg>").unwrap();

        let doc = compose_email(
            "Report",
            chrono::NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            &[Section::new("Gold", "<p>gold</p>".to_string(), vec![chart])],
        );
        let message = Message::builder()
            .from("bot@example.com".parse().unwrap())
            .to("reader@example.com".parse().unwrap())
            .subject(doc.subject.clone())
            .multipart(related_body(&doc).unwrap())
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("multipart/related"));
        assert!(raw.contains("Content-ID: <image_0>"));
        assert!(raw.contains("image/svg+xml"));
    }

    #[test]
    fn missing_chart_is_an_attachment_error() {
        let doc = EmailDocument {
            subject: "s".to_string(),
            html: String::new(),
            images: vec![InlineImage {
                cid: "image_0".to_string(),
                path: PathBuf::from("/nonexistent/chart.svg"),
                content_type: "image/svg+xml",
            }],
        };
        assert!(matches!(related_body(&doc), Err(AlerterError::Attachment(..))));
    }

    #[tokio::test]
    async fn sending_without_recipients_fails_fast() {
        let mut cfg = configured();
        cfg.recipients.clear();
        let sender = EmailSender::new(&cfg).unwrap();
        assert!(matches!(sender.send_plain("s", "b").await, Err(AlerterError::NoRecipients)));
    }
}
