// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::config::SmtpConfig;
use crate::error::{ReportError, Result};
use lettre::address::Envelope;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{error, info};
use std::path::Path;
use std::time::Duration;

/// The kinds of file we know how to attach.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Image { name: String, bytes: Vec<u8> },
    Audio { name: String, bytes: Vec<u8> },
    TabularText { name: String, text: String },
}

impl Attachment {
    /// Pick the variant from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "svg" => Self::image_from_path(path),
            "mp3" | "wav" | "ogg" => Self::audio_from_path(path),
            "csv" => {
                let (name, bytes) = read_artifact(path)?;
                let text = String::from_utf8(bytes).map_err(|_| {
                    ReportError::UnsupportedAttachment(format!("{} is not UTF-8", name))
                })?;
                Ok(Self::tabular_text(name, text))
            }
            _ => Err(ReportError::UnsupportedAttachment(path.display().to_string())),
        }
    }

    pub fn image_from_path(path: &Path) -> Result<Self> {
        let (name, bytes) = read_artifact(path)?;
        Ok(Attachment::Image { name, bytes })
    }

    pub fn audio_from_path(path: &Path) -> Result<Self> {
        let (name, bytes) = read_artifact(path)?;
        Ok(Attachment::Audio { name, bytes })
    }

    pub fn tabular_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Attachment::TabularText {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Attachment::Image { name, .. }
            | Attachment::Audio { name, .. }
            | Attachment::TabularText { name, .. } => name,
        }
    }

    pub fn content_type(&self) -> &'static str {
        let extension = Path::new(self.name())
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match self {
            Attachment::Image { .. } => match extension.as_str() {
                "jpg" | "jpeg" => "image/jpeg",
                "gif" => "image/gif",
                "svg" => "image/svg+xml",
                _ => "image/png",
            },
            Attachment::Audio { .. } => match extension.as_str() {
                "wav" => "audio/wav",
                "ogg" => "audio/ogg",
                _ => "audio/mpeg",
            },
            Attachment::TabularText { .. } => "text/csv",
        }
    }

    fn to_part(&self) -> Result<SinglePart> {
        let content_type = ContentType::parse(self.content_type())
            .map_err(|e| ReportError::Compose(format!("{}: {}", self.name(), e)))?;
        let part = MimeAttachment::new(self.name().to_string());

        Ok(match self {
            Attachment::Image { bytes, .. } | Attachment::Audio { bytes, .. } => {
                part.body(bytes.clone(), content_type)
            }
            Attachment::TabularText { text, .. } => part.body(text.clone(), content_type),
        })
    }
}

fn read_artifact(path: &Path) -> Result<(String, Vec<u8>)> {
    if !path.is_file() {
        return Err(ReportError::AttachmentMissing(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok((name, bytes))
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| ReportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: Message) -> anyhow::Result<()>;
}

/// Authenticated STARTTLS submission.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, timeout: Duration) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: Message) -> anyhow::Result<()> {
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Who got the message and who did not.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<ReportError>,
}

impl DeliveryReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn none_delivered(&self) -> bool {
        self.delivered.is_empty() && !self.failed.is_empty()
    }
}

pub struct Email {
    sender: Mailbox,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    subject: String,
    body: Option<String>,
    attachments: Vec<Attachment>,
}

impl Email {
    pub fn new<S: AsRef<str>>(sender: &str, to: &[S], subject: &str) -> Result<Self> {
        if to.is_empty() {
            return Err(ReportError::MissingConfig("email recipients".to_string()));
        }

        Ok(Self {
            sender: parse_mailbox(sender)?,
            to: to
                .iter()
                .map(|a| parse_mailbox(a.as_ref()))
                .collect::<Result<_>>()?,
            cc: Vec::new(),
            subject: subject.to_string(),
            body: None,
            attachments: Vec::new(),
        })
    }

    pub fn with_cc<S: AsRef<str>>(mut self, cc: &[S]) -> Result<Self> {
        self.cc = cc
            .iter()
            .map(|a| parse_mailbox(a.as_ref()))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    pub fn add_email_text(&mut self, html: impl Into<String>) {
        self.body = Some(html.into());
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    pub fn add_image_attachment(&mut self, path: &Path) -> Result<()> {
        self.attachments.push(Attachment::image_from_path(path)?);
        Ok(())
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Distinct addresses across To and Cc.
    pub fn recipient_count(&self) -> usize {
        self.recipients().len()
    }

    /// To and Cc addresses, each once.
    fn recipients(&self) -> Vec<Address> {
        let mut recipients: Vec<Address> = Vec::new();
        for mailbox in self.to.iter().chain(&self.cc) {
            if !recipients.contains(&mailbox.email) {
                recipients.push(mailbox.email.clone());
            }
        }
        recipients
    }

    /// The full message, with an envelope addressed to `recipient` alone.
    fn compose_for(&self, recipient: &Address) -> Result<Message> {
        let envelope = Envelope::new(Some(self.sender.email.clone()), vec![recipient.clone()])
            .map_err(|e| ReportError::Compose(e.to_string()))?;

        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(self.subject.clone())
            .envelope(envelope);
        for mailbox in &self.to {
            builder = builder.to(mailbox.clone());
        }
        for mailbox in &self.cc {
            builder = builder.cc(mailbox.clone());
        }

        let mut multipart =
            MultiPart::mixed().singlepart(SinglePart::html(self.body.clone().unwrap_or_default()));
        for attachment in &self.attachments {
            multipart = multipart.singlepart(attachment.to_part()?);
        }

        builder
            .multipart(multipart)
            .map_err(|e| ReportError::Compose(e.to_string()))
    }

    /// Deliver one envelope per recipient so a rejected address cannot stop
    /// the others from receiving the message.
    pub async fn send(&self, transport: &dyn MailTransport) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for recipient in self.recipients() {
            let outcome = match self.compose_for(&recipient) {
                Ok(message) => transport.deliver(message).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(()) => report.delivered.push(recipient.to_string()),
                Err(reason) => {
                    let failure = ReportError::RecipientDeliveryFailure {
                        recipient: recipient.to_string(),
                        reason,
                    };
                    error!("{}", failure);
                    report.failed.push(failure);
                }
            }
        }

        if report.all_delivered() {
            info!("✅ Email sent successfully to all recipients");
        } else {
            error!(
                "Email failed to send to {} of {} recipients",
                report.failed.len(),
                report.failed.len() + report.delivered.len()
            );
        }

        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records every message and refuses the listed addresses.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) rejected: Vec<String>,
        pub(crate) sent: Mutex<Vec<Message>>,
    }

    #[async_trait::async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(&self, message: Message) -> anyhow::Result<()> {
            let to = message.envelope().to()[0].to_string();
            if self.rejected.contains(&to) {
                anyhow::bail!("550 mailbox unavailable");
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn email() -> Email {
        Email::new(
            "reports@example.com",
            &["ana@example.com", "ben@example.com"],
            "Euro/GBP/BRL Currency Exchange Rates",
        )
        .unwrap()
    }

    #[test]
    fn test_content_types() {
        let png = Attachment::Image {
            name: "EUR_GBP.png".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(png.content_type(), "image/png");

        let jpg = Attachment::Image {
            name: "photo.JPG".to_string(),
            bytes: vec![],
        };
        assert_eq!(jpg.content_type(), "image/jpeg");

        let wav = Attachment::Audio {
            name: "alert.wav".to_string(),
            bytes: vec![],
        };
        assert_eq!(wav.content_type(), "audio/wav");

        let csv = Attachment::tabular_text("rates.csv", "Date,BRL\n");
        assert_eq!(csv.content_type(), "text/csv");
        assert_eq!(csv.name(), "rates.csv");
    }

    #[test]
    fn test_missing_attachment() {
        let dir = tempdir().unwrap();
        let mut email = email();
        let err = email
            .add_image_attachment(&dir.path().join("EUR_GBP.png"))
            .unwrap_err();
        assert!(matches!(err, ReportError::AttachmentMissing(path) if path.ends_with("EUR_GBP.png")));
        assert!(email.attachments().is_empty());
    }

    #[test]
    fn test_image_attachment_from_disk() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("BRL.png");
        std::fs::write(&path, b"\x89PNG fake")?;

        let mut email = email();
        email.add_image_attachment(&path)?;
        assert_eq!(
            email.attachments(),
            &[Attachment::Image {
                name: "BRL.png".to_string(),
                bytes: b"\x89PNG fake".to_vec(),
            }]
        );
        Ok(())
    }

    #[test]
    fn test_audio_attachment_from_disk() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("summary.ogg");
        std::fs::write(&path, b"OggS")?;

        let audio = Attachment::audio_from_path(&path)?;
        assert_eq!(audio.name(), "summary.ogg");
        assert_eq!(audio.content_type(), "audio/ogg");

        let err = Attachment::audio_from_path(&dir.path().join("gone.mp3")).unwrap_err();
        assert!(matches!(err, ReportError::AttachmentMissing(_)));
        Ok(())
    }

    #[test]
    fn test_attachment_kind_from_extension() -> anyhow::Result<()> {
        let dir = tempdir()?;
        for (name, body) in [("EUR_GBP.PNG", "png"), ("alert.mp3", "mp3"), ("BRL.csv", "Date,BRL\n")] {
            std::fs::write(dir.path().join(name), body)?;
        }

        let image = Attachment::from_path(&dir.path().join("EUR_GBP.PNG"))?;
        assert!(matches!(image, Attachment::Image { .. }));
        let audio = Attachment::from_path(&dir.path().join("alert.mp3"))?;
        assert_eq!(audio.content_type(), "audio/mpeg");
        assert_eq!(
            Attachment::from_path(&dir.path().join("BRL.csv"))?,
            Attachment::tabular_text("BRL.csv", "Date,BRL\n")
        );

        std::fs::write(dir.path().join("notes.docx"), "x")?;
        let err = Attachment::from_path(&dir.path().join("notes.docx")).unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedAttachment(_)));
        Ok(())
    }

    #[test]
    fn test_recipient_count_ignores_repeats() {
        let email = email().with_cc(&["cat@example.com", "ana@example.com"]).unwrap();
        assert_eq!(email.recipient_count(), 3);
    }

    #[test]
    fn test_invalid_addresses() {
        let err = Email::new("not an address", &["ana@example.com"], "s").err().unwrap();
        assert!(matches!(err, ReportError::InvalidAddress { .. }));

        let err = Email::new::<&str>("reports@example.com", &[], "s").err().unwrap();
        assert!(matches!(err, ReportError::MissingConfig(_)));
    }

    #[tokio::test]
    async fn test_send_to_every_recipient() {
        let mut email = email().with_cc(&["cat@example.com", "ana@example.com"]).unwrap();
        email.add_email_text("<p>Hi</p>");
        email.add_attachment(Attachment::tabular_text("BRL.csv", "Date,BRL\n2026-10-19,3.75\n"));

        let transport = RecordingTransport::default();
        let report = email.send(&transport).await;

        assert!(report.all_delivered());
        assert_eq!(
            report.delivered,
            vec!["ana@example.com", "ben@example.com", "cat@example.com"]
        );

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        let raw = String::from_utf8_lossy(&sent[0].formatted()).into_owned();
        assert!(raw.contains("Subject: Euro/GBP/BRL Currency Exchange Rates"));
        assert!(raw.contains("BRL.csv"));
        assert!(raw.contains("text/csv"));
    }

    #[tokio::test]
    async fn test_rejected_recipient_does_not_stop_others() {
        let email = email();
        let transport = RecordingTransport {
            rejected: vec!["ana@example.com".to_string()],
            ..Default::default()
        };
        let report = email.send(&transport).await;

        assert!(!report.all_delivered());
        assert!(!report.none_delivered());
        assert_eq!(report.delivered, vec!["ben@example.com"]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            &report.failed[0],
            ReportError::RecipientDeliveryFailure { recipient, reason }
                if recipient == "ana@example.com" && reason.contains("550")
        ));
    }
}
