use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment as MailAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::templates::EmailTemplate;
use crate::{Alert, NotificationChannel, NotificationConfig, NotificationError, SmtpTls};

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SMTP_HOST not set".into()))?;
        let from_addr = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SMTP_FROM_ADDRESS not set".into()))?;

        let from: Mailbox = from_addr
            .parse()
            .map_err(|e| NotificationError::Config(format!("Invalid from address: {}", e)))?;

        let to: Vec<Mailbox> = config
            .smtp_to
            .iter()
            .filter_map(|addr| addr.parse().ok())
            .collect();

        if to.is_empty() {
            return Err(NotificationError::Config(
                "No valid NOTIFICATION_EMAIL_TO addresses".into(),
            ));
        }

        let mut builder = match config.smtp_tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                host,
            )),
        }
        .map_err(|e| NotificationError::Smtp(format!("SMTP transport error: {}", e)))?;

        builder = builder.port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    /// Plain-text message, multipart with the alert's files when it has any.
    fn build_message(
        &self,
        recipient: &Mailbox,
        alert: &Alert,
    ) -> Result<Message, NotificationError> {
        let text = EmailTemplate::render(alert);
        let builder = Message::builder()
            .from(self.from.clone())
            .to(recipient.clone())
            .subject(&alert.title);

        let message = if alert.attachments.is_empty() {
            builder.header(ContentType::TEXT_PLAIN).body(text)
        } else {
            let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(text));
            for attachment in &alert.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    NotificationError::Attachment(format!("{}: {}", attachment.file_name, e))
                })?;
                parts = parts.singlepart(
                    MailAttachment::new(attachment.file_name.clone())
                        .body(attachment.bytes.clone(), content_type),
                );
            }
            builder.multipart(parts)
        };

        message.map_err(|e| NotificationError::Smtp(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        for recipient in &self.to {
            let email = self.build_message(recipient, alert)?;

            self.transport
                .send(email)
                .await
                .map_err(|e| NotificationError::Smtp(format!("Failed to send email: {}", e)))?;
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::report;
    use crate::Attachment;

    fn config() -> NotificationConfig {
        NotificationConfig {
            smtp_host: Some("localhost".into()),
            smtp_port: 2525,
            smtp_from: Some("scanner@example.com".into()),
            smtp_to: vec!["trader@example.com".into()],
            smtp_tls: SmtpTls::None,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_settings_are_config_errors() {
        let no_host = NotificationConfig {
            smtp_host: None,
            ..config()
        };
        assert!(matches!(SmtpNotifier::new(&no_host), Err(NotificationError::Config(_))));

        let bad_recipients = NotificationConfig {
            smtp_to: vec!["not an address".into()],
            ..config()
        };
        assert!(matches!(SmtpNotifier::new(&bad_recipients), Err(NotificationError::Config(_))));
    }

    #[tokio::test]
    async fn test_message_carries_subject_and_attachments() {
        let notifier = SmtpNotifier::new(&config()).unwrap();
        let alert = Alert::scan_completed(&report())
            .with_attachment(Attachment::csv(
                "superstocks.csv",
                b"Ticker,Precio,Base %,Vol_Multi\n".to_vec(),
            ));

        let message = notifier.build_message(&notifier.to[0], &alert).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Superstock scan: 2 superstocks, 1 watchlist"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("superstocks.csv"));
        assert!(raw.contains("AAA,BBB"));
    }

    #[tokio::test]
    async fn test_message_without_attachments_is_plain_text() {
        let notifier = SmtpNotifier::new(&config()).unwrap();
        let message = notifier
            .build_message(&notifier.to[0], &Alert::scan_failed("disk full"))
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Content-Type: text/plain"));
        assert!(!raw.contains("multipart"));
    }
}
