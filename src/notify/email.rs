use crate::config::EmailAlertConfig;
use crate::notify::{Notification, Notifier, NotifyError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

pub struct EmailNotifier {
    cfg: EmailAlertConfig,
}

impl EmailNotifier {
    pub fn new(cfg: EmailAlertConfig) -> Self {
        Self { cfg }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let mut builder = if self.cfg.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.cfg.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.cfg.smtp_server)
        };
        builder = builder
            .port(self.cfg.smtp_port)
            .timeout(Some(self.cfg.timeout()));

        let user = self.cfg.smtp_user.as_deref();
        if let (Some(user), Some(pass)) = (user, self.cfg.resolve_password()) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass));
        }
        Ok(builder.build())
    }
}

pub fn build_message(
    cfg: &EmailAlertConfig,
    notification: &Notification,
) -> Result<Message, NotifyError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&cfg.from)?)
        .subject(notification.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    for recipient in &cfg.to {
        builder = builder.to(parse_mailbox(recipient)?);
    }
    Ok(builder.body(notification.body.clone())?)
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &str {
        "email"
    }

    fn timeout(&self) -> Duration {
        self.cfg.timeout()
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.cfg.check().map_err(NotifyError::Config)?;
        let message = build_message(&self.cfg, notification)?;
        let transport = self.transport()?;
        let response = transport.send(message).await?;
        debug!(
            server = %self.cfg.smtp_server,
            port = self.cfg.smtp_port,
            code = %response.code(),
            recipients = self.cfg.to.len(),
            "SMTP-сервер принял письмо"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn cfg() -> EmailAlertConfig {
        EmailAlertConfig {
            enabled: true,
            smtp_server: "127.0.0.1".to_string(),
            from: "monitor@example.com".to_string(),
            to: vec!["ops@example.com".to_string(), "oncall@example.com".to_string()],
            starttls: false,
            timeout_secs: 2,
            ..EmailAlertConfig::default()
        }
    }

    fn notification() -> Notification {
        Notification {
            subject: "[ALERT] web-01".to_string(),
            body: "Health check alerts for web-01 at 2024-05-01T10:00:00Z:\n\nCPU usage high: 97%".to_string(),
        }
    }

    #[test]
    fn message_carries_headers_and_all_recipients() {
        let message = build_message(&cfg(), &notification()).expect("письмо собрано");
        let text = String::from_utf8(message.formatted()).expect("utf-8");

        assert!(text.contains("Subject: [ALERT] web-01"), "{text}");
        assert!(text.contains("From: monitor@example.com"), "{text}");
        assert!(text.contains("To: ops@example.com, oncall@example.com"), "{text}");
        assert!(text.contains("text/plain"), "{text}");
        assert!(text.contains("CPU usage high: 97%"), "{text}");
        assert_eq!(message.envelope().to().len(), 2);
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let mut cfg = cfg();
        cfg.to.push("not-an-address".to_string());
        let err = build_message(&cfg, &notification()).unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Address { ref address, .. } if address == "not-an-address"
        ));
    }

    #[tokio::test]
    async fn missing_server_fails_without_connecting() {
        let mut cfg = cfg();
        cfg.smtp_server = String::new();

        let err = EmailNotifier::new(cfg).send(&notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Config(ref problem) if problem.contains("smtp_server")));
    }

    #[tokio::test]
    async fn unreachable_server_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cfg = cfg();
        cfg.smtp_port = port;
        let notifier = EmailNotifier::new(cfg);

        let err = notifier.send(&notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Smtp(_)), "{err}");
    }
}
