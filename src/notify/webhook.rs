use crate::config::WebhookAlertConfig;
use crate::notify::{Notification, Notifier, NotifyError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 512;

pub struct WebhookNotifier {
    cfg: WebhookAlertConfig,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(cfg: WebhookAlertConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("hostcheck/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.timeout())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { cfg, client }
    }
}

pub fn payload(notification: &Notification) -> serde_json::Value {
    serde_json::json!({
        "text": format!("{}\n\n{}", notification.subject, notification.body),
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &str {
        "webhook"
    }

    fn timeout(&self) -> Duration {
        self.cfg.timeout()
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.cfg.check().map_err(NotifyError::Config)?;
        let body = serde_json::to_vec(&payload(notification))?;
        let resp = self
            .client
            .post(&self.cfg.url)
            .header("Content-Type", "application/json")
            .timeout(self.cfg.timeout())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let mut text = resp.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Err(NotifyError::Status {
            status: status.as_u16(),
            body: text,
        })
    }
}
