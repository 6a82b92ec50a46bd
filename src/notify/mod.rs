pub mod email;
pub mod webhook;

use crate::alerts::Alert;
use crate::config::Config;
use crate::report::Report;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn for_alerts(report: &Report, alerts: &[Alert]) -> Self {
        let lines = alerts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            subject: format!("[ALERT] {}", report.hostname),
            body: format!(
                "Health check alerts for {} at {}:\n\n{lines}",
                report.hostname, report.timestamp
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("канал настроен некорректно: {0}")]
    Config(String),
    #[error("некорректный адрес {address}: {source}")]
    Address {
        address: String,
        source: lettre::address::AddressError,
    },
    #[error("не удалось собрать письмо: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("ошибка SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("ошибка HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("вебхук ответил статусом {status}: {body}")]
    Status { status: u16, body: String },
    #[error("не удалось сериализовать тело запроса: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("превышено время ожидания ({0:?})")]
    Timeout(Duration),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &str;

    fn timeout(&self) -> Duration;

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: String,
    pub status: DeliveryStatus,
}

impl fmt::Display for ChannelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            DeliveryStatus::Sent => write!(f, "{}: sent", self.channel),
            DeliveryStatus::Failed(reason) => write!(f, "{}: failed ({reason})", self.channel),
        }
    }
}

pub struct NotificationRouter {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotificationRouter {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        if cfg.email_alert.enabled {
            if let Err(problem) = cfg.email_alert.check() {
                warn!(
                    channel = "email",
                    problem = %problem,
                    "канал включён, но настроен не полностью"
                );
            }
            channels.push(Box::new(EmailNotifier::new(cfg.email_alert.clone())));
        }
        if cfg.webhook_alert.enabled {
            if let Err(problem) = cfg.webhook_alert.check() {
                warn!(
                    channel = "webhook",
                    problem = %problem,
                    "канал включён, но настроен не полностью"
                );
            }
            channels.push(Box::new(WebhookNotifier::new(cfg.webhook_alert.clone())));
        }
        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel()).collect()
    }

    pub async fn dispatch(&self, report: &Report, alerts: &[Alert]) -> Vec<ChannelOutcome> {
        if alerts.is_empty() {
            return Vec::new();
        }
        let notification = Notification::for_alerts(report, alerts);

        let mut outcomes = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let limit = channel.timeout();
            let result = match tokio::time::timeout(limit, channel.send(&notification)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(NotifyError::Timeout(limit)),
            };

            let status = match result {
                Ok(()) => {
                    info!(
                        channel = channel.channel(),
                        alerts = alerts.len(),
                        "уведомление отправлено"
                    );
                    DeliveryStatus::Sent
                }
                Err(err) => {
                    warn!(
                        channel = channel.channel(),
                        error = %err,
                        "не удалось отправить уведомление"
                    );
                    DeliveryStatus::Failed(err.to_string())
                }
            };
            outcomes.push(ChannelOutcome {
                channel: channel.channel().to_string(),
                status,
            });
        }
        outcomes
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::report::{MemoryStat, NetworkStat, ServiceStatuses};
    use std::sync::{Arc, Mutex};

    pub(crate) struct RecordingNotifier {
        pub name: &'static str,
        pub received: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingNotifier {
        pub(crate) fn new(name: &'static str) -> (Self, Arc<Mutex<Vec<Notification>>>) {
            let received = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name,
                    received: received.clone(),
                },
                received,
            )
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn channel(&self) -> &str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.received.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    pub(crate) struct FailingNotifier {
        pub name: &'static str,
        pub attempts: Arc<Mutex<u32>>,
    }

    impl FailingNotifier {
        pub(crate) fn new(name: &'static str) -> (Self, Arc<Mutex<u32>>) {
            let attempts = Arc::new(Mutex::new(0));
            (
                Self {
                    name,
                    attempts: attempts.clone(),
                },
                attempts,
            )
        }
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        fn channel(&self) -> &str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            *self.attempts.lock().unwrap() += 1;
            Err(NotifyError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    struct HangingNotifier;

    #[async_trait]
    impl Notifier for HangingNotifier {
        fn channel(&self) -> &str {
            "hanging"
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    pub(crate) fn sample_report() -> Report {
        Report {
            timestamp: "2024-05-01T10:00:00Z".to_string(),
            hostname: "web-01".to_string(),
            cpu_percent: 97.0,
            memory: MemoryStat {
                percent: 10.0,
                total_bytes: 100,
                available_bytes: 90,
            },
            disk: Vec::new(),
            top_processes: Vec::new(),
            network: NetworkStat::default(),
            services: ServiceStatuses::default(),
        }
    }

    fn cpu_alert() -> Vec<Alert> {
        vec![Alert::Cpu { percent: 97.0 }]
    }

    #[test]
    fn notification_subject_and_body() {
        let alerts = vec![
            Alert::Cpu { percent: 97.0 },
            Alert::StoppedServices(vec!["nginx".to_string()]),
        ];
        let n = Notification::for_alerts(&sample_report(), &alerts);
        assert_eq!(n.subject, "[ALERT] web-01");
        assert_eq!(
            n.body,
            "Health check alerts for web-01 at 2024-05-01T10:00:00Z:\n\nCPU usage high: 97%\nStopped services: nginx"
        );
    }

    #[tokio::test]
    async fn empty_alerts_touch_no_channel() {
        let (recording, received) = RecordingNotifier::new("webhook");
        let (failing, attempts) = FailingNotifier::new("email");
        let router = NotificationRouter::new(vec![Box::new(failing), Box::new(recording)]);

        let outcomes = router.dispatch(&sample_report(), &[]).await;

        assert!(outcomes.is_empty());
        assert!(received.lock().unwrap().is_empty());
        assert_eq!(*attempts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_the_next() {
        let (failing, attempts) = FailingNotifier::new("email");
        let (recording, received) = RecordingNotifier::new("webhook");
        let router = NotificationRouter::new(vec![Box::new(failing), Box::new(recording)]);

        let outcomes = router.dispatch(&sample_report(), &cpu_alert()).await;

        assert_eq!(*attempts.lock().unwrap(), 1, "ровно одна попытка без повторов");
        assert_eq!(received.lock().unwrap().len(), 1);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].channel, "email");
        assert!(matches!(outcomes[0].status, DeliveryStatus::Failed(_)));
        assert_eq!(outcomes[1].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn hanging_channel_times_out() {
        let (recording, received) = RecordingNotifier::new("webhook");
        let router = NotificationRouter::new(vec![Box::new(HangingNotifier), Box::new(recording)]);

        let outcomes = router.dispatch(&sample_report(), &cpu_alert()).await;

        assert!(matches!(
            &outcomes[0].status,
            DeliveryStatus::Failed(reason) if reason.contains("время ожидания")
        ));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn from_config_keeps_only_enabled_channels() {
        let mut cfg = Config::default();
        assert!(NotificationRouter::from_config(&cfg).channel_names().is_empty());

        cfg.webhook_alert.enabled = true;
        cfg.webhook_alert.url = "http://127.0.0.1:1/hook".to_string();
        assert_eq!(NotificationRouter::from_config(&cfg).channel_names(), vec!["webhook"]);

        cfg.email_alert.enabled = true;
        assert_eq!(
            NotificationRouter::from_config(&cfg).channel_names(),
            vec!["email", "webhook"]
        );
    }
}
