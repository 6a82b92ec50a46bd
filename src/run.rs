use crate::alerts::{evaluate, Alert};
use crate::collectors::{MetricsError, MetricsSource};
use crate::config::{Config, ThresholdsConfig};
use crate::notify::{ChannelOutcome, NotificationRouter};
use crate::report::{build_report, ReportSettings};
use crate::store::{ReportStore, StoreError};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Collecting,
    Persisting,
    Evaluating,
    Notifying,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Collecting => "collecting",
            RunPhase::Persisting => "persisting",
            RunPhase::Evaluating => "evaluating",
            RunPhase::Notifying => "notifying",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("не удалось собрать отчёт: {0}")]
    Collect(#[from] MetricsError),
    #[error("задача сбора метрик завершилась аварийно: {0}")]
    CollectTask(#[from] tokio::task::JoinError),
    #[error("не удалось сохранить отчёт: {0}")]
    Persist(#[from] StoreError),
}

impl RunError {
    pub fn phase(&self) -> RunPhase {
        match self {
            RunError::Collect(_) | RunError::CollectTask(_) => RunPhase::Collecting,
            RunError::Persist(_) => RunPhase::Persisting,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report_path: PathBuf,
    pub alerts: Vec<Alert>,
    pub deliveries: Vec<ChannelOutcome>,
}

impl RunSummary {
    pub fn is_healthy(&self) -> bool {
        self.alerts.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Report saved: {}", self.report_path.display())?;
        if self.alerts.is_empty() {
            return write!(f, "No alerts.");
        }
        write!(f, "Alerts:")?;
        for alert in &self.alerts {
            write!(f, "\n  - {alert}")?;
        }
        if !self.deliveries.is_empty() {
            write!(f, "\nNotifications:")?;
            for outcome in &self.deliveries {
                write!(f, "\n  {outcome}")?;
            }
        }
        Ok(())
    }
}

pub struct HealthCheck {
    source: Arc<Mutex<Box<dyn MetricsSource>>>,
    settings: ReportSettings,
    thresholds: ThresholdsConfig,
    store: ReportStore,
    router: NotificationRouter,
}

impl HealthCheck {
    pub fn new(source: Box<dyn MetricsSource>, cfg: &Config, router: NotificationRouter) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            settings: ReportSettings::from(cfg),
            thresholds: cfg.thresholds.clone(),
            store: ReportStore::new(cfg.report_dir.clone()),
            router,
        }
    }

    pub async fn run(&self) -> Result<RunSummary, RunError> {
        enter(RunPhase::Collecting);
        let source = self.source.clone();
        let settings = self.settings.clone();
        let report = tokio::task::spawn_blocking(move || {
            // Sampler state is a refresh cache; a poisoned lock is still usable.
            let mut guard = source.lock().unwrap_or_else(|poisoned| {
                warn!("источник метрик восстановлен после паники в предыдущем запуске");
                PoisonError::into_inner(poisoned)
            });
            build_report(&mut **guard, &settings, SystemTime::now()).map_err(RunError::from)
        })
        .await??;

        enter(RunPhase::Persisting);
        let report_path = self.store.save(&report)?;
        info!(path = %report_path.display(), "отчёт сохранён");

        enter(RunPhase::Evaluating);
        let alerts = evaluate(&report, &self.thresholds);
        if alerts.is_empty() {
            info!(host = %report.hostname, "превышений порогов нет");
        } else {
            info!(host = %report.hostname, alerts = alerts.len(), "обнаружены превышения порогов");
        }

        enter(RunPhase::Notifying);
        let deliveries = self.router.dispatch(&report, &alerts).await;

        enter(RunPhase::Done);
        Ok(RunSummary {
            report_path,
            alerts,
            deliveries,
        })
    }
}

fn enter(phase: RunPhase) {
    debug!(phase = %phase, "этап запуска");
}
