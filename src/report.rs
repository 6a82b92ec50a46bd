use crate::collectors::{MetricsError, MetricsSource};
use crate::config::Config;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

// Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub timestamp: String,
    pub hostname: String,
    pub cpu_percent: f64,
    pub memory: MemoryStat,
    pub disk: Vec<DiskStat>,
    pub top_processes: Vec<ProcessStat>,
    pub network: NetworkStat,
    pub services: ServiceStatuses,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStat {
    pub percent: f64,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskStat {
    pub mountpoint: String,
    pub filesystem_type: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStat {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkStat {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceStatuses(Vec<(String, ServiceStatus)>);

impl ServiceStatuses {
    pub fn iter(&self) -> impl Iterator<Item = (&str, ServiceStatus)> {
        self.0.iter().map(|(name, status)| (name.as_str(), *status))
    }
}

impl FromIterator<(String, ServiceStatus)> for ServiceStatuses {
    fn from_iter<I: IntoIterator<Item = (String, ServiceStatus)>>(iter: I) -> Self {
        let mut out: Vec<(String, ServiceStatus)> = Vec::new();
        for (name, status) in iter {
            if !out.iter().any(|(existing, _)| *existing == name) {
                out.push((name, status));
            }
        }
        Self(out)
    }
}

impl Serialize for ServiceStatuses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, status) in &self.0 {
            map.serialize_entry(name, status)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub cpu_window: Duration,
    pub top_process_count: usize,
    pub services_to_check: Vec<String>,
}

impl From<&Config> for ReportSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            cpu_window: cfg.sampling.cpu_window(),
            top_process_count: cfg.thresholds.top_process_count,
            services_to_check: cfg.services_to_check.clone(),
        }
    }
}

pub fn build_report(
    source: &mut dyn MetricsSource,
    settings: &ReportSettings,
    collected_at: SystemTime,
) -> Result<Report, MetricsError> {
    let timestamp = humantime::format_rfc3339_seconds(collected_at).to_string();
    let hostname = source.hostname()?;
    let cpu_percent = round1(source.sample_cpu_percent(settings.cpu_window));

    let mem = source.sample_memory();
    let memory = MemoryStat {
        percent: round1(mem.percent),
        total_bytes: mem.total_bytes,
        available_bytes: mem.available_bytes,
    };

    let disk = collect_disks(source);

    let processes = source.list_processes();
    let services = service_statuses(&processes, &settings.services_to_check);
    let top_processes = top_processes(processes, settings.top_process_count);

    let network = source.network_counters();

    Ok(Report {
        timestamp,
        hostname,
        cpu_percent,
        memory,
        disk,
        top_processes,
        network,
        services,
    })
}

fn collect_disks(source: &mut dyn MetricsSource) -> Vec<DiskStat> {
    let partitions = source.list_disk_partitions();
    let mut out = Vec::with_capacity(partitions.len());
    for part in partitions {
        match source.disk_usage(&part.mountpoint) {
            Ok(usage) => out.push(DiskStat {
                mountpoint: part.mountpoint,
                filesystem_type: part.filesystem_type,
                total_bytes: usage.total_bytes,
                used_bytes: usage.used_bytes,
                free_bytes: usage.free_bytes,
                percent: round1(usage.percent),
            }),
            Err(MetricsError::PermissionDenied(_)) => {
                debug!(mountpoint = %part.mountpoint, "нет доступа к разделу, пропускаем");
            }
            Err(err) => {
                warn!(
                    mountpoint = %part.mountpoint,
                    error = %err,
                    "не удалось получить заполненность раздела"
                );
            }
        }
    }
    out
}

// Stable, so ties keep PID order.
pub fn top_processes(mut processes: Vec<ProcessStat>, count: usize) -> Vec<ProcessStat> {
    let load = |p: &ProcessStat| p.cpu_percent.unwrap_or(0.0) + p.memory_percent.unwrap_or(0.0);
    processes.sort_by(|a, b| load(b).total_cmp(&load(a)));
    processes.truncate(count);
    processes
}

pub fn service_statuses(processes: &[ProcessStat], tokens: &[String]) -> ServiceStatuses {
    let names: Vec<String> = processes.iter().map(|p| p.name.to_lowercase()).collect();
    tokens
        .iter()
        .map(|token| {
            let token = token.to_lowercase();
            let running = names.iter().any(|name| name.contains(&token));
            let status = if running {
                ServiceStatus::Running
            } else {
                ServiceStatus::Stopped
            };
            (token, status)
        })
        .collect()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
