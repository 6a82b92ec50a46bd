use crate::config::ThresholdsConfig;
use crate::report::{Report, ServiceStatus};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Cpu { percent: f64 },
    Memory { percent: f64 },
    Disk { mountpoint: String, percent: f64 },
    StoppedServices(Vec<String>),
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::Cpu { percent } => write!(f, "CPU usage high: {percent}%"),
            Alert::Memory { percent } => write!(f, "Memory usage high: {percent}%"),
            Alert::Disk {
                mountpoint,
                percent,
            } => write!(f, "Disk {mountpoint} usage high: {percent}%"),
            Alert::StoppedServices(names) => write!(f, "Stopped services: {}", names.join(", ")),
        }
    }
}

pub fn evaluate(report: &Report, thresholds: &ThresholdsConfig) -> Vec<Alert> {
    let mut out = Vec::new();

    if report.cpu_percent >= thresholds.cpu_percent {
        out.push(Alert::Cpu {
            percent: report.cpu_percent,
        });
    }

    if report.memory.percent >= thresholds.memory_percent {
        out.push(Alert::Memory {
            percent: report.memory.percent,
        });
    }

    for d in &report.disk {
        if d.percent >= thresholds.disk_percent {
            out.push(Alert::Disk {
                mountpoint: d.mountpoint.clone(),
                percent: d.percent,
            });
        }
    }

    let stopped: Vec<String> = report
        .services
        .iter()
        .filter(|(_, status)| *status != ServiceStatus::Running)
        .map(|(name, _)| name.to_string())
        .collect();
    if !stopped.is_empty() {
        out.push(Alert::StoppedServices(stopped));
    }

    out
}
