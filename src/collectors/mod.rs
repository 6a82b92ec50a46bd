pub mod system;

use crate::report::{NetworkStat, ProcessStat};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySample {
    pub percent: f64,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskPartition {
    pub mountpoint: String,
    pub filesystem_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("нет доступа к {0}")]
    PermissionDenied(String),
    #[error("метрика недоступна: {0}")]
    Unavailable(String),
}

// Calls may block; CPU sampling sleeps for the whole window.
pub trait MetricsSource: Send {
    fn hostname(&mut self) -> Result<String, MetricsError>;

    fn sample_cpu_percent(&mut self, window: Duration) -> f64;

    fn sample_memory(&mut self) -> MemorySample;

    fn list_disk_partitions(&mut self) -> Vec<DiskPartition>;

    fn disk_usage(&mut self, mountpoint: &str) -> Result<DiskUsage, MetricsError>;

    fn list_processes(&mut self) -> Vec<ProcessStat>;

    fn network_counters(&mut self) -> NetworkStat;
}
