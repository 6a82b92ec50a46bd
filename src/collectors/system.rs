use crate::collectors::{DiskPartition, DiskUsage, MemorySample, MetricsError, MetricsSource};
use crate::report::{NetworkStat, ProcessStat};
use std::thread;
use std::time::Duration;
use sysinfo::{
    CpuExt, DiskExt, NetworkExt, NetworksExt, PidExt, ProcessExt, System, SystemExt, UserExt,
};
use tracing::debug;

pub struct SysinfoSource {
    system: System,
    processes_fresh: bool,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_users_list();
        Self {
            system,
            processes_fresh: false,
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SysinfoSource {
    fn hostname(&mut self) -> Result<String, MetricsError> {
        self.system
            .host_name()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| MetricsError::Unavailable("hostname".to_string()))
    }

    fn sample_cpu_percent(&mut self, window: Duration) -> f64 {
        // Process CPU usage is measured over the same window.
        self.system.refresh_cpu();
        self.system.refresh_processes();
        thread::sleep(window.max(<System as SystemExt>::MINIMUM_CPU_UPDATE_INTERVAL));
        self.system.refresh_cpu();
        self.system.refresh_processes();
        self.processes_fresh = true;

        let usage = self.system.global_cpu_info().cpu_usage() as f64;
        debug!(cpu_percent = usage, window_ms = window.as_millis() as u64, "загрузка CPU измерена");
        usage.clamp(0.0, 100.0)
    }

    fn sample_memory(&mut self) -> MemorySample {
        self.system.refresh_memory();
        let total_bytes = self.system.total_memory();
        let available_bytes = self.system.available_memory();
        let percent = if total_bytes > 0 {
            (total_bytes.saturating_sub(available_bytes) as f64 / total_bytes as f64) * 100.0
        } else {
            0.0
        };
        MemorySample {
            percent,
            total_bytes,
            available_bytes,
        }
    }

    fn list_disk_partitions(&mut self) -> Vec<DiskPartition> {
        self.system.refresh_disks_list();
        self.system
            .disks()
            .iter()
            .map(|d| DiskPartition {
                mountpoint: d.mount_point().to_string_lossy().to_string(),
                filesystem_type: String::from_utf8_lossy(d.file_system()).to_string(),
            })
            .collect()
    }

    #[cfg(unix)]
    fn disk_usage(&mut self, mountpoint: &str) -> Result<DiskUsage, MetricsError> {
        use nix::errno::Errno;
        use nix::sys::statvfs::statvfs;

        let stat = statvfs(mountpoint).map_err(|errno| match errno {
            Errno::EACCES | Errno::EPERM => MetricsError::PermissionDenied(mountpoint.to_string()),
            _ => MetricsError::Unavailable(format!("{mountpoint}: {errno}")),
        })?;
        let fragment = stat.fragment_size() as u64;
        usage_from_blocks(
            stat.blocks() as u64 * fragment,
            stat.blocks_free() as u64 * fragment,
            stat.blocks_available() as u64 * fragment,
        )
        .ok_or_else(|| MetricsError::Unavailable(mountpoint.to_string()))
    }

    #[cfg(not(unix))]
    fn disk_usage(&mut self, mountpoint: &str) -> Result<DiskUsage, MetricsError> {
        let disk = self
            .system
            .disks_mut()
            .iter_mut()
            .find(|d| d.mount_point().to_string_lossy() == mountpoint)
            .ok_or_else(|| MetricsError::Unavailable(mountpoint.to_string()))?;
        disk.refresh();

        let total_bytes = disk.total_space();
        if total_bytes == 0 {
            return Err(match std::fs::metadata(mountpoint) {
                Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                    MetricsError::PermissionDenied(mountpoint.to_string())
                }
                _ => MetricsError::Unavailable(mountpoint.to_string()),
            });
        }
        let available = disk.available_space();
        usage_from_blocks(total_bytes, available, available)
            .ok_or_else(|| MetricsError::Unavailable(mountpoint.to_string()))
    }

    fn list_processes(&mut self) -> Vec<ProcessStat> {
        if !self.processes_fresh {
            self.system.refresh_processes();
        }
        self.processes_fresh = false;
        if self.system.total_memory() == 0 {
            self.system.refresh_memory();
        }
        let total_memory = self.system.total_memory();

        let mut out: Vec<ProcessStat> = self
            .system
            .processes()
            .values()
            .map(|p| ProcessStat {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                user: p
                    .user_id()
                    .and_then(|uid| self.system.get_user_by_id(uid))
                    .map(|u| u.name().to_string()),
                cpu_percent: Some(p.cpu_usage() as f64),
                memory_percent: (total_memory > 0)
                    .then(|| (p.memory() as f64 / total_memory as f64) * 100.0),
            })
            .collect();
        out.sort_by_key(|p| p.pid);
        out
    }

    fn network_counters(&mut self) -> NetworkStat {
        self.system.refresh_networks_list();
        self.system
            .networks()
            .iter()
            .fold(NetworkStat::default(), |mut acc, (_iface, data)| {
                acc.bytes_sent += data.total_transmitted();
                acc.bytes_recv += data.total_received();
                acc.packets_sent += data.total_packets_transmitted();
                acc.packets_recv += data.total_packets_received();
                acc
            })
    }
}

// Root-reserved blocks count neither as used nor as available.
fn usage_from_blocks(total_bytes: u64, free_bytes: u64, available_bytes: u64) -> Option<DiskUsage> {
    if total_bytes == 0 {
        return None;
    }
    let used_bytes = total_bytes.saturating_sub(free_bytes);
    let visible = used_bytes + available_bytes;
    let percent = if visible == 0 {
        0.0
    } else {
        (used_bytes as f64 / visible as f64) * 100.0
    };
    Some(DiskUsage {
        total_bytes,
        used_bytes,
        free_bytes: available_bytes,
        percent,
    })
}
