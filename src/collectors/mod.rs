pub mod system;

use crate::config::Config;
use crate::state::{CpuTimes, CpuUsageTracker, DiskStat, MemoryStat, MetricsSnapshot, NetStat};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Host `/proc` as mounted into the agent container.
pub const DEFAULT_PROC_ROOT: &str = "/host_proc";

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("не удалось прочитать {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("statvfs для {path} завершился ошибкой: {source}")]
    Statvfs {
        path: String,
        source: nix::errno::Errno,
    },
}

#[derive(Debug, Clone)]
pub struct Sampler {
    meminfo: PathBuf,
    stat: PathBuf,
    net_dev: PathBuf,
    disk_path: PathBuf,
}

impl Sampler {
    pub fn new(proc_root: impl AsRef<Path>, disk_path: impl Into<PathBuf>) -> Self {
        let proc_root = proc_root.as_ref();
        Self {
            meminfo: proc_root.join("meminfo"),
            stat: proc_root.join("stat"),
            net_dev: proc_root.join("net").join("dev"),
            disk_path: disk_path.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(DEFAULT_PROC_ROOT, &cfg.disk_path)
    }

    pub fn read_memory(&self) -> Result<MemoryStat, CollectError> {
        system::read_memory(&self.meminfo)
    }

    pub fn read_cpu_times(&self) -> Result<CpuTimes, CollectError> {
        system::read_cpu_times(&self.stat)
    }

    pub fn read_disk(&self) -> Result<DiskStat, CollectError> {
        system::read_disk(&self.disk_path)
    }

    pub fn read_network_counters(&self) -> Result<NetStat, CollectError> {
        system::read_network_counters(&self.net_dev)
    }

    /// CPU first so the tick baseline advances even if a later read fails.
    pub fn collect(&self, cpu: &mut CpuUsageTracker) -> Result<MetricsSnapshot, CollectError> {
        let cpu_usage_percent = cpu.update(self.read_cpu_times()?);
        let memory = self.read_memory()?;
        let disk = self.read_disk()?;
        let net = self.read_network_counters()?;

        Ok(MetricsSnapshot {
            cpu_usage_percent,
            memory,
            disk,
            net,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MEMINFO: &str = "\
MemTotal:        1000000 kB
MemFree:          300000 kB
MemAvailable:     400000 kB
Buffers:           20000 kB
Cached:           100000 kB
SwapCached:            0 kB
SwapTotal:        200000 kB
SwapFree:          50000 kB
";

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 10485760     100    0    0    0     0          0         0 10485760     100    0    0    0     0       0          0
  eth0: 5242880      50    0    0    0     0          0         0  3145728      30    0    0    0     0       0          0
";

    fn fake_proc(stat: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        fs::write(dir.path().join("stat"), stat).unwrap();
        fs::create_dir(dir.path().join("net")).unwrap();
        fs::write(dir.path().join("net").join("dev"), NET_DEV).unwrap();
        dir
    }

    #[test]
    fn collect_builds_full_snapshot() {
        let proc_dir = fake_proc("cpu  2000 0 1000 6000 1000 0 0 0\n");
        let sampler = Sampler::new(proc_dir.path(), proc_dir.path());
        let mut cpu = CpuUsageTracker::new(CpuTimes {
            total: 9_000,
            idle: 6_750,
        });

        let snapshot = sampler.collect(&mut cpu).unwrap();

        // 1000 ticks elapsed, 250 of them idle.
        assert_eq!(snapshot.cpu_usage_percent, Some(75.0));

        let mem = &snapshot.memory;
        assert_eq!(mem.ram_total_mb, Some(977));
        assert_eq!(mem.ram_available_mb, Some(391));
        assert_eq!(mem.ram_used_mb, Some(586));
        assert_eq!(mem.ram_free_mb, Some(293));
        assert_eq!(mem.ram_cache_mb, Some(98));
        assert_eq!(mem.ram_usage_percent, Some(60.0));
        assert_eq!(mem.swap_total_mb, Some(195));
        assert_eq!(mem.swap_free_mb, Some(49));
        assert_eq!(mem.swap_used_mb, Some(146));
        assert_eq!(mem.swap_usage_percent, Some(74.9));

        assert_eq!(snapshot.net, NetStat { rx_mb: 5, tx_mb: 3 });
        assert!(snapshot.disk.total_gb >= snapshot.disk.used_gb);
    }

    #[test]
    fn failed_read_aborts_collection_but_keeps_cpu_baseline() {
        let proc_dir = fake_proc("cpu  10 0 10 80 0 0 0 0\n");
        fs::remove_file(proc_dir.path().join("meminfo")).unwrap();
        let sampler = Sampler::new(proc_dir.path(), proc_dir.path());
        let mut cpu = CpuUsageTracker::new(CpuTimes::default());

        let err = sampler.collect(&mut cpu).unwrap_err();
        assert!(matches!(err, CollectError::Read { .. }));
        assert_eq!(cpu.baseline(), CpuTimes { total: 100, idle: 80 });
    }

    #[test]
    fn missing_disk_path_is_statvfs_error() {
        let proc_dir = fake_proc("cpu  1 1 1 1\n");
        let sampler = Sampler::new(proc_dir.path(), proc_dir.path().join("no-such-mount"));
        let mut cpu = CpuUsageTracker::new(CpuTimes::default());

        let err = sampler.collect(&mut cpu).unwrap_err();
        assert!(matches!(err, CollectError::Statvfs { .. }));
    }
}
