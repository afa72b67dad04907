use crate::collectors::CollectError;
use crate::state::{round_to, usage_percent, CpuTimes, DiskStat, MemoryStat, NetStat};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const BYTES_PER_MB: u64 = 1024 * 1024;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const NET_DEV_HEADER_LINES: usize = 2;
const NET_DEV_MIN_FIELDS: usize = 17;
const LOOPBACK_IFACE: &str = "lo";

pub fn read_memory(path: &Path) -> Result<MemoryStat, CollectError> {
    let text = read_pseudo_file(path)?;
    Ok(parse_meminfo(&text))
}

pub fn read_cpu_times(path: &Path) -> Result<CpuTimes, CollectError> {
    let text = read_pseudo_file(path)?;
    parse_cpu_times(&text).map_err(|reason| CollectError::Parse {
        path: path.display().to_string(),
        reason,
    })
}

pub fn read_network_counters(path: &Path) -> Result<NetStat, CollectError> {
    let text = read_pseudo_file(path)?;
    Ok(parse_net_dev(&text))
}

pub fn read_disk(path: &Path) -> Result<DiskStat, CollectError> {
    let st = nix::sys::statvfs::statvfs(path).map_err(|source| CollectError::Statvfs {
        path: path.display().to_string(),
        source,
    })?;
    Ok(disk_usage_from_blocks(
        st.fragment_size() as u64,
        st.blocks() as u64,
        st.blocks_free() as u64,
    ))
}

fn read_pseudo_file(path: &Path) -> Result<String, CollectError> {
    fs::read_to_string(path).map_err(|source| CollectError::Read {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_meminfo(text: &str) -> MemoryStat {
    let kv: HashMap<&str, u64> = text
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next()?.trim_end_matches(':');
            let value = parts.next()?.parse::<u64>().ok()?;
            Some((key, value))
        })
        .collect();
    let mb = |key: &str| kv.get(key).copied().map(kb_to_mb);

    let ram_total_mb = mb("MemTotal");
    let ram_free_mb = mb("MemFree");
    let ram_available_mb = mb("MemAvailable");
    let ram_cache_mb = mb("Cached");
    let ram_used_mb = match (ram_total_mb, ram_available_mb) {
        (Some(total), Some(available)) => Some(total.saturating_sub(available)),
        _ => None,
    };

    let swap_total_mb = mb("SwapTotal");
    let swap_free_mb = mb("SwapFree");
    let swap_used_mb = match (swap_total_mb, swap_free_mb) {
        (Some(total), Some(free)) => Some(total.saturating_sub(free)),
        _ => None,
    };

    MemoryStat {
        ram_total_mb,
        ram_used_mb,
        ram_free_mb,
        ram_available_mb,
        ram_cache_mb,
        ram_usage_percent: usage_percent(ram_used_mb, ram_total_mb),
        swap_total_mb,
        swap_used_mb,
        swap_free_mb,
        swap_usage_percent: usage_percent(swap_used_mb, swap_total_mb),
    }
}

/// Aggregate `cpu` line of `/proc/stat`:
/// `user nice system idle iowait irq softirq steal [guest guest_nice]`.
pub fn parse_cpu_times(text: &str) -> Result<CpuTimes, String> {
    let line = text.lines().next().ok_or("файл пуст")?;
    let mut fields = line.split_whitespace();
    match fields.next() {
        Some(label) if label.starts_with("cpu") => {}
        _ => return Err(format!("первая строка не является строкой cpu: '{line}'")),
    }

    let mut ticks = [0_u64; 8];
    for (slot, raw) in ticks.iter_mut().zip(fields) {
        *slot = raw
            .parse()
            .map_err(|_| format!("некорректный счётчик тиков '{raw}'"))?;
    }
    let [user, nice, system, idle, iowait, irq, softirq, steal] = ticks;

    let overflow = || "сумма тиков CPU не помещается в u64".to_string();
    let idle_all = idle.checked_add(iowait).ok_or_else(overflow)?;
    let total = [user, nice, system, irq, softirq, steal]
        .into_iter()
        .try_fold(idle_all, u64::checked_add)
        .ok_or_else(overflow)?;
    Ok(CpuTimes {
        total,
        idle: idle_all,
    })
}

pub fn parse_net_dev(text: &str) -> NetStat {
    let mut rx_bytes = 0_u64;
    let mut tx_bytes = 0_u64;

    for line in text.lines().skip(NET_DEV_HEADER_LINES) {
        let normalized = line.replace(':', " ");
        let parts: Vec<&str> = normalized.split_whitespace().collect();
        if parts.len() < NET_DEV_MIN_FIELDS {
            continue;
        }
        if parts[0] == LOOPBACK_IFACE {
            continue;
        }
        let (Ok(rx), Ok(tx)) = (parts[1].parse::<u64>(), parts[9].parse::<u64>()) else {
            debug!(iface = parts[0], "пропущена строка net/dev с некорректными счётчиками");
            continue;
        };
        rx_bytes = rx_bytes.saturating_add(rx);
        tx_bytes = tx_bytes.saturating_add(tx);
    }

    NetStat {
        rx_mb: rx_bytes / BYTES_PER_MB,
        tx_mb: tx_bytes / BYTES_PER_MB,
    }
}

pub fn disk_usage_from_blocks(fragment_size: u64, blocks: u64, blocks_free: u64) -> DiskStat {
    let total_gb = (fragment_size as f64 * blocks as f64) / BYTES_PER_GB;
    let free_gb = (fragment_size as f64 * blocks_free as f64) / BYTES_PER_GB;
    let used_gb = total_gb - free_gb;
    let usage_percent = if total_gb > 0.0 {
        Some(round_to(used_gb / total_gb * 100.0, 1))
    } else {
        None
    };

    DiskStat {
        total_gb: round_to(total_gb, 6),
        used_gb: round_to(used_gb, 6),
        usage_percent,
    }
}

fn kb_to_mb(kb: u64) -> u64 {
    (kb as f64 / 1024.0).round_ties_even() as u64
}
