use crate::data::MemoryInfo;
use std::collections::BTreeMap;

/// Parses `/proc/meminfo`. Values are converted from kB to bytes.
pub fn parse_meminfo(text: &str) -> MemoryInfo {
    let fields: BTreeMap<&str, u64> = text
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some((name.trim(), value * 1024))
        })
        .collect();
    let get = |name: &str| fields.get(name).copied().unwrap_or_default();
    MemoryInfo {
        total: get("MemTotal"),
        free: get("MemFree"),
        available: get("MemAvailable"),
        buffers: get("Buffers"),
        cached: get("Cached"),
        shared: get("Shmem"),
        active: get("Active"),
        inactive: get("Inactive"),
        dirty: get("Dirty"),
        swap_total: get("SwapTotal"),
        swap_free: get("SwapFree"),
        swap_cached: get("SwapCached"),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
}

impl CpuTimes {
    /// Guest time is already accounted in user time.
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq + self.steal
    }
}

/// Aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_times(text: &str) -> Option<CpuTimes> {
    let line = text.lines().find(|line| line.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|value| value.parse().ok())
        .collect();
    let get = |index: usize| values.get(index).copied().unwrap_or_default();
    Some(CpuTimes {
        user: get(0),
        nice: get(1),
        system: get(2),
        idle: get(3),
        iowait: get(4),
        irq: get(5),
        softirq: get(6),
        steal: get(7),
        guest: get(8),
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
}

pub fn parse_net_dev(text: &str) -> BTreeMap<String, NetCounters> {
    text.lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let values: Vec<u64> = rest.split_whitespace().filter_map(|value| value.parse().ok()).collect();
            if values.len() < 12 {
                return None;
            }
            Some((
                name.trim().to_string(),
                NetCounters {
                    rx_bytes: values[0],
                    rx_packets: values[1],
                    rx_errs: values[2],
                    rx_drop: values[3],
                    tx_bytes: values[8],
                    tx_packets: values[9],
                    tx_errs: values[10],
                    tx_drop: values[11],
                },
            ))
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiskCounters {
    pub reads: u64,
    pub sectors_read: u64,
    pub writes: u64,
    pub sectors_written: u64,
    pub io_ticks_ms: u64,
}

/// Whole disks and partitions from `/proc/diskstats`, without loop and ram devices.
pub fn parse_diskstats(text: &str) -> BTreeMap<String, DiskCounters> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 13 {
                return None;
            }
            let name = fields[2];
            if name.starts_with("loop") || name.starts_with("ram") {
                return None;
            }
            let num = |index: usize| fields[index].parse::<u64>().unwrap_or_default();
            Some((
                name.to_string(),
                DiskCounters {
                    reads: num(3),
                    sectors_read: num(5),
                    writes: num(7),
                    sectors_written: num(9),
                    io_ticks_ms: num(12),
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn meminfo_is_converted_to_bytes() {
        let info = parse_meminfo(
            "MemTotal:        8000 kB\nMemFree:         1000 kB\nMemAvailable:    5000 kB\nBuffers:          500 kB\nCached:          2000 kB\nSwapTotal:       1000 kB\nSwapFree:         900 kB\nSwapCached:       200 kB\n",
        );
        assert_eq!(info.total, 8000 * 1024);
        assert_eq!(info.used(), 4500 * 1024);
        assert_eq!(info.swap_used(), -100 * 1024);
    }

    #[test]
    fn cpu_line_is_found() {
        let times = parse_cpu_times("cpu  10 1 5 80 2 0 1 1 0 0\ncpu0 5 0 2 40 1 0 0 0 0 0\n").unwrap();
        assert_eq!(times.idle, 80);
        assert_eq!(times.total(), 100);
    }

    #[test]
    fn net_dev_skips_headers() {
        let text = "Inter-|   Receive |  Transmit\n face |bytes packets errs drop fifo frame compressed multicast|bytes\n  eth0: 2048 10 1 2 0 0 0 0 4096 20 3 4 0 0 0 0\n";
        let counters = parse_net_dev(text);
        assert_eq!(counters.len(), 1);
        assert_eq!(counters["eth0"].tx_bytes, 4096);
        assert_eq!(counters["eth0"].rx_drop, 2);
    }

    #[test]
    fn diskstats_skip_loop_devices() {
        let text = "   7       0 loop0 1 0 2 0 0 0 0 0 0 0 0\n   8       0 sda 100 0 800 10 50 0 400 20 0 90 30\n";
        let counters = parse_diskstats(text);
        assert_eq!(counters.keys().cloned().collect::<Vec<_>>(), vec!["sda"]);
        assert_eq!(counters["sda"].io_ticks_ms, 90);
    }
}
