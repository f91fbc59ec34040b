use super::{
    SampledCpu,
    SampledDisk,
    SampledMemory,
    SampledNetwork,
    Series,
    ALL_KEY,
};
use crate::host::procfs::{
    self,
    CpuTimes,
    DiskCounters,
    NetCounters,
};
use chrono::Local;
use eyre::{
    eyre,
    Context as _,
    Result,
};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    thread,
    time::{
        Duration,
        Instant,
    },
};

const SECTOR_KB: f64 = 0.5;

/// In-process replacement for `sar` when sysstat is not installed.
#[derive(Clone, Debug)]
pub struct Sampler {
    interval: Duration,
    count: u32,
    proc_root: PathBuf,
}

impl Sampler {
    pub fn new(interval: Duration, count: u32) -> Self {
        Self {
            interval,
            count,
            proc_root: PathBuf::from("/proc"),
        }
    }

    #[cfg(test)]
    fn with_root(mut self, root: PathBuf) -> Self {
        self.proc_root = root;
        self
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.proc_root.join(name);
        std::fs::read_to_string(&path).wrap_err_with(|| format!("failed to read {}", path.display()))
    }

    /// Takes `count + 1` readings `interval` apart and turns consecutive pairs into rates.
    fn rates<S, T>(
        &self,
        read: impl Fn() -> Result<S>,
        diff: impl Fn(&S, &S, f64) -> BTreeMap<String, T>,
    ) -> Result<Series<T>> {
        let mut series = Series::new();
        let mut previous = read()?;
        let mut previous_at = Instant::now();
        for _ in 0..self.count {
            thread::sleep(self.interval);
            let current = read()?;
            let elapsed = previous_at.elapsed().as_secs_f64().max(f64::EPSILON);
            previous_at = Instant::now();
            series.insert(Local::now().timestamp(), diff(&previous, &current, elapsed));
            previous = current;
        }
        Ok(series)
    }

    pub fn cpu(&self) -> Result<Series<SampledCpu>> {
        self.rates(
            || procfs::parse_cpu_times(&self.read("stat")?).ok_or_else(|| eyre!("no cpu line in /proc/stat")),
            |before: &CpuTimes, after: &CpuTimes, _| {
                let total = after.total().saturating_sub(before.total()).max(1) as f64;
                let pct = |a: u64, b: u64| a.saturating_sub(b) as f64 / total * 100.0;
                BTreeMap::from([(
                    ALL_KEY.to_string(),
                    SampledCpu {
                        user: pct(after.user, before.user),
                        nice: pct(after.nice, before.nice),
                        system: pct(after.system, before.system),
                        iowait: pct(after.iowait, before.iowait),
                        steal: pct(after.steal, before.steal),
                        idle: pct(after.idle, before.idle),
                        irq: pct(after.irq, before.irq),
                        softirq: pct(after.softirq, before.softirq),
                        guest: pct(after.guest, before.guest),
                    },
                )])
            },
        )
    }

    pub fn network(&self) -> Result<Series<SampledNetwork>> {
        self.rates(
            || Ok(procfs::parse_net_dev(&self.read("net/dev")?)),
            |before: &BTreeMap<String, NetCounters>, after, secs| {
                after
                    .iter()
                    .filter_map(|(name, now)| {
                        let then = before.get(name)?;
                        let rate = |a: u64, b: u64| a.saturating_sub(b) as f64 / secs;
                        Some((
                            name.clone(),
                            SampledNetwork {
                                rx_pck: rate(now.rx_packets, then.rx_packets),
                                tx_pck: rate(now.tx_packets, then.tx_packets),
                                rx_kb: rate(now.rx_bytes, then.rx_bytes) / 1024.0,
                                tx_kb: rate(now.tx_bytes, then.tx_bytes) / 1024.0,
                                err_in: rate(now.rx_errs, then.rx_errs),
                                err_out: rate(now.tx_errs, then.tx_errs),
                                drop_in: rate(now.rx_drop, then.rx_drop),
                                drop_out: rate(now.tx_drop, then.tx_drop),
                            },
                        ))
                    })
                    .collect()
            },
        )
    }

    pub fn disk(&self) -> Result<Series<SampledDisk>> {
        self.rates(
            || Ok(procfs::parse_diskstats(&self.read("diskstats")?)),
            |before: &BTreeMap<String, DiskCounters>, after, secs| {
                after
                    .iter()
                    .filter_map(|(name, now)| {
                        let then = before.get(name)?;
                        let rate = |a: u64, b: u64| a.saturating_sub(b) as f64 / secs;
                        let reads = rate(now.reads, then.reads);
                        let writes = rate(now.writes, then.writes);
                        let busy_ms = now.io_ticks_ms.saturating_sub(then.io_ticks_ms) as f64;
                        Some((
                            name.clone(),
                            SampledDisk {
                                tps: reads + writes,
                                reads,
                                writes,
                                read_kb: rate(now.sectors_read, then.sectors_read) * SECTOR_KB,
                                write_kb: rate(now.sectors_written, then.sectors_written) * SECTOR_KB,
                                util: (busy_ms / (secs * 1000.0) * 100.0).min(100.0),
                            },
                        ))
                    })
                    .collect()
            },
        )
    }

    /// Memory is a level, not a counter: one reading per interval.
    pub fn memory(&self) -> Result<Series<SampledMemory>> {
        let mut series = Series::new();
        for index in 0..self.count {
            if index > 0 {
                thread::sleep(self.interval);
            }
            let info = procfs::parse_meminfo(&self.read("meminfo")?);
            let sample = SampledMemory {
                total: info.total,
                available: info.available,
                used: info.used(),
                used_percent: info.used_percent(),
                free: info.free,
                buffers: info.buffers,
                cached: info.cached,
                active: info.active,
                inactive: info.inactive,
                dirty: info.dirty,
                swap_total: info.swap_total,
                swap_free: info.swap_free,
            };
            series.insert(
                Local::now().timestamp(),
                BTreeMap::from([(ALL_KEY.to_string(), sample)]),
            );
        }
        Ok(series)
    }
}
