//! Host workload time series: CPU, memory, network and disk activity.
//!
//! History always comes from the sysstat archives through `sar`. Current data
//! comes from `sar` as well when it is installed, otherwise from in-process
//! sampling of `/proc`. Both sources report overlapping but not identical
//! fields, so every workload kind has a `Sar*` and a `Sampled*` sample type.

mod sampler;
mod sar;

pub use sampler::Sampler;
pub use sar::{
    SarRecord,
    SarRunner,
    SAR_NOT_FOUND,
};

use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// Unix timestamp → series key (`all`, a device or an interface) → sample.
pub type Series<T> = BTreeMap<i64, BTreeMap<String, T>>;

pub const ALL_KEY: &str = "all";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "series", rename_all = "snake_case")]
pub enum WorkloadData {
    SarCpu(Series<SarCpu>),
    SampledCpu(Series<SampledCpu>),
    SarMemory(Series<SarMemory>),
    SampledMemory(Series<SampledMemory>),
    SarNetwork(Series<SarNetwork>),
    SampledNetwork(Series<SampledNetwork>),
    SarDisk(Series<SarDisk>),
    SampledDisk(Series<SampledDisk>),
}

/// Percentages, as printed by `sar -u`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SarCpu {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub iowait: f64,
    pub steal: f64,
    pub idle: f64,
}

/// Percentages derived from two `/proc/stat` readings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampledCpu {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub iowait: f64,
    pub steal: f64,
    pub idle: f64,
    pub irq: f64,
    pub softirq: f64,
    pub guest: f64,
}

/// `sar -r`: kilobytes and percentages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SarMemory {
    pub kb_mem_free: f64,
    pub kb_avail: f64,
    pub kb_mem_used: f64,
    pub mem_used: f64,
    pub kb_buffers: f64,
    pub kb_cached: f64,
    pub kb_commit: f64,
    pub commit: f64,
    pub kb_active: f64,
    pub kb_inact: f64,
    pub kb_dirty: f64,
}

impl SarMemory {
    /// Total memory reconstructed from used kilobytes and the used percentage.
    pub fn total_kb(&self) -> f64 {
        if self.mem_used == 0.0 {
            return 0.0;
        }
        self.kb_mem_used / self.mem_used * 100.0
    }

    pub fn real_used_percent(&self) -> f64 {
        let total = self.total_kb();
        if total == 0.0 {
            return 0.0;
        }
        (self.kb_mem_used - self.kb_buffers - self.kb_cached) / total * 100.0
    }
}

/// Bytes, from `/proc/meminfo`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampledMemory {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub used_percent: f64,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
    pub active: u64,
    pub inactive: u64,
    pub dirty: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

impl SampledMemory {
    /// `Available / Total` in integer arithmetic, kept as the library reports it.
    pub fn real_usage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.available / self.total) as f64
    }
}

/// `sar -n DEV`: per-second rates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SarNetwork {
    pub rx_pck: f64,
    pub tx_pck: f64,
    pub rx_kb: f64,
    pub tx_kb: f64,
    pub rx_cmp: f64,
    pub tx_cmp: f64,
    pub rx_mcst: f64,
    pub if_util: f64,
}

/// Per-second rates derived from two `/proc/net/dev` readings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampledNetwork {
    pub rx_pck: f64,
    pub tx_pck: f64,
    pub rx_kb: f64,
    pub tx_kb: f64,
    pub err_in: f64,
    pub err_out: f64,
    pub drop_in: f64,
    pub drop_out: f64,
}

/// `sar -d -p`: per-second rates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SarDisk {
    pub tps: f64,
    pub read_kb: f64,
    pub write_kb: f64,
    pub avg_request_size: f64,
    pub avg_queue_size: f64,
    pub await_ms: f64,
    pub util: f64,
}

/// Per-second rates derived from two `/proc/diskstats` readings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampledDisk {
    pub tps: f64,
    pub reads: f64,
    pub writes: f64,
    pub read_kb: f64,
    pub write_kb: f64,
    pub util: f64,
}
