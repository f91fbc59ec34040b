use crate::{
    workload::WorkloadData,
    yasdb::{
        SlowLog,
        VDatabase,
        VInstance,
        VParameter,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// Typed payload of an item. Serialized as `{"kind": ..., "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemDetails {
    Text(String),
    /// A file or directory copied into the package.
    Path(String),
    OsInfo(HostOsInfo),
    Firewall(FirewallStatus),
    Cpu(CpuSummary),
    Disks(Vec<DiskInfo>),
    Networks(Vec<NetworkInfo>),
    Memory(MemoryInfo),
    Workload(WorkloadData),
    IniParameters(BTreeMap<String, String>),
    Parameters(Vec<VParameter>),
    Processes(Vec<ProcessInfo>),
    Instance(VInstance),
    Database(VDatabase),
    SlowLogs(Vec<SlowLog>),
    Files(Vec<CollectedFile>),
}

impl ItemDetails {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HostOsInfo {
    pub hostname: String,
    pub os: String,
    pub platform: String,
    pub platform_version: String,
    pub kernel_version: String,
    pub kernel_arch: String,
    pub uptime_secs: u64,
    pub boot_time: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallStatus {
    pub tool: String,
    pub active: bool,
    pub output: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuSummary {
    pub model_name: String,
    pub vendor_id: String,
    pub frequency_mhz: u64,
    pub physical_cores: usize,
    pub logical_cores: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub mount_options: String,
    pub total: u64,
    pub available: u64,
}

impl DiskInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used() as f64 / self.total as f64 * 100.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    pub mac: String,
    pub addresses: Vec<String>,
    pub mtu: Option<u32>,
}

/// Values in bytes, as read from `/proc/meminfo`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
    pub available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub shared: u64,
    pub active: u64,
    pub inactive: u64,
    pub dirty: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub swap_cached: u64,
}

impl MemoryInfo {
    pub fn used(&self) -> u64 {
        self.total
            .saturating_sub(self.free)
            .saturating_sub(self.buffers)
            .saturating_sub(self.cached)
    }

    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used() as f64 / self.total as f64 * 100.0
    }

    /// `SwapTotal - SwapFree - SwapCached`; may be negative.
    pub fn swap_used(&self) -> i128 {
        self.swap_total as i128 - self.swap_free as i128 - self.swap_cached as i128
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub user: String,
    pub status: String,
    pub start_time: u64,
    pub cpu_percent: f32,
    pub memory: u64,
    pub command: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedFile {
    pub source: String,
    pub stored: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}
