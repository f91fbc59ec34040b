//! Host facts gathered in-process, plus the probe used for access checks.

pub mod procfs;
mod probe;

pub use probe::{
    HostProbe,
    SudoAccess,
    SystemProbe,
};

use crate::data::{
    CpuSummary,
    DiskInfo,
    FirewallStatus,
    HostOsInfo,
    MemoryInfo,
    NetworkInfo,
    ProcessInfo,
};
use eyre::{
    Context as _,
    Result,
};
use std::{
    collections::BTreeMap,
    path::Path,
};
use sysinfo::{
    Disks,
    Networks,
    System,
    Users,
};

/// Distribution family, from the `ID` of `/etc/os-release`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OsId {
    Centos,
    Kylin,
    Ubuntu,
    Other(String),
}

impl OsId {
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_lowercase().as_str() {
            "centos" | "rhel" | "openeuler" | "fedora" | "rocky" | "almalinux" => OsId::Centos,
            "kylin" => OsId::Kylin,
            "ubuntu" | "debian" => OsId::Ubuntu,
            other => OsId::Other(other.to_string()),
        }
    }

    pub fn install_sysstat_command(&self) -> &'static str {
        match self {
            OsId::Ubuntu => "sudo apt install sysstat",
            _ => "sudo yum install sysstat",
        }
    }
}

pub fn os_info() -> HostOsInfo {
    HostOsInfo {
        hostname: System::host_name().unwrap_or_default(),
        os: std::env::consts::OS.to_string(),
        platform: System::name().unwrap_or_default(),
        platform_version: System::os_version().unwrap_or_default(),
        kernel_version: System::kernel_version().unwrap_or_default(),
        kernel_arch: std::env::consts::ARCH.to_string(),
        uptime_secs: System::uptime(),
        boot_time: System::boot_time(),
    }
}

pub fn cpu_summary() -> CpuSummary {
    let mut sys = System::new();
    sys.refresh_cpu();
    let cpus = sys.cpus();
    let first = cpus.first();
    CpuSummary {
        model_name: first.map(|cpu| cpu.brand().trim().to_string()).unwrap_or_default(),
        vendor_id: first.map(|cpu| cpu.vendor_id().to_string()).unwrap_or_default(),
        frequency_mhz: first.map(|cpu| cpu.frequency()).unwrap_or_default(),
        physical_cores: sys.physical_core_count().unwrap_or_default(),
        logical_cores: cpus.len(),
    }
}

pub fn disks() -> Vec<DiskInfo> {
    let options = std::fs::read_to_string("/proc/mounts")
        .map(|mounts| mount_options(&mounts))
        .unwrap_or_default();
    let disks = Disks::new_with_refreshed_list();
    let mut infos: Vec<DiskInfo> = disks
        .iter()
        .map(|disk| {
            let mount_point = disk.mount_point().to_string_lossy().to_string();
            DiskInfo {
                device: disk.name().to_string_lossy().to_string(),
                fs_type: disk.file_system().to_string_lossy().to_string(),
                mount_options: options.get(&mount_point).cloned().unwrap_or_default(),
                mount_point,
                total: disk.total_space(),
                available: disk.available_space(),
            }
        })
        .collect();
    infos.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    infos
}

/// Mount point → options, from `/proc/mounts`.
pub fn mount_options(mounts: &str) -> BTreeMap<String, String> {
    mounts
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            Some((fields.get(1)?.to_string(), fields.get(3)?.to_string()))
        })
        .collect()
}

pub fn networks(addresses: &str) -> Vec<NetworkInfo> {
    let addresses = interface_addresses(addresses);
    let networks = Networks::new_with_refreshed_list();
    let mut infos: Vec<NetworkInfo> = networks
        .iter()
        .map(|(name, data)| NetworkInfo {
            name: name.clone(),
            mac: data.mac_address().to_string(),
            addresses: addresses.get(name).cloned().unwrap_or_default(),
            mtu: std::fs::read_to_string(format!("/sys/class/net/{name}/mtu"))
                .ok()
                .and_then(|mtu| mtu.trim().parse().ok()),
        })
        .collect();
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    infos
}

/// Interface → CIDR addresses, from `ip -o addr show` output.
pub fn interface_addresses(output: &str) -> BTreeMap<String, Vec<String>> {
    let mut addresses: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let (Some(name), Some(family), Some(address)) = (fields.get(1), fields.get(2), fields.get(3)) {
            if *family == "inet" || *family == "inet6" {
                addresses
                    .entry(name.trim_end_matches(':').to_string())
                    .or_default()
                    .push(address.to_string());
            }
        }
    }
    addresses
}

pub fn memory() -> Result<MemoryInfo> {
    let text = std::fs::read_to_string("/proc/meminfo").context("failed to read /proc/meminfo")?;
    Ok(procfs::parse_meminfo(&text))
}

/// Status of the host firewall: `firewalld` where present, `ufw` on Ubuntu.
pub fn firewall(probe: &dyn HostProbe) -> Result<FirewallStatus> {
    if probe.os_id() == OsId::Ubuntu {
        let output = probe.run("ufw", &["status"])?;
        return Ok(FirewallStatus {
            tool: "ufw".to_string(),
            active: output.contains("Status: active"),
            output,
        });
    }
    // `is-active` exits non-zero when inactive, which is not a failure here.
    let output = probe
        .run("systemctl", &["is-active", "firewalld"])
        .unwrap_or_else(|err| err.to_string());
    Ok(FirewallStatus {
        tool: "firewalld".to_string(),
        active: output.trim() == "active",
        output: output.trim().to_string(),
    })
}

/// Running `yasdb` processes whose command line references `data`.
pub fn yasdb_processes(data: &Path) -> Vec<ProcessInfo> {
    let mut sys = System::new();
    sys.refresh_processes();
    let users = Users::new_with_refreshed_list();
    let data = data.to_string_lossy();
    let mut processes: Vec<ProcessInfo> = sys
        .processes()
        .values()
        .filter(|process| process.name().starts_with("yasdb"))
        .filter(|process| process.cmd().iter().any(|arg| arg.contains(data.as_ref())))
        .map(|process| ProcessInfo {
            pid: process.pid().as_u32(),
            user: process
                .user_id()
                .and_then(|uid| users.get_user_by_id(uid))
                .map(|user| user.name().to_string())
                .unwrap_or_default(),
            status: process.status().to_string(),
            start_time: process.start_time(),
            cpu_percent: process.cpu_usage(),
            memory: process.memory(),
            command: process.cmd().join(" "),
        })
        .collect();
    processes.sort_by_key(|process| process.pid);
    processes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn os_ids_map_to_install_commands() {
        assert_eq!(OsId::from_id("ubuntu").install_sysstat_command(), "sudo apt install sysstat");
        assert_eq!(OsId::from_id("\"kylin\"".trim_matches('"')), OsId::Kylin);
        assert_eq!(OsId::from_id("centos").install_sysstat_command(), "sudo yum install sysstat");
    }

    #[test]
    fn parses_ip_addr_output() {
        let output = "1: lo    inet 127.0.0.1/8 scope host lo\n2: eth0    inet 10.0.0.5/24 brd 10.0.0.255 scope global eth0\n2: eth0    inet6 fe80::1/64 scope link\n";
        let addresses = interface_addresses(output);
        assert_eq!(addresses["eth0"], vec!["10.0.0.5/24", "fe80::1/64"]);
        assert_eq!(addresses["lo"], vec!["127.0.0.1/8"]);
    }

    #[test]
    fn parses_mount_options() {
        let options = mount_options("/dev/sda1 / ext4 rw,relatime 0 0\ntmpfs /run tmpfs rw,nosuid 0 0\n");
        assert_eq!(options["/"], "rw,relatime");
        assert_eq!(options.len(), 2);
    }
}
