//! One renderer per item, looked up by `ItemId`.
//!
//! Every renderer has two branches: an item with an error renders its error
//! and description only, anything else must carry the payload kind the
//! renderer expects.

use super::{
    graph::{
        self,
        GraphData,
    },
    writer::ReportWriter,
};
use crate::{
    data::{
        child,
        ItemDetails,
        ItemId,
        YtcItem,
    },
    error::ReportError,
};
use chrono::{
    Local,
    TimeZone as _,
};
use std::{
    collections::BTreeMap,
    time::Duration,
};
use strum::IntoEnumIterator as _;
use ytc_config::i18n;

/// Output of the item being rendered.
pub struct Section<'a> {
    pub writer: &'a mut ReportWriter,
    pub graphs: &'a mut Vec<GraphData>,
    pub item: ItemId,
}

pub trait Renderer: Send + Sync {
    /// Renders `item` below the title already written under `number`.
    fn render(&self, item: &YtcItem, number: &str, out: &mut Section<'_>) -> Result<(), ReportError>;
}

/// Success branch of one payload. `anchor` names the node for chart payloads.
type DetailsFn = fn(&YtcItem, &ItemDetails, &str, &mut Section<'_>) -> Result<(), ReportError>;

struct Leaf(DetailsFn);

impl Leaf {
    fn render_node(&self, node: &YtcItem, anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
        if node.failed() {
            out.writer.error(&node.error, &node.description);
            return Ok(());
        }
        let details = node
            .details
            .as_ref()
            .ok_or_else(|| ReportError::MissingPayload(node.name.clone()))?;
        (self.0)(node, details, anchor, out)
    }
}

impl Renderer for Leaf {
    fn render(&self, item: &YtcItem, _number: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
        let anchor = out.item.to_string();
        self.render_node(item, &anchor, out)
    }
}

struct Child {
    key: &'static str,
    required: bool,
    render: DetailsFn,
}

/// Item made of fixed sub-items, each rendered as its own numbered section.
struct Composite(&'static [Child]);

impl Renderer for Composite {
    fn render(&self, item: &YtcItem, number: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
        if item.failed() {
            out.writer.error(&item.error, &item.description);
            return Ok(());
        }
        if let Some(unknown) = item.children.keys().find(|key| !self.0.iter().any(|child| key.as_str() == child.key)) {
            return Err(ReportError::UnknownItem(format!("{}.{unknown}", item.name)));
        }
        let mut rendered = 0;
        for child in self.0 {
            let Some(node) = item.child(child.key) else {
                if child.required {
                    return Err(ReportError::MissingChild {
                        item: out.item,
                        child: child.key,
                    });
                }
                continue;
            };
            rendered += 1;
            out.writer.title(&format!("{number}.{rendered}"), &child::display_name(child.key));
            let anchor = format!("{}-{}", out.item, child.key);
            Leaf(child.render).render_node(node, &anchor, out)?;
        }
        if rendered == 0 {
            out.writer.paragraph(&i18n::t("report.no_data"));
        }
        Ok(())
    }
}

pub struct Registry(BTreeMap<ItemId, Box<dyn Renderer>>);

impl Default for Registry {
    fn default() -> Self {
        Self(ItemId::iter().map(|item| (item, renderer(item))).collect())
    }
}

impl Registry {
    pub fn get(&self, item: ItemId) -> Result<&dyn Renderer, ReportError> {
        self.0
            .get(&item)
            .map(|renderer| renderer.as_ref())
            .ok_or(ReportError::RendererNotFound(item))
    }

    #[cfg(test)]
    pub fn without(mut self, item: ItemId) -> Self {
        self.0.remove(&item);
        self
    }
}

const PARAMETER: &[Child] = &[
    Child {
        key: child::YASDB_INI,
        required: true,
        render: ini_parameters,
    },
    Child {
        key: child::V_PARAMETER,
        required: true,
        render: parameters,
    },
];

const WORKLOAD: &[Child] = &[
    Child {
        key: child::HISTORY,
        required: true,
        render: workload,
    },
    Child {
        key: child::CURRENT,
        required: true,
        render: workload,
    },
];

const SYSTEM_LOG: &[Child] = &[
    Child {
        key: child::MESSAGES,
        required: false,
        render: path,
    },
    Child {
        key: child::SYSLOG,
        required: false,
        render: path,
    },
];

const SLOW_SQL: &[Child] = &[
    Child {
        key: child::SLOW_PARAMETER,
        required: true,
        render: parameters,
    },
    Child {
        key: child::SLOW_LOGS_IN_TABLE,
        required: true,
        render: slow_logs,
    },
    Child {
        key: child::SLOW_LOGS_IN_FILE,
        required: true,
        render: path,
    },
];

fn renderer(item: ItemId) -> Box<dyn Renderer> {
    use ItemId::*;
    match item {
        YasdbVersion => Box::new(Leaf(text)),
        YasdbParameter => Box::new(Composite(PARAMETER)),
        HostOsInfo => Box::new(Leaf(os_info)),
        HostFirewalld => Box::new(Leaf(firewall)),
        HostCpu => Box::new(Leaf(cpu)),
        HostDisk => Box::new(Leaf(disks)),
        HostNetwork => Box::new(Leaf(networks)),
        HostMemory => Box::new(Leaf(memory)),
        HostNetworkIo | HostCpuUsage | HostDiskIo | HostMemoryUsage => Box::new(Composite(WORKLOAD)),
        YasdbAdr | YasdbRunLog | YasdbAlertLog | HostKernelLog | HostBashHistory | YasdbAwr => Box::new(Leaf(path)),
        YasdbProcessStatus => Box::new(Leaf(processes)),
        YasdbInstanceStatus => Box::new(Leaf(instance)),
        YasdbDatabaseStatus => Box::new(Leaf(database)),
        HostSystemLog => Box::new(Composite(SYSTEM_LOG)),
        YasdbCoredump | ExtraFiles => Box::new(Leaf(files)),
        YasdbSlowSql => Box::new(Composite(SLOW_SQL)),
    }
}

fn mismatch(node: &YtcItem, expected: &'static str, details: &ItemDetails) -> ReportError {
    ReportError::PayloadMismatch {
        item: node.name.clone(),
        expected,
        found: details.kind(),
    }
}

fn field(name: &str) -> String {
    i18n::t(&format!("field.{name}"))
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| field(name)).collect()
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes}B")
    }
}

fn format_epoch(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|time| time.format(crate::param::TIME_FORMAT).to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn text(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Text(text) = details else {
        return Err(mismatch(node, "text", details));
    };
    out.writer.code(text);
    Ok(())
}

fn path(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Path(path) = details else {
        return Err(mismatch(node, "path", details));
    };
    out.writer.path(path);
    Ok(())
}

fn os_info(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::OsInfo(info) = details else {
        return Err(mismatch(node, "os_info", details));
    };
    let uptime = humantime::format_duration(Duration::from_secs(info.uptime_secs)).to_string();
    out.writer.list(&[
        (field("hostname"), info.hostname.clone()),
        (field("os"), info.os.clone()),
        (field("platform"), info.platform.clone()),
        (field("platform_version"), info.platform_version.clone()),
        (field("kernel_version"), info.kernel_version.clone()),
        (field("kernel_arch"), info.kernel_arch.clone()),
        (field("uptime"), uptime),
        (field("boot_time"), format_epoch(info.boot_time)),
    ]);
    Ok(())
}

fn firewall(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Firewall(status) = details else {
        return Err(mismatch(node, "firewall", details));
    };
    let active = if status.active { "report.yes" } else { "report.no" };
    out.writer.list(&[
        (field("tool"), status.tool.clone()),
        (field("active"), i18n::t(active)),
    ]);
    if !status.output.trim().is_empty() {
        out.writer.code(&status.output);
    }
    Ok(())
}

fn cpu(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Cpu(cpu) = details else {
        return Err(mismatch(node, "cpu", details));
    };
    out.writer.list(&[
        (field("model_name"), cpu.model_name.clone()),
        (field("vendor_id"), cpu.vendor_id.clone()),
        (field("frequency_mhz"), cpu.frequency_mhz.to_string()),
        (field("physical_cores"), cpu.physical_cores.to_string()),
        (field("logical_cores"), cpu.logical_cores.to_string()),
    ]);
    Ok(())
}

fn disks(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Disks(disks) = details else {
        return Err(mismatch(node, "disks", details));
    };
    let rows: Vec<Vec<String>> = disks
        .iter()
        .map(|disk| {
            vec![
                disk.device.clone(),
                disk.mount_point.clone(),
                disk.fs_type.clone(),
                disk.mount_options.clone(),
                format_bytes(disk.total),
                format_bytes(disk.used()),
                format_bytes(disk.available),
                format!("{:.2}%", graph::truncate2(disk.used_percent())),
            ]
        })
        .collect();
    out.writer.table(
        &headers(&[
            "device",
            "mount_point",
            "fs_type",
            "mount_options",
            "total",
            "used",
            "available",
            "used_percent",
        ]),
        &rows,
    );
    Ok(())
}

fn networks(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Networks(networks) = details else {
        return Err(mismatch(node, "networks", details));
    };
    let rows: Vec<Vec<String>> = networks
        .iter()
        .map(|network| {
            vec![
                network.name.clone(),
                network.mac.clone(),
                network.addresses.join(", "),
                network.mtu.map(|mtu| mtu.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    out.writer.table(&headers(&["interface", "mac", "addresses", "mtu"]), &rows);
    Ok(())
}

fn memory(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Memory(memory) = details else {
        return Err(mismatch(node, "memory", details));
    };
    let swap_used = memory.swap_used();
    let swap_used = match u64::try_from(swap_used) {
        Ok(bytes) => format_bytes(bytes),
        Err(_) => format!("-{}", format_bytes(u64::try_from(-swap_used).unwrap_or(u64::MAX))),
    };
    let rows = vec![vec![
        format_bytes(memory.total),
        format_bytes(memory.used()),
        format!("{:.2}%", graph::truncate2(memory.used_percent())),
        format_bytes(memory.free),
        format_bytes(memory.available),
        format_bytes(memory.buffers),
        format_bytes(memory.cached),
        format_bytes(memory.swap_total),
        format_bytes(memory.swap_free),
        swap_used,
    ]];
    out.writer.table(
        &headers(&[
            "total",
            "used",
            "used_percent",
            "free",
            "available",
            "buffers",
            "cached",
            "swap_total",
            "swap_free",
            "swap_used",
        ]),
        &rows,
    );
    Ok(())
}

fn workload(node: &YtcItem, details: &ItemDetails, anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Workload(data) = details else {
        return Err(mismatch(node, "workload", details));
    };
    if let Some(data_type) = node.data_type {
        out.writer.paragraph(&i18n::t_with(
            "report.data_source",
            &[("Source", &i18n::t(&format!("report.source_{data_type}")))],
        ));
    }
    let views = graph::series_views(data);
    if views.is_empty() {
        out.writer.paragraph(&i18n::t("report.no_data"));
        return Ok(());
    }
    for view in views {
        if is_keyed_series(&view.key) {
            out.writer.paragraph(&i18n::t_with("report.series", &[("Name", &view.key)]));
        }
        out.writer.table(&view.headers(), &view.table_rows());
        let name = format!("{anchor}-{}", view.key);
        let title = format!("{} ({}) {}", out.item.display_name(), child::display_name(&node.name), view.key);
        out.writer.graph(&name);
        out.graphs.push(view.graph(name, title));
    }
    Ok(())
}

/// CPU and memory series only carry the `all` key.
fn is_keyed_series(key: &str) -> bool {
    key != crate::workload::ALL_KEY
}

fn ini_parameters(
    node: &YtcItem,
    details: &ItemDetails,
    _anchor: &str,
    out: &mut Section<'_>,
) -> Result<(), ReportError> {
    let ItemDetails::IniParameters(parameters) = details else {
        return Err(mismatch(node, "ini_parameters", details));
    };
    let rows: Vec<Vec<String>> = parameters
        .iter()
        .map(|(name, value)| vec![name.clone(), value.clone()])
        .collect();
    out.writer.table(&headers(&["name", "value"]), &rows);
    Ok(())
}

fn parameters(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Parameters(parameters) = details else {
        return Err(mismatch(node, "parameters", details));
    };
    let rows: Vec<Vec<String>> = parameters
        .iter()
        .map(|parameter| vec![parameter.name.clone(), parameter.value.clone()])
        .collect();
    out.writer.table(&headers(&["name", "value"]), &rows);
    Ok(())
}

fn processes(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Processes(processes) = details else {
        return Err(mismatch(node, "processes", details));
    };
    let rows: Vec<Vec<String>> = processes
        .iter()
        .map(|process| {
            vec![
                process.pid.to_string(),
                process.user.clone(),
                process.status.clone(),
                format_epoch(process.start_time),
                format!("{:.2}", graph::truncate2(f64::from(process.cpu_percent))),
                format_bytes(process.memory),
                process.command.clone(),
            ]
        })
        .collect();
    out.writer.table(
        &headers(&["pid", "user", "status", "start_time", "cpu_percent", "memory", "command"]),
        &rows,
    );
    Ok(())
}

fn instance(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Instance(instance) = details else {
        return Err(mismatch(node, "instance", details));
    };
    out.writer.list(&[
        (field("instance_number"), instance.instance_number.clone()),
        (field("instance_name"), instance.instance_name.clone()),
        (field("host_name"), instance.host_name.clone()),
        (field("version"), instance.version.clone()),
        (field("startup_time"), instance.startup_time.clone()),
        (field("status"), instance.status.clone()),
        (field("role"), instance.role.clone()),
    ]);
    Ok(())
}

fn database(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Database(database) = details else {
        return Err(mismatch(node, "database", details));
    };
    out.writer.list(&[
        (field("database_name"), database.database_name.clone()),
        (field("status"), database.status.clone()),
        (field("open_mode"), database.open_mode.clone()),
        (field("role"), database.role.clone()),
        (field("log_mode"), database.log_mode.clone()),
        (field("create_time"), database.create_time.clone()),
    ]);
    Ok(())
}

fn slow_logs(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::SlowLogs(logs) = details else {
        return Err(mismatch(node, "slow_logs", details));
    };
    let rows: Vec<Vec<String>> = logs
        .iter()
        .map(|log| {
            vec![
                log.start_time.clone(),
                log.user_name.clone(),
                log.user_host.clone(),
                log.query_time.clone(),
                log.rows_sent.clone(),
                log.sql_text.clone(),
            ]
        })
        .collect();
    out.writer.table(
        &headers(&["start_time", "user", "user_host", "query_time", "rows_sent", "sql_text"]),
        &rows,
    );
    Ok(())
}

fn files(node: &YtcItem, details: &ItemDetails, _anchor: &str, out: &mut Section<'_>) -> Result<(), ReportError> {
    let ItemDetails::Files(files) = details else {
        return Err(mismatch(node, "files", details));
    };
    let rows: Vec<Vec<String>> = files
        .iter()
        .map(|file| {
            let status = match file.error.is_empty() {
                true => i18n::t("report.status_ok"),
                false => file.error.clone(),
            };
            vec![file.source.clone(), file.stored.clone(), status]
        })
        .collect();
    out.writer.table(&headers(&["source", "storage_path", "status"]), &rows);
    Ok(())
}
