//! Workload series as report tables and as chart payload.
//!
//! Both views come from the same `SeriesView`, so a chart always has one
//! row per table row with the same timestamps in the same order.

use crate::workload::{
    SampledCpu,
    SampledDisk,
    SampledMemory,
    SampledNetwork,
    SarCpu,
    SarDisk,
    SarMemory,
    SarNetwork,
    Series,
    WorkloadData,
};
use chrono::{
    Local,
    TimeZone as _,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use ytc_config::i18n;

pub const X_KEY: &str = "time";

/// Chart payload for one series of one workload item.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphData {
    pub name: String,
    pub title: String,
    pub x_key: String,
    pub y_keys: Vec<String>,
    pub labels: Vec<String>,
    pub rows: Vec<BTreeMap<String, Value>>,
}

/// One series (`all`, a device or an interface) of a workload payload.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesView {
    pub key: String,
    pub columns: &'static [&'static str],
    pub y_keys: &'static [&'static str],
    /// Timestamp, table values, chart values.
    pub rows: Vec<(i64, Vec<f64>, Vec<f64>)>,
}

impl SeriesView {
    pub fn headers(&self) -> Vec<String> {
        std::iter::once(i18n::t("report.time"))
            .chain(self.columns.iter().map(|column| column.to_string()))
            .collect()
    }

    pub fn table_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|(time, values, _)| {
                std::iter::once(format_time(*time))
                    .chain(values.iter().map(|value| format!("{value:.2}")))
                    .collect()
            })
            .collect()
    }

    pub fn graph(&self, name: String, title: String) -> GraphData {
        let rows = self
            .rows
            .iter()
            .map(|(time, _, values)| {
                let mut row = BTreeMap::from([(X_KEY.to_string(), Value::from(format_time(*time)))]);
                for (key, value) in self.y_keys.iter().zip(values) {
                    row.insert(key.to_string(), Value::from(*value));
                }
                row
            })
            .collect();
        GraphData {
            name,
            title,
            x_key: X_KEY.to_string(),
            y_keys: self.y_keys.iter().map(|key| key.to_string()).collect(),
            labels: self.y_keys.iter().map(|key| i18n::t(&format!("graph.{key}"))).collect(),
            rows,
        }
    }
}

/// Two decimals, cut rather than rounded.
pub fn truncate2(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}

fn format_time(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|time| time.format(crate::param::TIME_FORMAT).to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

trait Sample {
    const COLUMNS: &'static [&'static str];
    const Y_KEYS: &'static [&'static str];

    fn values(&self) -> Vec<f64>;

    fn chart(&self) -> Vec<f64>;
}

const CPU_Y: &[&str] = &["usage"];
const MEMORY_Y: &[&str] = &["usage", "real_usage"];
const NETWORK_Y: &[&str] = &["network_in", "network_out"];
const DISK_Y: &[&str] = &["tps", "read", "write"];

impl Sample for SarCpu {
    const COLUMNS: &'static [&'static str] = &["%user", "%nice", "%system", "%iowait", "%steal", "%idle"];
    const Y_KEYS: &'static [&'static str] = CPU_Y;

    fn values(&self) -> Vec<f64> {
        vec![self.user, self.nice, self.system, self.iowait, self.steal, self.idle]
    }

    fn chart(&self) -> Vec<f64> {
        vec![100.0 - self.idle]
    }
}

impl Sample for SampledCpu {
    const COLUMNS: &'static [&'static str] = &[
        "%user", "%nice", "%system", "%iowait", "%steal", "%idle", "%irq", "%soft", "%guest",
    ];
    const Y_KEYS: &'static [&'static str] = CPU_Y;

    fn values(&self) -> Vec<f64> {
        vec![
            self.user,
            self.nice,
            self.system,
            self.iowait,
            self.steal,
            self.idle,
            self.irq,
            self.softirq,
            self.guest,
        ]
    }

    fn chart(&self) -> Vec<f64> {
        vec![100.0 - self.idle]
    }
}

impl Sample for SarMemory {
    const COLUMNS: &'static [&'static str] = &[
        "kbmemfree",
        "kbavail",
        "kbmemused",
        "%memused",
        "kbbuffers",
        "kbcached",
        "kbcommit",
        "%commit",
        "kbactive",
        "kbinact",
        "kbdirty",
    ];
    const Y_KEYS: &'static [&'static str] = MEMORY_Y;

    fn values(&self) -> Vec<f64> {
        vec![
            self.kb_mem_free,
            self.kb_avail,
            self.kb_mem_used,
            self.mem_used,
            self.kb_buffers,
            self.kb_cached,
            self.kb_commit,
            self.commit,
            self.kb_active,
            self.kb_inact,
            self.kb_dirty,
        ]
    }

    fn chart(&self) -> Vec<f64> {
        vec![self.mem_used, self.real_used_percent()]
    }
}

impl Sample for SampledMemory {
    const COLUMNS: &'static [&'static str] = &[
        "total",
        "available",
        "used",
        "%used",
        "free",
        "buffers",
        "cached",
        "active",
        "inactive",
        "dirty",
        "swap_total",
        "swap_free",
    ];
    const Y_KEYS: &'static [&'static str] = MEMORY_Y;

    fn values(&self) -> Vec<f64> {
        vec![
            self.total as f64,
            self.available as f64,
            self.used as f64,
            self.used_percent,
            self.free as f64,
            self.buffers as f64,
            self.cached as f64,
            self.active as f64,
            self.inactive as f64,
            self.dirty as f64,
            self.swap_total as f64,
            self.swap_free as f64,
        ]
    }

    fn chart(&self) -> Vec<f64> {
        vec![self.used_percent, self.real_usage()]
    }
}

impl Sample for SarNetwork {
    const COLUMNS: &'static [&'static str] = &[
        "rxpck/s", "txpck/s", "rxkB/s", "txkB/s", "rxcmp/s", "txcmp/s", "rxmcst/s", "%ifutil",
    ];
    const Y_KEYS: &'static [&'static str] = NETWORK_Y;

    fn values(&self) -> Vec<f64> {
        vec![
            self.rx_pck,
            self.tx_pck,
            self.rx_kb,
            self.tx_kb,
            self.rx_cmp,
            self.tx_cmp,
            self.rx_mcst,
            self.if_util,
        ]
    }

    fn chart(&self) -> Vec<f64> {
        vec![self.rx_kb, self.tx_kb]
    }
}

impl Sample for SampledNetwork {
    const COLUMNS: &'static [&'static str] = &[
        "rxpck/s", "txpck/s", "rxkB/s", "txkB/s", "errin/s", "errout/s", "dropin/s", "dropout/s",
    ];
    const Y_KEYS: &'static [&'static str] = NETWORK_Y;

    fn values(&self) -> Vec<f64> {
        vec![
            self.rx_pck,
            self.tx_pck,
            self.rx_kb,
            self.tx_kb,
            self.err_in,
            self.err_out,
            self.drop_in,
            self.drop_out,
        ]
    }

    fn chart(&self) -> Vec<f64> {
        vec![self.rx_kb, self.tx_kb]
    }
}

impl Sample for SarDisk {
    const COLUMNS: &'static [&'static str] = &["tps", "rkB/s", "wkB/s", "areq-sz", "aqu-sz", "await", "%util"];
    const Y_KEYS: &'static [&'static str] = DISK_Y;

    fn values(&self) -> Vec<f64> {
        vec![
            self.tps,
            self.read_kb,
            self.write_kb,
            self.avg_request_size,
            self.avg_queue_size,
            self.await_ms,
            self.util,
        ]
    }

    fn chart(&self) -> Vec<f64> {
        vec![self.tps, self.read_kb, self.write_kb]
    }
}

impl Sample for SampledDisk {
    const COLUMNS: &'static [&'static str] = &["tps", "r/s", "w/s", "rkB/s", "wkB/s", "%util"];
    const Y_KEYS: &'static [&'static str] = DISK_Y;

    fn values(&self) -> Vec<f64> {
        vec![self.tps, self.reads, self.writes, self.read_kb, self.write_kb, self.util]
    }

    fn chart(&self) -> Vec<f64> {
        vec![self.tps, self.read_kb, self.write_kb]
    }
}

/// Regroups `time → key → sample` into one time-ordered view per key.
fn views<T: Sample>(series: &Series<T>) -> Vec<SeriesView> {
    let mut by_key: BTreeMap<&str, SeriesView> = BTreeMap::new();
    for (time, samples) in series {
        for (key, sample) in samples {
            let view = by_key.entry(key.as_str()).or_insert_with(|| SeriesView {
                key: key.clone(),
                columns: T::COLUMNS,
                y_keys: T::Y_KEYS,
                rows: Vec::new(),
            });
            let values = sample.values().into_iter().map(truncate2).collect();
            let chart = sample.chart().into_iter().map(truncate2).collect();
            view.rows.push((*time, values, chart));
        }
    }
    by_key.into_values().collect()
}

pub fn series_views(data: &WorkloadData) -> Vec<SeriesView> {
    match data {
        WorkloadData::SarCpu(series) => views(series),
        WorkloadData::SampledCpu(series) => views(series),
        WorkloadData::SarMemory(series) => views(series),
        WorkloadData::SampledMemory(series) => views(series),
        WorkloadData::SarNetwork(series) => views(series),
        WorkloadData::SampledNetwork(series) => views(series),
        WorkloadData::SarDisk(series) => views(series),
        WorkloadData::SampledDisk(series) => views(series),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::ALL_KEY;
    use pretty_assertions::assert_eq;

    fn cpu(idle: f64) -> BTreeMap<String, SarCpu> {
        BTreeMap::from([(
            ALL_KEY.to_string(),
            SarCpu {
                idle,
                ..Default::default()
            },
        )])
    }

    #[test]
    fn cpu_usage_is_the_complement_of_idle() {
        let data = WorkloadData::SarCpu(BTreeMap::from([(1_700_000_060, cpu(87.456)), (1_700_000_000, cpu(90.0))]));
        let views = series_views(&data);
        assert_eq!(views.len(), 1);
        let graph = views[0].graph("host_cpu_usage-history-all".to_string(), "CPU".to_string());
        assert_eq!(graph.y_keys, vec!["usage"]);
        assert_eq!(graph.rows[0]["usage"], Value::from(10.0));
        assert_eq!(graph.rows[1]["usage"], Value::from(12.54));
    }

    #[test]
    fn tables_and_graphs_share_rows() {
        let disk = |tps: f64| {
            BTreeMap::from([
                ("sda".to_string(), SampledDisk { tps, ..Default::default() }),
                ("sdb".to_string(), SampledDisk { tps: tps * 2.0, ..Default::default() }),
            ])
        };
        let data = WorkloadData::SampledDisk(BTreeMap::from([(10, disk(1.0)), (20, disk(2.0)), (30, disk(3.0))]));
        for view in series_views(&data) {
            let table = view.table_rows();
            let graph = view.graph(view.key.clone(), String::new());
            assert_eq!(table.len(), graph.rows.len());
            for (row, point) in table.iter().zip(&graph.rows) {
                assert_eq!(Value::from(row[0].clone()), point[X_KEY]);
            }
        }
    }

    #[test]
    fn truncates_instead_of_rounding() {
        assert_eq!(truncate2(1.239), 1.23);
        assert_eq!(truncate2(-0.005), 0.0);
    }
}
