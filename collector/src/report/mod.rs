//! # Report Assembler
//!
//! Turns a frozen `YtcReport` into the text, markdown and HTML documents
//! plus the chart payload of the workload items.
//!
//! ## Architecture
//!
//! - **`ReportWriter`**: Every block is written to the three documents at once
//! - **`Registry`**: One `Renderer` per `ItemId`, each with an error and a success branch
//! - **`graph`**: Workload tables and the chart rows built from the same series
//!
//! Modules are walked in module order and items in declared order, never in
//! map order, so equal trees always render to identical documents.

mod graph;
mod renderers;
mod writer;

pub use graph::GraphData;
pub use renderers::{
    format_bytes,
    Registry,
    Renderer,
    Section,
};
pub use writer::ReportWriter;

use crate::{
    data::{
        ItemId,
        YtcModule,
        YtcReport,
    },
    error::ReportError,
    param::{
        ModuleType,
        TIME_FORMAT,
    },
};
use askama::Template;
use chrono::{
    DateTime,
    Local,
};
use ytc_config::i18n;

/// Stylesheet referenced by the HTML report as `static/ytc.css`.
pub const STYLESHEET: &str = include_str!("../../templates/ytc.css");

#[derive(Clone, Debug, PartialEq)]
pub struct ReportContent {
    pub txt: String,
    pub markdown: String,
    pub html: String,
    pub graphs: Vec<GraphData>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct HtmlReport<'a> {
    lang: &'a str,
    title: &'a str,
    body: &'a str,
    graphs: &'a str,
}

pub fn gen_report(report: &YtcReport) -> Result<ReportContent, ReportError> {
    gen_report_with(report, &Registry::default())
}

pub fn gen_report_with(report: &YtcReport, registry: &Registry) -> Result<ReportContent, ReportError> {
    for (module_type, module) in &report.modules {
        check_items(*module_type, module)?;
    }

    let title = i18n::t("report.title");
    let mut writer = ReportWriter::default();
    writer.txt.push_str(&format!("{title}\n{}\n\n", "#".repeat(title.chars().count())));
    writer.markdown.push_str(&format!("# {title}\n\n"));
    overview(report, &mut writer);

    let mut graphs = Vec::new();
    let modules = ModuleType::all()
        .into_iter()
        .filter_map(|module_type| report.modules.get(&module_type).map(|module| (module_type, module)));
    for (module_number, (module_type, module)) in modules.enumerate() {
        let module_number = module_number + 1;
        writer.title(&module_number.to_string(), &module_type.display_name());
        let items = ItemId::of(module_type)
            .into_iter()
            .filter_map(|item| module.get(item).map(|node| (item, node)));
        let mut item_number = 0;
        for (item, node) in items {
            item_number += 1;
            let number = format!("{module_number}.{item_number}");
            writer.title(&number, &item.display_name());
            let mut section = Section {
                writer: &mut writer,
                graphs: &mut graphs,
                item,
            };
            registry.get(item)?.render(node, &number, &mut section)?;
        }
        if item_number == 0 {
            writer.paragraph(&i18n::t("report.no_data"));
        }
    }

    let graph_json = serde_json::to_string(&graphs)?.replace("</", "<\\/");
    let lang = i18n::current().to_string();
    let html = HtmlReport {
        lang: &lang,
        title: &title,
        body: &writer.html,
        graphs: &graph_json,
    }
    .render()?;
    Ok(ReportContent {
        txt: writer.txt,
        markdown: writer.markdown,
        html,
        graphs,
    })
}

/// Every stored key must name an item of the module it is stored in.
fn check_items(module_type: ModuleType, module: &YtcModule) -> Result<(), ReportError> {
    for name in module.items.keys() {
        match name.parse::<ItemId>() {
            Ok(item) if item.module() == module_type => {}
            _ => return Err(ReportError::UnknownItem(name.clone())),
        }
    }
    Ok(())
}

fn format_time(time: DateTime<Local>) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn join_paths(paths: &[std::path::PathBuf]) -> String {
    paths.iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// Collection parameters and the inventory of collected items.
fn overview(report: &YtcReport, writer: &mut ReportWriter) {
    let param = &report.param;
    writer.heading(1, &i18n::t("report.overview"));

    writer.heading(2, &i18n::t("report.parameters"));
    let end_time = report.collect_end_time.map(format_time).unwrap_or_default();
    let types: Vec<String> = report.module_types().iter().map(|module| module.display_name()).collect();
    let rows = [
        ("report.collect_types", types.join(", ")),
        ("report.window_start", format_time(param.start)),
        ("report.window_end", format_time(param.end)),
        ("report.collect_begin", format_time(report.collect_begin_time)),
        ("report.collect_end", end_time),
        ("report.output", param.output.display().to_string()),
        ("report.yasdb_home", param.yasdb_home.display().to_string()),
        ("report.yasdb_data", param.yasdb_data.display().to_string()),
        ("report.yasdb_user", param.yasdb_user.clone().unwrap_or_default()),
        ("report.include", join_paths(&param.include)),
        ("report.exclude", join_paths(&param.exclude)),
    ];
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|(key, value)| vec![i18n::t(key), value])
        .collect();
    writer.table(&[i18n::t("report.name"), i18n::t("report.value")], &rows);

    writer.heading(2, &i18n::t("report.inventory"));
    let mut rows = Vec::new();
    for (module_type, module) in &report.modules {
        for item in ItemId::of(*module_type) {
            let Some(node) = module.get(item) else {
                continue;
            };
            let status = match node.first_error() {
                None => i18n::t("report.status_ok"),
                Some(_) => i18n::t("report.status_failed"),
            };
            rows.push(vec![module_type.display_name(), item.display_name(), status]);
        }
    }
    writer.table(
        &[i18n::t("report.module"), i18n::t("report.item"), i18n::t("report.status")],
        &rows,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collectors::testing,
        data::{
            child,
            DataType,
            ItemDetails,
            YtcItem,
        },
        workload::{
            SarCpu,
            WorkloadData,
            ALL_KEY,
        },
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn cpu_series(idles: &[f64]) -> WorkloadData {
        WorkloadData::SarCpu(
            idles
                .iter()
                .enumerate()
                .map(|(index, idle)| {
                    let sample = SarCpu {
                        user: 100.0 - idle,
                        idle: *idle,
                        ..Default::default()
                    };
                    (1_709_600_000 + index as i64 * 600, BTreeMap::from([(ALL_KEY.to_string(), sample)]))
                })
                .collect(),
        )
    }

    fn base_items() -> Vec<YtcItem> {
        vec![
            YtcItem::new("yasdb_version").with_details(ItemDetails::Text("23.2.1.100".into())),
            YtcItem::new("host_cpu_usage")
                .with_child(
                    YtcItem::new(child::HISTORY)
                        .with_data_type(DataType::Sar)
                        .with_details(ItemDetails::Workload(cpu_series(&[90.0, 80.5, 70.25]))),
                )
                .with_child(
                    YtcItem::new(child::CURRENT)
                        .with_data_type(DataType::Sar)
                        .with_details(ItemDetails::Workload(cpu_series(&[60.0]))),
                ),
            YtcItem::new("host_firewalld").with_details(ItemDetails::Firewall(Default::default())),
        ]
    }

    fn report_with(items: Vec<YtcItem>) -> YtcReport {
        ytc_config::i18n::init(ytc_config::Lang::En);
        let dir = std::path::Path::new("/tmp/ytc-report-test");
        let mut report = YtcReport::new(testing::param(dir));
        report.collect_end_time = Some(testing::begin_time() + chrono::Duration::minutes(3));
        let mut module = YtcModule::new(ModuleType::Base);
        for item in items {
            module.insert(item);
        }
        report.modules.insert(ModuleType::Base, module);
        report
    }

    #[test]
    fn insertion_order_does_not_change_output() {
        let forward = report_with(base_items());
        let mut reversed_items = base_items();
        reversed_items.reverse();
        let reversed = report_with(reversed_items);
        assert_eq!(gen_report(&forward).unwrap(), gen_report(&reversed).unwrap());
    }

    #[test]
    fn rendering_is_idempotent() {
        let report = report_with(base_items());
        let first = gen_report(&report).unwrap();
        let second = gen_report(&report).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn items_follow_declared_order() {
        let content = gen_report(&report_with(base_items())).unwrap();
        let version = content.txt.find("1.1 ").unwrap();
        let firewall = content.txt.find("1.2 ").unwrap();
        let usage = content.txt.find("1.3 ").unwrap();
        assert!(version < firewall && firewall < usage);
        assert!(content.txt.contains(&format!("1.3 {}", ItemId::HostCpuUsage.display_name())));
        assert!(content.txt.contains("1.3.1 "));
        assert!(content.txt.contains("1.3.2 "));
    }

    #[test]
    fn graph_rows_match_table_rows() {
        let content = gen_report(&report_with(base_items())).unwrap();
        assert_eq!(content.graphs.len(), 2);
        let history = &content.graphs[0];
        assert_eq!(history.name, "host_cpu_usage-history-all");
        assert_eq!(history.rows.len(), 3);
        let usages: Vec<f64> = history.rows.iter().map(|row| row["usage"].as_f64().unwrap()).collect();
        assert_eq!(usages, vec![10.0, 19.5, 29.75]);
        for row in &history.rows {
            let time = row[graph::X_KEY].as_str().unwrap();
            assert!(content.txt.contains(time), "{time} missing from table");
        }
        assert!(content.html.contains("data-graph=\"host_cpu_usage-history-all\""));
        assert!(content.html.contains("\"y_keys\":[\"usage\"]"));
    }

    #[test]
    fn missing_sar_renders_install_tip_and_keeps_other_items() {
        let tip = ytc_config::i18n::t_with("common.no_sar_desc", &[("Command", "sudo yum install sysstat")]);
        let mut items = base_items();
        items[1] = YtcItem::new("host_cpu_usage").fail("sar: command not found", tip);
        let content = gen_report(&report_with(items)).unwrap();
        assert!(content.txt.contains("Error: sar: command not found"));
        assert!(content.txt.contains("sudo yum install sysstat"));
        assert!(content.txt.contains("23.2.1.100"));
        assert!(content.graphs.is_empty());
        assert!(content.markdown.contains("sudo yum install sysstat"));
    }

    #[test]
    fn foreign_item_key_is_rejected() {
        let mut report = report_with(base_items());
        report
            .modules
            .get_mut(&ModuleType::Base)
            .unwrap()
            .insert(YtcItem::new("yasdb_awr").with_details(ItemDetails::Path("performance/awr.html".into())));
        assert!(matches!(gen_report(&report), Err(ReportError::UnknownItem(name)) if name == "yasdb_awr"));
    }

    #[test]
    fn overview_never_shows_the_password() {
        let content = gen_report(&report_with(base_items())).unwrap();
        assert!(content.txt.starts_with(&i18n::t("report.title")));
        assert!(!content.txt.contains("yasdb_123"));
        assert!(!content.html.contains("yasdb_123"));
    }
}
