use super::orchestrator::CollectFrontend;
use crate::{
    access::NoAccess,
    data::ItemId,
    param::ModuleType,
};
use comfy_table::{
    presets,
    Attribute,
    Cell,
    Color,
    ContentArrangement,
    Table,
};
use crossterm::style::Stylize as _;
use dialoguer::Confirm;
use indicatif::{
    MultiProgress,
    ProgressBar,
    ProgressStyle,
};
use std::{
    collections::BTreeMap,
    io::IsTerminal as _,
    sync::Mutex,
    time::Duration,
};
use ytc_config::i18n;

const TICK: Duration = Duration::from_millis(80);
const BAR_TEMPLATE: &str = "{spinner:.cyan.bold} {msg:12} [{bar:30.cyan/blue}] {pos}/{len}";
const FINISHED_TEMPLATE: &str = "✓ {msg}";
const FAILED_TEMPLATE: &str = "✗ {msg}";

struct ModuleBar {
    bar: ProgressBar,
    failed: u64,
}

/// Frontend printing to the terminal. Every module gets its own bar in a
/// shared `MultiProgress`; finished items are printed above the bars.
pub struct TerminalFrontend {
    assume_yes: bool,
    multi: MultiProgress,
    bars: Mutex<BTreeMap<ModuleType, ModuleBar>>,
}

impl TerminalFrontend {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            multi: MultiProgress::new(),
            bars: Mutex::new(BTreeMap::new()),
        }
    }

    fn with_bar<T>(&self, module: ModuleType, apply: impl FnOnce(&mut ModuleBar) -> T) -> Option<T> {
        let mut bars = self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        bars.get_mut(&module).map(apply)
    }

    /// Prints above the bars. Without a terminal the bars are hidden and
    /// lines go straight to stdout.
    fn println(&self, line: String) {
        if !std::io::stderr().is_terminal() {
            println!("{line}");
            return;
        }
        if let Err(err) = self.multi.println(line) {
            warn!(%err, "failed to print progress line");
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|err| {
            warn!(%err, template, "invalid progress template");
            ProgressStyle::default_bar()
        })
        .progress_chars("=>-")
}

fn header(titles: &[String]) -> Vec<Cell> {
    titles
        .iter()
        .map(|title| Cell::new(title).add_attribute(Attribute::Bold).fg(Color::Cyan))
        .collect()
}

/// Table of the items that cannot be collected as requested.
pub fn no_access_table(no_access: &[NoAccess]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&[
            i18n::t("progress.module"),
            i18n::t("progress.item"),
            i18n::t("progress.description"),
            i18n::t("progress.tips"),
            i18n::t("progress.force_collect"),
        ]));
    for entry in no_access {
        let (force, color) = match entry.force_collect {
            true => (i18n::t("progress.yes"), Color::Green),
            false => (i18n::t("progress.no"), Color::Red),
        };
        table.add_row(vec![
            Cell::new(entry.item.module().display_name()),
            Cell::new(entry.item.display_name()),
            Cell::new(&entry.description),
            Cell::new(&entry.tips),
            Cell::new(force).fg(color),
        ]);
    }
    table
}

impl CollectFrontend for TerminalFrontend {
    fn confirm_no_access(&self, no_access: &[NoAccess]) -> bool {
        println!("{}", no_access_table(no_access));
        if self.assume_yes {
            return true;
        }
        Confirm::new()
            .with_prompt(i18n::t("progress.confirm_prompt"))
            .default(true)
            .interact()
            .unwrap_or_else(|err| {
                warn!(%err, "confirmation prompt failed");
                false
            })
    }

    fn items_resolved(&self, items: &BTreeMap<ModuleType, Vec<ItemId>>) {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(header(&[i18n::t("progress.module"), i18n::t("progress.items")]));
        for (module, items) in items {
            let color = if items.is_empty() { Color::Red } else { Color::Green };
            table.add_row(vec![
                Cell::new(module.display_name()),
                Cell::new(items.len()).fg(color),
            ]);
        }
        println!("{table}");
    }

    fn bar_started(&self, module: ModuleType, items: &[ItemId]) {
        let bar = self.multi.add(ProgressBar::new(items.len() as u64));
        bar.set_style(style(BAR_TEMPLATE));
        bar.set_message(module.display_name());
        bar.enable_steady_tick(TICK);
        let mut bars = self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        bars.insert(module, ModuleBar { bar, failed: 0 });
    }

    fn item_finished(&self, module: ModuleType, item: ItemId, error: Option<&str>) {
        let counter = self.with_bar(module, |state| {
            state.bar.inc(1);
            state.failed += u64::from(error.is_some());
            format!("[{}/{}]", state.bar.position(), state.bar.length().unwrap_or_default())
        });
        let counter = counter.unwrap_or_default();
        let line = match error {
            None => format!("  {counter} {} {}", "✔".green(), item.display_name()),
            Some(err) => format!(
                "  {counter} {} {} {}",
                "✘".red(),
                item.display_name(),
                format!("err: {err}").red()
            ),
        };
        self.println(line);
    }

    fn bar_finished(&self, module: ModuleType) {
        self.with_bar(module, |state| {
            let done = state.bar.position();
            let summary = i18n::t_with(
                "progress.bar_summary",
                &[
                    ("Module", &module.display_name()),
                    ("Done", &(done - state.failed.min(done)).to_string()),
                    ("Failed", &state.failed.to_string()),
                ],
            );
            if state.failed == 0 {
                state.bar.set_style(style(FINISHED_TEMPLATE));
                state.bar.finish_with_message(summary.green().to_string());
            } else {
                state.bar.set_style(style(FAILED_TEMPLATE));
                state.bar.finish_with_message(summary.yellow().to_string());
            }
        });
    }
}
