//! Package directory of a run: raw item data, report documents and assets.
//!
//! ```text
//! <output>/ytc-<begin time>/
//! ├── data/collect.json       run metadata
//! ├── data/<module>.json      one result module per requested type
//! ├── baseinfo/ diagnosis/ performance/ extra/
//! ├── report.txt report.md report.html
//! └── static/ytc.css
//! ```

use crate::{
    data::{
        YtcModule,
        YtcReport,
    },
    error::CollectError,
    param::{
        CollectParam,
        ModuleType,
    },
    report::{
        self,
        ReportContent,
    },
};
use chrono::{
    DateTime,
    Local,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};

const DATA_DIR: &str = "data";
const META_FILE: &str = "collect.json";
const STATIC_DIR: &str = "static";
const STYLESHEET_FILE: &str = "ytc.css";

/// Everything of a `YtcReport` except the modules.
#[derive(Debug, Serialize, Deserialize)]
struct CollectMeta {
    collect_begin_time: DateTime<Local>,
    collect_end_time: Option<DateTime<Local>>,
    param: CollectParam,
    modules: Vec<ModuleType>,
}

#[derive(Clone, Debug)]
pub struct PackageGateway {
    package_dir: PathBuf,
}

fn package_err(path: &Path) -> impl FnOnce(std::io::Error) -> CollectError + '_ {
    move |source| CollectError::Package {
        path: path.to_path_buf(),
        source,
    }
}

fn write(path: &Path, contents: &str) -> Result<(), CollectError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(package_err(parent))?;
    }
    std::fs::write(path, contents).map_err(package_err(path))
}

fn read(path: &Path) -> Result<String, CollectError> {
    std::fs::read_to_string(path).map_err(package_err(path))
}

impl PackageGateway {
    pub fn new(param: &CollectParam) -> Self {
        Self {
            package_dir: param.package_dir(),
        }
    }

    /// Gateway over an existing package, e.g. to render it again.
    pub fn open(package_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
        }
    }

    /// Same value before, during and after the run.
    pub fn package_dir(&self) -> PathBuf {
        self.package_dir.clone()
    }

    fn data_file(&self, name: &str) -> PathBuf {
        self.package_dir.join(DATA_DIR).join(name)
    }

    /// Writes the module data of `types` and the report documents.
    #[instrument(skip_all, fields(package = %self.package_dir.display()))]
    pub fn gen_result(&self, report: &YtcReport, types: &[ModuleType]) -> Result<PathBuf, CollectError> {
        let mut modules: Vec<ModuleType> = types
            .iter()
            .copied()
            .filter(|module| report.modules.contains_key(module))
            .collect();
        modules.sort();
        modules.dedup();

        let meta = CollectMeta {
            collect_begin_time: report.collect_begin_time,
            collect_end_time: report.collect_end_time,
            param: report.param.clone(),
            modules: modules.clone(),
        };
        write(&self.data_file(META_FILE), &serde_json::to_string_pretty(&meta)?)?;
        for module in &modules {
            if let Some(data) = report.modules.get(module) {
                write(&self.data_file(&format!("{module}.json")), &serde_json::to_string_pretty(data)?)?;
            }
        }

        let mut packaged = report.clone();
        packaged.modules.retain(|module, _| modules.contains(module));
        self.write_report(&report::gen_report(&packaged)?)?;
        info!(modules = ?modules, "package written");
        Ok(self.package_dir())
    }

    fn write_report(&self, content: &ReportContent) -> Result<(), CollectError> {
        write(&self.package_dir.join("report.txt"), &content.txt)?;
        write(&self.package_dir.join("report.md"), &content.markdown)?;
        write(&self.package_dir.join("report.html"), &content.html)?;
        write(
            &self.package_dir.join(STATIC_DIR).join(STYLESHEET_FILE),
            report::STYLESHEET,
        )
    }

    /// Reads the result tree back from the package's data files.
    pub fn load(&self) -> Result<YtcReport, CollectError> {
        let meta: CollectMeta = serde_json::from_str(&read(&self.data_file(META_FILE))?)?;
        let mut report = YtcReport::new(meta.param);
        report.collect_begin_time = meta.collect_begin_time;
        report.collect_end_time = meta.collect_end_time;
        for module in meta.modules {
            let data: YtcModule = serde_json::from_str(&read(&self.data_file(&format!("{module}.json")))?)?;
            report.modules.insert(module, data);
        }
        Ok(report)
    }

    /// Renders the report documents of an existing package again.
    #[instrument(skip_all, fields(package = %self.package_dir.display()))]
    pub fn regenerate(&self) -> Result<ReportContent, CollectError> {
        let report = self.load()?;
        let content = report::gen_report(&report)?;
        self.write_report(&content)?;
        info!("report regenerated");
        Ok(content)
    }
}
