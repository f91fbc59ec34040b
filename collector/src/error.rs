use crate::{
    data::ItemId,
    param::ModuleType,
};
use std::path::PathBuf;
use thiserror::Error;

/// Rejected collection flags. Raised before any probe or collection runs.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("invalid value '{value}' for --{flag}, e.g. {examples}")]
    InvalidFlag {
        flag: &'static str,
        value: String,
        examples: &'static str,
    },
    #[error("--range cannot be combined with --start or --end")]
    RangeWithStartEnd,
    #[error("start time {0} is later than the current time")]
    StartAfterNow(String),
    #[error("end time {end} is earlier than start time {start}")]
    EndBeforeStart { start: String, end: String },
    #[error("collection window {window} is shorter than the minimum {min}")]
    LessThanMinDuration { window: String, min: String },
    #[error("collection window {window} is longer than the maximum {max}")]
    GreaterThanMaxDuration { window: String, max: String },
    #[error("at least one collection type is required")]
    NoCollectType,
    #[error("path {0} must be absolute")]
    RelativePath(PathBuf),
    #[error("--include {include} overlaps the output directory {output}")]
    IncludeOverlapsOutput { include: PathBuf, output: PathBuf },
    #[error("output directory {path} is not usable: {reason}")]
    Output { path: PathBuf, reason: String },
}

/// Run-level failures of the collection pipeline.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no collectible item")]
    NoneCollectItem,
    #[error("pre-collect of module {module} failed: {reason:#}")]
    PreCollect { module: ModuleType, reason: eyre::Report },
    #[error("failed to write package {path}: {source}")]
    Package { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("failed to serialize module data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Structural defects found while assembling the report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown item '{0}'")]
    UnknownItem(String),
    #[error("no renderer registered for item {0}")]
    RendererNotFound(ItemId),
    #[error("item {item} carries {found} data, expected {expected}")]
    PayloadMismatch {
        item: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("item {0} has neither an error nor a payload")]
    MissingPayload(String),
    #[error("item {item} is missing child '{child}'")]
    MissingChild { item: ItemId, child: &'static str },
    #[error("failed to encode graph data: {0}")]
    Graph(#[from] serde_json::Error),
    #[error("failed to render html report: {0}")]
    Template(#[from] askama::Error),
}
