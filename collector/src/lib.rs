//! # YashanDB Trouble-shooting Collector
//!
//! Gathers host and database diagnostics over a time window, packages them
//! into a directory tree and renders a text, markdown and HTML report.
//!
//! ## Architecture
//!
//! - **`param`**: Collection parameters and time-window resolution
//! - **`access`**: Turns probe failures into operator-facing descriptions and tips
//! - **`collectors`**: One typed collector per module plus the `Orchestrator`
//!   - **`BaseCollector`**: Database version and parameters, host facts and workload
//!   - **`DiagCollector`**: Logs, process and instance status, coredumps
//!   - **`PerfCollector`**: AWR report and slow SQL
//!   - **`ExtraCollector`**: Operator supplied files
//! - **`data`**: The result tree (`YtcReport` → `YtcModule` → `YtcItem`)
//! - **`report`**: Assembles the report documents and the chart payload
//! - **`package`**: Writes the package directory
//! - **`host`**, **`workload`**, **`yasdb`**: Probes of the host and the database

#[macro_use]
extern crate tracing;

pub mod access;
pub mod collectors;
pub mod data;
pub mod deadline;
pub mod error;
pub mod host;
pub mod package;
pub mod param;
pub mod report;
pub mod workload;
pub mod yasdb;

pub use collectors::*;
pub use data::{
    ItemId,
    YtcItem,
    YtcModule,
    YtcReport,
};
pub use deadline::Deadline;
pub use error::{
    CollectError,
    ParamError,
    ReportError,
};
pub use package::PackageGateway;
pub use param::{
    CollectParam,
    ModuleType,
    TimeWindow,
    WindowArgs,
};
