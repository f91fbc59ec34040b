//! # Collectors Module
//!
//! One typed collector per module, driven by the `Orchestrator`.
//!
//! ## Architecture
//!
//! - **`TypedCollector` trait**: Access check, item resolution, per-item tasks and the module result
//! - **`BaseCollector`**: Database version and parameters, host facts, workload history and samples
//! - **`DiagCollector`**: ADR, run and alert logs, process and instance status, system logs, coredumps
//! - **`PerfCollector`**: AWR report between the window's snapshots and slow SQL
//! - **`ExtraCollector`**: Operator supplied files and directories
//! - **`Orchestrator`**: Confirmation, pre-collect, one progress bar per module, packaging
//!
//! Every item task runs its probes on the blocking pool and stores exactly
//! one `YtcItem` into its module, so a failing item never takes its
//! siblings down.

pub mod baseinfo;
mod collector;
pub mod diagnosis;
pub mod extra;
pub(crate) mod files;
pub mod orchestrator;
pub mod performance;
pub mod progress;
#[cfg(test)]
pub(crate) mod testing;

pub use baseinfo::BaseCollector;
pub(crate) use collector::{
    blocking_task,
    timed_task,
};
pub use collector::{
    CollectContext,
    CollectTask,
    TypedCollector,
};
pub use diagnosis::DiagCollector;
pub use extra::ExtraCollector;
pub use orchestrator::{
    CollectFrontend,
    CollectOutcome,
    Orchestrator,
    OrchestratorState,
};
pub use performance::PerfCollector;
pub use progress::TerminalFrontend;

use crate::param::ModuleType;

/// Collectors for the requested module types, in module order.
pub fn new_collectors(types: &[ModuleType], ctx: &CollectContext) -> Vec<Box<dyn TypedCollector>> {
    let mut types = types.to_vec();
    types.sort();
    types.dedup();
    types
        .into_iter()
        .map(|module| -> Box<dyn TypedCollector> {
            match module {
                ModuleType::Base => Box::new(BaseCollector::new(ctx.clone())),
                ModuleType::Diag => Box::new(DiagCollector::new(ctx.clone())),
                ModuleType::Perf => Box::new(PerfCollector::new(ctx.clone())),
                ModuleType::Extra => Box::new(ExtraCollector::new(ctx.clone())),
            }
        })
        .collect()
}
